//! Configuration management.
//!
//! The tool reads one JSON file. Its location is resolved in this order:
//!
//! 1. `--config <path>` (or `WETL_CONFIG`, wired through clap)
//! 2. `./config.json` in the working directory
//! 3. `~/.worklog-etl/config.json`
//!
//! Credentials can be overridden with `FEISHU_APP_ID` / `FEISHU_APP_SECRET`
//! so they need not live in the file. Command-line flags of `wetl run` are
//! applied on top of the loaded file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bitable::{FetchOptions, RetryPolicy, DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE};
use crate::error::{Error, Result};
use crate::etl::fields::DEFAULT_DATE_FIELD;
use crate::etl::timestamp::DEFAULT_TIMEZONE;
use crate::etl::{PipelineSettings, SyncMode};

/// Largest batch the create endpoint accepts.
pub const MAX_BATCH_SIZE: usize = 500;

pub const DEFAULT_CSV_FILE_NAME: &str = "output.csv";

const CONFIG_FILE_NAME: &str = "config.json";
const REDACTED: &str = "********";

/// Contents of `config.json`. Field names match the file keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app_id: String,
    pub app_secret: String,
    pub bitable_app_token: String,
    pub source_table: String,
    pub target_table: String,
    pub date_field: String,
    /// `full` or `incremental`.
    pub mode: String,
    pub days: u32,
    pub batch_size: usize,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_id: Option<String>,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robot_webhook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub csv_output: bool,
    pub csv_file_name: String,
    pub timezone: String,
    pub max_attempts: u32,
    pub request_timeout_secs: u64,
    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            bitable_app_token: String::new(),
            source_table: String::new(),
            target_table: String::new(),
            date_field: DEFAULT_DATE_FIELD.to_string(),
            mode: SyncMode::Full.to_string(),
            days: 7,
            batch_size: MAX_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            view_id: None,
            dry_run: false,
            robot_webhook: None,
            chat_id: None,
            csv_output: false,
            csv_file_name: DEFAULT_CSV_FILE_NAME.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            max_attempts: crate::bitable::retry::DEFAULT_MAX_ATTEMPTS,
            request_timeout_secs: 30,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Global per-user config location.
#[must_use]
pub fn global_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".worklog-etl").join(CONFIG_FILE_NAME))
}

/// Resolve which config file to load.
///
/// # Errors
///
/// Returns [`Error::ConfigNotFound`] listing every location tried.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::ConfigNotFound {
            searched: vec![path.to_path_buf()],
        });
    }

    let mut searched = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(global) = global_config_path() {
        searched.push(global);
    }

    searched
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or(Error::ConfigNotFound { searched })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Parse config JSON and fill in defaults for empty values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the JSON is malformed.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))?;
        config.fill_defaults();
        Ok(config)
    }

    /// Load a config file and apply the credential environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        let mut config = Self::from_json_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Empty strings and zero sizes in the file mean "use the default".
    fn fill_defaults(&mut self) {
        let defaults = Self::default();
        if self.mode.trim().is_empty() {
            self.mode = defaults.mode;
        }
        if self.date_field.trim().is_empty() {
            self.date_field = defaults.date_field;
        }
        if self.batch_size == 0 {
            self.batch_size = defaults.batch_size;
        }
        if self.csv_file_name.trim().is_empty() {
            self.csv_file_name = defaults.csv_file_name;
        }
        if self.timezone.trim().is_empty() {
            self.timezone = defaults.timezone;
        }
        if self.base_url.trim().is_empty() {
            self.base_url = defaults.base_url;
        }
        self.view_id = non_empty(self.view_id.take());
        self.robot_webhook = non_empty(self.robot_webhook.take());
        self.chat_id = non_empty(self.chat_id.take());
    }

    /// Override credentials from `FEISHU_APP_ID` / `FEISHU_APP_SECRET`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = non_empty(lookup("FEISHU_APP_ID")) {
            self.app_id = id;
        }
        if let Some(secret) = non_empty(lookup("FEISHU_APP_SECRET")) {
            self.app_secret = secret;
        }
    }

    /// Parsed run mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for anything but `full` / `incremental`.
    pub fn sync_mode(&self) -> Result<SyncMode> {
        self.mode
            .parse()
            .map_err(|_| Error::Config(format!("invalid mode '{}': must be full or incremental", self.mode)))
    }

    /// Check required fields and value ranges.
    ///
    /// # Errors
    ///
    /// Returns the first problem found as [`Error::Config`].
    pub fn validate(&self) -> Result<()> {
        if self.app_id.is_empty() || self.app_secret.is_empty() {
            return Err(Error::Config("missing app_id or app_secret".into()));
        }
        if self.bitable_app_token.is_empty() {
            return Err(Error::Config("missing bitable_app_token".into()));
        }
        if self.source_table.is_empty() || self.target_table.is_empty() {
            return Err(Error::Config("missing source_table or target_table".into()));
        }
        self.sync_mode()?;
        if self.days == 0 {
            return Err(Error::Config("days must be greater than 0".into()));
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(Error::Config(format!(
                "batch_size {} exceeds the API limit of {MAX_BATCH_SIZE}",
                self.batch_size
            )));
        }
        if self.page_size == 0 || self.page_size > DEFAULT_PAGE_SIZE {
            return Err(Error::Config(format!(
                "page_size must be between 1 and {DEFAULT_PAGE_SIZE}"
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be greater than 0".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            page_size: self.page_size,
            view_id: self.view_id.clone(),
        }
    }

    /// Settings for one pipeline run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the mode is invalid.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        Ok(PipelineSettings {
            source_table: self.source_table.clone(),
            target_table: self.target_table.clone(),
            date_field: self.date_field.clone(),
            mode: self.sync_mode()?,
            days: self.days,
            batch_size: self.batch_size,
            dry_run: self.dry_run,
            fetch: self.fetch_options(),
            csv_path: self.csv_output.then(|| PathBuf::from(&self.csv_file_name)),
        })
    }

    /// JSON view with secrets masked, for display.
    #[must_use]
    pub fn redacted(&self) -> serde_json::Value {
        let mut shown = self.clone();
        if !shown.app_secret.is_empty() {
            shown.app_secret = REDACTED.to_string();
        }
        if shown.robot_webhook.is_some() {
            shown.robot_webhook = Some(REDACTED.to_string());
        }
        serde_json::to_value(shown).unwrap_or_default()
    }
}
