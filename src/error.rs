//! Error types for the worklog ETL CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=remote, 3=auth, 5=config, etc.)
//! - Retryability flags for schedulers deciding whether to re-run
//! - Context-aware recovery hints
//! - Structured JSON output for `--json` consumers

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::bitable::ApiError;

/// Result type alias for worklog ETL operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Stage ─────────────────────────────────────────────────────

/// Pipeline stage a remote failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    DedupIndex,
    Load,
}

impl Stage {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::DedupIndex => "dedup-index",
            Self::Load => "load",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Wrappers match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Remote (exit 8; 2 belongs to clap usage errors)
    RemoteError,

    // Auth (exit 3)
    AuthError,

    // Validation (exit 4)
    InvalidArgument,

    // Config (exit 5)
    ConfigError,
    ConfigNotFound,

    // I/O (exit 6)
    IoError,
    JsonError,
    CsvError,

    // Notification (exit 7)
    NotifyError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::RemoteError => "REMOTE_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ConfigError => "CONFIG_ERROR",
            Self::ConfigNotFound => "CONFIG_NOT_FOUND",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::CsvError => "CSV_ERROR",
            Self::NotifyError => "NOTIFY_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1, 3-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::RemoteError => 8,
            Self::AuthError => 3,
            Self::InvalidArgument => 4,
            Self::ConfigError | Self::ConfigNotFound => 5,
            Self::IoError | Self::JsonError | Self::CsvError => 6,
            Self::NotifyError => 7,
        }
    }

    /// Whether re-running the same command may succeed.
    ///
    /// True for remote failures: the transport already retried, but the
    /// dedup index makes a later re-run safe.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in worklog ETL operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Remote {stage} failed on table {table}: {source}")]
    Remote {
        stage: Stage,
        table: String,
        #[source]
        source: ApiError,
    },

    #[error("Authentication failed: {0}")]
    Auth(#[source] ApiError),

    #[error("No config file found (searched: {})", searched.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    ConfigNotFound { searched: Vec<PathBuf> },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Remote { .. } => ErrorCode::RemoteError,
            Self::Auth(_) => ErrorCode::AuthError,
            Self::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Notify(_) => ErrorCode::NotifyError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Csv(_) => ErrorCode::CsvError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Remote {
                stage: Stage::Load, ..
            } => Some(
                "Batches written before the failure are kept. \
                 Re-run the same command; already written rows are skipped by dedup."
                    .to_string(),
            ),
            Self::Remote { source, .. } => match source {
                ApiError::Code { code, .. } => Some(format!(
                    "The API rejected the request with code {code}. \
                     Check that the app has access to the base and that the table IDs are correct."
                )),
                _ => Some("Check network access to the open API and re-run.".to_string()),
            },

            Self::Auth(_) => Some(
                "Check app_id / app_secret in the config file, \
                 or set FEISHU_APP_ID / FEISHU_APP_SECRET."
                    .to_string(),
            ),

            Self::ConfigNotFound { .. } => Some(
                "Create config.json in the working directory or pass --config <path> \
                 (or set WETL_CONFIG)."
                    .to_string(),
            ),

            Self::Config(msg) if msg.contains("mode") => {
                Some("Valid modes: full, incremental".to_string())
            }
            Self::InvalidArgument(msg) if msg.contains("mode") => {
                Some("Valid modes: full, incremental".to_string())
            }

            Self::Config(_)
            | Self::InvalidArgument(_)
            | Self::Notify(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Csv(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Self::Remote { stage, table, .. } = self {
            obj["error"]["stage"] = serde_json::Value::String(stage.to_string());
            obj["error"]["table"] = serde_json::Value::String(table.clone());
        }

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
