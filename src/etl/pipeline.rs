//! Extract → window → transform → dedup → load.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::csv_export;
use super::load::{self, Loader, WriteSummary};
use super::timestamp::TimestampNormalizer;
use super::transform::{self, SkipStats};
use super::window::{self, ExecutionWindow};
use crate::bitable::{fetch_all, FetchOptions, RecordStore};
use crate::error::{Error, Result, Stage};

/// Which part of the tables a run covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Whole source and target tables.
    #[default]
    Full,
    /// Only the trailing `days` window.
    Incremental,
}

impl SyncMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            other => Err(Error::InvalidArgument(format!(
                "invalid mode '{other}': expected 'full' or 'incremental'"
            ))),
        }
    }
}

/// Everything one run needs besides the store and the clock.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub source_table: String,
    pub target_table: String,
    pub date_field: String,
    pub mode: SyncMode,
    /// Window length in incremental mode.
    pub days: u32,
    pub batch_size: usize,
    pub dry_run: bool,
    pub fetch: FetchOptions,
    /// Export transformed rows here when set.
    pub csv_path: Option<PathBuf>,
}

/// Counters of one run, filled in as stages complete.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub mode: SyncMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<ExecutionWindow>,
    /// Source records fetched.
    pub fetched: usize,
    pub pages: usize,
    pub quarantined_fields: usize,
    pub outside_window: usize,
    pub unresolvable_dates: usize,
    /// Records entering the transform.
    pub extracted: usize,
    /// Target rows produced by the transform.
    pub transformed: usize,
    pub skips: SkipStats,
    pub existing_keys: usize,
    pub new_rows: usize,
    pub write: WriteSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<PathBuf>,
}

/// One sync between a source and a target table.
pub struct Pipeline<'a, S> {
    store: &'a S,
    settings: &'a PipelineSettings,
    normalizer: &'a TimestampNormalizer,
}

impl<'a, S: RecordStore> Pipeline<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S, settings: &'a PipelineSettings, normalizer: &'a TimestampNormalizer) -> Self {
        Self {
            store,
            settings,
            normalizer,
        }
    }

    /// Run every stage, recording counters into `report` as they complete.
    ///
    /// On failure `report` keeps the counters of the stages that finished.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] with the failing stage and table.
    pub async fn run(&self, now: DateTime<Utc>, report: &mut PipelineReport) -> Result<()> {
        let settings = self.settings;
        report.mode = settings.mode;

        let window = match settings.mode {
            SyncMode::Full => None,
            SyncMode::Incremental => Some(ExecutionWindow::trailing(self.normalizer.today(now), settings.days)),
        };
        report.window = window;

        // Extract
        let fetched = fetch_all(self.store, &settings.source_table, &settings.fetch)
            .await
            .map_err(|source| Error::Remote {
                stage: Stage::Extract,
                table: settings.source_table.clone(),
                source,
            })?;
        report.fetched = fetched.records.len();
        report.pages = fetched.pages;
        report.quarantined_fields = fetched.quarantined_fields;
        if fetched.quarantined_fields > 0 {
            warn!(fields = fetched.quarantined_fields, "fields with unsupported shapes were ignored");
        }

        let records = match &window {
            Some(window) => {
                let outcome = window::filter(fetched.records, &settings.date_field, window, self.normalizer);
                report.outside_window = outcome.outside;
                report.unresolvable_dates = outcome.unresolvable;
                info!(%window, kept = outcome.records.len(), "incremental window applied");
                outcome.records
            }
            None => fetched.records,
        };
        report.extracted = records.len();

        // Transform
        let transformed = transform::transform(&records, &settings.date_field, self.normalizer);
        report.transformed = transformed.rows.len();
        report.skips = transformed.stats;

        if let Some(path) = &settings.csv_path {
            match csv_export::write_rows(path, &transformed.rows, &settings.date_field) {
                Ok(()) => {
                    info!(path = %path.display(), "CSV written");
                    report.csv_path = Some(path.clone());
                }
                Err(e) => warn!(path = %path.display(), error = %e, "CSV export failed"),
            }
        }

        // Load
        let loader = Loader::new(
            self.store,
            &settings.target_table,
            &settings.date_field,
            self.normalizer,
            &settings.fetch,
        );
        let existing = loader.build_existing_keys(window.as_ref()).await?;
        report.existing_keys = existing.len();

        let new_rows = load::select_new(transformed.rows, &existing);
        report.new_rows = new_rows.len();
        info!(new = new_rows.len(), "rows left after dedup");

        report.write = loader.write(&new_rows, settings.batch_size, settings.dry_run).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitable::testing::MemoryStore;
    use crate::bitable::{FieldValue, SourceRecord};
    use tempfile::TempDir;

    fn text(value: &str) -> FieldValue {
        FieldValue::Text(value.to_string())
    }

    fn source(id: &str, date: &str, name: &str, slots: &[(&str, &str)]) -> SourceRecord {
        let mut fields = vec![
            ("日期".to_string(), text(date)),
            ("姓名".to_string(), text(name)),
            ("部门".to_string(), text("研发部")),
        ];
        for (i, (project, hours)) in slots.iter().enumerate() {
            fields.push((format!("项目名称-{}", i + 1), text(project)));
            fields.push((format!("项目工时-{}", i + 1), text(hours)));
        }
        SourceRecord::new(id, fields)
    }

    fn target(id: &str, date: &str, name: &str, project: &str) -> SourceRecord {
        SourceRecord::new(
            id,
            [
                ("日期".to_string(), text(date)),
                ("姓名".to_string(), text(name)),
                ("项目名称".to_string(), text(project)),
            ],
        )
    }

    fn settings(mode: SyncMode) -> PipelineSettings {
        PipelineSettings {
            source_table: "tblSource".into(),
            target_table: "tblTarget".into(),
            date_field: "日期".into(),
            mode,
            days: 7,
            batch_size: 500,
            dry_run: false,
            fetch: FetchOptions::default(),
            csv_path: None,
        }
    }

    // 2024-01-08T04:00:00Z, noon in Shanghai.
    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_704_686_400, 0).unwrap()
    }

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_pages(
                "tblSource",
                vec![
                    vec![
                        source("s1", "2024-01-05", "Alice", &[("Alpha", "3"), ("Beta", "2")]),
                        source("s2", "2023-12-01", "Bob", &[("Gamma", "8")]),
                    ],
                    vec![source("s3", "2024-01-07", "Carol", &[("Delta", "4")])],
                ],
            )
            .with_table("tblTarget", vec![target("t1", "2024-01-05", "Alice", "Alpha")])
    }

    #[tokio::test]
    async fn test_full_run() {
        let store = store();
        let settings = settings(SyncMode::Full);
        let normalizer = TimestampNormalizer::default();
        let mut report = PipelineReport::default();

        Pipeline::new(&store, &settings, &normalizer)
            .run(now(), &mut report)
            .await
            .unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.pages, 2);
        assert_eq!(report.transformed, 4);
        assert_eq!(report.existing_keys, 1);
        assert_eq!(report.new_rows, 3);
        assert_eq!(report.write.written, 3);
        assert!(report.window.is_none());

        let written: Vec<_> = store.committed()[0]
            .iter()
            .map(|f| f["项目名称"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(written, ["Beta", "Gamma", "Delta"]);
    }

    #[tokio::test]
    async fn test_incremental_run_uses_window() {
        let store = store();
        let settings = settings(SyncMode::Incremental);
        let normalizer = TimestampNormalizer::default();
        let mut report = PipelineReport::default();

        Pipeline::new(&store, &settings, &normalizer)
            .run(now(), &mut report)
            .await
            .unwrap();

        assert_eq!(report.window.unwrap().to_string(), "[2024-01-01, 2024-01-08)");
        assert_eq!(report.fetched, 3);
        assert_eq!(report.outside_window, 1);
        assert_eq!(report.extracted, 2);
        assert_eq!(report.new_rows, 2);
        assert_eq!(report.write.written, 2);
    }

    #[tokio::test]
    async fn test_rerun_after_success_writes_nothing() {
        let store = MemoryStore::new()
            .with_table("tblSource", vec![source("s1", "2024-01-05", "Alice", &[("Alpha", "3")])])
            .with_table("tblTarget", vec![target("t1", "2024-01-05", "Alice", "Alpha")]);
        let settings = settings(SyncMode::Full);
        let normalizer = TimestampNormalizer::default();
        let mut report = PipelineReport::default();

        Pipeline::new(&store, &settings, &normalizer)
            .run(now(), &mut report)
            .await
            .unwrap();

        assert_eq!(report.new_rows, 0);
        assert!(store.create_calls().is_empty());
    }

    #[tokio::test]
    async fn test_dedup_matches_target_dates_stored_as_millis() {
        // 2024-01-05T00:00:00+08:00, as written back by the loader
        let written_date = FieldValue::Number(1_704_384_000_000.0);
        let existing = SourceRecord::new(
            "t1",
            [
                ("日期".to_string(), written_date),
                ("姓名".to_string(), text("Alice")),
                ("项目名称".to_string(), text("Alpha")),
            ],
        );
        let store = MemoryStore::new()
            .with_table(
                "tblSource",
                vec![source("s1", "2024-01-05", "Alice", &[("Alpha", "3"), ("Beta", "1")])],
            )
            .with_table("tblTarget", vec![existing]);
        let normalizer = TimestampNormalizer::default();

        for mode in [SyncMode::Full, SyncMode::Incremental] {
            let settings = settings(mode);
            let mut report = PipelineReport::default();

            Pipeline::new(&store, &settings, &normalizer)
                .run(now(), &mut report)
                .await
                .unwrap();

            assert_eq!(report.existing_keys, 1, "{mode} mode");
            assert_eq!(report.new_rows, 1, "{mode} mode");
        }

        let written: Vec<_> = store
            .committed()
            .iter()
            .flatten()
            .map(|f| f["项目名称"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(written, ["Beta", "Beta"]);
    }

    #[tokio::test]
    async fn test_extract_failure_keeps_partial_report() {
        let store = MemoryStore::new().failing_list("tblSource");
        let settings = settings(SyncMode::Full);
        let normalizer = TimestampNormalizer::default();
        let mut report = PipelineReport::default();

        let err = Pipeline::new(&store, &settings, &normalizer)
            .run(now(), &mut report)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Remote { stage: Stage::Extract, .. }));
        assert_eq!(report.fetched, 0);
    }

    #[tokio::test]
    async fn test_csv_export_written_alongside_run() {
        let temp = TempDir::new().unwrap();
        let mut settings = settings(SyncMode::Full);
        settings.csv_path = Some(temp.path().join("rows.csv"));
        settings.dry_run = true;
        let store = store();
        let normalizer = TimestampNormalizer::default();
        let mut report = PipelineReport::default();

        Pipeline::new(&store, &settings, &normalizer)
            .run(now(), &mut report)
            .await
            .unwrap();

        assert_eq!(report.csv_path, settings.csv_path);
        let content = std::fs::read_to_string(temp.path().join("rows.csv")).unwrap();
        assert_eq!(content.lines().count(), 5);
        assert!(store.create_calls().is_empty());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("FULL".parse::<SyncMode>().unwrap(), SyncMode::Full);
        assert_eq!("incremental".parse::<SyncMode>().unwrap(), SyncMode::Incremental);
        assert!("weekly".parse::<SyncMode>().is_err());
        assert_eq!(SyncMode::Incremental.to_string(), "incremental");
    }
}
