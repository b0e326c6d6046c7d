//! Deduplicated, batched writes into the target table.
//!
//! The target table is the only durable state. Before writing, the loader
//! indexes the `date|name|project` keys already present (over the same window
//! as the candidate rows) and only writes rows whose key is new.
//!
//! A failed batch aborts the load. Batches committed before it stay written;
//! re-running the sync is the recovery path, since dedup skips them.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::fields;
use super::timestamp::TimestampNormalizer;
use super::transform::TargetRow;
use super::window::{self, ExecutionWindow};
use crate::bitable::{fetch_all, FetchOptions, RecordStore, WriteFields};
use crate::error::{Error, Result, Stage};

/// Rows previewed in dry-run mode.
const DRY_RUN_PREVIEW: usize = 3;

/// Composite identity of a target row: `date|name|project`, case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    #[must_use]
    pub fn new(date: &str, name: &str, project: &str) -> Self {
        Self(format!("{date}|{name}|{project}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keys already present in the target table.
#[derive(Debug, Clone, Default)]
pub struct ExistingKeys {
    keys: HashSet<DedupKey>,
    /// Target records looked at (after windowing).
    pub scanned: usize,
    /// Target records without a usable date, name or project.
    pub skipped: usize,
}

impl ExistingKeys {
    #[must_use]
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<DedupKey> for ExistingKeys {
    fn from_iter<I: IntoIterator<Item = DedupKey>>(iter: I) -> Self {
        let keys: HashSet<_> = iter.into_iter().collect();
        Self {
            scanned: keys.len(),
            keys,
            skipped: 0,
        }
    }
}

/// Result of the write stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WriteSummary {
    /// Rows handed to the writer.
    pub pending: usize,
    pub written: usize,
    /// Create calls issued.
    pub batches: usize,
    /// Rows dropped because their date could not be converted.
    pub dropped: usize,
    pub dry_run: bool,
    /// Prepared field maps shown in dry-run mode.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preview: Vec<WriteFields>,
}

/// Keep the rows whose key is not in `existing`, preserving order.
#[must_use]
pub fn select_new(rows: Vec<TargetRow>, existing: &ExistingKeys) -> Vec<TargetRow> {
    rows.into_iter()
        .filter(|row| !existing.contains(&row.dedup_key()))
        .collect()
}

/// Writes target rows through a [`RecordStore`].
pub struct Loader<'a, S> {
    store: &'a S,
    table_id: &'a str,
    date_field: &'a str,
    normalizer: &'a TimestampNormalizer,
    fetch: &'a FetchOptions,
}

impl<'a, S: RecordStore> Loader<'a, S> {
    #[must_use]
    pub const fn new(
        store: &'a S,
        table_id: &'a str,
        date_field: &'a str,
        normalizer: &'a TimestampNormalizer,
        fetch: &'a FetchOptions,
    ) -> Self {
        Self {
            store,
            table_id,
            date_field,
            normalizer,
            fetch,
        }
    }

    fn remote_error(&self, stage: Stage, source: crate::bitable::ApiError) -> Error {
        Error::Remote {
            stage,
            table: self.table_id.to_string(),
            source,
        }
    }

    /// Index the keys present in the target table, restricted to `window`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] if the target table cannot be read.
    pub async fn build_existing_keys(&self, window: Option<&ExecutionWindow>) -> Result<ExistingKeys> {
        let fetched = fetch_all(self.store, self.table_id, self.fetch)
            .await
            .map_err(|e| self.remote_error(Stage::DedupIndex, e))?;

        let records = match window {
            Some(window) => {
                let outcome = window::filter(fetched.records, self.date_field, window, self.normalizer);
                info!(table = self.table_id, %window, kept = outcome.records.len(), "windowed target table");
                outcome.records
            }
            None => fetched.records,
        };

        let mut existing = ExistingKeys {
            scanned: records.len(),
            ..ExistingKeys::default()
        };

        for record in &records {
            let date = match self.normalizer.resolve_date_field(record, self.date_field) {
                Ok(Some(date)) => date,
                Ok(None) | Err(_) => {
                    warn!(record = %record.id, "target record has no usable date, not indexed");
                    existing.skipped += 1;
                    continue;
                }
            };
            let name = record.text(fields::NAME);
            let project = record.text(fields::TARGET_PROJECT);
            if name.is_empty() || project.is_empty() {
                warn!(record = %record.id, "target record lacks name or project, not indexed");
                existing.skipped += 1;
                continue;
            }
            existing.keys.insert(DedupKey::new(&date, name, project));
        }

        debug!(keys = existing.len(), skipped = existing.skipped, "built dedup index");
        Ok(existing)
    }

    fn prepare(&self, row: &TargetRow) -> Option<WriteFields> {
        match self.normalizer.to_epoch_millis(&row.date) {
            Ok(millis) => Some(row.to_write_fields(self.date_field, millis)),
            Err(e) => {
                warn!(key = %row.dedup_key(), error = %e, "date conversion failed, row dropped");
                None
            }
        }
    }

    /// Write `rows` in contiguous chunks of at most `batch_size`.
    ///
    /// In dry-run mode nothing is sent; up to three prepared rows are logged
    /// and returned as a preview.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] on the first failed create call. Earlier
    /// batches remain committed.
    pub async fn write(&self, rows: &[TargetRow], batch_size: usize, dry_run: bool) -> Result<WriteSummary> {
        let mut summary = WriteSummary {
            pending: rows.len(),
            dry_run,
            ..WriteSummary::default()
        };

        if dry_run {
            info!(rows = rows.len(), "dry run, nothing will be written");
            for (i, row) in rows.iter().take(DRY_RUN_PREVIEW).enumerate() {
                if let Some(prepared) = self.prepare(row) {
                    info!(n = i + 1, fields = %serde_json::Value::Object(prepared.clone()), "dry-run preview");
                    summary.preview.push(prepared);
                }
            }
            return Ok(summary);
        }

        if rows.is_empty() {
            info!("nothing to write");
            return Ok(summary);
        }

        for chunk in rows.chunks(batch_size.max(1)) {
            let prepared: Vec<WriteFields> = chunk.iter().filter_map(|row| self.prepare(row)).collect();
            summary.dropped += chunk.len() - prepared.len();

            if prepared.is_empty() {
                info!("batch has no valid rows, skipped");
                continue;
            }

            self.store
                .batch_create(self.table_id, &prepared)
                .await
                .map_err(|e| self.remote_error(Stage::Load, e))?;

            summary.batches += 1;
            summary.written += prepared.len();
            info!(written = summary.written, total = rows.len(), "batch written");
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitable::testing::MemoryStore;
    use crate::bitable::{FieldValue, SourceRecord};

    fn row(date: &str, name: &str, project: &str) -> TargetRow {
        TargetRow {
            status: "已完成".into(),
            date: date.into(),
            department: "研发部".into(),
            name: name.into(),
            worklog: String::new(),
            notes: String::new(),
            project: project.into(),
            hours: 1.0,
        }
    }

    fn target(id: &str, date: &str, name: &str, project: &str) -> SourceRecord {
        SourceRecord::new(
            id,
            [
                ("日期".to_string(), FieldValue::Text(date.into())),
                ("姓名".to_string(), FieldValue::Text(name.into())),
                ("项目名称".to_string(), FieldValue::Text(project.into())),
            ],
        )
    }

    fn rows(n: usize) -> Vec<TargetRow> {
        (0..n).map(|i| row("2024-01-01", "Alice", &format!("P{i}"))).collect()
    }

    #[test]
    fn test_select_new_excludes_exact_key_only() {
        let existing: ExistingKeys = [DedupKey::new("2024-01-01", "Alice", "ProjX")].into_iter().collect();
        let candidates = vec![
            row("2024-01-01", "Alice", "ProjX"),
            row("2024-01-01", "Alice", "ProjY"),
            row("2024-01-01", "alice", "ProjX"),
        ];

        let selected = select_new(candidates, &existing);

        let projects: Vec<_> = selected.iter().map(|r| (r.name.as_str(), r.project.as_str())).collect();
        assert_eq!(projects, [("Alice", "ProjY"), ("alice", "ProjX")]);
    }

    #[tokio::test]
    async fn test_batches_of_two_with_second_failing() {
        let store = MemoryStore::new().failing_create_call(2);
        let normalizer = TimestampNormalizer::default();
        let fetch = FetchOptions::default();
        let loader = Loader::new(&store, "tblTarget", "日期", &normalizer, &fetch);

        let result = loader.write(&rows(5), 2, false).await;

        assert!(matches!(
            result,
            Err(Error::Remote {
                stage: Stage::Load,
                ..
            })
        ));
        let sizes: Vec<_> = store.create_calls().iter().map(Vec::len).collect();
        assert_eq!(sizes, [2, 2]);
        assert_eq!(store.committed().len(), 1);
        assert_eq!(store.committed()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_batches_of_two_succeed() {
        let store = MemoryStore::new();
        let normalizer = TimestampNormalizer::default();
        let fetch = FetchOptions::default();
        let loader = Loader::new(&store, "tblTarget", "日期", &normalizer, &fetch);

        let summary = loader.write(&rows(5), 2, false).await.unwrap();

        let sizes: Vec<_> = store.create_calls().iter().map(Vec::len).collect();
        assert_eq!(sizes, [2, 2, 1]);
        assert_eq!(summary.written, 5);
        assert_eq!(summary.batches, 3);
        assert_eq!(store.create_calls()[0][0]["日期"], serde_json::json!(1_704_038_400_000_i64));
    }

    #[tokio::test]
    async fn test_dry_run_never_creates() {
        let store = MemoryStore::new();
        let normalizer = TimestampNormalizer::default();
        let fetch = FetchOptions::default();
        let loader = Loader::new(&store, "tblTarget", "日期", &normalizer, &fetch);

        let summary = loader.write(&rows(10), 2, true).await.unwrap();

        assert!(store.create_calls().is_empty());
        assert_eq!(summary.written, 0);
        assert_eq!(summary.pending, 10);
        assert_eq!(summary.preview.len(), 3);
        assert!(summary.dry_run);
    }

    #[tokio::test]
    async fn test_bad_dates_are_dropped_and_empty_batches_skipped() {
        let store = MemoryStore::new();
        let normalizer = TimestampNormalizer::default();
        let fetch = FetchOptions::default();
        let loader = Loader::new(&store, "tblTarget", "日期", &normalizer, &fetch);
        let input = vec![
            row("someday", "Alice", "A"),
            row("never", "Alice", "B"),
            row("2024-01-02", "Alice", "C"),
        ];

        let summary = loader.write(&input, 2, false).await.unwrap();

        assert_eq!(summary.dropped, 2);
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.written, 1);
        assert_eq!(store.create_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_batch_size_writes_one_per_call() {
        let store = MemoryStore::new();
        let normalizer = TimestampNormalizer::default();
        let fetch = FetchOptions::default();
        let loader = Loader::new(&store, "tblTarget", "日期", &normalizer, &fetch);

        loader.write(&rows(2), 0, false).await.unwrap();
        assert_eq!(store.create_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_existing_keys_skip_incomplete_records() {
        let store = MemoryStore::new().with_table(
            "tblTarget",
            vec![
                target("t1", "2024-01-01", "Alice", "ProjX"),
                target("t2", "2024-01-01", "", "ProjX"),
                target("t3", "", "Bob", "ProjY"),
                target("t4", "2024-01-02", "Bob", "ProjY"),
            ],
        );
        let normalizer = TimestampNormalizer::default();
        let fetch = FetchOptions::default();
        let loader = Loader::new(&store, "tblTarget", "日期", &normalizer, &fetch);

        let keys = loader.build_existing_keys(None).await.unwrap();

        assert_eq!(keys.len(), 2);
        assert_eq!(keys.skipped, 2);
        assert!(keys.contains(&DedupKey::new("2024-01-01", "Alice", "ProjX")));
        assert!(keys.contains(&DedupKey::new("2024-01-02", "Bob", "ProjY")));
    }

    #[tokio::test]
    async fn test_existing_keys_respect_window() {
        let store = MemoryStore::new().with_table(
            "tblTarget",
            vec![
                target("t1", "2024-01-05", "Alice", "ProjX"),
                target("t2", "2023-06-01", "Alice", "ProjX"),
            ],
        );
        let normalizer = TimestampNormalizer::default();
        let fetch = FetchOptions::default();
        let loader = Loader::new(&store, "tblTarget", "日期", &normalizer, &fetch);
        let window = ExecutionWindow::trailing(chrono::NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(), 7);

        let keys = loader.build_existing_keys(Some(&window)).await.unwrap();

        assert_eq!(keys.len(), 1);
        assert!(keys.contains(&DedupKey::new("2024-01-05", "Alice", "ProjX")));
    }

    #[tokio::test]
    async fn test_existing_keys_failure_carries_stage() {
        let store = MemoryStore::new().failing_list("tblTarget");
        let normalizer = TimestampNormalizer::default();
        let fetch = FetchOptions::default();
        let loader = Loader::new(&store, "tblTarget", "日期", &normalizer, &fetch);

        let err = loader.build_existing_keys(None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Remote {
                stage: Stage::DedupIndex,
                ref table,
                ..
            } if table == "tblTarget"
        ));
    }
}
