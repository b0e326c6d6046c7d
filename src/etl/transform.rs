//! Wide source record → narrow target rows.
//!
//! Every source record carries up to three `(project, hours)` slots. Each
//! populated slot becomes its own target row sharing the record's base
//! fields.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::fields;
use super::load::DedupKey;
use super::timestamp::TimestampNormalizer;
use crate::bitable::{SourceRecord, WriteFields};

/// One row of the target table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetRow {
    pub status: String,
    /// Canonical `YYYY-MM-DD` date.
    pub date: String,
    pub department: String,
    pub name: String,
    pub worklog: String,
    pub notes: String,
    pub project: String,
    pub hours: f64,
}

impl TargetRow {
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.date, &self.name, &self.project)
    }

    /// `(label, text)` pairs in target column order.
    #[must_use]
    pub fn labelled_values<'a>(&'a self, date_field: &'a str) -> [(&'a str, String); 8] {
        [
            (fields::STATUS, self.status.clone()),
            (date_field, self.date.clone()),
            (fields::DEPARTMENT, self.department.clone()),
            (fields::NAME, self.name.clone()),
            (fields::WORKLOG, self.worklog.clone()),
            (fields::NOTES, self.notes.clone()),
            (fields::TARGET_PROJECT, self.project.clone()),
            (fields::TARGET_HOURS, self.hours.to_string()),
        ]
    }

    /// Field map for the create API, with the date as epoch millis.
    #[must_use]
    pub fn to_write_fields(&self, date_field: &str, date_millis: i64) -> WriteFields {
        let mut map = WriteFields::new();
        map.insert(fields::STATUS.into(), Value::String(self.status.clone()));
        map.insert(date_field.into(), json!(date_millis));
        map.insert(fields::DEPARTMENT.into(), Value::String(self.department.clone()));
        map.insert(fields::NAME.into(), Value::String(self.name.clone()));
        map.insert(fields::WORKLOG.into(), Value::String(self.worklog.clone()));
        map.insert(fields::NOTES.into(), Value::String(self.notes.clone()));
        map.insert(fields::TARGET_PROJECT.into(), Value::String(self.project.clone()));
        map.insert(fields::TARGET_HOURS.into(), json!(self.hours));
        map
    }
}

/// Why a whole source record was skipped by its check marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    Duplicate,
}

/// Skip counters of one transform pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipStats {
    /// Records flagged as entered twice.
    pub duplicate: usize,
    /// Records flagged as empty.
    pub empty: usize,
    /// Records with a missing or invalid date.
    pub other: usize,
    /// Individual project slots with unusable hours.
    pub invalid_slots: usize,
}

impl SkipStats {
    /// Whole records skipped, over all categories.
    #[must_use]
    pub const fn records(&self) -> usize {
        self.duplicate + self.empty + self.other
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransformOutcome {
    pub rows: Vec<TargetRow>,
    pub stats: SkipStats,
}

/// Check-marker rule. The empty-data sentinel wins over the duplicate one.
#[must_use]
pub fn check_skip_reason(record: &SourceRecord) -> Option<SkipReason> {
    let marker = record.field(fields::CHECK).to_text_lossy().to_lowercase();
    if marker.is_empty() {
        return None;
    }
    if marker.contains(fields::EMPTY_DATA_SENTINEL) {
        Some(SkipReason::Empty)
    } else if marker.contains(fields::DUPLICATE_SENTINEL) {
        Some(SkipReason::Duplicate)
    } else {
        None
    }
}

fn is_unset(value: &str) -> bool {
    value.is_empty() || value == fields::UNSET_PLACEHOLDER
}

/// Expand `records` into target rows, preserving record then slot order.
#[must_use]
pub fn transform(
    records: &[SourceRecord],
    date_field: &str,
    normalizer: &TimestampNormalizer,
) -> TransformOutcome {
    let mut outcome = TransformOutcome::default();

    for record in records {
        match check_skip_reason(record) {
            Some(SkipReason::Empty) => {
                debug!(record = %record.id, "flagged as empty data, skipped");
                outcome.stats.empty += 1;
                continue;
            }
            Some(SkipReason::Duplicate) => {
                debug!(record = %record.id, "flagged as duplicate entry, skipped");
                outcome.stats.duplicate += 1;
                continue;
            }
            None => {}
        }

        let date = match normalizer.resolve_date_field(record, date_field) {
            Ok(Some(date)) => date,
            Ok(None) => {
                warn!(record = %record.id, field = date_field, "date is empty, skipped");
                outcome.stats.other += 1;
                continue;
            }
            Err(e) => {
                warn!(record = %record.id, field = date_field, error = %e, "invalid date, skipped");
                outcome.stats.other += 1;
                continue;
            }
        };

        for (name_key, hours_key) in fields::PROJECT_SLOTS {
            let project = record.text(name_key);
            let raw_hours = record.field(hours_key).to_text_lossy();
            if is_unset(project) || is_unset(&raw_hours) {
                continue;
            }

            let hours = match raw_hours.parse::<f64>() {
                Ok(h) if h.is_finite() && h > 0.0 => h,
                _ => {
                    warn!(record = %record.id, project, hours = %raw_hours, "invalid hours, slot skipped");
                    outcome.stats.invalid_slots += 1;
                    continue;
                }
            };

            outcome.rows.push(TargetRow {
                status: record.text(fields::STATUS).to_string(),
                date: date.clone(),
                department: record.text(fields::DEPARTMENT).to_string(),
                name: record.text(fields::NAME).to_string(),
                worklog: record.text(fields::WORKLOG).to_string(),
                notes: record.text(fields::NOTES).to_string(),
                project: project.to_string(),
                hours,
            });
        }
    }

    info!(
        rows = outcome.rows.len(),
        duplicate = outcome.stats.duplicate,
        empty = outcome.stats.empty,
        other = outcome.stats.other,
        invalid_slots = outcome.stats.invalid_slots,
        "transformed records"
    );
    outcome
}
