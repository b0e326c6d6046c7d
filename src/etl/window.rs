//! Trailing date window for incremental runs.

use std::fmt;

use chrono::{Days, NaiveDate};
use serde::Serialize;
use tracing::debug;

use super::timestamp::TimestampNormalizer;
use crate::bitable::SourceRecord;

/// Half-open range of calendar dates, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutionWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ExecutionWindow {
    /// The `days` calendar days before `today`. Today itself is excluded.
    #[must_use]
    pub fn trailing(today: NaiveDate, days: u32) -> Self {
        let start = today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

impl fmt::Display for ExecutionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Records inside the window plus what was dropped.
#[derive(Debug, Clone, Default)]
pub struct WindowOutcome {
    pub records: Vec<SourceRecord>,
    /// Dated records outside the window.
    pub outside: usize,
    /// Records whose date was missing, empty or unparseable.
    pub unresolvable: usize,
}

/// Keep the records whose date field falls inside `window`.
#[must_use]
pub fn filter(
    records: Vec<SourceRecord>,
    date_field: &str,
    window: &ExecutionWindow,
    normalizer: &TimestampNormalizer,
) -> WindowOutcome {
    let mut outcome = WindowOutcome::default();

    for record in records {
        let date = match normalizer.resolve_date_field(&record, date_field) {
            Ok(Some(text)) => normalizer.calendar_date(&text),
            Ok(None) => {
                debug!(record = %record.id, "no date, dropped by window");
                outcome.unresolvable += 1;
                continue;
            }
            Err(e) => Err(e),
        };

        match date {
            Ok(date) if window.contains(date) => outcome.records.push(record),
            Ok(_) => outcome.outside += 1,
            Err(e) => {
                debug!(record = %record.id, error = %e, "unresolvable date, dropped by window");
                outcome.unresolvable += 1;
            }
        }
    }

    outcome
}
