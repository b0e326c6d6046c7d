//! Date normalisation between the table's date shapes.
//!
//! The list API returns a date cell either as a display string or as a Unix
//! timestamp in seconds or milliseconds. Everything inside the pipeline works
//! on canonical `YYYY-MM-DD` strings; the create API wants epoch millis at
//! local midnight.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::bitable::{FieldValue, SourceRecord};

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_SECS: i64 = 946_684_800;
/// 2038-01-19T03:14:07Z
pub const MAX_VALID_SECS: i64 = 2_147_483_647;
/// Numbers at or above this magnitude are milliseconds. Smaller numbers
/// that are out of range as seconds are tried as milliseconds too.
pub const MILLIS_THRESHOLD: f64 = 1_000_000_000_000.0;

pub const DEFAULT_TIMEZONE: &str = "Asia/Shanghai";

const DATE_FORMAT: &str = "%Y-%m-%d";

const UTC_PLUS_8: FixedOffset = match FixedOffset::east_opt(8 * 3600) {
    Some(offset) => offset,
    None => panic!("UTC+8 is a valid offset"),
};

/// Date conversion failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimestampError {
    #[error("timestamp {value} is outside 2000-01-01..=2038-01-19")]
    OutOfRange { value: f64 },

    #[error("unsupported date value: {kind}")]
    UnsupportedType { kind: &'static str },

    #[error("invalid date '{input}', expected YYYY-MM-DD")]
    Parse { input: String },
}

/// Zone in which calendar dates are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateZone {
    Named(Tz),
    /// Used when the configured name is unknown.
    Fixed(FixedOffset),
}

impl DateZone {
    /// Look up an IANA zone name, falling back to UTC+8.
    #[must_use]
    pub fn resolve(name: &str) -> Self {
        match name.parse::<Tz>() {
            Ok(tz) => Self::Named(tz),
            Err(_) => {
                warn!(zone = name, "unknown time zone, falling back to UTC+8");
                Self::Fixed(UTC_PLUS_8)
            }
        }
    }

    fn date_of(self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Named(tz) => instant.with_timezone(&tz).date_naive(),
            Self::Fixed(offset) => instant.with_timezone(&offset).date_naive(),
        }
    }

    fn midnight_millis(self, date: NaiveDate) -> Option<i64> {
        let midnight = date.and_time(NaiveTime::MIN);
        match self {
            Self::Named(tz) => tz.from_local_datetime(&midnight).earliest().map(|t| t.timestamp_millis()),
            Self::Fixed(offset) => offset
                .from_local_datetime(&midnight)
                .earliest()
                .map(|t| t.timestamp_millis()),
        }
    }
}

/// Converts date cells to canonical strings and back to epoch millis.
#[derive(Debug, Clone, Copy)]
pub struct TimestampNormalizer {
    zone: DateZone,
}

impl Default for TimestampNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}

impl TimestampNormalizer {
    #[must_use]
    pub fn new(zone_name: &str) -> Self {
        Self {
            zone: DateZone::resolve(zone_name),
        }
    }

    #[must_use]
    pub const fn zone(&self) -> DateZone {
        self.zone
    }

    /// Canonical `YYYY-MM-DD` form of a date cell.
    ///
    /// Text is returned unchanged. Numbers are Unix timestamps, milliseconds
    /// when `|value| >= 1e12`, and must land in the 2000..=2038 range.
    ///
    /// # Errors
    ///
    /// [`TimestampError::OutOfRange`] for timestamps outside the valid range,
    /// [`TimestampError::UnsupportedType`] for anything that is neither text
    /// nor a number.
    pub fn to_canonical_date_string(&self, value: &FieldValue) -> Result<String, TimestampError> {
        match value {
            FieldValue::Text(text) => Ok(text.clone()),
            FieldValue::Number(raw) => {
                let date = self.timestamp_date(*raw)?;
                Ok(date.format(DATE_FORMAT).to_string())
            }
            FieldValue::Absent => Err(TimestampError::UnsupportedType { kind: "null" }),
            FieldValue::Unsupported { kind } => Err(TimestampError::UnsupportedType { kind }),
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn timestamp_date(&self, raw: f64) -> Result<NaiveDate, TimestampError> {
        let out_of_range = TimestampError::OutOfRange { value: raw };
        if !raw.is_finite() {
            return Err(out_of_range);
        }

        let in_range = |secs: f64| (MIN_VALID_SECS as f64..=MAX_VALID_SECS as f64).contains(&secs);
        let secs = if raw.abs() >= MILLIS_THRESHOLD || !in_range(raw) {
            raw / 1000.0
        } else {
            raw
        };
        if !in_range(secs) {
            return Err(out_of_range);
        }

        let whole = secs.floor();
        let nanos = ((secs - whole) * 1e9) as u32;
        let instant = DateTime::from_timestamp(whole as i64, nanos).ok_or(out_of_range)?;
        Ok(self.zone.date_of(instant))
    }

    /// Parse a canonical date string.
    ///
    /// # Errors
    ///
    /// [`TimestampError::Parse`] on empty or malformed input.
    pub fn calendar_date(&self, date: &str) -> Result<NaiveDate, TimestampError> {
        NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| TimestampError::Parse {
            input: date.to_string(),
        })
    }

    /// Epoch millis of local midnight on `date`.
    ///
    /// # Errors
    ///
    /// [`TimestampError::Parse`] on empty or malformed input.
    pub fn to_epoch_millis(&self, date: &str) -> Result<i64, TimestampError> {
        let parsed = self.calendar_date(date)?;
        self.zone
            .midnight_millis(parsed)
            .ok_or_else(|| TimestampError::Parse {
                input: date.to_string(),
            })
    }

    /// Resolve a record's date field to its canonical string.
    ///
    /// A missing, null or empty field is `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// Propagates conversion failures of a present value.
    pub fn resolve_date_field(
        &self,
        record: &SourceRecord,
        key: &str,
    ) -> Result<Option<String>, TimestampError> {
        match record.field(key) {
            FieldValue::Absent => Ok(None),
            value => {
                let date = self.to_canonical_date_string(value)?;
                Ok((!date.is_empty()).then_some(date))
            }
        }
    }

    /// Calendar date of `now` in the configured zone.
    #[must_use]
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.zone.date_of(now)
    }
}
