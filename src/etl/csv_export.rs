//! CSV dump of transformed rows.

use std::path::Path;

use super::transform::TargetRow;
use crate::error::Result;

/// Write `rows` to `path` with a header row.
///
/// Columns are the union of row labels in first-seen order. With no rows the
/// file is created empty.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_rows(path: &Path, rows: &[TargetRow], date_field: &str) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;

    let mut headers: Vec<&str> = Vec::new();
    let labelled: Vec<_> = rows.iter().map(|row| row.labelled_values(date_field)).collect();
    for values in &labelled {
        for (label, _) in values {
            if !headers.contains(label) {
                headers.push(*label);
            }
        }
    }

    if labelled.is_empty() {
        writer.flush()?;
        return Ok(());
    }

    writer.write_record(&headers)?;
    for values in &labelled {
        let record = headers.iter().map(|header| {
            values
                .iter()
                .find(|(label, _)| label == header)
                .map_or("", |(_, value)| value.as_str())
        });
        writer.write_record(record)?;
    }
    writer.flush()?;

    Ok(())
}
