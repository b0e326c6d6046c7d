//! Page-token driven full table retrieval.
//!
//! The whole table is materialised in memory. That is fine for timesheet
//! tables (tens of thousands of rows at most) but is the first thing to
//! revisit if tables grow much larger.

use tracing::{debug, info};

use super::{ApiError, PageRequest, RecordStore, SourceRecord};

/// Largest page the list endpoint accepts.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Options shared by every page request of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub page_size: u32,
    pub view_id: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            view_id: None,
        }
    }
}

/// Every record of a table plus fetch diagnostics.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub records: Vec<SourceRecord>,
    pub pages: usize,
    /// Fields dropped at decode time because of an unsupported shape.
    pub quarantined_fields: usize,
}

/// Fetch all records of `table_id`, following continuation tokens.
///
/// Stops when the server returns an empty or absent page token.
///
/// # Errors
///
/// Returns the first page failure; records from earlier pages are discarded.
pub async fn fetch_all<S: RecordStore>(
    store: &S,
    table_id: &str,
    options: &FetchOptions,
) -> Result<FetchOutcome, ApiError> {
    let mut outcome = FetchOutcome::default();
    let mut page_token: Option<String> = None;

    loop {
        let request = PageRequest {
            page_size: options.page_size,
            page_token: page_token.take(),
            view_id: options.view_id.clone(),
        };

        let page = store.list_page(table_id, &request).await?;
        outcome.pages += 1;
        outcome.quarantined_fields += page
            .items
            .iter()
            .map(SourceRecord::unsupported_fields)
            .sum::<usize>();
        debug!(table_id, page = outcome.pages, items = page.items.len(), "page received");
        outcome.records.extend(page.items);

        match page.page_token.filter(|t| !t.is_empty()) {
            Some(next) => page_token = Some(next),
            None => break,
        }
    }

    info!(
        table_id,
        records = outcome.records.len(),
        pages = outcome.pages,
        "fetched table"
    );
    Ok(outcome)
}
