//! Feishu/Lark Bitable open API access.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐      ┌──────────────┐
//! │ etl pipeline │─────▶│ RecordStore  │  ← trait seam (tests use a fake)
//! └──────────────┘      └──────┬───────┘
//!                              │
//!                       ┌──────▼───────┐
//!                       │BitableClient │  list_page / batch_create
//!                       └──────┬───────┘
//!                              │
//!                       ┌──────▼───────┐
//!                       │ RetryPolicy  │  3 attempts, 1s then 2s backoff
//!                       └──────┬───────┘
//!                              ▼
//!                         HTTPS (reqwest)
//! ```
//!
//! The pager drives [`RecordStore::list_page`] until the continuation token
//! runs out; the loader writes through [`RecordStore::batch_create`].

pub mod auth;
pub mod client;
pub mod pager;
pub mod retry;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

use serde::de::DeserializeOwned;

pub use auth::{tenant_access_token, AccessToken};
pub use client::{build_http_client, BitableClient, ClientSettings, DEFAULT_BASE_URL};
pub use pager::{fetch_all, FetchOptions, FetchOutcome, DEFAULT_PAGE_SIZE};
pub use retry::{AttemptFailure, RetryPolicy, TransportError};
pub use types::{FieldValue, SourceRecord, WriteFields};

/// Longest response excerpt kept in decode errors.
const BODY_EXCERPT_CHARS: usize = 200;

/// Failure of a single API operation.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("undecodable response ({source}): {body}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },

    #[error("API returned code {code}: {msg}")]
    Code { code: i64, msg: String },

    #[error("API returned an empty access token")]
    EmptyToken,
}

/// Parse a response body, keeping an excerpt of it on failure.
pub(crate) fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|source| ApiError::Decode {
        source,
        body: body.chars().take(BODY_EXCERPT_CHARS).collect(),
    })
}

/// Parameters of one list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub page_size: u32,
    /// Continuation token from the previous page; `None` on the first call.
    pub page_token: Option<String>,
    pub view_id: Option<String>,
}

/// One page of records.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<SourceRecord>,
    /// Empty or absent when this is the last page.
    pub page_token: Option<String>,
}

/// Table-level operations the pipeline needs from the remote store.
pub trait RecordStore: Send + Sync {
    /// Fetch one page of a table.
    fn list_page(
        &self,
        table_id: &str,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Page, ApiError>> + Send;

    /// Create all `records` in one call. Returns the number created.
    fn batch_create(
        &self,
        table_id: &str,
        records: &[WriteFields],
    ) -> impl Future<Output = Result<usize, ApiError>> + Send;
}
