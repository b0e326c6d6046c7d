//! HTTP client for Bitable record endpoints.

use std::time::Duration;

use tracing::debug;

use super::retry::RetryPolicy;
use super::types::{
    BatchCreateRequest, BatchCreateResponse, ListRecordsResponse, NewRecord, SourceRecord,
    WriteFields,
};
use super::{decode_body, ApiError, Page, PageRequest, RecordStore};

/// Feishu open API root.
pub const DEFAULT_BASE_URL: &str = "https://open.feishu.cn/open-apis";

/// Build the shared HTTP client with a fixed request timeout.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
}

/// Where and how the client talks to one Bitable app.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// API root, e.g. [`DEFAULT_BASE_URL`].
    pub base_url: String,
    /// The Bitable app (base) token that owns the tables.
    pub app_token: String,
    pub retry: RetryPolicy,
}

/// Authenticated Bitable client.
pub struct BitableClient {
    http: reqwest::Client,
    settings: ClientSettings,
    access_token: String,
}

impl BitableClient {
    #[must_use]
    pub fn new(http: reqwest::Client, settings: ClientSettings, access_token: String) -> Self {
        Self {
            http,
            settings,
            access_token,
        }
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn access_token(&self) -> &str {
        &self.access_token
    }

    pub(crate) fn base_url(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    pub(crate) fn retry(&self) -> &RetryPolicy {
        &self.settings.retry
    }

    fn records_url(&self, table_id: &str) -> String {
        format!(
            "{}/bitable/v1/apps/{}/tables/{}/records",
            self.base_url(),
            self.settings.app_token,
            table_id
        )
    }
}

impl RecordStore for BitableClient {
    async fn list_page(&self, table_id: &str, request: &PageRequest) -> Result<Page, ApiError> {
        let url = self.records_url(table_id);

        let mut query = vec![("page_size", request.page_size.to_string())];
        if let Some(token) = request.page_token.as_deref().filter(|t| !t.is_empty()) {
            query.push(("page_token", token.to_string()));
        }
        if let Some(view_id) = request.view_id.as_deref().filter(|v| !v.is_empty()) {
            query.push(("view_id", view_id.to_string()));
        }

        let response = self
            .retry()
            .send(|| {
                self.http
                    .get(&url)
                    .query(&query)
                    .bearer_auth(&self.access_token)
            })
            .await?;

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Body(e.to_string()))?;
        let decoded: ListRecordsResponse = decode_body(&body)?;

        if decoded.code != 0 {
            return Err(ApiError::Code {
                code: decoded.code,
                msg: decoded.msg,
            });
        }

        let data = decoded.data.unwrap_or_default();
        let items: Vec<SourceRecord> = data
            .items
            .unwrap_or_default()
            .into_iter()
            .map(SourceRecord::from_wire)
            .collect();

        debug!(table_id, items = items.len(), "fetched page");

        Ok(Page {
            items,
            page_token: data.page_token,
        })
    }

    async fn batch_create(&self, table_id: &str, records: &[WriteFields]) -> Result<usize, ApiError> {
        let url = format!("{}/batch_create", self.records_url(table_id));
        let payload = BatchCreateRequest {
            records: records.iter().map(|fields| NewRecord { fields }).collect(),
        };

        let response = self
            .retry()
            .send(|| {
                self.http
                    .post(&url)
                    .bearer_auth(&self.access_token)
                    .json(&payload)
            })
            .await?;

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Body(e.to_string()))?;
        let decoded: BatchCreateResponse = decode_body(&body)?;

        if decoded.code != 0 {
            return Err(ApiError::Code {
                code: decoded.code,
                msg: decoded.msg,
            });
        }

        Ok(decoded
            .data
            .map_or(records.len(), |data| data.records.len()))
    }
}
