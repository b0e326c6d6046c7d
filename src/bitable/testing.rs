//! In-memory [`RecordStore`] and a canned local HTTP server for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::retry::{AttemptFailure, TransportError};
use super::{ApiError, Page, PageRequest, RecordStore, SourceRecord, WriteFields};

/// Serves pre-split pages per table and records every create call.
#[derive(Default)]
pub(crate) struct MemoryStore {
    pages: HashMap<String, Vec<Vec<SourceRecord>>>,
    failing_table: Option<String>,
    failing_create_call: Option<usize>,
    list_requests: Mutex<Vec<(String, PageRequest)>>,
    create_calls: Mutex<Vec<Vec<WriteFields>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `pages` for `table_id`, in order.
    pub fn with_pages(mut self, table_id: &str, pages: Vec<Vec<SourceRecord>>) -> Self {
        self.pages.insert(table_id.to_string(), pages);
        self
    }

    /// Serve all `records` for `table_id` as a single page.
    pub fn with_table(self, table_id: &str, records: Vec<SourceRecord>) -> Self {
        self.with_pages(table_id, vec![records])
    }

    /// Every list call against `table_id` fails.
    pub fn failing_list(mut self, table_id: &str) -> Self {
        self.failing_table = Some(table_id.to_string());
        self
    }

    /// The create call with this 1-based index fails after "retries".
    pub fn failing_create_call(mut self, call: usize) -> Self {
        self.failing_create_call = Some(call);
        self
    }

    pub fn list_requests(&self) -> Vec<(String, PageRequest)> {
        self.list_requests.lock().unwrap().clone()
    }

    /// Batches of every create call, including the failed one.
    pub fn create_calls(&self) -> Vec<Vec<WriteFields>> {
        self.create_calls.lock().unwrap().clone()
    }

    /// Batches that were accepted.
    pub fn committed(&self) -> Vec<Vec<WriteFields>> {
        self.create_calls()
            .into_iter()
            .enumerate()
            .filter(|(i, _)| self.failing_create_call != Some(i + 1))
            .map(|(_, batch)| batch)
            .collect()
    }

    fn exhausted() -> ApiError {
        ApiError::Transport(TransportError::RetryExhausted {
            attempts: 3,
            last: AttemptFailure::Status(500),
        })
    }
}

impl RecordStore for MemoryStore {
    async fn list_page(&self, table_id: &str, request: &PageRequest) -> Result<Page, ApiError> {
        self.list_requests
            .lock()
            .unwrap()
            .push((table_id.to_string(), request.clone()));

        if self.failing_table.as_deref() == Some(table_id) {
            return Err(Self::exhausted());
        }

        let pages = self.pages.get(table_id).cloned().unwrap_or_default();
        let index = request
            .page_token
            .as_deref()
            .and_then(|t| t.strip_prefix("page-"))
            .and_then(|n| n.parse::<usize>().ok())
            .unwrap_or(0);

        let items = pages.get(index).cloned().unwrap_or_default();
        // The real API ends with an empty token rather than omitting it.
        let page_token = if index + 1 < pages.len() {
            Some(format!("page-{}", index + 1))
        } else {
            Some(String::new())
        };

        Ok(Page { items, page_token })
    }

    async fn batch_create(&self, _table_id: &str, records: &[WriteFields]) -> Result<usize, ApiError> {
        let call = {
            let mut calls = self.create_calls.lock().unwrap();
            calls.push(records.to_vec());
            calls.len()
        };

        if self.failing_create_call == Some(call) {
            return Err(Self::exhausted());
        }
        Ok(records.len())
    }
}

/// Serve one canned `(status, body)` reply per incoming connection on a
/// local port. Returns the base URL and a counter of requests served.
pub(crate) async fn serve_replies(replies: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    tokio::spawn(async move {
        for (status, body) in replies {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            read_request(&mut stream).await;
            counter.fetch_add(1, Ordering::SeqCst);
            let reason = reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Unknown");
            let reply = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(reply.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{addr}"), hits)
}

/// Consume headers and a `Content-Length` body.
async fn read_request(stream: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let body_len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + body_len {
            return;
        }
    }
}
