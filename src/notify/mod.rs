//! Run-result notification.
//!
//! Every `wetl run` produces a [`NotificationResult`], whether or not it is
//! sent. Delivery prefers a custom-bot webhook and falls back to the app bot
//! posting into `chat_id`. Delivery failures never change the run outcome;
//! the caller only logs them.

pub mod card;

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::bitable::{BitableClient, RetryPolicy};
use crate::error::{Error, Result};
use crate::etl::{PipelineReport, SyncMode};

const SUCCESS_MESSAGE: &str = "数据同步完成";

/// Outcome of one run, as shown to humans.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationResult {
    pub success: bool,
    pub mode: SyncMode,
    pub duration: Duration,
    pub start_time: DateTime<Local>,
    pub message: String,
    pub details: String,
}

impl NotificationResult {
    /// Summarise a finished (or failed) run.
    #[must_use]
    pub fn from_run(
        start_time: DateTime<Local>,
        duration: Duration,
        report: &PipelineReport,
        outcome: &Result<()>,
    ) -> Self {
        let mut details = format!(
            "抽取记录: {} 条, 转换后: {} 条, 新增: {} 条, 写入: {} 条.",
            report.extracted, report.transformed, report.new_rows, report.write.written
        );
        if report.write.dry_run {
            details.push_str(" (dry-run)");
        }

        Self {
            success: outcome.is_ok(),
            mode: report.mode,
            duration,
            start_time,
            message: match outcome {
                Ok(()) => SUCCESS_MESSAGE.to_string(),
                Err(e) => e.to_string(),
            },
            details,
        }
    }
}

/// Where notifications go.
#[derive(Debug, Clone, Default)]
pub struct NotifyTargets {
    pub webhook: Option<String>,
    pub chat_id: Option<String>,
}

impl NotifyTargets {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.webhook.is_none() && self.chat_id.is_none()
    }
}

/// How a notification was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Webhook,
    Chat,
    /// No usable target.
    Skipped,
}

/// Webhook replies carry a `code`; HTTP 200 alone does not mean accepted.
///
/// Older bot replies only carry `StatusCode`. A body with neither, or one
/// that is not JSON, is not an acknowledgement.
fn check_reply(body: &str) -> Result<()> {
    let reply: Value = serde_json::from_str(body)
        .map_err(|e| Error::Notify(format!("unreadable reply ({e}): {body}")))?;
    let code = reply
        .get("code")
        .or_else(|| reply.get("StatusCode"))
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Notify(format!("reply has no status code: {body}")))?;
    if code == 0 {
        Ok(())
    } else {
        Err(Error::Notify(format!("bot replied with code {code}: {body}")))
    }
}

async fn read_reply(response: reqwest::Response) -> Result<()> {
    let body = response
        .text()
        .await
        .map_err(|e| Error::Notify(format!("failed to read reply: {e}")))?;
    check_reply(&body)
}

/// Deliver `result` to the configured target.
///
/// `client` is the authenticated Bitable client; without it the chat target
/// cannot be used.
///
/// # Errors
///
/// Returns [`Error::Notify`] if delivery fails after retries.
pub async fn send_notification(
    targets: &NotifyTargets,
    http: &reqwest::Client,
    client: Option<&BitableClient>,
    retry: &RetryPolicy,
    result: &NotificationResult,
) -> Result<Delivery> {
    let card = card::build_card(result);

    if let Some(webhook) = &targets.webhook {
        let message = card::webhook_message(&card);
        let response = retry
            .send(|| http.post(webhook).json(&message))
            .await
            .map_err(|e| Error::Notify(e.to_string()))?;
        read_reply(response).await?;
        info!("notification sent via webhook");
        return Ok(Delivery::Webhook);
    }

    match (&targets.chat_id, client) {
        (Some(chat_id), Some(client)) => {
            let url = format!("{}/im/v1/messages?receive_id_type=chat_id", client.base_url());
            let message = card::chat_message(chat_id, &card);
            let response = client
                .retry()
                .send(|| {
                    client
                        .http()
                        .post(&url)
                        .bearer_auth(client.access_token())
                        .json(&message)
                })
                .await
                .map_err(|e| Error::Notify(e.to_string()))?;
            read_reply(response).await?;
            info!(chat_id = %chat_id, "notification sent to chat");
            Ok(Delivery::Chat)
        }
        (Some(_), None) => {
            warn!("no access token, cannot notify the chat");
            Ok(Delivery::Skipped)
        }
        (None, _) => {
            warn!("no robot_webhook or chat_id configured, notification not sent");
            Ok(Delivery::Skipped)
        }
    }
}
