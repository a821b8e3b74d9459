//! Notification dispatch over the Telegram Bot HTTP API.
//!
//! The target identifier (a chat id) is opaque here; it comes from the
//! profile or the deployment override. Delivery failure is reported to the
//! caller and never rolls back persisted state.

use crate::model::{RunError, SeverityTier};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("notification API returned HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("notification API did not accept the message: {0}")]
    NotAccepted(String),
}

impl NotifyError {
    /// Network errors, rate limiting, and server errors may succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            NotifyError::Transport(_) => true,
            NotifyError::Rejected { status, .. } => *status == 429 || *status >= 500,
            NotifyError::NotAccepted(_) => false,
        }
    }
}

impl From<NotifyError> for RunError {
    fn from(e: NotifyError) -> Self {
        RunError::DeliveryFailed(e.to_string())
    }
}

/// Delivers a text message to an opaque target.
pub trait Notifier {
    fn send(&self, target: &str, message: &str) -> Result<(), NotifyError>;
}

// ---------------------------------------------------------------------------
// Message formatting
// ---------------------------------------------------------------------------

/// Short human-readable alert naming the previous and new tier.
pub fn format_alert_message(
    previous: SeverityTier,
    current: SeverityTier,
    observed_at: DateTime<Utc>,
    frames_used: usize,
) -> String {
    [
        format!("Rain alert: {} -> {}", previous, current),
        format!("Radar observed at {}", observed_at.format("%Y-%m-%d %H:%M UTC")),
        format!("Frames used: {}", frames_used),
    ]
    .join("\n")
}

// ---------------------------------------------------------------------------
// Telegram client
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    #[serde(default)]
    ok: bool,
    description: Option<String>,
}

/// Extracts a readable reason from an error body: the API's `description`
/// when the body is JSON, otherwise the trimmed text.
fn describe_error_body(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<TelegramResponse>(body) {
        if let Some(description) = parsed.description.filter(|d| !d.trim().is_empty()) {
            return description;
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.to_string()
    }
}

pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    api_base: String,
    bot_token: String,
    retry: RetryPolicy,
}

impl TelegramNotifier {
    pub fn new(
        client: reqwest::blocking::Client,
        api_base: &str,
        bot_token: String,
        retry: RetryPolicy,
    ) -> Self {
        TelegramNotifier {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            retry,
        }
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }

    fn post_once(&self, target: &str, message: &str) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "chat_id": target,
            "text": message,
            "disable_notification": false,
        });
        // The request URL embeds the bot token; keep it out of error messages.
        let response = self
            .client
            .post(self.send_message_url())
            .json(&payload)
            .send()
            .map_err(reqwest::Error::without_url)?;
        let status = response.status();
        let body = response.text().map_err(reqwest::Error::without_url)?;
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                detail: describe_error_body(&body),
            });
        }
        match serde_json::from_str::<TelegramResponse>(&body) {
            Ok(parsed) if parsed.ok => Ok(()),
            _ => Err(NotifyError::NotAccepted(describe_error_body(&body))),
        }
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, target: &str, message: &str) -> Result<(), NotifyError> {
        self.retry.run(
            "notification",
            |_| self.post_once(target, message),
            NotifyError::is_transient,
        )?;
        info!(chat = %target, "notification delivered");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
