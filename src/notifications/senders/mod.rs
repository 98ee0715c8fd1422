use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use super::models::ChannelConfig;

pub mod slack;
pub mod telegram;
pub mod webhook;

/// Upper bound on a single delivery attempt.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// A trait for sending notifications to a specific channel type.
/// All concrete sender implementations (e.g., Telegram, Slack, Webhook) must implement this trait.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Sends a notification.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for this channel.
    /// * `message` - The rendered, human-readable message.
    /// * `context` - Key-value pairs for template rendering (`monitor`, `status`,
    ///   `previous_status`, `time`, `message`).
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError>;
}

/// Turns a non-2xx response into [`SenderError::SendFailed`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    service: &str,
) -> Result<(), SenderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let error_body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    Err(SenderError::SendFailed(format!(
        "{service} returned non-success status: {status}. Body: {error_body}"
    )))
}
