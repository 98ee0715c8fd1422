use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use super::{NotificationSender, SEND_TIMEOUT, SenderError, ensure_success};
use crate::notifications::models::ChannelConfig;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// A sender for pushing notifications via the Telegram Bot API.
pub struct TelegramSender {
    client: Client,
    api_base: String,
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramSender {
    pub fn new() -> Self {
        Self::with_api_base(TELEGRAM_API_BASE)
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Escapes text for Telegram's legacy Markdown mode.
/// Characters to escape: _ * ` [
pub fn escape_markdown(text: &str) -> String {
    let mut escaped_text = String::with_capacity(text.len());
    for char_to_escape in text.chars() {
        if matches!(char_to_escape, '_' | '*' | '`' | '[') {
            escaped_text.push('\\');
        }
        escaped_text.push(char_to_escape);
    }
    escaped_text
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        _context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        let (bot_token, chat_id) = match config {
            ChannelConfig::Telegram { bot_token, chat_id } => (bot_token, chat_id),
            _ => {
                return Err(SenderError::InvalidConfiguration(
                    "Expected Telegram config, but found a different type.".to_string(),
                ));
            }
        };

        let api_url = format!("{}/bot{bot_token}/sendMessage", self.api_base);
        let payload = TelegramMessage {
            chat_id,
            text: message,
            parse_mode: "Markdown",
        };

        let response = self
            .client
            .post(&api_url)
            .timeout(SEND_TIMEOUT)
            .json(&payload)
            .send()
            .await?;
        ensure_success(response, "Telegram API").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("api_v2*beta"), "api\\_v2\\*beta");
        assert_eq!(escape_markdown("plain name"), "plain name");
    }

    #[tokio::test]
    async fn test_rejects_foreign_config() {
        let sender = TelegramSender::new();
        let config = ChannelConfig::Slack { webhook_url: "http://x".into() };
        let err = sender.send(&config, "hi", &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, SenderError::InvalidConfiguration(_)));
    }
}
