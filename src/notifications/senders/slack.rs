use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;

use super::{NotificationSender, SEND_TIMEOUT, SenderError, ensure_success};
use crate::notifications::models::ChannelConfig;

/// A sender for Slack incoming webhooks.
pub struct SlackSender {
    client: Client,
}

impl Default for SlackSender {
    fn default() -> Self {
        Self::new()
    }
}

impl SlackSender {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSender for SlackSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        _context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        let ChannelConfig::Slack { webhook_url } = config else {
            return Err(SenderError::InvalidConfiguration(
                "Expected Slack config, but found a different type.".to_string(),
            ));
        };

        let response = self
            .client
            .post(webhook_url)
            .timeout(SEND_TIMEOUT)
            .json(&serde_json::json!({ "text": message }))
            .send()
            .await?;
        ensure_success(response, "Slack webhook").await
    }
}
