use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::senders::SenderError;
use crate::config::NotificationConfig;

/// A validated notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChannelConfig {
    Telegram {
        bot_token: String,
        chat_id: String,
    },
    Slack {
        webhook_url: String,
    },
    Webhook {
        url: String,
        method: String, // "GET" or "POST"
        headers: Option<HashMap<String, String>>,
        body_template: Option<String>, // JSON template for POST requests
    },
}

impl ChannelConfig {
    pub fn channel_type(&self) -> &'static str {
        match self {
            ChannelConfig::Telegram { .. } => "telegram",
            ChannelConfig::Slack { .. } => "slack",
            ChannelConfig::Webhook { .. } => "webhook",
        }
    }
}

fn required(value: &Option<String>, channel: &str, field: &str) -> Result<String, SenderError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SenderError::InvalidConfiguration(format!("{channel} channel requires '{field}'")))
}

impl TryFrom<&NotificationConfig> for ChannelConfig {
    type Error = SenderError;

    fn try_from(raw: &NotificationConfig) -> Result<Self, Self::Error> {
        match raw.kind.trim().to_lowercase().as_str() {
            "telegram" => Ok(ChannelConfig::Telegram {
                bot_token: required(&raw.token, "telegram", "token")?,
                chat_id: required(&raw.chat_id, "telegram", "chat_id")?,
            }),
            "slack" => Ok(ChannelConfig::Slack {
                webhook_url: required(&raw.webhook_url, "slack", "webhook_url")?,
            }),
            "webhook" => Ok(ChannelConfig::Webhook {
                url: required(&raw.url, "webhook", "url")
                    .or_else(|_| required(&raw.webhook_url, "webhook", "url"))?,
                method: raw
                    .method
                    .as_deref()
                    .unwrap_or("POST")
                    .trim()
                    .to_uppercase(),
                headers: raw.headers.clone(),
                body_template: raw.body_template.clone(),
            }),
            other => Err(SenderError::InvalidConfiguration(format!(
                "unsupported channel type: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: &str) -> NotificationConfig {
        NotificationConfig {
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_telegram_requires_token_and_chat() {
        let mut config = raw("telegram");
        config.token = Some("t".into());
        assert!(ChannelConfig::try_from(&config).is_err());

        config.chat_id = Some("1".into());
        assert_eq!(
            ChannelConfig::try_from(&config).unwrap(),
            ChannelConfig::Telegram { bot_token: "t".into(), chat_id: "1".into() }
        );
    }

    #[test]
    fn test_webhook_defaults_to_post_and_accepts_webhook_url() {
        let mut config = raw("Webhook");
        config.webhook_url = Some("http://hook".into());
        let channel = ChannelConfig::try_from(&config).unwrap();
        assert_eq!(channel.channel_type(), "webhook");
        match channel {
            ChannelConfig::Webhook { url, method, .. } => {
                assert_eq!(url, "http://hook");
                assert_eq!(method, "POST");
            }
            other => panic!("unexpected channel {other:?}"),
        }
    }

    #[test]
    fn test_unknown_channel_type_is_rejected() {
        let err = ChannelConfig::try_from(&raw("pager")).unwrap_err();
        assert!(err.to_string().contains("unsupported channel type: pager"));
    }
}
