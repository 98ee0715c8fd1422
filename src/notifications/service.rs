use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::models::ChannelConfig;
use super::senders::{
    NotificationSender, slack::SlackSender, telegram::TelegramSender, telegram::escape_markdown,
    webhook::WebhookSender,
};
use crate::config::NotificationConfig;
use crate::monitor::Notifier;

struct Channel {
    config: Arc<ChannelConfig>,
    sender: Arc<dyn NotificationSender>,
}

fn sender_for(config: &ChannelConfig) -> Arc<dyn NotificationSender> {
    match config {
        ChannelConfig::Telegram { .. } => Arc::new(TelegramSender::new()),
        ChannelConfig::Slack { .. } => Arc::new(SlackSender::new()),
        ChannelConfig::Webhook { .. } => Arc::new(WebhookSender::new()),
    }
}

/// Fans status changes out to every configured channel.
pub struct NotificationService {
    channels: Vec<Channel>,
}

impl NotificationService {
    /// Builds the service from raw config entries; entries that are incomplete
    /// or of an unknown type are skipped.
    pub fn from_config(entries: &[NotificationConfig]) -> Self {
        let channels: Vec<Channel> = entries
            .iter()
            .filter_map(|entry| match ChannelConfig::try_from(entry) {
                Ok(config) => Some(Channel {
                    sender: sender_for(&config),
                    config: Arc::new(config),
                }),
                Err(e) => {
                    warn!(channel_type = %entry.kind, error = %e, "Skipping notification channel.");
                    None
                }
            })
            .collect();
        info!(channels = channels.len(), "Notification channels configured.");
        Self { channels }
    }

    pub fn with_channels(channels: Vec<(ChannelConfig, Arc<dyn NotificationSender>)>) -> Self {
        Self {
            channels: channels
                .into_iter()
                .map(|(config, sender)| Channel {
                    config: Arc::new(config),
                    sender,
                })
                .collect(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Renders the transition text. `markdown` escapes the name for
    /// Telegram's Markdown parse mode; other channels get it verbatim.
    pub fn render_message(monitor: &str, is_up: bool, at: DateTime<Utc>, markdown: bool) -> String {
        let (emoji, status) = if is_up { ("🟢", "UP") } else { ("🔴", "DOWN") };
        let name = if markdown {
            escape_markdown(monitor)
        } else {
            monitor.to_string()
        };
        format!(
            "{emoji} Monitor *{name}* is {status} at {}",
            at.format("%a, %d %b %Y %H:%M:%S UTC")
        )
    }

    fn context(monitor: &str, is_up: bool, was_up: bool, at: DateTime<Utc>) -> HashMap<String, String> {
        let label = |up: bool| (if up { "UP" } else { "DOWN" }).to_string();
        HashMap::from([
            ("monitor".to_string(), monitor.to_string()),
            ("status".to_string(), label(is_up)),
            ("previous_status".to_string(), label(was_up)),
            ("time".to_string(), at.to_rfc3339()),
        ])
    }

    /// Sends the transition to every channel, each on its own task. Failures
    /// are logged by the task; callers may ignore the returned handles.
    pub fn dispatch(
        &self,
        monitor: &str,
        is_up: bool,
        was_up: bool,
        at: DateTime<Utc>,
    ) -> Vec<JoinHandle<()>> {
        let context = Arc::new(Self::context(monitor, is_up, was_up, at));
        self.channels
            .iter()
            .map(|channel| {
                let markdown = matches!(*channel.config, ChannelConfig::Telegram { .. });
                let message = Self::render_message(monitor, is_up, at, markdown);
                let sender = Arc::clone(&channel.sender);
                let config = Arc::clone(&channel.config);
                let context = Arc::clone(&context);
                tokio::spawn(async move {
                    if let Err(e) = sender.send(&config, &message, &context).await {
                        error!(
                            channel_type = config.channel_type(),
                            error = %e,
                            "Failed to deliver notification."
                        );
                    }
                })
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for NotificationService {
    async fn notify(&self, target: &str, is_up: bool, was_up: bool) {
        self.dispatch(target, is_up, was_up, Utc::now());
    }
}
