//! Status-change notifications over Telegram, Slack and generic webhooks.
pub mod models;
pub mod senders;
pub mod service;

pub use models::ChannelConfig;
pub use service::NotificationService;
