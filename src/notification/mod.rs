//! 通知发送层
//!
//! 所有发送端实现 `WebhookSender` trait：
//! - `DiscordWebhook`：真实的 Discord webhook（带限流重试）
//! - `DryRunSender`：只记录日志
//!
//! # 使用示例
//! ```ignore
//! use sanderson_notifications::notification::{DiscordWebhook, WebhookConfig, WebhookMessage};
//!
//! let webhook = DiscordWebhook::new(WebhookConfig {
//!     webhook: "<id>/<token>".to_string(),
//!     ..Default::default()
//! })?;
//! webhook.send(&WebhookMessage::new("Hello", "Progress Updates")).await?;
//! ```

pub mod channel;
pub mod dry_run;
pub mod webhook;

pub use channel::{Avatar, Embed, EmbedFooter, WebhookMessage, WebhookSender};
pub use dry_run::DryRunSender;
pub use webhook::{DiscordWebhook, WebhookConfig, WebhookPayload, WEBHOOK_BASE_URL};
