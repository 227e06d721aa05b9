//! Dry-run 发送端 - 只打印不发送

use async_trait::async_trait;
use tracing::info;

use super::channel::{WebhookMessage, WebhookSender};
use crate::error::SendError;

#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunSender;

#[async_trait]
impl WebhookSender for DryRunSender {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn send(&self, message: &WebhookMessage) -> Result<(), SendError> {
        info!(
            username = %message.username,
            content = %message.content,
            embed = ?message.embed.as_ref().map(|e| e.description.as_str()),
            "[DRY-RUN] Would send webhook message"
        );
        Ok(())
    }
}
