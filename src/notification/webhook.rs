//! Discord Webhook 客户端
//!
//! 通过 HTTP POST 发送消息，遇到 429 按 `retry_after` 等待后重试

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::channel::{Avatar, Embed, WebhookMessage, WebhookSender};
use crate::error::SendError;

pub const WEBHOOK_BASE_URL: &str = "https://discord.com/api/webhooks";

/// 最多尝试次数（含首次）
const MAX_ATTEMPTS: u32 = 3;

/// 429 响应体无法解析时的等待时间（毫秒）
const FALLBACK_RETRY_MS: f64 = 1000.0;

/// Webhook 客户端配置
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Webhook ID（`<id>/<token>`）或完整 URL
    pub webhook: String,
    /// 预置头像的基础 URL
    pub avatar_base_url: Option<String>,
    /// 每条消息前附加的提及
    pub mentions: Vec<String>,
    /// 超时时间 (秒)
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            webhook: String::new(),
            avatar_base_url: None,
            mentions: Vec::new(),
            timeout_secs: 30,
        }
    }
}

impl WebhookConfig {
    /// 实际 POST 的 URL
    pub fn url(&self) -> String {
        if self.webhook.starts_with("http://") || self.webhook.starts_with("https://") {
            self.webhook.clone()
        } else {
            format!("{}/{}", WEBHOOK_BASE_URL, self.webhook.trim_start_matches('/'))
        }
    }

    /// 解析头像；预置头像在未配置基础 URL 时省略
    pub fn avatar_url(&self, avatar: &Avatar) -> Option<String> {
        match avatar {
            Avatar::Url(url) if url.is_empty() => None,
            Avatar::Url(url) => Some(url.clone()),
            Avatar::Named(name) => self
                .avatar_base_url
                .as_deref()
                .map(|base| format!("{}/{}.png", base.trim_end_matches('/'), name)),
        }
    }

    /// 附加提及后的正文
    pub fn content(&self, content: &str) -> String {
        if self.mentions.is_empty() {
            content.to_string()
        } else {
            format!("{} {}", self.mentions.join(" "), content)
        }
    }
}

/// Webhook 请求载荷
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<&'a Embed>,
}

/// 429 响应
#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    /// 等待时间（毫秒）
    retry_after: f64,
}

/// Discord Webhook 客户端
#[derive(Debug)]
pub struct DiscordWebhook {
    client: Client,
    config: WebhookConfig,
}

impl DiscordWebhook {
    /// 创建新的 Webhook 客户端
    pub fn new(config: WebhookConfig) -> Result<Self> {
        if config.webhook.is_empty() {
            anyhow::bail!("webhook is required");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn payload<'a>(&self, message: &'a WebhookMessage) -> WebhookPayload<'a> {
        WebhookPayload {
            username: &message.username,
            avatar_url: message
                .avatar
                .as_ref()
                .and_then(|a| self.config.avatar_url(a)),
            content: self.config.content(&message.content),
            embeds: message.embed.iter().collect(),
        }
    }
}

#[async_trait]
impl WebhookSender for DiscordWebhook {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, message: &WebhookMessage) -> Result<(), SendError> {
        let url = self.config.url();
        let payload = self.payload(message);

        for attempt in 1..=MAX_ATTEMPTS {
            let response = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| SendError::Transport(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| SendError::Transport(e.to_string()))?;

            if status == StatusCode::TOO_MANY_REQUESTS {
                let delay_ms = serde_json::from_str::<RateLimitResponse>(&body)
                    .map(|r| r.retry_after)
                    .unwrap_or(FALLBACK_RETRY_MS)
                    .max(0.0);

                if attempt < MAX_ATTEMPTS {
                    info!(delay_ms, attempt, "Being rate limited by Discord, waiting");
                    tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
                }
                continue;
            }

            if status.is_success() {
                debug!(username = %message.username, "Webhook message sent");
                return Ok(());
            }

            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        warn!(attempts = MAX_ATTEMPTS, "Rate limiting still applied, giving up");
        Err(SendError::RateLimited {
            attempts: MAX_ATTEMPTS,
        })
    }
}
