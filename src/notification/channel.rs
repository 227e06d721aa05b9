//! Webhook 发送 trait 与消息定义

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SendError;

/// 消息头像
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Avatar {
    /// 预置头像名，由 webhook 客户端解析为 `<avatarBaseUrl>/<name>.png`
    Named(String),
    /// 完整 URL，原样使用
    Url(String),
}

impl Avatar {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }
}

/// Embed 页脚
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Discord embed（只用到描述和页脚）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

impl Embed {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            footer: None,
        }
    }

    pub fn with_footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }
}

/// 一条 webhook 消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookMessage {
    /// 消息正文
    pub content: String,
    /// 显示的发送者名称
    pub username: String,
    pub avatar: Option<Avatar>,
    pub embed: Option<Embed>,
}

impl WebhookMessage {
    pub fn new(content: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            username: username.into(),
            avatar: None,
            embed: None,
        }
    }

    /// 设置头像
    pub fn with_avatar(mut self, avatar: Avatar) -> Self {
        self.avatar = Some(avatar);
        self
    }

    /// 可选头像（空 URL 等情况）
    pub fn with_optional_avatar(mut self, avatar: Option<Avatar>) -> Self {
        self.avatar = avatar;
        self
    }

    /// 设置 embed
    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }
}

/// Webhook 发送端
///
/// 实现负责内部的限流重试；返回的错误对调用方而言是最终结果。
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// 发送端名称（用于日志）
    fn name(&self) -> &str;

    async fn send(&self, message: &WebhookMessage) -> Result<(), SendError>;
}
