//! 错误类型 - 配置错误为致命错误，连接器错误只影响单个连接器

use thiserror::Error;

/// 配置错误（启动时检查，任何连接器运行前终止）
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("config is missing Discord webhook ID")]
    MissingWebhook,

    #[error("failed to load connector '{connector}': unknown plugin '{plugin}'")]
    UnknownPlugin { connector: String, plugin: String },

    #[error("could not parse config for connector '{connector}' with plugin '{plugin}': {source}")]
    Options {
        connector: String,
        plugin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration for connector '{connector}' with plugin '{plugin}': {reason}")]
    Invalid {
        connector: String,
        plugin: String,
        reason: String,
    },
}

/// 插件 `validate` 返回的错误，由配置加载器包装成 [`ConfigError::Invalid`]
#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// HTTP 抓取错误
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request to '{url}' failed: {message}")]
    Transport { url: String, message: String },

    #[error("'{url}' responded with status {status}")]
    Status { url: String, status: u16 },
}

/// Webhook 发送错误（webhook 客户端内部已处理限流重试，调用方视为最终失败）
#[derive(Debug, Error)]
pub enum SendError {
    #[error("webhook request failed: {0}")]
    Transport(String),

    #[error("couldn't send Discord message (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("rate limiting still applied after {attempts} attempts")]
    RateLimited { attempts: u32 },
}

/// 单个连接器 check/init 过程中的错误
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("init failed: {0}")]
    Init(String),

    #[error("stored offset is unreadable: {0}")]
    Offset(#[from] serde_json::Error),

    #[error("{0}")]
    Api(String),
}

impl ConnectorError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::Api(message.into())
    }
}
