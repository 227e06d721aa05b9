// src/plugins/mod.rs
//! 连接器插件
//!
//! 每种插件实现 [`Plugin`]：`validate` 在启动时检查配置，`init` 做一次性准备，
//! `check` 执行一次轮询并返回新的 offset。offset 的类型由插件通过关联类型声明，
//! 运行器只接触 JSON 值，编解码由 [`Connector::run`] 完成。

pub mod atom;
pub mod feed;
pub mod progress;
pub mod twitter;
pub mod youtube;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

use crate::clock::Clock;
use crate::error::{ConnectorError, ValidationError};
use crate::fetch::HttpFetcher;
use crate::notification::WebhookSender;

pub use atom::AtomPlugin;
pub use progress::ProgressPlugin;
pub use twitter::TwitterPlugin;
pub use youtube::YouTubePlugin;

/// 单次运行中传给连接器的依赖
#[derive(Clone)]
pub struct PluginContext {
    /// 连接器名称（配置中的键）
    pub connector: String,
    pub webhook: Arc<dyn WebhookSender>,
    pub http: Arc<dyn HttpFetcher>,
    pub clock: Arc<dyn Clock>,
}

impl PluginContext {
    pub fn new(
        connector: impl Into<String>,
        webhook: Arc<dyn WebhookSender>,
        http: Arc<dyn HttpFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connector: connector.into(),
            webhook,
            http,
            clock,
        }
    }
}

/// `check` 的结果：出错时 offset 仍然有效
#[derive(Debug)]
pub struct CheckOutcome<O> {
    /// 新 offset；`None` 表示没有可保存的状态
    pub offset: Option<O>,
    pub result: Result<(), ConnectorError>,
}

impl<O> CheckOutcome<O> {
    pub fn ok(offset: O) -> Self {
        Self {
            offset: Some(offset),
            result: Ok(()),
        }
    }

    /// 原样保留传入的 offset
    pub fn keep(offset: Option<O>) -> Self {
        Self {
            offset,
            result: Ok(()),
        }
    }

    pub fn failed(offset: Option<O>, error: impl Into<ConnectorError>) -> Self {
        Self {
            offset,
            result: Err(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// 连接器插件
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 持久化的 offset 类型；首次运行时不存在
    type Offset: Serialize + DeserializeOwned + Send + Sync;

    /// 插件标识（配置中的 `plugin` 字段）
    fn name(&self) -> &'static str;

    fn validate(&self) -> Result<(), ValidationError>;

    async fn init(&mut self, _ctx: &PluginContext) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn check(
        &self,
        offset: Option<Self::Offset>,
        ctx: &PluginContext,
    ) -> CheckOutcome<Self::Offset>;
}

/// 已配置的连接器（封闭的插件集合）
#[derive(Debug, Clone)]
pub enum Connector {
    Atom(AtomPlugin),
    Progress(ProgressPlugin),
    Twitter(TwitterPlugin),
    YouTube(YouTubePlugin),
}

/// 一次 init + check 的结果，offset 已编码为 JSON
#[derive(Debug)]
pub struct ConnectorRun {
    pub offset: Option<Value>,
    pub result: Result<(), ConnectorError>,
}

impl Connector {
    pub fn plugin_name(&self) -> &'static str {
        match self {
            Self::Atom(p) => p.name(),
            Self::Progress(p) => p.name(),
            Self::Twitter(p) => p.name(),
            Self::YouTube(p) => p.name(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Atom(p) => p.validate(),
            Self::Progress(p) => p.validate(),
            Self::Twitter(p) => p.validate(),
            Self::YouTube(p) => p.validate(),
        }
    }

    /// 执行 init 与 check
    ///
    /// 任何失败路径都会返回可保存的 offset：init 失败或存储的 offset 无法解析时
    /// 原样返回 `stored`。
    pub async fn run(&mut self, stored: Option<&Value>, ctx: &PluginContext) -> ConnectorRun {
        match self {
            Self::Atom(p) => run_plugin(p, stored, ctx).await,
            Self::Progress(p) => run_plugin(p, stored, ctx).await,
            Self::Twitter(p) => run_plugin(p, stored, ctx).await,
            Self::YouTube(p) => run_plugin(p, stored, ctx).await,
        }
    }
}

async fn run_plugin<P: Plugin>(
    plugin: &mut P,
    stored: Option<&Value>,
    ctx: &PluginContext,
) -> ConnectorRun {
    let keep_stored = |error: ConnectorError| ConnectorRun {
        offset: stored.cloned(),
        result: Err(error),
    };

    if let Err(e) = plugin.init(ctx).await {
        return keep_stored(e);
    }

    let offset = match stored {
        None | Some(Value::Null) => None,
        Some(value) => match serde_json::from_value::<P::Offset>(value.clone()) {
            Ok(offset) => Some(offset),
            Err(e) => return keep_stored(ConnectorError::Offset(e)),
        },
    };

    let outcome = plugin.check(offset, ctx).await;

    let offset = match outcome.offset.as_ref().map(serde_json::to_value) {
        Some(Ok(value)) => Some(value),
        Some(Err(e)) => {
            error!(error = %e, "Could not encode new offset, keeping previous one");
            return keep_stored(ConnectorError::Offset(e));
        }
        None => stored.cloned(),
    };

    ConnectorRun {
        offset,
        result: outcome.result,
    }
}

type Builder = fn(Value) -> Result<Connector, serde_json::Error>;

/// 插件名 → 构造函数
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    builders: HashMap<&'static str, Builder>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PluginRegistry {
    /// 空注册表
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// 内置插件
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("atom", |v| serde_json::from_value(v).map(Connector::Atom));
        registry.register("progress", |v| {
            serde_json::from_value(v).map(Connector::Progress)
        });
        registry.register("twitter", |v| serde_json::from_value(v).map(Connector::Twitter));
        registry.register("youtube", |v| serde_json::from_value(v).map(Connector::YouTube));
        registry
    }

    pub fn register(&mut self, name: &'static str, builder: Builder) {
        self.builders.insert(name, builder);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    /// 用插件选项构造连接器；未知插件返回 `None`
    pub fn build(
        &self,
        plugin: &str,
        options: Value,
    ) -> Option<Result<Connector, serde_json::Error>> {
        let options = match options {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        self.builders.get(plugin).map(|build| build(options))
    }
}
