//! 配置加载 - 解析 YAML，合并共享默认值，构造并校验连接器

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::ConfigError;
use crate::notification::WebhookConfig;
use crate::plugins::{Connector, PluginRegistry};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawConfig {
    discord_webhook: String,
    avatar_base_url: Option<String>,
    mentions: Vec<String>,
    /// 插件名 → 该插件所有连接器共享的默认选项
    shared: BTreeMap<String, Value>,
    connectors: BTreeMap<String, RawConnector>,
}

#[derive(Debug, Deserialize)]
struct RawConnector {
    plugin: String,
    #[serde(default)]
    config: Value,
}

/// 一个已配置的连接器
#[derive(Debug, Clone)]
pub struct ConfiguredConnector {
    /// 配置中的名称，也是 offset 文件中的键
    pub name: String,
    pub connector: Connector,
}

/// 加载完成的配置
#[derive(Debug, Clone)]
pub struct Config {
    pub webhook: WebhookConfig,
    /// 按名称排序
    pub connectors: Vec<ConfiguredConnector>,
}

/// 配置加载器
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    registry: PluginRegistry,
}

impl ConfigLoader {
    pub fn new(registry: PluginRegistry) -> Self {
        Self { registry }
    }

    /// 从文件加载
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        self.parse(&content)
    }

    /// 从 YAML 文本加载
    pub fn parse(&self, content: &str) -> Result<Config, ConfigError> {
        let raw: RawConfig = if content.trim().is_empty() {
            RawConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };

        if raw.discord_webhook.is_empty() {
            return Err(ConfigError::MissingWebhook);
        }

        let mut connectors = Vec::with_capacity(raw.connectors.len());
        for (name, connector) in raw.connectors {
            let options = match raw.shared.get(&connector.plugin) {
                Some(shared) => merge_keys(connector.config, shared),
                None => connector.config,
            };

            let built = self
                .registry
                .build(&connector.plugin, options)
                .ok_or_else(|| ConfigError::UnknownPlugin {
                    connector: name.clone(),
                    plugin: connector.plugin.clone(),
                })?
                .map_err(|source| ConfigError::Options {
                    connector: name.clone(),
                    plugin: connector.plugin.clone(),
                    source,
                })?;

            built.validate().map_err(|e| ConfigError::Invalid {
                connector: name.clone(),
                plugin: connector.plugin.clone(),
                reason: e.to_string(),
            })?;

            debug!(connector = %name, plugin = %connector.plugin, "Loaded connector");
            connectors.push(ConfiguredConnector {
                name,
                connector: built,
            });
        }

        Ok(Config {
            webhook: WebhookConfig {
                webhook: raw.discord_webhook,
                avatar_base_url: raw.avatar_base_url,
                mentions: raw.mentions,
                ..Default::default()
            },
            connectors,
        })
    }
}

/// 把 `shared` 递归合并进 `own`，已存在的键永远不被覆盖
pub fn merge_keys(own: Value, shared: &Value) -> Value {
    match (own, shared) {
        (Value::Null, shared) => shared.clone(),
        (Value::Object(mut own), Value::Object(shared)) => {
            for (key, shared_value) in shared {
                let merged = match own.remove(key) {
                    Some(own_value) => merge_keys(own_value, shared_value),
                    None => shared_value.clone(),
                };
                own.insert(key.clone(), merged);
            }
            Value::Object(own)
        }
        (own, _) => own,
    }
}

impl Config {
    /// 连接器名称列表
    pub fn connector_names(&self) -> Vec<&str> {
        self.connectors.iter().map(|c| c.name.as_str()).collect()
    }
}
