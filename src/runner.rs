//! 运行协调器 - 并发执行所有连接器，合并 offset，汇总失败

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};

use crate::clock::Clock;
use crate::config::ConfiguredConnector;
use crate::fetch::HttpFetcher;
use crate::notification::WebhookSender;
use crate::offsets::OffsetMap;
use crate::plugins::{ConnectorRun, PluginContext};

/// 一轮运行的结果
#[derive(Debug, Default)]
pub struct RunSummary {
    /// 合并后的全部 offset（包括已不在配置中的连接器）
    pub offsets: OffsetMap,
    /// 出错的连接器名称
    pub failed: Vec<String>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// 运行协调器
#[derive(Clone)]
pub struct Runner {
    webhook: Arc<dyn WebhookSender>,
    http: Arc<dyn HttpFetcher>,
    clock: Arc<dyn Clock>,
}

impl Runner {
    pub fn new(
        webhook: Arc<dyn WebhookSender>,
        http: Arc<dyn HttpFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            webhook,
            http,
            clock,
        }
    }

    /// 每个连接器一个任务，互不等待；全部结束后按连接器名合并 offset
    pub async fn run(&self, connectors: Vec<ConfiguredConnector>, previous: &OffsetMap) -> RunSummary {
        info!(
            connectors = connectors.len(),
            webhook = self.webhook.name(),
            "Checking for updates"
        );

        let handles: Vec<(String, JoinHandle<ConnectorRun>)> = connectors
            .into_iter()
            .map(|configured| {
                let ConfiguredConnector {
                    name,
                    mut connector,
                } = configured;
                let stored = previous.get(&name).cloned();
                let ctx = PluginContext::new(
                    name.clone(),
                    self.webhook.clone(),
                    self.http.clone(),
                    self.clock.clone(),
                );
                let span = info_span!("connector", name = %name, plugin = connector.plugin_name());

                let handle = tokio::spawn(
                    async move {
                        let run = connector.run(stored.as_ref(), &ctx).await;
                        if let Err(e) = &run.result {
                            error!(error = %e, "Connector check failed");
                        }
                        run
                    }
                    .instrument(span),
                );
                (name, handle)
            })
            .collect();

        let mut summary = RunSummary {
            offsets: previous.clone(),
            failed: Vec::new(),
        };

        for (name, handle) in handles {
            match handle.await {
                Ok(run) => {
                    if let Some(offset) = run.offset {
                        summary.offsets.insert(name.clone(), offset);
                    }
                    if run.result.is_err() {
                        summary.failed.push(name);
                    }
                }
                Err(e) => {
                    // 任务 panic：保留该连接器原有的 offset
                    error!(connector = %name, error = %e, "Connector task aborted");
                    summary.failed.push(name);
                }
            }
        }

        if summary.has_failures() {
            error!(failed = ?summary.failed, "Errors occurred while trying to check for updates");
        } else {
            info!("All connectors checked");
        }

        summary
    }
}
