//! Sanderson Notifications CLI
//!
//! 执行一轮检查后退出，定时执行交给外部调度器（cron 等）

use anyhow::{Context, Result};
use clap::Parser;
use sanderson_notifications::{
    config::DEFAULT_CONFIG_PATH, offsets::DEFAULT_OFFSETS_PATH, ConfigLoader, DiscordWebhook,
    DryRunSender, OffsetStore, PluginRegistry, ReqwestFetcher, Runner, SystemClock, WebhookSender,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "notifier")]
#[command(about = "Check progress pages and feeds, post updates to Discord")]
#[command(version)]
struct Cli {
    /// 配置文件路径
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// offset 文件路径
    #[arg(long, default_value = DEFAULT_OFFSETS_PATH)]
    offsets: PathBuf,

    /// 只打印将要发送的消息，不发送也不保存 offset
    #[arg(long)]
    dry_run: bool,
}

/// 返回值表示是否所有连接器都成功
async fn run(cli: Cli) -> Result<bool> {
    let config = ConfigLoader::new(PluginRegistry::builtin())
        .load(&cli.config)
        .with_context(|| format!("could not load config from {}", cli.config.display()))?;
    info!(connectors = ?config.connector_names(), "Loaded configuration");

    let store = OffsetStore::open(&cli.offsets)?;
    let previous = store.read()?;

    let webhook: Arc<dyn WebhookSender> = if cli.dry_run {
        Arc::new(DryRunSender)
    } else {
        Arc::new(DiscordWebhook::new(config.webhook.clone())?)
    };

    let runner = Runner::new(webhook, Arc::new(ReqwestFetcher::new()?), Arc::new(SystemClock));
    let summary = runner.run(config.connectors, &previous).await;

    if cli.dry_run {
        info!("[DRY-RUN] Skipping offset update");
    } else {
        store.write(&summary.offsets)?;
    }

    Ok(!summary.has_failures())
}

#[tokio::main]
async fn main() {
    // 通过 RUST_LOG 控制日志级别，默认为 info
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sanderson_notifications=info,notifier=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Run aborted: {e:#}");
            std::process::exit(1);
        }
    }
}
