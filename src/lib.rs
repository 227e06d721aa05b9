//! Sanderson Notifications - 轮询进度页面与 feed，把变化推送到 Discord webhook

pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod notification;
pub mod offsets;
pub mod plugins;
pub mod progress;
pub mod runner;
pub mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigLoader, ConfiguredConnector};
pub use error::{ConfigError, ConnectorError, FetchError, SendError, ValidationError};
pub use fetch::{FetchResponse, HttpFetcher, Redirects, ReqwestFetcher};
pub use notification::{
    Avatar, DiscordWebhook, DryRunSender, Embed, WebhookConfig, WebhookMessage, WebhookSender,
};
pub use offsets::{OffsetMap, OffsetStore};
pub use plugins::{
    CheckOutcome, Connector, ConnectorRun, Plugin, PluginContext, PluginRegistry,
};
pub use progress::{Action, Progress, ProgressDiff, ProgressOffset, Snapshot};
pub use runner::{RunSummary, Runner};
