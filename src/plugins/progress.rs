//! 进度条连接器 - 抓取进度页面，去抖后发布变化

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, info};

use super::{CheckOutcome, Plugin, PluginContext};
use crate::error::{ConnectorError, FetchError, ValidationError};
use crate::notification::{Avatar, Embed, WebhookMessage};
use crate::progress::{render, Action, Progress, ProgressDiff, ProgressOffset, Snapshot};

const ITEM_SELECTOR: &str = "[class^=progress-item-template]";
const TITLE_SELECTOR: &str = "[class^=progress-title-template]";
const PERCENT_SELECTOR: &str = "[class^=progress-percent-template]";
const LINK_SELECTOR: &str = "a[href]";

/// 错误信息中保留的页面内容长度
const MAX_ERROR_CONTENT: usize = 500;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressPlugin {
    /// 进度页面 URL
    pub url: String,
    /// 通知正文
    pub message: String,
    /// 去抖窗口（配置中以秒为单位），0 表示立即发布
    #[serde(deserialize_with = "deserialize_delay")]
    pub debounce_delay: Duration,
}

fn deserialize_delay<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    if secs < 0.0 {
        return Err(serde::de::Error::custom("debounce delay must not be negative"));
    }
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

impl ProgressPlugin {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
            debounce_delay: Duration::ZERO,
        }
    }

    pub fn with_debounce_delay(mut self, delay: Duration) -> Self {
        self.debounce_delay = delay;
        self
    }

    async fn read_progress(&self, ctx: &PluginContext) -> Result<Snapshot, ConnectorError> {
        let response = ctx.http.get(&self.url, &[]).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: response.status,
            }
            .into());
        }

        parse_progress(&response.body)
    }

    async fn report(&self, diff: &ProgressDiff, ctx: &PluginContext) -> Result<(), ConnectorError> {
        let embed = Embed::new(render(diff)).with_footer(format!("See {} for more", self.url));
        let message = WebhookMessage::new(&self.message, "Progress Updates")
            .with_avatar(Avatar::named("dragonsteel"))
            .with_embed(embed);

        ctx.webhook.send(&message).await?;
        Ok(())
    }
}

#[async_trait]
impl Plugin for ProgressPlugin {
    type Offset = ProgressOffset;

    fn name(&self) -> &'static str {
        "progress"
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::new("URL for progress updates must not be empty"));
        }
        if self.message.is_empty() {
            return Err(ValidationError::new(
                "message for progress updates must not be empty",
            ));
        }
        Ok(())
    }

    async fn check(
        &self,
        offset: Option<ProgressOffset>,
        ctx: &PluginContext,
    ) -> CheckOutcome<ProgressOffset> {
        info!(url = %self.url, "Checking for progress updates");

        let current = match self.read_progress(ctx).await {
            Ok(snapshot) => snapshot,
            Err(e) => return CheckOutcome::failed(offset, e),
        };

        let previous = offset.unwrap_or_default();
        let transition = previous.advance(current, self.debounce_delay, ctx.clock.now());

        match &transition.action {
            Action::Idle => info!("No progress changes to report"),
            Action::Started => info!(
                delay_secs = self.debounce_delay.as_secs_f64(),
                "Progress changed, waiting for it to settle"
            ),
            Action::Extended => info!("Progress changed again, restarting debounce window"),
            Action::Waiting => debug!("Progress unchanged since last check, still waiting"),
            Action::Publish(diff) => {
                info!(bars = diff.len(), "Reporting changed progress bars");
                if let Err(e) = self.report(diff, ctx).await {
                    // 未送达的差异下次重试
                    return CheckOutcome::failed(Some(previous), e);
                }
            }
        }

        CheckOutcome::ok(transition.offset)
    }
}

fn selector(css: &str) -> Result<Selector, ConnectorError> {
    Selector::parse(css).map_err(|e| ConnectorError::parse(format!("invalid selector '{css}': {e}")))
}

fn first_text(element: &ElementRef<'_>, selector: &Selector) -> String {
    element
        .select(selector)
        .next()
        .map(|e| e.text().collect::<String>())
        .unwrap_or_default()
}

/// 从页面中读取所有进度条，顺序与页面一致
pub fn parse_progress(html: &str) -> Result<Snapshot, ConnectorError> {
    let item = selector(ITEM_SELECTOR)?;
    let title = selector(TITLE_SELECTOR)?;
    let percent = selector(PERCENT_SELECTOR)?;
    let link = selector(LINK_SELECTOR)?;

    let document = Html::parse_document(html);
    let snapshot: Snapshot = document
        .select(&item)
        .map(|bar| {
            let value = first_text(&bar, &percent)
                .trim()
                .trim_end_matches('%')
                .trim()
                .parse()
                .unwrap_or(0);

            let progress = Progress::new(first_text(&bar, &title).trim(), value);
            match bar.select(&link).next().and_then(|a| a.value().attr("href")) {
                Some(href) if !href.is_empty() => progress.with_link(href),
                _ => progress,
            }
        })
        .collect();

    if snapshot.is_empty() {
        let content: String = html.chars().take(MAX_ERROR_CONTENT).collect();
        return Err(ConnectorError::parse(format!(
            "unexpectedly received empty list of progress bars, content was {content}"
        )));
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::fetch::{FetchResponse, Redirects};
    use crate::testing::{RecordingSender, StaticFetcher};
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    const URL: &str = "https://progress.test/";

    const PAGE: &str = r#"<html><body>
        <div class="progress-item-template-1">
          <span class="progress-title-template-1"> <a href="https://books.test/stormlight-5">Stormlight 5</a> </span>
          <span class="progress-percent-template-1">75%</span>
        </div>
        <div class="progress-item-template-2">
          <span class="progress-title-template-2">Secret Project</span>
          <span class="progress-percent-template-2">n/a</span>
        </div>
    </body></html>"#;

    fn ctx(sender: Arc<RecordingSender>, fetcher: Arc<StaticFetcher>) -> PluginContext {
        let clock: Arc<dyn Clock> =
            Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        PluginContext::new("progress", sender, fetcher, clock)
    }

    #[test]
    fn test_parse_progress_page() {
        let snapshot = parse_progress(PAGE).unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].title, "Stormlight 5");
        assert_eq!(snapshot[0].link.as_deref(), Some("https://books.test/stormlight-5"));
        assert_eq!(snapshot[0].value, 75);
        assert_eq!(snapshot[1].title, "Secret Project");
        assert_eq!(snapshot[1].link, None);
        assert_eq!(snapshot[1].value, 0);
    }

    #[test]
    fn test_parse_page_without_bars() {
        let err = parse_progress("<html><body>maintenance</body></html>").unwrap_err();
        assert!(err.to_string().contains("empty list of progress bars"));
    }

    #[test]
    fn test_validate() {
        assert!(ProgressPlugin::new(URL, "Progress updated!").validate().is_ok());
        assert_eq!(
            ProgressPlugin::new("", "msg").validate().unwrap_err().to_string(),
            "URL for progress updates must not be empty"
        );
        assert_eq!(
            ProgressPlugin::new(URL, "").validate().unwrap_err().to_string(),
            "message for progress updates must not be empty"
        );
    }

    #[test]
    fn test_deserialize_delay() {
        let plugin: ProgressPlugin =
            serde_json::from_value(serde_json::json!({"url": URL, "message": "m", "debounceDelay": 1.5}))
                .unwrap();
        assert_eq!(plugin.debounce_delay, Duration::from_millis(1500));

        let negative = serde_json::from_value::<ProgressPlugin>(
            serde_json::json!({"url": URL, "message": "m", "debounceDelay": -1}),
        );
        assert!(negative
            .unwrap_err()
            .to_string()
            .contains("debounce delay must not be negative"));
    }

    #[tokio::test]
    async fn test_first_run_publishes_all_bars() {
        let sender = Arc::new(RecordingSender::new());
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond(URL, FetchResponse::ok(PAGE));

        let plugin = ProgressPlugin::new(URL, "Progress updated!");
        let outcome = plugin.check(None, &ctx(sender.clone(), fetcher)).await;

        assert!(outcome.is_ok());
        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "Progress updated!");
        assert_eq!(sent[0].username, "Progress Updates");
        assert_eq!(sent[0].avatar, Some(Avatar::named("dragonsteel")));

        let embed = sent[0].embed.clone().unwrap();
        assert!(embed.description.starts_with("**[New] [Stormlight 5](https://books.test/stormlight-5)**"));
        assert_eq!(embed.footer.unwrap().text, format!("See {URL} for more"));

        let offset = outcome.offset.unwrap();
        assert_eq!(offset.published.len(), 2);
        assert!(!offset.is_debouncing());
    }

    #[tokio::test]
    async fn test_page_is_fetched_following_redirects() {
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond(URL, FetchResponse::ok(PAGE));

        ProgressPlugin::new(URL, "m")
            .check(None, &ctx(Arc::new(RecordingSender::new()), fetcher.clone()))
            .await
            .result
            .unwrap();

        assert_eq!(
            fetcher.requests_with_redirects(),
            vec![(URL.to_string(), Redirects::Follow)]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_offset() {
        let sender = Arc::new(RecordingSender::new());
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond(URL, FetchResponse::with_status(503, "unavailable"));

        let previous = ProgressOffset::from_published(vec![Progress::new("A", 10)]);
        let outcome = ProgressPlugin::new(URL, "m")
            .check(Some(previous.clone()), &ctx(sender.clone(), fetcher))
            .await;

        assert!(matches!(
            outcome.result,
            Err(ConnectorError::Fetch(FetchError::Status { status: 503, .. }))
        ));
        assert_eq!(outcome.offset, Some(previous));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_rolls_back() {
        let sender = Arc::new(RecordingSender::new());
        sender.fail(true);
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond(URL, FetchResponse::ok(PAGE));

        let previous = ProgressOffset::from_published(vec![Progress::new("Stormlight 5", 50)]);
        let outcome = ProgressPlugin::new(URL, "m")
            .check(Some(previous.clone()), &ctx(sender.clone(), fetcher))
            .await;

        assert!(matches!(outcome.result, Err(ConnectorError::Send(_))));
        assert_eq!(outcome.offset, Some(previous));
        assert_eq!(sender.attempts(), 1);
    }
}
