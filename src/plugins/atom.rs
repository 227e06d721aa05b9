//! Atom feed 连接器 - 为每个新条目发一条消息

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::feed::{fetch_feed, unhandled, HandledEntries};
use super::{CheckOutcome, Plugin, PluginContext};
use crate::error::ValidationError;
use crate::fetch::Redirects;
use crate::notification::{Avatar, WebhookMessage};

const DEFAULT_MESSAGE: &str = "A new blog post was published";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AtomPlugin {
    pub feed_url: String,
    /// 发送者名称，缺省使用 feed 标题
    pub nickname: String,
    pub avatar_url: String,
    pub message: String,
}

impl AtomPlugin {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Plugin for AtomPlugin {
    type Offset = HandledEntries;

    fn name(&self) -> &'static str {
        "atom"
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.feed_url.is_empty() {
            return Err(ValidationError::new(
                "feed URL for Atom integration must not be empty",
            ));
        }
        Ok(())
    }

    async fn check(
        &self,
        offset: Option<HandledEntries>,
        ctx: &PluginContext,
    ) -> CheckOutcome<HandledEntries> {
        info!(feed = %self.feed_url, "Checking Atom feed for updates");

        // 重定向（如跳转到登录页）按错误处理
        let feed = match fetch_feed(ctx, &self.feed_url, offset.is_some(), Redirects::Stop).await {
            Ok(Some(feed)) => feed,
            Ok(None) => return CheckOutcome::keep(offset),
            Err(e) => return CheckOutcome::failed(offset, e),
        };

        let mut entries = unhandled(&feed.entries, offset.as_ref().unwrap_or(&HandledEntries::new()));
        // 稳定排序，未标注时间的条目排在最前
        entries.sort_by_key(|entry| entry.published);

        if entries.is_empty() {
            info!(feed = %self.feed_url, "No posts to report");
            return CheckOutcome::keep(offset);
        }

        let mut handled = offset.unwrap_or_default();

        let nickname = if self.nickname.is_empty() {
            info!(title = %feed.title, "No nickname configured, using feed title");
            feed.title.as_str()
        } else {
            self.nickname.as_str()
        };
        let message = if self.message.is_empty() {
            DEFAULT_MESSAGE
        } else {
            self.message.as_str()
        };
        let avatar = (!self.avatar_url.is_empty()).then(|| Avatar::url(&self.avatar_url));

        info!(count = entries.len(), "Reporting posts from Atom feed");
        for entry in entries {
            let post = WebhookMessage::new(format!("{}\n{}", message, entry.link), nickname)
                .with_optional_avatar(avatar.clone());

            if let Err(e) = ctx.webhook.send(&post).await {
                return CheckOutcome::failed(Some(handled), e);
            }

            handled.insert(entry.id, true);
            info!(title = %entry.title, "Reported post");
        }

        CheckOutcome::ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::error::ConnectorError;
    use crate::fetch::FetchResponse;
    use crate::plugins::feed::fixtures::atom;
    use crate::testing::{RecordingSender, StaticFetcher};
    use std::sync::Arc;

    const FEED: &str = "https://blog.test/feed.atom";

    fn setup(body: FetchResponse) -> (Arc<RecordingSender>, PluginContext) {
        let (sender, _, ctx) = setup_with_fetcher(body);
        (sender, ctx)
    }

    fn setup_with_fetcher(
        body: FetchResponse,
    ) -> (Arc<RecordingSender>, Arc<StaticFetcher>, PluginContext) {
        let sender = Arc::new(RecordingSender::new());
        let fetcher = Arc::new(StaticFetcher::new());
        fetcher.respond(FEED, body);
        let ctx = PluginContext::new("blog", sender.clone(), fetcher.clone(), Arc::new(SystemClock));
        (sender, fetcher, ctx)
    }

    #[test]
    fn test_validate_requires_feed_url() {
        assert!(AtomPlugin::new(FEED).validate().is_ok());
        assert_eq!(
            AtomPlugin::default().validate().unwrap_err().to_string(),
            "feed URL for Atom integration must not be empty"
        );
    }

    #[tokio::test]
    async fn test_reports_unhandled_entries_oldest_first() {
        let xml = atom(
            "Brandon's Blog",
            &[
                ("new", "https://blog.test/new", Some("2024-03-01T00:00:00Z")),
                ("seen", "https://blog.test/seen", Some("2024-02-01T00:00:00Z")),
                ("old", "https://blog.test/old", Some("2024-01-01T00:00:00Z")),
            ],
        );
        let (sender, ctx) = setup(FetchResponse::ok(xml));

        let mut handled = HandledEntries::new();
        handled.insert("seen".to_string(), true);

        let mut plugin = AtomPlugin::new(FEED);
        plugin.avatar_url = "https://blog.test/avatar.png".to_string();
        let outcome = plugin.check(Some(handled), &ctx).await;

        assert!(outcome.is_ok());
        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].content, "A new blog post was published\nhttps://blog.test/old");
        assert_eq!(sent[1].content, "A new blog post was published\nhttps://blog.test/new");
        assert_eq!(sent[0].username, "Brandon's Blog");
        assert_eq!(sent[0].avatar, Some(Avatar::url("https://blog.test/avatar.png")));

        let handled = outcome.offset.unwrap();
        assert_eq!(handled.len(), 3);
        assert!(handled.values().all(|v| *v));
    }

    #[tokio::test]
    async fn test_feed_is_fetched_without_following_redirects() {
        let (_, fetcher, ctx) = setup_with_fetcher(FetchResponse::ok(atom("Blog", &[])));

        AtomPlugin::new(FEED).check(None, &ctx).await.result.unwrap();
        assert_eq!(
            fetcher.requests_with_redirects(),
            vec![(FEED.to_string(), Redirects::Stop)]
        );
    }

    #[tokio::test]
    async fn test_redirect_is_an_error() {
        let (sender, ctx) = setup(
            FetchResponse::with_status(302, "").with_header("Location", "https://blog.test/login"),
        );

        let outcome = AtomPlugin::new(FEED).check(None, &ctx).await;
        assert!(matches!(
            outcome.result,
            Err(ConnectorError::Fetch(crate::error::FetchError::Status { status: 302, .. }))
        ));
        assert!(outcome.offset.is_none());
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_empty_feed_on_first_run_stores_nothing() {
        let (sender, ctx) = setup(FetchResponse::ok(atom("Blog", &[])));

        let outcome = AtomPlugin::new(FEED).check(None, &ctx).await;
        assert!(outcome.is_ok());
        assert!(outcome.offset.is_none());
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_new_returns_offset_unchanged() {
        let xml = atom("Blog", &[("a", "https://blog.test/a", None)]);
        let (sender, ctx) = setup(FetchResponse::ok(xml));

        let mut handled = HandledEntries::new();
        handled.insert("a".to_string(), true);

        let outcome = AtomPlugin::new(FEED).check(Some(handled.clone()), &ctx).await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.offset, Some(handled));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_missing_feed_keeps_offset() {
        let (sender, ctx) = setup(FetchResponse::with_status(404, "not found"));

        let mut handled = HandledEntries::new();
        handled.insert("a".to_string(), true);

        let outcome = AtomPlugin::new(FEED).check(Some(handled.clone()), &ctx).await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.offset, Some(handled));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_returns_progress_so_far() {
        let xml = atom("Blog", &[("a", "https://blog.test/a", None)]);
        let (sender, ctx) = setup(FetchResponse::ok(xml));
        sender.fail(true);

        let outcome = AtomPlugin::new(FEED).check(None, &ctx).await;
        assert!(matches!(outcome.result, Err(ConnectorError::Send(_))));
        assert_eq!(outcome.offset, Some(HandledEntries::new()));
    }
}
