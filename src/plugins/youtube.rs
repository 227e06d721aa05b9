//! YouTube 频道连接器 - 轮询频道 feed，可选查询直播预约时间

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use super::feed::{fetch_feed, unhandled, FeedEntry, HandledEntries};
use super::{CheckOutcome, Plugin, PluginContext};
use crate::error::{ConnectorError, FetchError, ValidationError};
use crate::fetch::Redirects;
use crate::notification::{Avatar, WebhookMessage};

const FEED_URL: &str = "https://www.youtube.com/feeds/videos.xml";
const VIDEOS_API_URL: &str = "https://www.googleapis.com/youtube/v3/videos";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct YouTubePlugin {
    pub channel_id: String,
    pub nickname: String,
    pub message: String,
    /// 直播预约消息，`%s` 替换为开播时间
    pub livestream_message: String,
    /// YouTube Data API key；为空时不查询直播信息
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<Video>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Video {
    live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveStreamingDetails {
    scheduled_start_time: Option<String>,
}

impl YouTubePlugin {
    pub fn new(channel_id: impl Into<String>, nickname: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            nickname: nickname.into(),
            ..Default::default()
        }
    }

    pub fn feed_url(&self) -> Result<Url, url::ParseError> {
        Url::parse_with_params(FEED_URL, &[("channel_id", self.channel_id.as_str())])
    }

    fn post_message(&self, nickname: &str) -> String {
        if self.message.is_empty() {
            format!("{nickname} posted something on YouTube")
        } else {
            self.message.clone()
        }
    }

    /// 视频为预约直播时返回直播消息
    async fn livestream_message(
        &self,
        entry: &FeedEntry,
        nickname: &str,
        ctx: &PluginContext,
    ) -> Result<Option<String>, ConnectorError> {
        let Some(video_id) = entry.video_id.as_deref() else {
            return Ok(None);
        };
        if self.token.is_empty() {
            return Ok(None);
        }

        let url = Url::parse_with_params(
            VIDEOS_API_URL,
            &[
                ("part", "liveStreamingDetails"),
                ("id", video_id),
                ("key", self.token.as_str()),
            ],
        )
        .map_err(|e| ConnectorError::api(format!("invalid video API URL: {e}")))?;

        let response = ctx.http.get(url.as_str(), &[]).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                url: VIDEOS_API_URL.to_string(),
                status: response.status,
            }
            .into());
        }

        let videos: VideoListResponse = serde_json::from_str(&response.body)
            .map_err(|e| ConnectorError::parse(format!("invalid video details: {e}")))?;

        let scheduled = videos
            .items
            .into_iter()
            .next()
            .and_then(|v| v.live_streaming_details)
            .and_then(|d| d.scheduled_start_time)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|start| start.with_timezone(&Utc));

        let Some(start) = scheduled else {
            return Ok(None);
        };

        let template = if self.livestream_message.is_empty() {
            format!("{nickname} is going live on YouTube %s!")
        } else {
            self.livestream_message.clone()
        };

        Ok(Some(template.replacen("%s", &format!("<t:{}:R>", start.timestamp()), 1)))
    }
}

#[async_trait]
impl Plugin for YouTubePlugin {
    type Offset = HandledEntries;

    fn name(&self) -> &'static str {
        "youtube"
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.channel_id.is_empty() {
            return Err(ValidationError::new("channel ID for YouTube must not be empty"));
        }
        if self.nickname.is_empty() && self.message.is_empty() {
            return Err(ValidationError::new(
                "either a channel nickname or a YouTube post message must be given",
            ));
        }
        Ok(())
    }

    async fn check(
        &self,
        offset: Option<HandledEntries>,
        ctx: &PluginContext,
    ) -> CheckOutcome<HandledEntries> {
        info!(channel = %self.channel_id, "Checking for YouTube updates");

        let feed_url = match self.feed_url() {
            Ok(url) => url,
            Err(e) => {
                return CheckOutcome::failed(
                    offset,
                    ConnectorError::api(format!("invalid feed URL: {e}")),
                )
            }
        };

        let feed = match fetch_feed(ctx, feed_url.as_str(), offset.is_some(), Redirects::Follow).await {
            Ok(Some(feed)) => feed,
            Ok(None) => return CheckOutcome::keep(offset),
            Err(e) => return CheckOutcome::failed(offset, e),
        };

        let entries = unhandled(&feed.entries, offset.as_ref().unwrap_or(&HandledEntries::new()));
        if entries.is_empty() {
            info!("No YouTube posts to report");
            return CheckOutcome::keep(offset);
        }

        let mut handled = offset.unwrap_or_default();

        let nickname = if self.nickname.is_empty() {
            feed.title.as_str()
        } else {
            self.nickname.as_str()
        };

        info!(count = entries.len(), "Reporting YouTube posts");
        for entry in entries {
            let message = match self.livestream_message(&entry, nickname, ctx).await {
                Ok(Some(live)) => live,
                Ok(None) => self.post_message(nickname),
                Err(e) => {
                    warn!(video = ?entry.video_id, error = %e, "Could not look up livestream details");
                    return CheckOutcome::failed(Some(handled), e);
                }
            };

            let post = WebhookMessage::new(format!("{} {}", message, entry.link), "YouTube")
                .with_avatar(Avatar::named("youtube"));

            if let Err(e) = ctx.webhook.send(&post).await {
                return CheckOutcome::failed(Some(handled), e);
            }

            handled.insert(entry.id, true);
            info!(title = %entry.title, "Reported YouTube post");
        }

        CheckOutcome::ok(handled)
    }
}
