//! Twitter 连接器 - 按 `since_id` 拉取时间线，逐条转发

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::info;
use url::Url;

use super::{CheckOutcome, Plugin, PluginContext};
use crate::error::{ConnectorError, ValidationError};
use crate::notification::{Avatar, WebhookMessage};

const TIMELINE_URL: &str = "https://api.twitter.com/1.1/statuses/user_timeline.json";

/// 429 时的最多尝试次数
const MAX_TRIES: u32 = 3;

/// 分页上限，防止 API 异常时死循环
const MAX_PAGES: usize = 50;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TwitterPlugin {
    /// API bearer token
    pub token: String,
    pub account: String,
    pub nickname: String,
    pub tweet_message: String,
    pub retweet_message: String,
    /// 不转发这些账号原创内容的转推
    pub exclude_retweets_of: Vec<String>,
    #[serde(skip)]
    retweet_exclusions: HashSet<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    pub id: u64,
    pub user: TweetUser,
    #[serde(default)]
    pub retweeted_status: Option<Box<Tweet>>,
    #[serde(default)]
    pub in_reply_to_screen_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TweetUser {
    pub name: String,
    pub screen_name: String,
}

impl TwitterPlugin {
    pub fn new(token: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            account: account.into(),
            ..Default::default()
        }
    }

    fn timeline_url(&self, since: &str, max_id: Option<u64>) -> Result<Url, ConnectorError> {
        let mut url = Url::parse_with_params(
            TIMELINE_URL,
            &[
                ("screen_name", self.account.as_str()),
                ("since_id", since),
                ("count", "100"),
                ("exclude_replies", "false"),
                ("include_rts", "true"),
            ],
        )
        .map_err(|e| ConnectorError::api(format!("invalid timeline URL: {e}")))?;

        if let Some(max_id) = max_id {
            url.query_pairs_mut()
                .append_pair("max_id", &max_id.to_string());
        }
        Ok(url)
    }

    /// 拉取 `since` 之后的所有推文（新的在前）
    async fn tweets_since(
        &self,
        since: &str,
        ctx: &PluginContext,
    ) -> Result<Vec<Tweet>, ConnectorError> {
        let mut result = Vec::new();
        let mut max_id = None;

        for _ in 0..MAX_PAGES {
            let page = self.read_page(since, max_id, ctx).await?;

            // max_id 是闭区间，只剩上一页最后一条时说明已经取完
            let fresh: Vec<Tweet> = page
                .into_iter()
                .filter(|t| Some(t.id) != max_id)
                .collect();
            let Some(last) = fresh.last() else {
                break;
            };

            max_id = Some(last.id);
            result.extend(fresh);
        }

        Ok(result)
    }

    async fn read_page(
        &self,
        since: &str,
        max_id: Option<u64>,
        ctx: &PluginContext,
    ) -> Result<Vec<Tweet>, ConnectorError> {
        let url = self.timeline_url(since, max_id)?;
        let authorization = format!("Bearer {}", self.token);

        for attempt in 1..=MAX_TRIES {
            let response = ctx
                .http
                .get(url.as_str(), &[("Authorization", authorization.as_str())])
                .await?;

            if response.status == 429 {
                if response.header("x-app-rate-limit-remaining") == Some("0") {
                    return Err(ConnectorError::api(
                        "app rate limit hit for current 24h period",
                    ));
                }
                if attempt == MAX_TRIES {
                    break;
                }

                let raw_reset = response
                    .header("x-rate-limit-reset")
                    .ok_or_else(|| ConnectorError::api("no rate limit reset time found"))?;
                let reset = raw_reset.parse::<i64>().map_err(|e| {
                    ConnectorError::api(format!(
                        "rate limit reset '{raw_reset}' could not be parsed into number: {e}"
                    ))
                })?;

                let delay = Utc
                    .timestamp_opt(reset, 0)
                    .single()
                    .map(|reset| (reset - ctx.clock.now()).to_std().unwrap_or_default())
                    .unwrap_or_default();

                info!(delay_secs = delay.as_secs(), "Being rate limited by Twitter, waiting");
                tokio::time::sleep(delay).await;
                continue;
            }

            if response.status != 200 {
                return Err(ConnectorError::api(format!(
                    "received response '{}', body was: {}",
                    response.status, response.body
                )));
            }

            return serde_json::from_str(&response.body)
                .map_err(|e| ConnectorError::parse(format!("couldn't parse tweets: {e}")));
        }

        Err(ConnectorError::api(format!(
            "rate limiting still applied after {MAX_TRIES} retries"
        )))
    }

    fn skip_reason(&self, tweet: &Tweet) -> Option<String> {
        if let Some(original) = &tweet.retweeted_status {
            if self.retweet_exclusions.contains(&original.user.screen_name) {
                return Some(format!(
                    "original tweet is from '{}'",
                    original.user.screen_name
                ));
            }
        }

        match &tweet.in_reply_to_screen_name {
            Some(reply_to) if *reply_to != self.account => {
                Some("reply is not in response to themself".to_string())
            }
            _ => None,
        }
    }

    fn message_for(&self, tweet: &Tweet, nickname: &str) -> String {
        if tweet.retweeted_status.is_some() {
            if self.retweet_message.is_empty() {
                format!("{nickname} retweeted")
            } else {
                self.retweet_message.clone()
            }
        } else if self.tweet_message.is_empty() {
            format!("{nickname} tweeted")
        } else {
            self.tweet_message.clone()
        }
    }
}

#[async_trait]
impl Plugin for TwitterPlugin {
    /// 最后处理的推文 ID
    type Offset = String;

    fn name(&self) -> &'static str {
        "twitter"
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.token.is_empty() {
            return Err(ValidationError::new("token for Twitter must not be empty"));
        }
        if self.account.is_empty() {
            return Err(ValidationError::new("account for Twitter must not be empty"));
        }
        Ok(())
    }

    async fn init(&mut self, _ctx: &PluginContext) -> Result<(), ConnectorError> {
        self.retweet_exclusions = self.exclude_retweets_of.iter().cloned().collect();
        Ok(())
    }

    async fn check(&self, offset: Option<String>, ctx: &PluginContext) -> CheckOutcome<String> {
        let Some(mut last_tweet) = offset.filter(|id| !id.is_empty()) else {
            return CheckOutcome::failed(
                None,
                ConnectorError::api("latest Tweet ID must be specified as offset for start"),
            );
        };

        info!(account = %self.account, "Checking for new tweets");

        let tweets = match self.tweets_since(&last_tweet, ctx).await {
            Ok(tweets) => tweets,
            Err(e) => return CheckOutcome::failed(Some(last_tweet), e),
        };

        let Some(newest) = tweets.first() else {
            info!("No tweets to report");
            return CheckOutcome::ok(last_tweet);
        };

        let nickname = if self.nickname.is_empty()
            && (self.tweet_message.is_empty() || self.retweet_message.is_empty())
        {
            info!(name = %newest.user.name, "No nickname configured, using account name");
            newest.user.name.clone()
        } else {
            self.nickname.clone()
        };

        info!(count = tweets.len(), "Reporting tweets");
        for tweet in tweets.iter().rev() {
            if let Some(reason) = self.skip_reason(tweet) {
                info!(tweet = tweet.id, reason = %reason, "Ignoring tweet");
                last_tweet = tweet.id.to_string();
                continue;
            }

            let post = WebhookMessage::new(
                format!(
                    "{} https://twitter.com/{}/status/{}",
                    self.message_for(tweet, &nickname),
                    self.account,
                    tweet.id
                ),
                "Twitter",
            )
            .with_avatar(Avatar::named("twitter"));

            if let Err(e) = ctx.webhook.send(&post).await {
                return CheckOutcome::failed(Some(last_tweet), e);
            }

            last_tweet = tweet.id.to_string();
        }

        CheckOutcome::ok(last_tweet)
    }
}
