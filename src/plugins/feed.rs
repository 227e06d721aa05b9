//! Atom feed 公共逻辑 - 抓取、解析、筛选未处理条目

use atom_syndication::Feed;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{error, info};

use super::PluginContext;
use crate::error::{ConnectorError, FetchError};
use crate::fetch::Redirects;

/// 条目 ID → 是否已通知
pub type HandledEntries = BTreeMap<String, bool>;

/// feed 中的一条记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: String,
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    /// YouTube feed 的 `yt:videoId` 扩展
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: String,
    pub entries: Vec<FeedEntry>,
}

/// 解析 Atom 文档
pub fn parse_feed(body: &str) -> Result<ParsedFeed, ConnectorError> {
    let feed = Feed::read_from(body.as_bytes())
        .map_err(|e| ConnectorError::parse(format!("invalid Atom feed: {e}")))?;

    let entries = feed
        .entries()
        .iter()
        .map(|entry| FeedEntry {
            id: entry.id().to_string(),
            title: entry.title().value.clone(),
            link: entry
                .links()
                .first()
                .map(|l| l.href().to_string())
                .unwrap_or_default(),
            published: entry.published().map(|p| p.with_timezone(&Utc)),
            video_id: entry.extensions().get("yt").and_then(|yt| {
                yt.get("videoId")
                    .or_else(|| yt.get("yt:videoId"))
                    .and_then(|values| values.first())
                    .and_then(|ext| ext.value())
                    .map(str::to_string)
            }),
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title().value.clone(),
        entries,
    })
}

/// 筛出未处理的条目，顺序与 feed 相反（feed 通常新的在前）
pub fn unhandled(entries: &[FeedEntry], handled: &HandledEntries) -> Vec<FeedEntry> {
    entries
        .iter()
        .rev()
        .filter(|entry| !handled.get(&entry.id).copied().unwrap_or(false))
        .cloned()
        .collect()
}

/// 抓取并解析 feed
///
/// `redirects` 为 [`Redirects::Stop`] 时 3xx 按非 2xx 状态报错。
///
/// 404 不算错误：站点暂时不可用时返回 `Ok(None)`，首次运行（没有 offset）时以 error 级别记录。
pub async fn fetch_feed(
    ctx: &PluginContext,
    url: &str,
    has_offset: bool,
    redirects: Redirects,
) -> Result<Option<ParsedFeed>, ConnectorError> {
    let response = ctx.http.get_with(url, &[], redirects).await?;

    if response.status == 404 {
        if has_offset {
            info!(url, "Could not find feed, site might be down");
        } else {
            error!(url, "Could not find feed, site might be down");
        }
        return Ok(None);
    }

    if !response.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status,
        }
        .into());
    }

    parse_feed(&response.body).map(Some)
}
