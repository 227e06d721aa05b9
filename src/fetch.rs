//! HTTP 抓取 - 连接器通过 `HttpFetcher` 获取页面、feed 与 API 响应

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::FetchError;

const USER_AGENT: &str = concat!("sanderson-notifications/", env!("CARGO_PKG_VERSION"));

/// 抓取结果（任何状态码都作为响应返回，由连接器决定如何处理）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// 响应头，键统一为小写
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    /// 200 响应
    pub fn ok(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 按名称取响应头（不区分大小写）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// 重定向策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Redirects {
    /// 跟随重定向（最多 10 次）
    #[default]
    Follow,
    /// 把 3xx 当作普通响应返回
    Stop,
}

/// HTTP GET 抓取端
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get_with(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        redirects: Redirects,
    ) -> Result<FetchResponse, FetchError>;

    /// 跟随重定向的 GET
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<FetchResponse, FetchError> {
        self.get_with(url, headers, Redirects::Follow).await
    }
}

/// 基于 reqwest 的实现
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
    no_redirect: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        let no_redirect = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            no_redirect,
        })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get_with(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        redirects: Redirects,
    ) -> Result<FetchResponse, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let client = match redirects {
            Redirects::Follow => &self.client,
            Redirects::Stop => &self.no_redirect,
        };

        let mut request = client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(transport)?;

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}
