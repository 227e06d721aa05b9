//! 测试替身 - 记录发送的消息、返回预设的 HTTP 响应
//!
//! 单元测试与 `tests/` 下的集成测试共用。

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{FetchError, SendError};
use crate::fetch::{FetchResponse, HttpFetcher, Redirects};
use crate::notification::{WebhookMessage, WebhookSender};

/// 记录消息的发送端，可切换为失败模式
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<WebhookMessage>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的发送全部返回 500
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 成功发送的消息
    pub fn sent(&self) -> Vec<WebhookMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 包括失败在内的发送次数
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &WebhookMessage) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SendError::Rejected {
                status: 500,
                body: "internal error".to_string(),
            });
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());
        Ok(())
    }
}

type Canned = Result<FetchResponse, FetchError>;

/// URL → 预设响应队列；队列只剩一个时重复返回它
#[derive(Debug, Default)]
pub struct StaticFetcher {
    responses: Mutex<HashMap<String, VecDeque<Canned>>>,
    requests: Mutex<Vec<(String, Redirects)>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个响应
    pub fn respond(&self, url: impl Into<String>, response: FetchResponse) -> &Self {
        self.push(url.into(), Ok(response));
        self
    }

    /// 追加一个传输错误
    pub fn fail(&self, url: impl Into<String>, message: impl Into<String>) -> &Self {
        let url = url.into();
        let error = FetchError::Transport {
            url: url.clone(),
            message: message.into(),
        };
        self.push(url, Err(error));
        self
    }

    /// 丢弃某个 URL 的所有预设，并设置新的响应
    pub fn replace(&self, url: impl Into<String>, response: FetchResponse) -> &Self {
        let url = url.into();
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        responses.insert(url, VecDeque::from([Ok(response)]));
        self
    }

    /// 已请求过的 URL（按顺序）
    pub fn requests(&self) -> Vec<String> {
        self.requests_with_redirects()
            .into_iter()
            .map(|(url, _)| url)
            .collect()
    }

    /// 已请求过的 URL 及其重定向策略
    pub fn requests_with_redirects(&self) -> Vec<(String, Redirects)> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn push(&self, url: String, canned: Canned) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url)
            .or_default()
            .push_back(canned);
    }
}

#[async_trait]
impl HttpFetcher for StaticFetcher {
    async fn get_with(
        &self,
        url: &str,
        _headers: &[(&str, &str)],
        redirects: Redirects,
    ) -> Result<FetchResponse, FetchError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((url.to_string(), redirects));

        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        let Some(queue) = responses.get_mut(url) else {
            return Err(FetchError::Transport {
                url: url.to_string(),
                message: "no canned response".to_string(),
            });
        };

        let canned = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };

        canned.unwrap_or_else(|| {
            Err(FetchError::Transport {
                url: url.to_string(),
                message: "no canned response".to_string(),
            })
        })
    }
}
