//! Discord webhook 客户端测试
//!
//! 用 wiremock 验证请求体、限流重试与错误映射

use sanderson_notifications::{
    Avatar, DiscordWebhook, Embed, SendError, WebhookConfig, WebhookMessage, WebhookSender,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, mentions: Vec<String>) -> DiscordWebhook {
    DiscordWebhook::new(WebhookConfig {
        webhook: format!("{}/hook", server.uri()),
        avatar_base_url: Some("https://cdn.test/avatars".to_string()),
        mentions,
        ..Default::default()
    })
    .unwrap()
}

fn progress_message() -> WebhookMessage {
    WebhookMessage::new("Progress updated!", "Progress Updates")
        .with_avatar(Avatar::named("dragonsteel"))
        .with_embed(Embed::new("**[New] A**").with_footer("See https://progress.test for more"))
}

#[tokio::test]
async fn test_posts_full_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({
            "username": "Progress Updates",
            "avatar_url": "https://cdn.test/avatars/dragonsteel.png",
            "content": "<@&1> Progress updated!",
            "embeds": [{
                "description": "**[New] A**",
                "footer": {"text": "See https://progress.test for more"}
            }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server, vec!["<@&1>".to_string()])
        .send(&progress_message())
        .await;

    assert!(result.is_ok(), "send should succeed: {result:?}");
}

#[tokio::test]
async fn test_retries_after_rate_limit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"retry_after": 10.0})))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let result = client(&server, Vec::new()).send(&progress_message()).await;
    assert!(result.is_ok());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn test_gives_up_after_three_rate_limits() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"retry_after": 1})))
        .expect(3)
        .mount(&server)
        .await;

    let result = client(&server, Vec::new()).send(&progress_message()).await;
    assert!(matches!(result, Err(SendError::RateLimited { attempts: 3 })));
}

#[tokio::test]
async fn test_rejected_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad embed"))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server, Vec::new()).send(&progress_message()).await;
    match result {
        Err(SendError::Rejected { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad embed");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_plain_message_omits_optional_fields() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    client(&server, Vec::new())
        .send(&WebhookMessage::new("hello", "Twitter"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    assert_eq!(body, json!({"username": "Twitter", "content": "hello"}));
}
