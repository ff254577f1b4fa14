// tests/oracle_verdict.rs
//
// Relevance oracle over real HTTP against a fake chat-completions endpoint.

mod common;

use std::sync::Arc;
use std::time::Duration;

use channel_relay::config::OracleConfig;
use channel_relay::oracle::{MistralProvider, MockProvider, RelevanceOracle, Verdict};
use common::{FakeServer, Reply};
use serde_json::json;

fn completion(content: &str) -> Reply {
    Reply::raw(
        200,
        json!({
            "id": "cmpl-1",
            "object": "chat.completion",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        }),
    )
}

fn oracle_for(server: &FakeServer, timeout_secs: u64) -> RelevanceOracle {
    let cfg = OracleConfig {
        api_key: Some("test-key".into()),
        endpoint: format!("{}/v1/chat/completions", server.base),
        timeout_secs,
        ..Default::default()
    };
    RelevanceOracle::from_config(&cfg).unwrap()
}

#[tokio::test]
async fn verdicts_follow_reply_prefix() {
    for (reply, expected) in [
        ("RELEVANT", Verdict::Relevant),
        ("  relevant - mentions sirens", Verdict::Relevant),
        ("NOT RELEVANT", Verdict::NotRelevant),
        ("Not relevant.", Verdict::NotRelevant),
    ] {
        let server = FakeServer::start(move |_, _| completion(reply)).await;
        let oracle = oracle_for(&server, 5);
        assert_eq!(oracle.evaluate("msg", "query").await, expected, "{reply}");
    }
}

#[tokio::test]
async fn unexpected_reply_is_unknown_and_relevant() {
    let server = FakeServer::start(|_, _| completion("I cannot decide")).await;
    let v = oracle_for(&server, 5).evaluate("msg", "query").await;
    assert_eq!(v, Verdict::Unknown("I cannot decide".into()));
    assert!(v.is_relevant());
}

#[tokio::test]
async fn unexpected_reply_is_logged_in_full() {
    let reply = format!("Hard to say. {}END-OF-REPLY", "context ".repeat(40));
    let oracle = RelevanceOracle::with_provider(
        Arc::new(MockProvider::new(&reply)),
        Duration::from_secs(1),
    );
    let (logs, _guard) = common::CapturedLogs::start();
    assert!(oracle.evaluate("msg", "query").await.is_relevant());
    let text = logs.text();
    assert!(text.contains("unexpected oracle reply"), "{text}");
    assert!(text.contains("END-OF-REPLY"), "reply was cut: {text}");
}

#[tokio::test]
async fn request_carries_prompt_model_and_bearer_key() {
    let server = FakeServer::start(|_, _| completion("RELEVANT")).await;
    oracle_for(&server, 5)
        .evaluate("rockets near Haifa", "attacks in the north")
        .await;

    let calls = server.calls_to("completions");
    assert_eq!(calls.len(), 1);
    let c = &calls[0];
    assert_eq!(c.authorization.as_deref(), Some("Bearer test-key"));
    assert_eq!(c.body["model"], "mistral-tiny");
    assert_eq!(c.body["max_tokens"], 500);
    let prompt = c.body["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.contains("The user's query is: attacks in the north"));
    assert!(prompt.contains("The message to analyze is: rockets near Haifa"));
}

#[tokio::test]
async fn http_errors_fail_open_without_retry() {
    let server =
        FakeServer::start(|_, _| Reply::raw(500, json!({"message": "internal"}))).await;
    let v = oracle_for(&server, 5).evaluate("msg", "q").await;
    assert_eq!(v, Verdict::Relevant);
    assert_eq!(server.calls().len(), 1);
}

#[tokio::test]
async fn malformed_reply_fails_open() {
    let server = FakeServer::start(|_, _| Reply::raw(200, json!({"choices": []}))).await;
    assert_eq!(
        oracle_for(&server, 5).evaluate("msg", "q").await,
        Verdict::Relevant
    );
}

#[tokio::test]
async fn slow_oracle_times_out_as_relevant() {
    let server =
        FakeServer::start(|_, _| completion("NOT RELEVANT").delayed(Duration::from_secs(3))).await;
    let started = std::time::Instant::now();
    let v = oracle_for(&server, 1).evaluate("msg", "q").await;
    assert_eq!(v, Verdict::Relevant);
    assert!(started.elapsed() < Duration::from_millis(2500));
}

#[tokio::test]
async fn unreachable_endpoint_fails_open() {
    let cfg = OracleConfig {
        api_key: Some("k".into()),
        endpoint: "http://127.0.0.1:9/v1/chat/completions".into(),
        timeout_secs: 2,
        ..Default::default()
    };
    let oracle = RelevanceOracle::from_config(&cfg).unwrap();
    assert_eq!(oracle.evaluate("msg", "q").await, Verdict::Relevant);
}

#[tokio::test]
async fn analysis_returns_text_or_none() {
    let server = FakeServer::start(|_, _| completion("  1. Summary: rain.  ")).await;
    let out = oracle_for(&server, 5)
        .analyze(&channel_relay::oracle::AnalysisRequest {
            channel_name: "Weather".into(),
            message_text: "heavy rain".into(),
            ..Default::default()
        })
        .await;
    assert_eq!(out.as_deref(), Some("1. Summary: rain."));
    let prompt = server.calls()[0].body["messages"][0]["content"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(prompt.contains("Channel: Weather"));
    assert!(prompt.contains("Text: heavy rain"));

    let down = FakeServer::start(|_, _| Reply::raw(503, json!({}))).await;
    assert!(oracle_for(&down, 5)
        .analyze(&Default::default())
        .await
        .is_none());
}

#[tokio::test]
async fn mock_provider_is_usable_through_the_enum() {
    let mock = Arc::new(MockProvider::new("NOT RELEVANT"));
    let oracle = RelevanceOracle::with_provider(mock.clone(), Duration::from_secs(1));
    assert_eq!(oracle.evaluate("a", "b").await, Verdict::NotRelevant);
    assert_eq!(mock.calls(), 1);
    let _ = MistralProvider::new(&OracleConfig::default(), "k").unwrap();
}
