//! End-to-end routing tier behavior

mod harness;

use harness::fleet;
use harness::mock_backend::MockBackend;
use harness::mock_classifier::MockClassifier;
use harness::server::TestServerBuilder;

use crossbar_store::Location;

fn completion_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "model": "auto",
        "messages": [{"role": "user", "content": text}],
        "stream": false
    })
}

#[tokio::test]
async fn heartbeat_short_circuits_without_classification() {
    let backend = MockBackend::start().await.unwrap();
    let classifier = MockClassifier::start(
        r#"{"complexity":"simple","task_type":"simple_qa","estimated_tokens":100,"sensitive":false}"#,
    )
    .await
    .unwrap();

    let builder = TestServerBuilder::new()
        .await
        .unwrap()
        .with_classifier(&classifier.base_url());
    fleet::repoint_self_model(builder.store(), &backend.base_url()).await;
    let server = builder.start().await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .header("x-router-source", "heartbeat")
        .json(&completion_body("ping"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-router-tier").unwrap(), "1");
    assert_eq!(
        resp.headers().get("x-router-model").unwrap(),
        "local/llama3.2:3b"
    );
    assert!(resp.headers().get("x-router-classification").is_none());

    // The rule short-circuit never touched Tier 2
    assert_eq!(classifier.call_count(), 0);
    assert_eq!(backend.completion_count(), 1);

    let logs = server.store.list_request_logs(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].tier, 1);
    assert_eq!(logs[0].selected_model, "local/llama3.2:3b");
}

#[tokio::test]
async fn greeting_matches_the_priority_40_rule() {
    let backend = MockBackend::start().await.unwrap();
    let builder = TestServerBuilder::new().await.unwrap();
    fleet::repoint_self_model(builder.store(), &backend.base_url()).await;
    let server = builder.start().await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&completion_body("hello"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-router-tier").unwrap(), "1");
    assert_eq!(
        resp.headers().get("x-router-model").unwrap(),
        "local/llama3.2:3b"
    );

    let logs = server.store.list_request_logs(10).await.unwrap();
    let rule_id = logs[0].rule_id.expect("tier 1 decision records its rule");
    let rules = server.store.load_rules().await.unwrap();
    let matched = rules.iter().find(|r| r.id == rule_id).unwrap();
    assert_eq!(matched.priority, 40);
}

#[tokio::test]
async fn classification_selects_a_capable_lan_model() {
    let backend = MockBackend::start().await.unwrap();
    let classifier = MockClassifier::start(
        r#"{"complexity":"complex","task_type":"coding","estimated_tokens":2000,"sensitive":false}"#,
    )
    .await
    .unwrap();

    let builder = TestServerBuilder::new()
        .await
        .unwrap()
        .with_classifier(&classifier.base_url());
    fleet::seed(
        builder.store(),
        &fleet::model("lan/coder", Location::Lan, 70, &backend.base_url()),
        &["coding", "conversation"],
    )
    .await;
    let server = builder.start().await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&completion_body("Write a Python web server"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-router-tier").unwrap(), "2");
    assert_eq!(resp.headers().get("x-router-model").unwrap(), "lan/coder");

    let classification = resp
        .headers()
        .get("x-router-classification")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(classification.contains("\"task_type\":\"coding\""));

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["model"], "lan/coder");
    assert_eq!(classifier.call_count(), 1);

    let logs = server.store.list_request_logs(10).await.unwrap();
    assert_eq!(logs[0].tier, 2);
    assert!(logs[0]
        .classification
        .as_deref()
        .unwrap()
        .contains("coding"));
}

#[tokio::test]
async fn sensitive_requests_fall_back_past_the_cloud() {
    let backend = MockBackend::start().await.unwrap();
    let classifier = MockClassifier::start(
        r#"{"complexity":"medium","task_type":"conversation","estimated_tokens":500,"sensitive":true}"#,
    )
    .await
    .unwrap();

    let builder = TestServerBuilder::new()
        .await
        .unwrap()
        .with_classifier(&classifier.base_url());

    // Only a cloud model exists, and it is also the configured fallback
    fleet::disable_self_model(builder.store()).await;
    fleet::seed(
        builder.store(),
        &fleet::priced(
            fleet::model("anthropic/claude-sonnet", Location::Cloud, 90, &backend.base_url()),
            3.0,
            15.0,
        ),
        &["conversation", "coding"],
    )
    .await;
    let mut policy = builder.store().load_policy().await.unwrap();
    policy.fallback_model_id = Some("anthropic/claude-sonnet".to_owned());
    builder.store().update_policy(&policy).await.unwrap();

    let server = builder.start().await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&completion_body("my api key is sk-secret, what does it do?"))
        .send()
        .await
        .unwrap();

    // The privacy gate emptied Tier 2; Tier 3 ignores it by design
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("x-router-tier").unwrap(), "3");
    assert_eq!(
        resp.headers().get("x-router-model").unwrap(),
        "anthropic/claude-sonnet"
    );
}

#[tokio::test]
async fn validation_rejects_bad_bodies() {
    let server = TestServerBuilder::new().await.unwrap().start().await.unwrap();

    // Missing messages
    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&serde_json::json!({"model": "auto"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");

    // Out-of-range temperature
    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 9.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Invalid role
    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .json(&serde_json::json!({
            "messages": [{"role": "wizard", "content": "hi"}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
