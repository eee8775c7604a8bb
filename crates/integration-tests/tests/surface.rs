//! Liveness, model listing, auth, and CORS surface

mod harness;

use harness::fleet;
use harness::mock_backend::MockBackend;
use harness::server::TestServerBuilder;

use crossbar_store::Location;

#[tokio::test]
async fn health_reports_ok_with_a_healthy_fleet() {
    let server = TestServerBuilder::new().await.unwrap().start().await.unwrap();

    let resp = server.client().get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
    assert!(body["models"]["total"].as_i64().unwrap() >= 1);
    assert!(body["models"]["healthy"].as_i64().unwrap() >= 1);
    assert!(body["budget"]["daily_limit"].is_number());
}

#[tokio::test]
async fn health_degrades_without_healthy_models() {
    let builder = TestServerBuilder::new().await.unwrap();
    fleet::disable_self_model(builder.store()).await;
    let server = builder.start().await.unwrap();

    let resp = server.client().get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 503);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn models_list_orders_by_location_then_quality() {
    let builder = TestServerBuilder::new().await.unwrap();
    fleet::disable_self_model(builder.store()).await;
    let endpoint = "http://127.0.0.1:9999/v1";
    fleet::seed(builder.store(), &fleet::model("cloud/big", Location::Cloud, 95, endpoint), &[])
        .await;
    fleet::seed(builder.store(), &fleet::model("lan/mid", Location::Lan, 70, endpoint), &[]).await;
    fleet::seed(
        builder.store(),
        &fleet::model("local/small", Location::Colocated, 50, endpoint),
        &[],
    )
    .await;
    fleet::seed(
        builder.store(),
        &fleet::model("lan/strong", Location::Lan, 85, endpoint),
        &[],
    )
    .await;
    let server = builder.start().await.unwrap();

    let resp = server.client().get(server.url("/v1/models")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["object"], "list");
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["local/small", "lan/strong", "lan/mid", "cloud/big"]);

    let first = &body["data"][0];
    assert_eq!(first["object"], "model");
    assert_eq!(first["owned_by"], "local");
    assert!(first["created"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn gateway_key_guards_everything_but_liveness() {
    let server = TestServerBuilder::new()
        .await
        .unwrap()
        .with_api_key("sk-gateway-test")
        .start()
        .await
        .unwrap();

    // No key
    let resp = server.client().get(server.url("/v1/models")).send().await.unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "authentication_error");

    // Wrong key
    let resp = server
        .client()
        .get(server.url("/v1/models"))
        .bearer_auth("sk-wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Right key
    let resp = server
        .client()
        .get(server.url("/v1/models"))
        .bearer_auth("sk-gateway-test")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Liveness stays open
    let resp = server.client().get(server.url("/health")).send().await.unwrap();
    assert_ne!(resp.status(), 401);
}

#[tokio::test]
async fn preflight_answers_204_with_permissive_cors() {
    let server = TestServerBuilder::new().await.unwrap().start().await.unwrap();

    let resp = server
        .client()
        .request(reqwest::Method::OPTIONS, server.url("/v1/chat/completions"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 204);
    assert_eq!(resp.headers().get("access-control-allow-origin").unwrap(), "*");
    assert!(resp.headers().contains_key("access-control-allow-methods"));
}

#[tokio::test]
async fn untrusted_source_header_is_ignored() {
    let backend = MockBackend::start().await.unwrap();
    let builder = TestServerBuilder::new().await.unwrap();
    fleet::repoint_self_model(builder.store(), &backend.base_url()).await;
    let server = builder.start().await.unwrap();

    // An unknown source tag must not match the heartbeat rule; the text
    // still matches the greeting rule, so the request routes at Tier 1
    let resp = server
        .client()
        .post(server.url("/v1/chat/completions"))
        .header("x-router-source", "totally-invented")
        .json(&serde_json::json!({
            "messages": [{"role": "user", "content": "hello"}],
            "stream": false
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let logs = server.store.list_request_logs(10).await.unwrap();
    let rule_id = logs[0].rule_id.unwrap();
    let rules = server.store.load_rules().await.unwrap();
    assert_eq!(rules.iter().find(|r| r.id == rule_id).unwrap().priority, 40);
}
