//! Fleet seeding helpers

use crossbar_store::{Location, ModelRecord, Store, WireFormat};

/// A zero-priced model pointing at the given endpoint
pub fn model(id: &str, location: Location, quality: i64, endpoint: &str) -> ModelRecord {
    ModelRecord {
        id: id.to_owned(),
        display_name: id.to_owned(),
        provider: id.split('/').next().unwrap_or("test").to_owned(),
        location,
        endpoint: endpoint.to_owned(),
        wire_format: WireFormat::Openai,
        api_key_env: None,
        quality_score: quality,
        context_window: 32_768,
        max_output_tokens: 1024,
        supports_tools: false,
        supports_vision: false,
        supports_reasoning: false,
        price_in_per_mtok: 0.0,
        price_out_per_mtok: 0.0,
        price_cache_read_per_mtok: 0.0,
        price_cache_write_per_mtok: 0.0,
        latency_p50_ms: None,
        latency_p95_ms: None,
        hardware: None,
        enabled: true,
        healthy: true,
        last_health_check: None,
        last_used_at: None,
    }
}

/// Price a model per million input/output tokens
pub fn priced(mut m: ModelRecord, input: f64, output: f64) -> ModelRecord {
    m.price_in_per_mtok = input;
    m.price_out_per_mtok = output;
    m
}

/// Upsert a model with its capability set
pub async fn seed(store: &Store, m: &ModelRecord, capabilities: &[&str]) {
    store.upsert_model(m).await.unwrap();
    store.set_capabilities(&m.id, capabilities).await.unwrap();
}

/// Point the migration-seeded self model at a live endpoint
pub async fn repoint_self_model(store: &Store, endpoint: &str) {
    let mut seeded = store
        .get_model("local/llama3.2:3b")
        .await
        .unwrap()
        .expect("seeded self model");
    seeded.endpoint = endpoint.to_owned();
    store.upsert_model(&seeded).await.unwrap();
}

/// Disable the migration-seeded self model so tests control the fleet
pub async fn disable_self_model(store: &Store) {
    let mut seeded = store
        .get_model("local/llama3.2:3b")
        .await
        .unwrap()
        .expect("seeded self model");
    seeded.enabled = false;
    store.upsert_model(&seeded).await.unwrap();
}
