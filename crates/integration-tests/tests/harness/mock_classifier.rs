//! Mock classifier endpoint
//!
//! Returns a fixed classification payload as the assistant message of an
//! OpenAI-shaped chat response, counting invocations so tests can prove
//! Tier 1 short-circuits skip the classifier entirely.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use tokio_util::sync::CancellationToken;

/// Mock classifier serving one canned payload
pub struct MockClassifier {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<ClassifierState>,
}

struct ClassifierState {
    calls: AtomicU32,
    payload: String,
}

impl MockClassifier {
    /// Start with the given assistant message content
    pub async fn start(payload: &str) -> anyhow::Result<Self> {
        let state = Arc::new(ClassifierState {
            calls: AtomicU32::new(0),
            payload: payload.to_owned(),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            addr,
            shutdown,
            state,
        })
    }

    /// Base URL to configure as the classifier endpoint
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// How many classification calls arrived
    pub fn call_count(&self) -> u32 {
        self.state.calls.load(Ordering::Relaxed)
    }
}

impl Drop for MockClassifier {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(State(state): State<Arc<ClassifierState>>) -> impl IntoResponse {
    state.calls.fetch_add(1, Ordering::Relaxed);
    Json(serde_json::json!({
        "id": "chatcmpl-classifier",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "tiny",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": state.payload},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 50, "completion_tokens": 20, "total_tokens": 70}
    }))
}
