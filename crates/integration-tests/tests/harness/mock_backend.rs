//! Mock OpenAI-shaped backend for integration tests
//!
//! Answers `/chat/completions` with a canned SSE stream (the gateway
//! always streams upstream) and `/models` for health probes. Failure
//! modes cover the dispatcher's whole classification table.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router, routing};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Mock backend that returns predictable responses
pub struct MockBackend {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    completion_count: AtomicU32,
    /// Requests to fail before succeeding (0 = never fail)
    fail_count: AtomicU32,
    /// Status used while failing
    fail_status: u16,
    /// Stream body content
    response_content: String,
    /// When set, the SSE body carries zero chunks
    empty_stream: bool,
}

impl MockBackend {
    /// Start a healthy mock
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(0, 500, "Hello from mock backend", false).await
    }

    /// Start a mock with custom response content
    pub async fn start_with_response(content: &str) -> anyhow::Result<Self> {
        Self::start_inner(0, 500, content, false).await
    }

    /// Start a mock failing the first `n` completions with `status`
    pub async fn start_failing(n: u32, status: u16) -> anyhow::Result<Self> {
        Self::start_inner(n, status, "Hello from mock backend", false).await
    }

    /// Start a mock whose stream ends before any chunk
    pub async fn start_empty_stream() -> anyhow::Result<Self> {
        Self::start_inner(0, 500, "", true).await
    }

    async fn start_inner(
        fail_count: u32,
        fail_status: u16,
        content: &str,
        empty_stream: bool,
    ) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            completion_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(fail_count),
            fail_status,
            response_content: content.to_owned(),
            empty_stream,
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_completions))
            .route("/v1/models", routing::get(handle_models))
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

    /// Base URL to store as a model endpoint
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Completion requests received so far
    pub fn completion_count(&self) -> u32 {
        self.state.completion_count.load(Ordering::Relaxed)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Serialize)]
struct StreamChunk {
    id: String,
    object: String,
    created: u64,
    model: String,
    choices: Vec<StreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
}

#[derive(Serialize)]
struct StreamChoice {
    index: u32,
    delta: StreamDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    finish_reason: Option<String>,
}

#[derive(Serialize)]
struct StreamDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Serialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

async fn handle_completions(
    State(state): State<Arc<MockState>>,
    Json(req): Json<serde_json::Value>,
) -> impl IntoResponse {
    state.completion_count.fetch_add(1, Ordering::Relaxed);

    let remaining = state.fail_count.load(Ordering::Relaxed);
    if remaining > 0 {
        state.fail_count.fetch_sub(1, Ordering::Relaxed);
        return (
            StatusCode::from_u16(state.fail_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(serde_json::json!({
                "error": {"message": "mock backend intentional failure", "type": "server_error"}
            })),
        )
            .into_response();
    }

    let model = req
        .get("model")
        .and_then(|m| m.as_str())
        .unwrap_or("mock-model")
        .to_owned();

    let mut body = String::new();
    if !state.empty_stream {
        push_chunk(&mut body, &model, Some("assistant"), Some(""), None, None);
        for word in state.response_content.split_whitespace() {
            push_chunk(&mut body, &model, None, Some(&format!("{word} ")), None, None);
        }
        push_chunk(&mut body, &model, None, None, Some("stop"), None);
        push_chunk(
            &mut body,
            &model,
            None,
            None,
            None,
            Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        );
    }
    body.push_str("data: [DONE]\n\n");

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
        body,
    )
        .into_response()
}

fn push_chunk(
    body: &mut String,
    model: &str,
    role: Option<&str>,
    content: Option<&str>,
    finish_reason: Option<&str>,
    usage: Option<Usage>,
) {
    let has_usage = usage.is_some();
    let chunk = StreamChunk {
        id: "chatcmpl-mock".to_owned(),
        object: "chat.completion.chunk".to_owned(),
        created: 1_700_000_000,
        model: model.to_owned(),
        choices: if has_usage {
            Vec::new()
        } else {
            vec![StreamChoice {
                index: 0,
                delta: StreamDelta {
                    role: role.map(ToOwned::to_owned),
                    content: content.map(ToOwned::to_owned),
                },
                finish_reason: finish_reason.map(ToOwned::to_owned),
            }]
        },
        usage,
    };
    body.push_str(&format!(
        "data: {}\n\n",
        serde_json::to_string(&chunk).unwrap()
    ));
}

async fn handle_models(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    let _ = &state;
    Json(serde_json::json!({
        "object": "list",
        "data": [{"id": "mock-model", "object": "model", "created": 1_700_000_000, "owned_by": "mock"}]
    }))
}
