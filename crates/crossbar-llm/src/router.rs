//! Axum handlers for the OpenAI-compatible surface
//!
//! The completion handler glues the orchestrator to the dispatcher,
//! streams normalized chunks to the client as SSE, and records exactly
//! one request-log row (and ledger update) when the stream closes,
//! attributed to the model that actually served the request.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing;
use crossbar_core::HttpError;
use crossbar_routing::{RequestMeta, Router, RoutingDecision, RoutingError};
use crossbar_store::{BudgetLedger, ModelRecord, RequestLogRow, Store};
use futures_util::StreamExt;
use jiff::Timestamp;
use tokio::sync::mpsc;

use crate::adapter::ChunkStream;
use crate::dispatch::Dispatcher;
use crate::error::GatewayError;
use crate::protocol::openai::{ModelEntry, ModelList};
use crate::types::{ChatCompletion, ChatRequest, Choice, ChoiceMessage, Usage};

/// Accepted values for the `X-Router-Source` header
const SOURCE_WHITELIST: &[&str] = &["heartbeat", "cron", "webhook"];

/// Longest preview stored in the request log
const STORED_PREVIEW_CHARS: usize = 100;

/// Shared state for the completion handlers
#[derive(Clone)]
pub struct GatewayState {
    inner: Arc<GatewayStateInner>,
}

struct GatewayStateInner {
    store: Store,
    ledger: BudgetLedger,
    router: Router,
    dispatcher: Dispatcher,
}

impl GatewayState {
    /// Assemble the handler state
    pub fn new(store: Store, ledger: BudgetLedger, router: Router, dispatcher: Dispatcher) -> Self {
        Self {
            inner: Arc::new(GatewayStateInner {
                store,
                ledger,
                router,
                dispatcher,
            }),
        }
    }

    /// Registry handle, shared with the liveness endpoint
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// Ledger handle, shared with the liveness endpoint
    pub fn ledger(&self) -> &BudgetLedger {
        &self.inner.ledger
    }
}

/// Build the completion routes
pub fn llm_router(state: GatewayState) -> axum::Router {
    axum::Router::new()
        .route("/v1/chat/completions", routing::post(chat_completions))
        .route("/v1/models", routing::get(list_models))
        .with_state(state)
}

/// Handle `POST /v1/chat/completions`
async fn chat_completions(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let request = match ChatRequest::from_value(&body) {
        Ok(request) => request,
        Err(message) => return error_response(&GatewayError::Validation(message)),
    };

    // Untrusted header values collapse to None rather than erroring
    let source = header_tag(&headers, "x-router-source")
        .filter(|s| SOURCE_WHITELIST.contains(&s.as_str()));
    let channel = header_tag(&headers, "x-router-channel").filter(|c| is_valid_channel(c));

    let meta = RequestMeta::extract(&request.messages_as_values(), source, channel);

    let decision = match state.inner.router.route(&meta).await {
        Ok(decision) => decision,
        Err(RoutingError::NoAvailableModel) => {
            return error_response(&GatewayError::NoAvailableModel);
        }
        Err(RoutingError::Store(e)) => return error_response(&GatewayError::Store(e)),
    };

    let started = Instant::now();
    let opened = match state
        .inner
        .dispatcher
        .dispatch(&decision.candidates, &request)
        .await
    {
        Ok(opened) => opened,
        Err(e) => return error_response(&e),
    };

    let log = CompletionLog::new(&state, &decision, &meta, opened.model.clone(), started);

    let mut response = if request.stream {
        sse_response(opened.stream, log)
    } else {
        buffered_response(opened.stream, log).await
    };

    apply_router_headers(response.headers_mut(), &decision);
    response
}

/// Handle `GET /v1/models`
async fn list_models(State(state): State<GatewayState>) -> Response {
    let models = match state.inner.store.list_enabled_models().await {
        Ok(models) => models,
        Err(e) => return error_response(&GatewayError::Store(e)),
    };

    let now = Timestamp::now().as_second().max(0) as u64;
    let data = models
        .into_iter()
        .map(|m| ModelEntry {
            id: m.id,
            object: "model".to_owned(),
            created: now,
            owned_by: m.provider,
        })
        .collect();

    Json(ModelList {
        object: "list".to_owned(),
        data,
    })
    .into_response()
}

/// Everything needed to account for a request exactly once at stream end
struct CompletionLog {
    store: Store,
    ledger: BudgetLedger,
    id: String,
    tier: i64,
    rule_id: Option<i64>,
    classification: Option<String>,
    model: ModelRecord,
    preview: Option<String>,
    started: Instant,
}

impl CompletionLog {
    fn new(
        state: &GatewayState,
        decision: &RoutingDecision,
        meta: &RequestMeta,
        model: ModelRecord,
        started: Instant,
    ) -> Self {
        let preview: String = meta.text_preview.chars().take(STORED_PREVIEW_CHARS).collect();
        Self {
            store: state.inner.store.clone(),
            ledger: state.inner.ledger.clone(),
            id: uuid::Uuid::new_v4().to_string(),
            tier: i64::from(decision.tier.as_number()),
            rule_id: decision.rule_id,
            classification: decision
                .classification
                .as_ref()
                .and_then(|c| serde_json::to_string(c).ok()),
            model,
            preview: if preview.is_empty() { None } else { Some(preview) },
            started,
        }
    }

    /// Write the log row and ledger update; failures are non-fatal
    async fn finish(self, usage: Option<Usage>, success: bool) {
        let (input_tokens, output_tokens) = usage.map_or((0, 0), |u| {
            (u64::from(u.prompt_tokens), u64::from(u.completion_tokens))
        });
        let cost_usd = self.model.cost_usd(input_tokens, output_tokens);

        let row = RequestLogRow {
            id: self.id,
            timestamp: Timestamp::now().as_second(),
            tier: self.tier,
            rule_id: self.rule_id,
            classification: self.classification,
            selected_model: self.model.id.clone(),
            input_tokens: input_tokens as i64,
            output_tokens: output_tokens as i64,
            cost_usd,
            latency_ms: self.started.elapsed().as_millis() as i64,
            success,
            preview: self.preview,
        };

        if let Err(e) = self.store.insert_request_log(&row).await {
            tracing::error!(error = %e, "failed to write request log");
        }
        if let Err(e) = self
            .ledger
            .record_request_cost(&self.model, input_tokens, output_tokens)
            .await
        {
            tracing::error!(error = %e, "failed to record request cost");
        }
    }
}

/// Frames sent from the pump task to the SSE encoder
enum OutFrame {
    Chunk(Box<crate::types::ChatChunk>),
    Error(String),
    Done,
}

/// Stream the backend to the client, accounting when the stream closes
fn sse_response(stream: ChunkStream, log: CompletionLog) -> Response {
    let (tx, rx) = mpsc::channel::<OutFrame>(16);
    tokio::spawn(pump(stream, tx, log));

    let events = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (frame, rx))
    })
    .map(|frame| -> Result<Event, std::convert::Infallible> {
        match frame {
            OutFrame::Chunk(chunk) => Ok(Event::default()
                .data(serde_json::to_string(&chunk).unwrap_or_default())),
            OutFrame::Error(message) => {
                let payload = serde_json::json!({
                    "error": {"message": message, "type": "server_error"}
                });
                Ok(Event::default().data(payload.to_string()))
            }
            OutFrame::Done => Ok(Event::default().data("[DONE]")),
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

/// Drive the backend stream into the client channel
///
/// Ends in one of three ways: upstream completion (forward `[DONE]`),
/// upstream error (forward a single error event), or client disconnect
/// (send fails). Dropping the stream aborts the upstream request, and
/// accounting runs exactly once on every path.
async fn pump(mut stream: ChunkStream, tx: mpsc::Sender<OutFrame>, log: CompletionLog) {
    let mut usage: Option<Usage> = None;
    let mut failed = false;
    let mut completed = false;

    loop {
        match stream.next().await {
            Some(Ok(chunk)) => {
                if let Some(u) = chunk.usage {
                    usage = Some(u);
                }
                if tx.send(OutFrame::Chunk(Box::new(chunk))).await.is_err() {
                    tracing::debug!(model = %log.model.id, "client disconnected mid-stream");
                    break;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(model = %log.model.id, error = %e, "stream failed mid-flight");
                let _ = tx.send(OutFrame::Error(e.to_string())).await;
                failed = true;
                break;
            }
            None => {
                completed = true;
                break;
            }
        }
    }

    if completed {
        let _ = tx.send(OutFrame::Done).await;
    }
    drop(stream);

    log.finish(usage, completed && !failed).await;
}

/// Accumulate the stream into a single completion response
async fn buffered_response(mut stream: ChunkStream, log: CompletionLog) -> Response {
    let mut chunks = Vec::new();
    let mut usage: Option<Usage> = None;
    let mut failed = false;

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                if let Some(u) = chunk.usage {
                    usage = Some(u);
                }
                chunks.push(chunk);
            }
            Err(e) => {
                tracing::warn!(model = %log.model.id, error = %e, "stream failed while buffering");
                failed = true;
                break;
            }
        }
    }

    if chunks.is_empty() {
        log.finish(usage, false).await;
        return error_response(&GatewayError::EmptyBackendResponse);
    }
    if failed {
        log.finish(usage, false).await;
        return json_error(
            StatusCode::BAD_GATEWAY,
            "backend stream failed",
            "server_error",
        );
    }

    let content: String = chunks.iter().filter_map(|c| c.content_delta()).collect();
    let finish_reason = chunks
        .iter()
        .rev()
        .find_map(|c| c.finish_reason().map(ToOwned::to_owned));

    let completion = ChatCompletion {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
        object: "chat.completion".to_owned(),
        created: Timestamp::now().as_second().max(0) as u64,
        model: log.model.id.clone(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_owned(),
                content: Some(content),
            },
            finish_reason,
        }],
        usage,
    };

    log.finish(usage, true).await;
    (StatusCode::OK, Json(completion)).into_response()
}

/// Set the routing diagnostics headers
fn apply_router_headers(headers: &mut HeaderMap, decision: &RoutingDecision) {
    if let Some(first) = decision.candidates.first()
        && let Ok(value) = HeaderValue::from_str(&first.model.id)
    {
        headers.insert(HeaderName::from_static("x-router-model"), value);
    }

    if let Ok(value) = HeaderValue::from_str(&decision.tier.as_number().to_string()) {
        headers.insert(HeaderName::from_static("x-router-tier"), value);
    }

    if let Some(classification) = &decision.classification
        && let Ok(json) = serde_json::to_string(classification)
        && let Ok(value) = HeaderValue::from_str(&json)
    {
        headers.insert(HeaderName::from_static("x-router-classification"), value);
    }
}

/// Read a short header value, dropping anything non-ASCII
fn header_tag(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

/// Channel tags are short identifier-like strings
fn is_valid_channel(channel: &str) -> bool {
    channel.len() <= 32
        && channel
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// OpenAI-shaped error body for a domain error
fn error_response(error: &GatewayError) -> Response {
    json_error(error.status_code(), &error.client_message(), error.error_type())
}

fn json_error(status: StatusCode, message: &str, error_type: &str) -> Response {
    let body = serde_json::json!({
        "error": {"message": message, "type": error_type}
    });
    (status, Json(body)).into_response()
}
