//! Anthropic Messages backend adapter
//!
//! Translates the canonical request into the Messages shape (system
//! prompt hoisted to a top-level field, roles coerced to user/assistant)
//! and normalizes both streaming and non-streaming replies to OpenAI
//! chunks.

use async_trait::async_trait;
use crossbar_store::ModelRecord;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use jiff::Timestamp;

use super::{Backend, ChunkStream, SseFrame, frames_to_chunks, resolve_credential};
use crate::error::BackendError;
use crate::protocol::anthropic::{
    AnthropicBlock, AnthropicBody, AnthropicDelta, AnthropicMessage, AnthropicResponse,
    AnthropicStreamEvent, AnthropicUsage, map_stop_reason,
};
use crate::types::{ChatChunk, ChatRequest, ChunkChoice, ChunkDelta, Role, Usage};

/// Internal id to published Anthropic model name; unmapped ids fall back
/// to their last path segment
const MODEL_MAP: &[(&str, &str)] = &[
    ("anthropic/claude-opus", "claude-opus-4-1"),
    ("anthropic/claude-sonnet", "claude-sonnet-4-5"),
    ("anthropic/claude-haiku", "claude-haiku-4-5"),
];

/// Adapter for the Anthropic Messages API
pub struct AnthropicBackend {
    client: reqwest::Client,
    version: String,
}

impl AnthropicBackend {
    /// Create over a shared HTTP client with a configured API version
    pub const fn new(client: reqwest::Client, version: String) -> Self {
        Self { client, version }
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn send(
        &self,
        model: &ModelRecord,
        request: &ChatRequest,
    ) -> Result<ChunkStream, BackendError> {
        // Anthropic never serves anonymous traffic; fail before the wire
        let Some(key) = resolve_credential(model) else {
            return Err(BackendError::MissingCredential {
                model: model.id.clone(),
            });
        };

        let url = format!("{}/messages", model.endpoint.trim_end_matches('/'));
        let body = build_body(model, request);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", key)
            .header("anthropic-version", &self.version)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(model = %model.id, status, "backend returned error");
            return Err(BackendError::Upstream { status, body });
        }

        if super::openai::is_event_stream(&response) {
            let chunk_id = format!("chatcmpl-{}", uuid::Uuid::new_v4().simple());
            let model_name = model.id.clone();
            let created = now_unix();

            let frames = response.bytes_stream().eventsource().map(move |result| {
                match result {
                    Ok(event) => {
                        let data = event.data.trim();
                        if data.is_empty() {
                            return SseFrame::Skip;
                        }
                        match serde_json::from_str::<AnthropicStreamEvent>(data) {
                            Ok(stream_event) => {
                                translate_event(&stream_event, &chunk_id, &model_name, created)
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "skipping unparseable Anthropic SSE event");
                                SseFrame::Skip
                            }
                        }
                    }
                    Err(e) => SseFrame::Fail(BackendError::Streaming(e.to_string())),
                }
            });
            Ok(frames_to_chunks(frames))
        } else {
            let wire: AnthropicResponse = response
                .json()
                .await
                .map_err(|e| BackendError::Streaming(format!("failed to parse response: {e}")))?;
            Ok(single_chunk(&wire, &model.id))
        }
    }
}

/// Translate the canonical request to the Messages shape
fn build_body(model: &ModelRecord, request: &ChatRequest) -> AnthropicBody {
    let mut system_parts = Vec::new();
    let mut messages = Vec::new();

    for msg in &request.messages {
        match msg.role {
            Role::System => system_parts.push(msg.content.flattened_text()),
            Role::Assistant => messages.push(AnthropicMessage {
                role: "assistant".to_owned(),
                content: msg.content.flattened_text(),
            }),
            Role::User => messages.push(AnthropicMessage {
                role: "user".to_owned(),
                content: msg.content.flattened_text(),
            }),
        }
    }

    AnthropicBody {
        model: published_name(model).to_owned(),
        max_tokens: request
            .max_tokens
            .unwrap_or(model.max_output_tokens.max(1) as u32),
        system: if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n"))
        },
        messages,
        temperature: request.temperature,
        top_p: request.top_p,
        stop_sequences: request.stop.clone(),
        stream: true,
    }
}

/// Published model name for the internal id
fn published_name(model: &ModelRecord) -> &str {
    MODEL_MAP
        .iter()
        .find(|(id, _)| *id == model.id)
        .map_or_else(|| model.upstream_name(), |(_, name)| *name)
}

/// Translate one Anthropic stream event into a frame
fn translate_event(
    event: &AnthropicStreamEvent,
    chunk_id: &str,
    model: &str,
    created: u64,
) -> SseFrame {
    let base = |delta: ChunkDelta, finish_reason: Option<String>, usage: Option<Usage>| ChatChunk {
        id: chunk_id.to_owned(),
        object: "chat.completion.chunk".to_owned(),
        created,
        model: model.to_owned(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
        usage,
    };

    match event {
        AnthropicStreamEvent::MessageStart { .. } => SseFrame::Chunk(base(
            ChunkDelta {
                role: Some("assistant".to_owned()),
                content: None,
            },
            None,
            None,
        )),

        AnthropicStreamEvent::ContentBlockDelta { delta, .. } => match delta {
            AnthropicDelta::TextDelta { text } if !text.is_empty() => SseFrame::Chunk(base(
                ChunkDelta {
                    role: None,
                    content: Some(text.clone()),
                },
                None,
                None,
            )),
            _ => SseFrame::Skip,
        },

        AnthropicStreamEvent::MessageDelta { delta, usage } => SseFrame::Chunk(base(
            ChunkDelta::default(),
            Some(map_stop_reason(delta.stop_reason.as_deref()).to_owned()),
            usage.as_ref().map(to_usage),
        )),

        AnthropicStreamEvent::MessageStop => SseFrame::Done,

        AnthropicStreamEvent::ContentBlockStart { .. }
        | AnthropicStreamEvent::ContentBlockStop { .. }
        | AnthropicStreamEvent::Ping
        | AnthropicStreamEvent::Other => SseFrame::Skip,
    }
}

/// Synthesize a one-chunk stream from a non-streaming response
fn single_chunk(wire: &AnthropicResponse, model_id: &str) -> ChunkStream {
    let text: String = wire
        .content
        .iter()
        .filter_map(|block| match block {
            AnthropicBlock::Text { text } => Some(text.as_str()),
            AnthropicBlock::Other => None,
        })
        .collect();

    let chunk = ChatChunk {
        id: wire.id.clone(),
        object: "chat.completion.chunk".to_owned(),
        created: now_unix(),
        model: model_id.to_owned(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: Some("assistant".to_owned()),
                content: Some(text),
            },
            finish_reason: Some(map_stop_reason(wire.stop_reason.as_deref()).to_owned()),
        }],
        usage: wire.usage.as_ref().map(to_usage),
    };
    Box::pin(futures_util::stream::iter(vec![Ok(chunk)]))
}

const fn to_usage(usage: &AnthropicUsage) -> Usage {
    Usage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.input_tokens + usage.output_tokens,
    }
}

fn now_unix() -> u64 {
    Timestamp::now().as_second().max(0) as u64
}
