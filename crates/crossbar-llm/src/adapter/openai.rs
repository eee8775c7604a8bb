//! OpenAI-shaped backend adapter
//!
//! Speaks to anything exposing `/chat/completions` in the OpenAI shape:
//! co-located Ollama, LAN vLLM, or the real OpenAI API.

use async_trait::async_trait;
use crossbar_store::ModelRecord;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use jiff::Timestamp;

use super::{Backend, ChunkStream, SseFrame, frames_to_chunks, resolve_credential};
use crate::error::BackendError;
use crate::protocol::openai::OpenAiChatBody;
use crate::types::{ChatChunk, ChatCompletion, ChatRequest, ChunkChoice, ChunkDelta};

/// Adapter for OpenAI-compatible endpoints
pub struct OpenAiBackend {
    client: reqwest::Client,
}

impl OpenAiBackend {
    /// Create over a shared HTTP client
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn send(
        &self,
        model: &ModelRecord,
        request: &ChatRequest,
    ) -> Result<ChunkStream, BackendError> {
        let url = format!("{}/chat/completions", model.endpoint.trim_end_matches('/'));

        // Streaming is the upstream default; the client's own stream flag
        // only shapes the gateway response
        let body = OpenAiChatBody {
            model: model.upstream_name(),
            messages: &request.messages,
            stream: true,
            max_tokens: Some(
                request
                    .max_tokens
                    .unwrap_or(model.max_output_tokens.max(1) as u32),
            ),
            temperature: request.temperature,
            top_p: request.top_p,
            stop: request.stop.as_deref(),
        };

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = resolve_credential(model) {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(model = %model.id, status, "backend returned error");
            return Err(BackendError::Upstream { status, body });
        }

        if is_event_stream(&response) {
            let frames = response.bytes_stream().eventsource().map(|result| match result {
                Ok(event) => {
                    let data = event.data.trim();
                    if data == "[DONE]" {
                        return SseFrame::Done;
                    }
                    match serde_json::from_str::<ChatChunk>(data) {
                        Ok(chunk) => SseFrame::Chunk(chunk),
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unparseable SSE chunk");
                            SseFrame::Skip
                        }
                    }
                }
                Err(e) => SseFrame::Fail(BackendError::Streaming(e.to_string())),
            });
            Ok(frames_to_chunks(frames))
        } else {
            let completion: ChatCompletion = response
                .json()
                .await
                .map_err(|e| BackendError::Streaming(format!("failed to parse response: {e}")))?;
            Ok(single_chunk(&completion))
        }
    }
}

/// Whether the backend answered with an SSE body
///
/// Some backends ignore the stream flag and answer with plain JSON; the
/// content type is the reliable discriminator.
pub(crate) fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"))
}

/// Synthesize a one-chunk stream from a non-streaming response
fn single_chunk(completion: &ChatCompletion) -> ChunkStream {
    let choice = completion.choices.first();
    let chunk = ChatChunk {
        id: completion.id.clone(),
        object: "chat.completion.chunk".to_owned(),
        created: Timestamp::now().as_second().max(0) as u64,
        model: completion.model.clone(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: Some("assistant".to_owned()),
                content: choice.and_then(|c| c.message.content.clone()),
            },
            finish_reason: choice.and_then(|c| c.finish_reason.clone()),
        }],
        usage: completion.usage,
    };
    Box::pin(futures_util::stream::iter(vec![Ok(chunk)]))
}
