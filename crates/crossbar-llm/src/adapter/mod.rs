//! Backend adapters
//!
//! Each adapter translates the gateway's canonical request into one wire
//! format and normalizes the backend's reply, streaming or not, into
//! OpenAI-shaped chunks. Adapters are stateless beyond a shared HTTP
//! client; dropping the returned stream aborts the in-flight upstream
//! request.

pub mod anthropic;
pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use crossbar_store::{ModelRecord, WireFormat};
use futures_util::Stream;

use crate::error::BackendError;
use crate::types::{ChatChunk, ChatRequest};

/// Pull-driven stream of normalized chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, BackendError>> + Send>>;

/// A successfully opened backend stream plus the model that serves it
///
/// The model record here is the **actual** serving model; the dispatcher
/// may have walked past earlier candidates to reach it.
pub struct StreamResponse {
    /// The serving model
    pub model: ModelRecord,
    /// Normalized chunk stream
    pub stream: ChunkStream,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("model", &self.model)
            .field("stream", &"<ChunkStream>")
            .finish()
    }
}

/// Trait implemented by each backend wire format
#[async_trait]
pub trait Backend: Send + Sync {
    /// Adapter name for diagnostics
    fn name(&self) -> &'static str;

    /// Open a completion against the model's endpoint
    async fn send(
        &self,
        model: &ModelRecord,
        request: &ChatRequest,
    ) -> Result<ChunkStream, BackendError>;
}

/// The fixed adapter set, selected by a model's wire-format tag
pub struct Adapters {
    openai: openai::OpenAiBackend,
    anthropic: anthropic::AnthropicBackend,
}

impl Adapters {
    /// Build the adapter set over one shared HTTP client
    pub fn new(anthropic_version: String) -> Self {
        let client = reqwest::Client::new();
        Self {
            openai: openai::OpenAiBackend::new(client.clone()),
            anthropic: anthropic::AnthropicBackend::new(client, anthropic_version),
        }
    }

    /// Adapter for a model, defaulting to the OpenAI shape
    pub fn for_model(&self, model: &ModelRecord) -> &dyn Backend {
        match model.wire_format {
            WireFormat::Openai => &self.openai,
            WireFormat::Anthropic => &self.anthropic,
        }
    }
}

/// Resolve a model's credential from its named env var
///
/// Empty values count as absent.
pub(crate) fn resolve_credential(model: &ModelRecord) -> Option<String> {
    model
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .filter(|key| !key.is_empty())
}

/// Intermediate frame while decoding a backend's SSE feed
pub(crate) enum SseFrame {
    /// A parsed chunk to forward
    Chunk(ChatChunk),
    /// An event to drop silently
    Skip,
    /// Terminator; the stream ends before this frame
    Done,
    /// Transport or decode failure to surface
    Fail(BackendError),
}

/// Collapse a frame stream into the public chunk stream
pub(crate) fn frames_to_chunks<S>(frames: S) -> ChunkStream
where
    S: Stream<Item = SseFrame> + Send + 'static,
{
    use futures_util::StreamExt;

    let stream = frames
        .take_while(|frame| futures_util::future::ready(!matches!(frame, SseFrame::Done)))
        .filter_map(|frame| {
            futures_util::future::ready(match frame {
                SseFrame::Chunk(chunk) => Some(Ok(chunk)),
                SseFrame::Fail(error) => Some(Err(error)),
                SseFrame::Skip | SseFrame::Done => None,
            })
        });
    Box::pin(stream)
}
