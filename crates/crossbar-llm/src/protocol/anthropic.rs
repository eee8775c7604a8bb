//! Anthropic Messages API wire format

use serde::{Deserialize, Serialize};

/// Outbound Messages request body
#[derive(Debug, Serialize)]
pub struct AnthropicBody {
    /// Published model name
    pub model: String,
    /// Maximum tokens to generate (required by the API)
    pub max_tokens: u32,
    /// Concatenated system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Conversation messages, user/assistant only
    pub messages: Vec<AnthropicMessage>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Whether to stream the response
    pub stream: bool,
}

/// One message on the Anthropic wire
#[derive(Debug, Serialize)]
pub struct AnthropicMessage {
    /// "user" or "assistant"
    pub role: String,
    /// Flattened text content
    pub content: String,
}

/// Non-streaming Messages response
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    /// Response identifier
    pub id: String,
    /// Response content blocks
    pub content: Vec<AnthropicBlock>,
    /// Model that produced the response
    pub model: String,
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// Content block in a response
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicBlock {
    /// Text content
    Text {
        /// The text string
        text: String,
    },
    /// Any block type this gateway does not relay
    #[serde(other)]
    Other,
}

/// Token usage on the Anthropic wire
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AnthropicUsage {
    /// Input tokens
    pub input_tokens: u32,
    /// Output tokens
    pub output_tokens: u32,
}

/// SSE event stream payloads
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    /// Stream started
    MessageStart {
        /// Partial message metadata, unused beyond its presence
        #[serde(default)]
        message: serde_json::Value,
    },
    /// New content block started
    ContentBlockStart {
        /// Block index
        index: u32,
        /// Initial block content
        #[serde(default)]
        content_block: serde_json::Value,
    },
    /// Incremental content within a block
    ContentBlockDelta {
        /// Block index
        index: u32,
        /// Delta payload
        delta: AnthropicDelta,
    },
    /// Content block finished
    ContentBlockStop {
        /// Block index
        index: u32,
    },
    /// Message metadata delta (stop reason, usage)
    MessageDelta {
        /// Stop reason delta
        delta: AnthropicMessageDelta,
        /// Updated usage
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    /// Stream completed
    MessageStop,
    /// Keep-alive
    Ping,
    /// Any event type this gateway does not translate
    #[serde(other)]
    Other,
}

/// Delta payload within a `content_block_delta`
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicDelta {
    /// Incremental text
    TextDelta {
        /// Text fragment
        text: String,
    },
    /// Any delta type this gateway does not translate
    #[serde(other)]
    Other,
}

/// Delta within a `message_delta` event
#[derive(Debug, Deserialize)]
pub struct AnthropicMessageDelta {
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Stop sequence that fired
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

/// Map an Anthropic stop reason to the OpenAI finish reason
pub fn map_stop_reason(stop_reason: Option<&str>) -> &'static str {
    match stop_reason {
        Some("max_tokens") => "length",
        // end_turn, stop_sequence, and anything unknown all read as stop
        _ => "stop",
    }
}
