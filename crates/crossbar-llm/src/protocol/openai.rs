//! OpenAI chat-completions wire format
//!
//! Inbound streaming chunks already match the normalized chunk shape, so
//! only the outbound body and the list-models surface live here.

use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// Outbound chat-completions request body
///
/// Messages pass through untouched; only the listed generation knobs are
/// forwarded.
#[derive(Debug, Serialize)]
pub struct OpenAiChatBody<'a> {
    /// Model name as the backend knows it
    pub model: &'a str,
    /// Conversation messages, relayed verbatim
    pub messages: &'a [ChatMessage],
    /// Whether the backend should stream
    pub stream: bool,
    /// Output token cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<&'a [String]>,
}

/// Models list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    /// Object type (always "list")
    pub object: String,
    /// Model entries
    pub data: Vec<ModelEntry>,
}

/// One model in the list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Model identifier
    pub id: String,
    /// Object type (always "model")
    pub object: String,
    /// Creation timestamp (unix seconds)
    #[serde(default)]
    pub created: u64,
    /// Owning provider
    #[serde(default)]
    pub owned_by: String,
}
