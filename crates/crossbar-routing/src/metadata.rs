//! Request metadata extraction
//!
//! Routing never sees the full typed request; it works from a small
//! metadata view derived once per request.

/// Floor for the character-based token estimate
const MIN_ESTIMATED_TOKENS: i64 = 100;

/// Metadata the routing tiers match against
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Content of the last user message; empty when none exists or the
    /// content is not a plain string
    pub text_preview: String,
    /// `max(100, ceil(total_content_chars / 4))`
    pub estimated_tokens: i64,
    /// Whether any message carries structured (non-string) content
    pub has_media: bool,
    /// Whitelisted source tag from the request
    pub source: Option<String>,
    /// Whitelisted channel tag from the request
    pub channel: Option<String>,
}

impl RequestMeta {
    /// Extract metadata from OpenAI-shaped messages
    pub fn extract(
        messages: &[serde_json::Value],
        source: Option<String>,
        channel: Option<String>,
    ) -> Self {
        let mut total_chars = 0usize;
        let mut has_media = false;

        for msg in messages {
            match msg.get("content") {
                Some(serde_json::Value::String(s)) => total_chars += s.chars().count(),
                Some(serde_json::Value::Null) | None => {}
                Some(_) => has_media = true,
            }
        }

        let text_preview = messages
            .iter()
            .rev()
            .find(|m| m.get("role").and_then(|r| r.as_str()) == Some("user"))
            .and_then(|m| m.get("content").and_then(|c| c.as_str()))
            .unwrap_or("")
            .to_owned();

        let estimated_tokens = (total_chars.div_ceil(4) as i64).max(MIN_ESTIMATED_TOKENS);

        Self {
            text_preview,
            estimated_tokens,
            has_media,
            source,
            channel,
        }
    }
}
