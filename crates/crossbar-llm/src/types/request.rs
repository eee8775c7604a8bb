//! Inbound chat request with explicit validation
//!
//! The body arrives as dynamic JSON and is validated field by field so
//! every rejection carries a precise message rather than a serde trace.

use serde::Serialize;

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// End-user message
    User,
    /// Assistant response
    Assistant,
}

/// Message content: plain text, null, or structured parts
///
/// Structured parts are relayed untouched to OpenAI-shaped backends and
/// flattened to text elsewhere; their presence drives `has_media`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain string content
    Text(String),
    /// Explicit null content
    Null,
    /// Array of structured content parts
    Parts(Vec<serde_json::Value>),
}

impl MessageContent {
    /// Text view of the content; empty for null or structured parts
    pub fn as_text(&self) -> &str {
        match self {
            Self::Text(s) => s,
            Self::Null | Self::Parts(_) => "",
        }
    }

    /// Flatten to plain text, joining the `text` fields of structured parts
    pub fn flattened_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Null => String::new(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// One validated conversation message
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Author role
    pub role: Role,
    /// Message content
    pub content: MessageContent,
}

/// A validated chat-completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Requested model, usually "auto"
    pub model: Option<String>,
    /// Conversation messages, at least one
    pub messages: Vec<ChatMessage>,
    /// Whether to stream; defaults to true
    pub stream: bool,
    /// Output token cap override
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    pub top_p: Option<f64>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
}

impl ChatRequest {
    /// Validate a raw JSON body into a request
    ///
    /// # Errors
    ///
    /// Returns a human-readable message for the first violated
    /// constraint; callers wrap it in a 400.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, String> {
        let Some(body) = value.as_object() else {
            return Err("request body must be a JSON object".to_owned());
        };

        let Some(raw_messages) = body.get("messages") else {
            return Err("`messages` is required".to_owned());
        };
        let Some(raw_messages) = raw_messages.as_array() else {
            return Err("`messages` must be an array".to_owned());
        };
        if raw_messages.is_empty() {
            return Err("`messages` must not be empty".to_owned());
        }

        let mut messages = Vec::with_capacity(raw_messages.len());
        for (i, raw) in raw_messages.iter().enumerate() {
            messages.push(parse_message(i, raw)?);
        }

        let model = match body.get("model") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(_) => return Err("`model` must be a string".to_owned()),
        };

        let stream = match body.get("stream") {
            None | Some(serde_json::Value::Null) => true,
            Some(serde_json::Value::Bool(b)) => *b,
            Some(_) => return Err("`stream` must be a boolean".to_owned()),
        };

        let max_tokens = match body.get("max_tokens") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => match v.as_u64() {
                Some(n) if n >= 1 && n <= u64::from(u32::MAX) => Some(n as u32),
                _ => return Err("`max_tokens` must be an integer >= 1".to_owned()),
            },
        };

        let temperature = parse_bounded_float(body, "temperature", 0.0, 2.0)?;
        let top_p = parse_bounded_float(body, "top_p", 0.0, 1.0)?;

        let stop = match body.get("stop") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(vec![s.clone()]),
            Some(serde_json::Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(s) => out.push(s.to_owned()),
                        None => return Err("`stop` entries must be strings".to_owned()),
                    }
                }
                Some(out)
            }
            Some(_) => return Err("`stop` must be a string or array of strings".to_owned()),
        };

        Ok(Self {
            model,
            messages,
            stream,
            max_tokens,
            temperature,
            top_p,
            stop,
        })
    }

    /// Messages as JSON values, for metadata extraction
    pub fn messages_as_values(&self) -> Vec<serde_json::Value> {
        self.messages
            .iter()
            .map(|m| serde_json::to_value(m).unwrap_or_default())
            .collect()
    }
}

fn parse_message(index: usize, raw: &serde_json::Value) -> Result<ChatMessage, String> {
    let Some(obj) = raw.as_object() else {
        return Err(format!("messages[{index}] must be an object"));
    };

    let role = match obj.get("role").and_then(|r| r.as_str()) {
        Some("system") => Role::System,
        Some("user") => Role::User,
        Some("assistant") => Role::Assistant,
        Some(other) => return Err(format!("messages[{index}] has invalid role `{other}`")),
        None => return Err(format!("messages[{index}] is missing `role`")),
    };

    let content = match obj.get("content") {
        None | Some(serde_json::Value::Null) => MessageContent::Null,
        Some(serde_json::Value::String(s)) => MessageContent::Text(s.clone()),
        Some(serde_json::Value::Array(parts)) => MessageContent::Parts(parts.clone()),
        Some(_) => {
            return Err(format!(
                "messages[{index}] content must be a string, null, or array of parts"
            ));
        }
    };

    Ok(ChatMessage { role, content })
}

fn parse_bounded_float(
    body: &serde_json::Map<String, serde_json::Value>,
    field: &str,
    min: f64,
    max: f64,
) -> Result<Option<f64>, String> {
    match body.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => match v.as_f64() {
            Some(f) if (min..=max).contains(&f) => Ok(Some(f)),
            _ => Err(format!("`{field}` must be a number in [{min}, {max}]")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_body() -> serde_json::Value {
        serde_json::json!({
            "model": "auto",
            "messages": [{"role": "user", "content": "hello"}]
        })
    }

    #[test]
    fn minimal_request_validates() {
        let req = ChatRequest::from_value(&valid_body()).unwrap();
        assert_eq!(req.messages.len(), 1);
        assert!(req.stream);
        assert_eq!(req.model.as_deref(), Some("auto"));
    }

    #[test]
    fn missing_messages_rejected() {
        let err = ChatRequest::from_value(&serde_json::json!({"model": "auto"})).unwrap_err();
        assert!(err.contains("messages"));
    }

    #[test]
    fn empty_messages_rejected() {
        let err =
            ChatRequest::from_value(&serde_json::json!({"messages": []})).unwrap_err();
        assert!(err.contains("empty"));
    }

    #[test]
    fn invalid_role_rejected() {
        let body = serde_json::json!({
            "messages": [{"role": "tool", "content": "x"}]
        });
        assert!(ChatRequest::from_value(&body).is_err());
    }

    #[test]
    fn numeric_content_rejected() {
        let body = serde_json::json!({
            "messages": [{"role": "user", "content": 42}]
        });
        assert!(ChatRequest::from_value(&body).is_err());
    }

    #[test]
    fn null_content_accepted() {
        let body = serde_json::json!({
            "messages": [{"role": "assistant", "content": null}]
        });
        assert!(ChatRequest::from_value(&body).is_ok());
    }

    #[test]
    fn structured_content_accepted() {
        let body = serde_json::json!({
            "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}]
        });
        let req = ChatRequest::from_value(&body).unwrap();
        assert!(matches!(req.messages[0].content, MessageContent::Parts(_)));
    }

    #[test]
    fn out_of_range_overrides_rejected() {
        for (field, value) in [
            ("max_tokens", serde_json::json!(0)),
            ("temperature", serde_json::json!(2.5)),
            ("top_p", serde_json::json!(-0.1)),
        ] {
            let mut body = valid_body();
            body[field] = value;
            assert!(ChatRequest::from_value(&body).is_err(), "{field} should reject");
        }
    }

    #[test]
    fn stop_accepts_string_and_array() {
        let mut body = valid_body();
        body["stop"] = serde_json::json!("END");
        assert_eq!(
            ChatRequest::from_value(&body).unwrap().stop,
            Some(vec!["END".to_owned()])
        );

        body["stop"] = serde_json::json!(["a", "b"]);
        assert_eq!(
            ChatRequest::from_value(&body).unwrap().stop.unwrap().len(),
            2
        );
    }

    #[test]
    fn stream_false_respected() {
        let mut body = valid_body();
        body["stream"] = serde_json::json!(false);
        assert!(!ChatRequest::from_value(&body).unwrap().stream);
    }
}
