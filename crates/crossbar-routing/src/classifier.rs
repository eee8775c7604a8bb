//! Tier-2 classification via a small local model
//!
//! The classifier is best-effort by contract: any failure, from a refused
//! connection to malformed output, degrades to the default classification
//! and never propagates an error into the routing pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use url::Url;

/// Default classifier timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Characters of the preview sent to the classifier
const PREVIEW_CAP: usize = 500;

/// Default estimated tokens when the classifier gives none
const DEFAULT_ESTIMATED_TOKENS: u64 = 1000;

/// System prompt forcing JSON-only output
const SYSTEM_PROMPT: &str = "You are a request classifier. Respond with a single JSON object \
and nothing else, using exactly these fields: \
{\"complexity\": \"simple\"|\"medium\"|\"complex\"|\"reasoning\", \
\"task_type\": \"coding\"|\"math\"|\"reasoning\"|\"tool_use\"|\"summarization\"|\"extraction\"|\
\"simple_qa\"|\"conversation\"|\"classification\"|\"analysis\"|\"writing\"|\"multi_step\", \
\"estimated_tokens\": <integer>, \"sensitive\": <boolean>}. \
Mark sensitive=true when the text contains credentials, personal data, or \
confidential material.";

/// Request complexity bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    #[default]
    Medium,
    Complex,
    Reasoning,
}

/// Closed task-type set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Coding,
    Math,
    Reasoning,
    ToolUse,
    Summarization,
    Extraction,
    SimpleQa,
    #[default]
    Conversation,
    Classification,
    Analysis,
    Writing,
    MultiStep,
}

/// Classifier output after whitelist clamping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    /// Complexity bucket
    pub complexity: Complexity,
    /// Task type
    pub task_type: TaskType,
    /// Classifier's own token estimate
    pub estimated_tokens: u64,
    /// Whether the request looks privacy-sensitive
    pub sensitive: bool,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            complexity: Complexity::Medium,
            task_type: TaskType::Conversation,
            estimated_tokens: DEFAULT_ESTIMATED_TOKENS,
            sensitive: false,
        }
    }
}

/// Raw classifier output before clamping; every field may be missing or junk
#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    complexity: Option<String>,
    #[serde(default)]
    task_type: Option<String>,
    #[serde(default)]
    estimated_tokens: Option<serde_json::Value>,
    #[serde(default)]
    sensitive: Option<bool>,
}

/// Subset of the chat-completions response the classifier reads
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for the local classifier endpoint
pub struct ClassifierClient {
    client: reqwest::Client,
    endpoint: Url,
    model: String,
    timeout: Duration,
}

impl ClassifierClient {
    /// Create a client against an OpenAI-shaped local endpoint
    pub fn new(endpoint: Url, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the request timeout
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Classify a text preview, degrading to defaults on any failure
    ///
    /// `model_override` substitutes the policy's router model name for
    /// the configured default when set.
    pub async fn classify(&self, preview: &str, model_override: Option<&str>) -> Classification {
        let capped: String = preview.chars().take(PREVIEW_CAP).collect();
        let model = model_override.unwrap_or(&self.model);

        let base = self.endpoint.as_str().trim_end_matches('/');
        let url = format!("{base}/chat/completions");

        let body = serde_json::json!({
            "model": model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": format!("Classify this request:\n\n{capped}")},
            ],
            "stream": false,
            "temperature": 0,
        });

        let response = match self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "classifier unreachable, using defaults");
                return Classification::default();
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "classifier returned error, using defaults");
            return Classification::default();
        }

        let parsed: ChatResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "classifier response unparseable, using defaults");
                return Classification::default();
            }
        };

        let Some(content) = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|c| !c.trim().is_empty())
        else {
            tracing::warn!("classifier returned empty content, using defaults");
            return Classification::default();
        };

        parse_classification(content)
    }
}

/// Parse raw classifier text into a clamped classification
///
/// Out-of-whitelist fields are replaced individually; a wholly
/// unparseable payload yields the full defaults.
pub fn parse_classification(raw: &str) -> Classification {
    let stripped = strip_fences(raw);

    let Ok(parsed) = serde_json::from_str::<RawClassification>(stripped) else {
        tracing::debug!("classifier output is not JSON, using defaults");
        return Classification::default();
    };

    let complexity = parsed
        .complexity
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();

    let task_type = parsed
        .task_type
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();

    let estimated_tokens = parsed
        .estimated_tokens
        .as_ref()
        .and_then(serde_json::Value::as_u64)
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_ESTIMATED_TOKENS);

    Classification {
        complexity,
        task_type,
        estimated_tokens,
        sensitive: parsed.sensitive.unwrap_or(false),
    }
}

/// Remove optional triple-backtick fencing around the payload
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", etc.) up to the first newline
    let body = rest.find('\n').map_or("", |i| &rest[i + 1..]);
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_output_parses() {
        let c = parse_classification(
            r#"{"complexity":"complex","task_type":"coding","estimated_tokens":2000,"sensitive":false}"#,
        );
        assert_eq!(c.complexity, Complexity::Complex);
        assert_eq!(c.task_type, TaskType::Coding);
        assert_eq!(c.estimated_tokens, 2000);
        assert!(!c.sensitive);
    }

    #[test]
    fn fenced_output_parses() {
        let c = parse_classification(
            "```json\n{\"complexity\":\"simple\",\"task_type\":\"simple_qa\",\"estimated_tokens\":200,\"sensitive\":false}\n```",
        );
        assert_eq!(c.complexity, Complexity::Simple);
        assert_eq!(c.task_type, TaskType::SimpleQa);
    }

    #[test]
    fn unknown_values_clamp_to_defaults() {
        let c = parse_classification(
            r#"{"complexity":"galactic","task_type":"interpretive_dance","estimated_tokens":-5,"sensitive":true}"#,
        );
        assert_eq!(c.complexity, Complexity::Medium);
        assert_eq!(c.task_type, TaskType::Conversation);
        assert_eq!(c.estimated_tokens, 1000);
        assert!(c.sensitive);
    }

    #[test]
    fn garbage_yields_full_defaults() {
        assert_eq!(parse_classification("I think this is a coding task."), Classification::default());
        assert_eq!(parse_classification(""), Classification::default());
    }

    #[test]
    fn missing_fields_default_individually() {
        let c = parse_classification(r#"{"task_type":"math"}"#);
        assert_eq!(c.complexity, Complexity::Medium);
        assert_eq!(c.task_type, TaskType::Math);
        assert_eq!(c.estimated_tokens, 1000);
        assert!(!c.sensitive);
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_defaults() {
        // Nothing listens on this port
        let client = ClassifierClient::new(
            Url::parse("http://127.0.0.1:1/v1").unwrap(),
            "tiny".to_owned(),
        )
        .with_timeout(Duration::from_millis(200));

        let c = client.classify("hello", None).await;
        assert_eq!(c, Classification::default());
    }
}
