//! Oracle transport: the [`LlmClient`] seam and its Anthropic Messages API
//! implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The request never produced an HTTP response.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The provider answered with a non-2xx status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The response envelope could not be decoded.
    #[error("JSON error: {0}")]
    Json(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Not configured")]
    NotConfigured,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One single-turn prompt for the oracle.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    /// Falls back to the client's model when unset.
    pub model: Option<String>,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            model: None,
            max_tokens: 256,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Concatenated text blocks of the reply.
    pub text: String,
    pub usage: LlmUsage,
    /// Model that actually answered.
    pub model: String,
}

/// The single capability the matching engine needs from an oracle:
/// send a prompt, get text back.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Short provider tag used in logs ("anthropic", "mock").
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Talks to `POST {api_base}/v1/messages`.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
    timeout: Option<Duration>,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            api_base: ANTHROPIC_API_BASE.to_string(),
            timeout: None,
        }
    }

    /// Point the client at a proxy or a local stand-in. Trailing slashes are dropped.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        let base: String = api_base.into();
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Bound every request; an expired request is reported as [`LlmError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        match reqwest::Client::builder().timeout(timeout).build() {
            Ok(http) => self.http = http,
            Err(e) => tracing::warn!(error = %e, "Could not build timed HTTP client, keeping default"),
        }
        self.timeout = Some(timeout);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.api_base)
    }

    fn transport_error(&self, err: reqwest::Error) -> LlmError {
        match self.timeout {
            Some(limit) if err.is_timeout() => LlmError::Timeout(limit),
            _ => LlmError::Http(err.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [UserTurn<'a>; 1],
}

#[derive(Debug, Serialize)]
struct UserTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    #[serde(default)]
    content: Vec<ReplyBlock>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: LlmUsage,
}

#[derive(Debug, Deserialize)]
struct ReplyBlock {
    /// Absent `type` is read as a text block.
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: String,
}

impl MessagesReply {
    fn joined_text(self) -> (String, Option<String>, LlmUsage) {
        let text = self
            .content
            .into_iter()
            .filter(|block| block.kind.as_deref().map_or(true, |k| k == "text"))
            .map(|block| block.text)
            .collect();
        (text, self.model, self.usage)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Pull a human message out of a failed response body.
fn failure_message(status: reqwest::StatusCode, body: String) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        return envelope.error.message;
    }
    if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown").to_string()
    } else {
        body
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = MessagesBody {
            model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: [UserTurn {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: failure_message(status, raw),
            });
        }

        let reply: MessagesReply = response
            .json()
            .await
            .map_err(|e| LlmError::Json(e.to_string()))?;
        let (text, answered_by, usage) = reply.joined_text();

        Ok(CompletionResponse {
            text,
            usage,
            model: answered_by.unwrap_or_else(|| model.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_and_overrides() {
        let plain = CompletionRequest::new("Is asthma a lung disease?");
        assert_eq!(plain.max_tokens, 256);
        assert!(plain.system.is_none());
        assert!(plain.model.is_none());

        let tuned = plain
            .with_system("Answer in JSON")
            .with_model("claude-3-5-sonnet")
            .with_max_tokens(64);
        assert_eq!(tuned.system.as_deref(), Some("Answer in JSON"));
        assert_eq!(tuned.model.as_deref(), Some("claude-3-5-sonnet"));
        assert_eq!(tuned.max_tokens, 64);
    }

    #[test]
    fn test_api_base_trailing_slash_is_dropped() {
        let client = AnthropicClient::new("sk-test", "claude-3-haiku-20240307")
            .with_api_base("http://localhost:9999//");
        assert_eq!(client.endpoint(), "http://localhost:9999/v1/messages");
        assert_eq!(client.provider(), "anthropic");
        assert_eq!(client.model(), "claude-3-haiku-20240307");
    }

    #[test]
    fn test_body_skips_missing_system_prompt() {
        let body = MessagesBody {
            model: "claude-3-haiku-20240307",
            max_tokens: 128,
            system: None,
            messages: [UserTurn {
                role: "user",
                content: "diabetes vs type 2 diabetes",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 128);
    }

    #[test]
    fn test_reply_keeps_only_text_blocks() {
        let raw = r#"{
            "content": [
                {"type": "text", "text": "{\"match\": "},
                {"type": "tool_use", "text": "ignored"},
                {"text": "true}"}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 3}
        }"#;
        let reply: MessagesReply = serde_json::from_str(raw).unwrap();
        let (text, model, usage) = reply.joined_text();
        assert_eq!(text, r#"{"match": true}"#);
        assert!(model.is_none());
        assert_eq!(usage.output_tokens, 3);
    }

    #[test]
    fn test_failure_message_sources() {
        let status = reqwest::StatusCode::TOO_MANY_REQUESTS;
        let envelope = r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#;
        assert_eq!(failure_message(status, envelope.to_string()), "slow down");
        assert_eq!(failure_message(status, "plain text".to_string()), "plain text");
        assert_eq!(failure_message(status, String::new()), "Too Many Requests");
    }

    #[test]
    fn test_api_error_display() {
        let err = LlmError::Api {
            status: 529,
            message: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 529 - overloaded");
    }
}
