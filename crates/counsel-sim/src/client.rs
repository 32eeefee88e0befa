//! OpenAI-compatible chat-completions client.
//!
//! One client serves one backend. It implements both [`TextGenerator`] and
//! [`Reasoner`]; which one a role gets is decided by the backend registry.
//! Reasoning backends return `reasoning_content` next to the answer, which
//! is kept as the verdict's trace.

use std::time::Duration;

use async_trait::async_trait;
use dialogue::transport::{GenerationRequest, ReasonerReply};
use dialogue::{ChatMessage, Reasoner, TextGenerator, TransportError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::BackendSpec;
use crate::retry::RetryPolicy;

/// Reply some hosted reasoning models send instead of an HTTP error when overloaded.
pub const SERVICE_TIMEOUT_SENTINEL: &str = "Model service timeout. Please try again later.";

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

pub struct ChatClient {
    name: String,
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    max_tokens: Option<u32>,
    retry: RetryPolicy,
}

impl ChatClient {
    pub fn new(spec: &BackendSpec, retry: RetryPolicy) -> Result<Self, TransportError> {
        let endpoint = completions_url(&spec.base_url);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(spec.timeout_secs))
            .build()
            .map_err(|e| TransportError::Request {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            name: spec.name.clone(),
            http,
            endpoint,
            model: spec.model.clone(),
            api_key: spec.resolve_api_key(),
            max_tokens: spec.max_tokens,
            retry,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// One completion, retried per the policy.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
    ) -> Result<ReasonerReply, TransportError> {
        self.retry
            .run(&self.name, || self.complete_once(messages, temperature))
            .await
    }

    async fn complete_once(
        &self,
        messages: &[ChatMessage],
        temperature: Option<f32>,
    ) -> Result<ReasonerReply, TransportError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens: self.max_tokens,
        };
        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| TransportError::Request {
            endpoint: self.endpoint.clone(),
            message: e.to_string(),
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| TransportError::Request {
            endpoint: self.endpoint.clone(),
            message: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body: truncate(&text, 500),
            });
        }

        let reply = parse_completion(&self.endpoint, &text)?;
        debug!(
            backend = %self.name,
            chars = reply.text.len(),
            trace = reply.trace.is_some(),
            "Completion received"
        );
        Ok(reply)
    }
}

#[async_trait]
impl TextGenerator for ChatClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, TransportError> {
        let messages = request.to_messages();
        let reply = self.complete(&messages, Some(request.temperature)).await?;
        Ok(reply.text)
    }
}

#[async_trait]
impl Reasoner for ChatClient {
    async fn evaluate(&self, messages: &[ChatMessage]) -> Result<ReasonerReply, TransportError> {
        self.complete(messages, None).await
    }
}

/// `<base>/chat/completions`, tolerating a trailing slash or a full URL.
pub fn completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

/// Extract answer and trace from a chat-completions body.
pub fn parse_completion(endpoint: &str, body: &str) -> Result<ReasonerReply, TransportError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| TransportError::Malformed {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;
    let message = parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| TransportError::Malformed {
            endpoint: endpoint.to_string(),
            message: "response has no choices".to_string(),
        })?;

    let text = message.content.unwrap_or_default();
    if text.trim() == SERVICE_TIMEOUT_SENTINEL {
        return Err(TransportError::ServiceTimeout);
    }
    let trace = message.reasoning_content.filter(|t| !t.trim().is_empty());
    Ok(ReasonerReply { text, trace })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completions_url() {
        assert_eq!(
            completions_url("http://localhost:8000/v1"),
            "http://localhost:8000/v1/chat/completions"
        );
        assert_eq!(
            completions_url("http://localhost:8000/v1/"),
            "http://localhost:8000/v1/chat/completions"
        );
        assert_eq!(
            completions_url("https://api.example.com/v1/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_parse_answer_and_trace() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"verdict\": \"yes\"}","reasoning_content":"The reply is warm."}}]}"#;
        let reply = parse_completion("e", body).unwrap();
        assert_eq!(reply.text, r#"{"verdict": "yes"}"#);
        assert_eq!(reply.trace.as_deref(), Some("The reply is warm."));
    }

    #[test]
    fn test_parse_plain_chat_has_no_trace() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Hello there."}}]}"#;
        let reply = parse_completion("e", body).unwrap();
        assert_eq!(reply.text, "Hello there.");
        assert!(reply.trace.is_none());
    }

    #[test]
    fn test_sentinel_is_service_timeout() {
        let body = format!(
            r#"{{"choices":[{{"message":{{"content":"{}"}}}}]}}"#,
            SERVICE_TIMEOUT_SENTINEL
        );
        assert_eq!(parse_completion("e", &body), Err(TransportError::ServiceTimeout));
        assert!(TransportError::ServiceTimeout.is_retryable());
    }

    #[test]
    fn test_malformed_bodies() {
        assert!(matches!(
            parse_completion("e", "not json"),
            Err(TransportError::Malformed { .. })
        ));
        assert!(matches!(
            parse_completion("e", r#"{"choices":[]}"#),
            Err(TransportError::Malformed { .. })
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![ChatMessage::system("be kind"), ChatMessage::user("hi")];
        let body = CompletionRequest {
            model: "qwen-turbo",
            messages: &messages,
            temperature: Some(0.8),
            max_tokens: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "qwen-turbo");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_truncate_long_bodies() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
