//! Collaborator contracts: text generation and reasoning calls.
//!
//! The core never opens a connection itself. Sessions receive a
//! [`TextGenerator`] for role turns and summaries and a [`Reasoner`] for
//! verdicts, both as trait objects, so tests substitute the deterministic
//! mocks defined here.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Author of a message in a chat-completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Input to a single role-turn or summary generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Role instructions, sent as the leading system message.
    pub system_prompt: String,
    /// Projected conversation, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
}

impl GenerationRequest {
    /// Full message list with the system prompt prepended.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        out.push(ChatMessage::system(self.system_prompt.clone()));
        out.extend(self.messages.iter().cloned());
        out
    }
}

/// Reasoner output: the visible answer plus an opaque trace kept for audit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonerReply {
    pub text: String,
    pub trace: Option<String>,
}

/// Terminal failure of a remote call, after the transport's own retries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },

    #[error("model service reported a timeout")]
    ServiceTimeout,

    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl TransportError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request { .. } | Self::ServiceTimeout => true,
            Self::Status { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::Malformed { .. } | Self::Exhausted { .. } => false,
        }
    }
}

/// Produces role turns and summaries.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, TransportError>;
}

/// Produces evaluator judgments.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn evaluate(&self, messages: &[ChatMessage]) -> Result<ReasonerReply, TransportError>;
}

// ── Mocks ───────────────────────────────────────────────────────────

/// Deterministic generator for tests.
///
/// Replies are taken from a script in order; once the script runs out the
/// generator falls back to `"{prefix} {n}"` where `n` counts calls from 1.
pub struct MockGenerator {
    prefix: String,
    script: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    should_fail: bool,
}

impl MockGenerator {
    /// Numbered replies: `"{prefix} 1"`, `"{prefix} 2"`, …
    pub fn numbered(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            should_fail: false,
        }
    }

    /// Scripted replies; `Err` entries surface as transport failures.
    pub fn scripted(prefix: &str, script: Vec<Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::numbered(prefix)
        }
    }

    /// A generator whose every call fails.
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::numbered("mock-generator-fail")
        }
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Copies of every request received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, TransportError> {
        let call = {
            let mut requests = self.requests.lock().map_err(|_| mock_poisoned())?;
            requests.push(request.clone());
            requests.len()
        };
        if self.should_fail {
            return Err(TransportError::Exhausted {
                attempts: 1,
                last_error: "simulated failure".to_string(),
            });
        }
        let scripted = self
            .script
            .lock()
            .map_err(|_| mock_poisoned())?
            .pop_front();
        match scripted {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(TransportError::Request {
                endpoint: "mock".to_string(),
                message,
            }),
            None => Ok(format!("{} {}", self.prefix, call)),
        }
    }
}

/// Deterministic reasoner for tests.
///
/// Replies come from a script in order, then the default reply repeats.
pub struct MockReasoner {
    default_reply: Option<String>,
    script: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockReasoner {
    /// Always answers with an accepting verdict.
    pub fn accepting() -> Self {
        Self::repeating(r#"{"verdict": "yes", "suggestion": "none", "phase": "Set the agenda"}"#)
    }

    /// Always rejects with the given suggestion.
    pub fn rejecting(suggestion: &str) -> Self {
        Self::repeating(&format!(
            r#"{{"verdict": "no", "suggestion": "{}", "phase": "Set the agenda"}}"#,
            suggestion
        ))
    }

    /// Answers `reply` on every call.
    pub fn repeating(reply: &str) -> Self {
        Self {
            default_reply: Some(reply.to_string()),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Scripted replies, then `default_reply` forever.
    pub fn scripted(script: Vec<&str>, default_reply: &str) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(str::to_string).collect()),
            ..Self::repeating(default_reply)
        }
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self {
            default_reply: None,
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Reasoner for MockReasoner {
    async fn evaluate(&self, messages: &[ChatMessage]) -> Result<ReasonerReply, TransportError> {
        self.calls
            .lock()
            .map_err(|_| mock_poisoned())?
            .push(messages.to_vec());
        let scripted = self
            .script
            .lock()
            .map_err(|_| mock_poisoned())?
            .pop_front();
        let text = match (scripted, &self.default_reply) {
            (Some(text), _) => text,
            (None, Some(text)) => text.clone(),
            (None, None) => {
                return Err(TransportError::Exhausted {
                    attempts: 1,
                    last_error: "simulated failure".to_string(),
                })
            }
        };
        Ok(ReasonerReply {
            text,
            trace: Some("mock trace".to_string()),
        })
    }
}

fn mock_poisoned() -> TransportError {
    TransportError::Malformed {
        endpoint: "mock".to_string(),
        message: "mock state poisoned".to_string(),
    }
}
