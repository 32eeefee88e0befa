//! Backend registry: which endpoint serves which role.
//!
//! Backends carry an explicit kind, and each kind declares the
//! capabilities it offers. Role bindings are checked against those
//! capabilities once at startup; nothing is inferred from model names.
//!
//! | Kind        | Capabilities              |
//! |-------------|---------------------------|
//! | `chat`      | conversation, summary     |
//! | `reasoning` | reasoning                 |

use std::collections::HashMap;
use std::sync::Arc;

use dialogue::{Reasoner, SessionServices, TextGenerator};
use serde::{Deserialize, Serialize};

use crate::client::ChatClient;
use crate::retry::RetryPolicy;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// What a role needs from its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Client and counselor turns.
    Conversation,
    /// Evaluator verdicts with a reasoning trace.
    Reasoning,
    /// Running summaries.
    Summary,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conversation => write!(f, "conversation"),
            Self::Reasoning => write!(f, "reasoning"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Plain OpenAI-compatible chat completions.
    Chat,
    /// Chat completions that also return `reasoning_content`.
    Reasoning,
}

impl BackendKind {
    pub fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::Chat => &[Capability::Conversation, Capability::Summary],
            Self::Reasoning => &[Capability::Reasoning],
        }
    }

    pub fn supports(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Reasoning => write!(f, "reasoning"),
        }
    }
}

/// One configured endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSpec {
    pub name: String,
    pub kind: BackendKind,
    /// OpenAI-compatible base URL, e.g. `http://localhost:8000/v1`.
    pub base_url: String,
    pub model: String,
    /// Inline key. Prefer `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl BackendSpec {
    pub fn new(name: &str, kind: BackendKind, base_url: &str, model: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key: None,
            api_key_env: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_tokens: None,
        }
    }

    /// Key from `api_key_env` if set and present, else the inline key.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
            .or_else(|| self.api_key.clone())
    }
}

/// Backend name per role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBindings {
    pub conversation: String,
    pub summary: String,
    pub evaluator: String,
}

impl RoleBindings {
    /// `(role, capability, backend name)` for every role.
    pub fn entries(&self) -> [(&'static str, Capability, &str); 3] {
        [
            ("conversation", Capability::Conversation, self.conversation.as_str()),
            ("summary", Capability::Summary, self.summary.as_str()),
            ("evaluator", Capability::Reasoning, self.evaluator.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend name {0:?} is defined more than once")]
    Duplicate(String),

    #[error("role {role} is bound to unknown backend {name:?}")]
    Unknown { role: &'static str, name: String },

    #[error("role {role} needs {capability}, but backend {backend:?} ({kind}) does not provide it")]
    MissingCapability {
        role: &'static str,
        capability: Capability,
        backend: String,
        kind: BackendKind,
    },

    #[error("failed to build client for backend {name:?}: {message}")]
    Client { name: String, message: String },
}

/// Role bindings checked against the registry, before any client is built.
#[derive(Debug, Clone, Copy)]
pub struct BackendPlan<'a> {
    pub conversation: &'a BackendSpec,
    pub summary: &'a BackendSpec,
    pub evaluator: &'a BackendSpec,
}

impl<'a> BackendPlan<'a> {
    pub fn resolve(
        backends: &'a [BackendSpec],
        roles: &RoleBindings,
    ) -> Result<Self, BackendError> {
        let mut by_name: HashMap<&'a str, &'a BackendSpec> = HashMap::new();
        for backend in backends {
            if by_name.insert(backend.name.as_str(), backend).is_some() {
                return Err(BackendError::Duplicate(backend.name.clone()));
            }
        }

        let lookup = |role: &'static str,
                      capability: Capability,
                      name: &str|
         -> Result<&'a BackendSpec, BackendError> {
            let spec = by_name.get(name).copied().ok_or_else(|| BackendError::Unknown {
                role,
                name: name.to_string(),
            })?;
            if !spec.kind.supports(capability) {
                return Err(BackendError::MissingCapability {
                    role,
                    capability,
                    backend: spec.name.clone(),
                    kind: spec.kind,
                });
            }
            Ok(spec)
        };

        let [conversation, summary, evaluator] = roles.entries();
        Ok(Self {
            conversation: lookup(conversation.0, conversation.1, conversation.2)?,
            summary: lookup(summary.0, summary.1, summary.2)?,
            evaluator: lookup(evaluator.0, evaluator.1, evaluator.2)?,
        })
    }

    /// Human-readable `role → backend` lines.
    pub fn describe(&self) -> Vec<String> {
        [
            ("conversation", self.conversation),
            ("summary", self.summary),
            ("evaluator", self.evaluator),
        ]
        .iter()
        .map(|(role, spec)| {
            format!(
                "{role:<12} → {} ({}, {} @ {})",
                spec.name, spec.kind, spec.model, spec.base_url
            )
        })
        .collect()
    }
}

/// Clients built for each role. Roles bound to the same backend share one client.
pub struct ResolvedBackends {
    pub conversation: Arc<ChatClient>,
    pub summary: Arc<ChatClient>,
    pub evaluator: Arc<ChatClient>,
}

impl ResolvedBackends {
    pub fn build(plan: &BackendPlan<'_>, retry: RetryPolicy) -> Result<Self, BackendError> {
        let mut built: HashMap<String, Arc<ChatClient>> = HashMap::new();
        let mut client_for = |spec: &BackendSpec| -> Result<Arc<ChatClient>, BackendError> {
            if let Some(client) = built.get(&spec.name) {
                return Ok(client.clone());
            }
            let client = Arc::new(ChatClient::new(spec, retry).map_err(|e| {
                BackendError::Client {
                    name: spec.name.clone(),
                    message: e.to_string(),
                }
            })?);
            built.insert(spec.name.clone(), client.clone());
            Ok(client)
        };

        Ok(Self {
            conversation: client_for(plan.conversation)?,
            summary: client_for(plan.summary)?,
            evaluator: client_for(plan.evaluator)?,
        })
    }

    pub fn services(&self) -> SessionServices {
        SessionServices {
            conversation: self.conversation.clone() as Arc<dyn TextGenerator>,
            summary: self.summary.clone() as Arc<dyn TextGenerator>,
            reasoner: self.evaluator.clone() as Arc<dyn Reasoner>,
        }
    }
}
