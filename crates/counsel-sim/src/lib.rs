//! Runner for simulated counseling sessions.
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`backend`]: capability-tagged backend registry and role bindings
//! - [`client`]: OpenAI-compatible chat-completions transport
//! - [`retry`]: bounded exponential backoff
//! - [`batch`]: concurrent processing of a profile folder
//! - [`extract`]: per-round phase labels and suggestions from reasoning artifacts

pub mod backend;
pub mod batch;
pub mod client;
pub mod config;
pub mod extract;
pub mod retry;

pub use backend::{BackendError, BackendKind, BackendPlan, BackendSpec, Capability, ResolvedBackends};
pub use batch::{BatchItemResult, BatchReport, BatchRunner, ItemStatus};
pub use client::ChatClient;
pub use config::SimConfig;
pub use extract::{extract_dir, ExtractReport, SessionExtract};
pub use retry::RetryPolicy;
