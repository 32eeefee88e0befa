//! Simulated counseling dialogue core
//!
//! This library provides:
//! - A turn-taking session state machine between a synthetic client and counselor
//! - A bounded critique/revision loop that gates every counselor turn
//! - Windowed summarization that keeps evaluator context small
//!
//! # Modules
//!
//! - [`history`]: turns, roles, modes and perspective projection
//! - [`summary`]: when to compress history and what context to hand downstream
//! - [`evaluator`]: verdict prompts and tolerant parsing of free-form judgments
//! - [`revision`]: draft → evaluate → revise loop with an attempt cap
//! - [`session`]: the orchestrator that alternates roles and keeps the audit trail
//! - [`artifacts`]: the five per-session artifacts and sinks that persist them
//! - [`ledger`]: the write-once processed set shared by concurrent workers
//!
//! Network access lives outside this crate. Generators and reasoners are
//! injected through the traits in [`transport`].

#![allow(clippy::uninlined_format_args)]

pub mod agents;
pub mod artifacts;
pub mod config;
pub mod errors;
pub mod evaluator;
pub mod history;
pub mod ledger;
pub mod prompts;
pub mod revision;
pub mod session;
pub mod summary;
pub mod transport;

pub use artifacts::{ArtifactKind, ArtifactSink, JsonDirectorySink, SessionArtifacts};
pub use config::DialogueConfig;
pub use errors::{ConfigError, LedgerError, PersistenceError, SessionError};
pub use evaluator::{Conclusion, EvaluationVerdict, Evaluator, ParsedVerdict};
pub use history::{DialogueHistory, Mode, Role, SessionKind, Turn};
pub use ledger::ProcessedLedger;
pub use revision::{RevisionAttempt, RevisionLoop, RoundAudit, RoundOutcome};
pub use session::{CounselingSession, EndReason, SessionPhase, SessionServices, SessionSpec};
pub use summary::{SummaryDecision, SummaryEngine, SummaryPolicy};
pub use transport::{ChatMessage, MessageRole, Reasoner, TextGenerator, TransportError};
