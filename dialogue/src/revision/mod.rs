//! Critique/revision loop for counselor turns.

pub mod audit;
pub mod engine;
pub mod state;

pub use audit::{modification_instruction, RevisionAttempt, RoundAudit, RoundOutcome};
pub use engine::{RevisionConfig, RevisionLoop, RoundInput};
pub use state::{RevisionPhase, RevisionTracker, RevisionTransition, TransitionError};
