//! Error types for sessions, configuration, persistence and the ledger.
//!
//! Transport errors live with the collaborator traits in
//! [`crate::transport`]; evaluator parse problems never surface as errors.

use std::path::PathBuf;

use crate::revision::TransitionError;

/// Failure of the session state machine itself.
///
/// Turn-level transport failures are absorbed by fallbacks and never reach
/// this type.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} has already ended")]
    AlreadyEnded(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("invalid session configuration: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be {requirement}, got {value}")]
    OutOfRange {
        field: &'static str,
        requirement: &'static str,
        value: String,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("invalid verdict key pattern: {0}")]
    VerdictPattern(String),
}

/// Error while persisting session artifacts.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to serialize {artifact}: {source}")]
    Serialize {
        artifact: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid artifact id {0:?}")]
    InvalidId(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
