//! Session state machine: lifecycle phases and end reasons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::revision::TransitionError;

/// Lifecycle of a counseling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Created; no turn generated yet.
    NotStarted,
    /// Turns are being generated.
    InProgress,
    /// Terminal.
    Ended,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        self == Self::Ended
    }

    pub fn valid_transitions(self) -> &'static [SessionPhase] {
        match self {
            Self::NotStarted => &[Self::InProgress, Self::Ended],
            Self::InProgress => &[Self::Ended],
            Self::Ended => &[],
        }
    }

    /// Checked transition.
    pub fn transition(self, to: SessionPhase) -> Result<SessionPhase, TransitionError> {
        if self.valid_transitions().contains(&to) {
            Ok(to)
        } else {
            Err(TransitionError::new(self, to))
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndReason {
    /// The latest counselor turn contained the termination phrase.
    Farewell { turn_index: usize },
    /// Turn count reached the mode's ceiling.
    TurnCeiling { turns: usize },
    /// Ended by the caller.
    Aborted { reason: String },
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Farewell { turn_index } => write!(f, "farewell at turn {turn_index}"),
            Self::TurnCeiling { turns } => write!(f, "turn ceiling reached at {turns}"),
            Self::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}

/// A recorded lifecycle change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}
