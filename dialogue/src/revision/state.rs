//! Revision state machine: phases, transitions, and the per-round tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of one counselor round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RevisionPhase {
    /// Counselor is producing a draft.
    Draft,
    /// Evaluator is judging the latest draft.
    Evaluating,
    /// Draft rejected; building the cumulative instruction.
    Revising,
    /// Latest draft accepted by the evaluator.
    Accepted,
    /// Attempt cap reached; latest draft accepted regardless of verdict.
    Exhausted,
    /// Generator call failed; round closed with a placeholder.
    Aborted,
}

impl RevisionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Exhausted | Self::Aborted)
    }

    pub fn valid_transitions(self) -> &'static [RevisionPhase] {
        match self {
            Self::Draft => &[Self::Evaluating, Self::Aborted],
            Self::Evaluating => &[Self::Accepted, Self::Revising, Self::Exhausted],
            Self::Revising => &[Self::Draft],
            Self::Accepted | Self::Exhausted | Self::Aborted => &[],
        }
    }
}

impl std::fmt::Display for RevisionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Evaluating => write!(f, "evaluating"),
            Self::Revising => write!(f, "revising"),
            Self::Accepted => write!(f, "accepted"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// A recorded phase change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionTransition {
    pub from: RevisionPhase,
    pub to: RevisionPhase,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: String,
    pub to: String,
}

impl TransitionError {
    pub fn new(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid transition {} → {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// Current phase plus the transitions taken so far in one round.
#[derive(Debug, Clone)]
pub struct RevisionTracker {
    phase: RevisionPhase,
    attempt: u32,
    transitions: Vec<RevisionTransition>,
}

impl RevisionTracker {
    pub fn new() -> Self {
        Self {
            phase: RevisionPhase::Draft,
            attempt: 0,
            transitions: Vec::new(),
        }
    }

    pub fn phase(&self) -> RevisionPhase {
        self.phase
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn transitions(&self) -> &[RevisionTransition] {
        &self.transitions
    }

    /// Move to `to`. Entering `Draft` from `Revising` starts the next attempt.
    pub fn advance(&mut self, to: RevisionPhase) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError::new(self.phase, to));
        }
        if self.phase == RevisionPhase::Revising && to == RevisionPhase::Draft {
            self.attempt += 1;
        }
        self.transitions.push(RevisionTransition {
            from: self.phase,
            to,
            attempt: self.attempt,
            timestamp: Utc::now(),
        });
        self.phase = to;
        Ok(())
    }
}

impl Default for RevisionTracker {
    fn default() -> Self {
        Self::new()
    }
}
