//! Round audit records and the cumulative modification instruction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{RevisionPhase, RevisionTransition};
use crate::evaluator::EvaluationVerdict;
use crate::prompts::{render, PromptTemplates};

/// One rejected draft and the suggestion applied to replace it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionAttempt {
    /// 1-based, at most the attempt cap.
    pub attempt_number: u32,
    pub draft_before: String,
    pub suggestion_applied: String,
    pub verdict: EvaluationVerdict,
}

/// How a round closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    Accepted,
    Exhausted,
    Aborted,
}

impl RoundOutcome {
    pub fn from_phase(phase: RevisionPhase) -> Option<Self> {
        match phase {
            RevisionPhase::Accepted => Some(Self::Accepted),
            RevisionPhase::Exhausted => Some(Self::Exhausted),
            RevisionPhase::Aborted => Some(Self::Aborted),
            _ => None,
        }
    }
}

impl std::fmt::Display for RoundOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Everything that happened in one counselor round. Built once by the
/// revision loop and never changed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundAudit {
    /// 1-based counselor round number.
    pub round: u32,
    /// Sequence index the final text will occupy in the history.
    pub turn_index: usize,
    /// Attempt-0 draft, before any revision. `None` if the first call failed.
    pub original_draft: Option<String>,
    /// Text committed to the transcript.
    pub final_text: String,
    /// One per evaluation performed, in order.
    pub verdicts: Vec<EvaluationVerdict>,
    /// One per rejected draft, in order.
    pub attempts: Vec<RevisionAttempt>,
    pub outcome: RoundOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub transitions: Vec<RevisionTransition>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RoundAudit {
    pub fn last_verdict(&self) -> Option<&EvaluationVerdict> {
        self.verdicts.last()
    }

    pub fn was_revised(&self) -> bool {
        !self.attempts.is_empty()
    }
}

/// Guidance for the next draft: every suggestion so far, numbered, with the
/// newest marked as current, plus the attempt-0 draft for reference.
pub fn modification_instruction(
    templates: &PromptTemplates,
    attempts: &[RevisionAttempt],
    original_draft: &str,
) -> String {
    let last = attempts.len();
    let requests = attempts
        .iter()
        .enumerate()
        .map(|(i, attempt)| {
            let template = if i + 1 == last {
                &templates.modification_current
            } else {
                &templates.modification_request
            };
            render(
                template,
                &[
                    ("index", (i + 1).to_string().as_str()),
                    ("suggestion", attempt.suggestion_applied.as_str()),
                ],
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    render(
        &templates.modification_instruction,
        &[("requests", requests.as_str()), ("original", original_draft)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(n: u32, suggestion: &str) -> RevisionAttempt {
        RevisionAttempt {
            attempt_number: n,
            draft_before: format!("draft {n}"),
            suggestion_applied: suggestion.to_string(),
            verdict: EvaluationVerdict::unavailable("x".into(), suggestion, "unrecognized"),
        }
    }

    #[test]
    fn test_instruction_numbers_all_suggestions() {
        let templates = PromptTemplates::default();
        let attempts = vec![attempt(1, "be warmer"), attempt(2, "ask about sleep")];
        let text = modification_instruction(&templates, &attempts, "original reply");
        assert!(text.contains("Request 1: be warmer"));
        assert!(text.contains("Current request (2): ask about sleep"));
        assert!(text.contains("original reply"));
        assert!(!text.contains("draft 2"));
    }

    #[test]
    fn test_outcome_from_phase() {
        assert_eq!(
            RoundOutcome::from_phase(RevisionPhase::Exhausted),
            Some(RoundOutcome::Exhausted)
        );
        assert_eq!(RoundOutcome::from_phase(RevisionPhase::Draft), None);
    }
}
