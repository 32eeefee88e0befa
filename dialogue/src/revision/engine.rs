//! Revision loop: drives draft → evaluate → revise for one counselor turn.
//!
//! ```text
//!   Draft ──► Evaluating ──► Accepted
//!     ▲           │
//!     │           ├──► Exhausted   (attempt cap reached, last draft kept)
//!     │           ▼
//!     └──────  Revising
//!
//!   Draft ──► Aborted              (generator failed, apology committed)
//! ```
//!
//! Every step awaits the previous one; nothing inside a round runs
//! concurrently.

use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::audit::{modification_instruction, RevisionAttempt, RoundAudit, RoundOutcome};
use super::state::{RevisionPhase, RevisionTracker, TransitionError};
use crate::agents::CounselorAgent;
use crate::evaluator::{EvaluationRequest, Evaluator};
use crate::history::{DialogueHistory, Mode, SessionKind};
use crate::prompts::PromptTemplates;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_ROUND_BUDGET: usize = 50;

/// Limits for the revision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionConfig {
    /// Revisions allowed per round before the last draft is forced through.
    pub max_attempts: u32,
    /// Intended session length, shown to the evaluator for pacing.
    pub round_budget: usize,
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            round_budget: DEFAULT_ROUND_BUDGET,
        }
    }
}

/// Inputs for one round.
#[derive(Debug, Clone, Copy)]
pub struct RoundInput<'a> {
    /// 1-based counselor round number.
    pub round: u32,
    pub history: &'a DialogueHistory,
    pub mode: Mode,
    pub session_kind: SessionKind,
    /// Evaluator context from the summarizer.
    pub context: &'a str,
}

pub struct RevisionLoop<'a> {
    counselor: &'a CounselorAgent,
    evaluator: &'a Evaluator,
    templates: &'a PromptTemplates,
    config: RevisionConfig,
}

impl<'a> RevisionLoop<'a> {
    pub fn new(
        counselor: &'a CounselorAgent,
        evaluator: &'a Evaluator,
        templates: &'a PromptTemplates,
        config: RevisionConfig,
    ) -> Self {
        Self {
            counselor,
            evaluator,
            templates,
            config,
        }
    }

    /// Run one round to a terminal phase.
    pub async fn run(&self, input: RoundInput<'_>) -> Result<RoundAudit, TransitionError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let round = input.round;

        let mut tracker = RevisionTracker::new();
        let mut verdicts = Vec::new();
        let mut attempts: Vec<RevisionAttempt> = Vec::new();
        let mut suggestions: Vec<String> = Vec::new();
        let mut original_draft: Option<String> = None;
        let mut guidance: Option<String> = None;

        let (final_text, error) = loop {
            let draft = match self
                .counselor
                .draft(input.history, input.mode, guidance.as_deref())
                .await
            {
                Ok(draft) => draft,
                Err(e) => {
                    warn!(
                        round,
                        attempt = tracker.attempt(),
                        error = %e,
                        "Counselor generation failed, closing round with apology"
                    );
                    tracker.advance(RevisionPhase::Aborted)?;
                    break (self.templates.counselor_apology.clone(), Some(e.to_string()));
                }
            };
            if original_draft.is_none() {
                original_draft = Some(draft.clone());
            }

            tracker.advance(RevisionPhase::Evaluating)?;
            let request = EvaluationRequest {
                session_kind: input.session_kind,
                round,
                attempt: tracker.attempt(),
                first_evaluation: tracker.attempt() == 0,
                round_budget: self.config.round_budget,
                turn_count: input.history.len(),
                context: input.context,
                prior_suggestions: &suggestions,
                draft: &draft,
            };
            let verdict = self.evaluator.evaluate(&request).await;
            debug!(
                round,
                attempt = tracker.attempt(),
                conclusion = %verdict.conclusion,
                phase = %verdict.phase_label,
                valid = verdict.valid,
                "Draft evaluated"
            );
            verdicts.push(verdict.clone());

            if verdict.is_accept() {
                tracker.advance(RevisionPhase::Accepted)?;
                break (draft, None);
            }
            if tracker.attempt() >= self.config.max_attempts {
                info!(
                    round,
                    attempts = tracker.attempt(),
                    "Attempt cap reached, keeping last draft"
                );
                tracker.advance(RevisionPhase::Exhausted)?;
                break (draft, None);
            }

            tracker.advance(RevisionPhase::Revising)?;
            suggestions.push(verdict.improvement_suggestion.clone());
            attempts.push(RevisionAttempt {
                attempt_number: tracker.attempt() + 1,
                draft_before: draft,
                suggestion_applied: verdict.improvement_suggestion.clone(),
                verdict,
            });
            guidance = Some(modification_instruction(
                self.templates,
                &attempts,
                original_draft.as_deref().unwrap_or_default(),
            ));
            tracker.advance(RevisionPhase::Draft)?;
        };

        let outcome = RoundOutcome::from_phase(tracker.phase()).unwrap_or(RoundOutcome::Aborted);
        info!(
            round,
            outcome = %outcome,
            evaluations = verdicts.len(),
            revisions = attempts.len(),
            "Counselor round closed"
        );

        Ok(RoundAudit {
            round,
            turn_index: input.history.len(),
            original_draft,
            final_text,
            verdicts,
            attempts,
            outcome,
            error,
            transitions: tracker.transitions().to_vec(),
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
        })
    }
}
