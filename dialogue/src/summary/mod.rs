//! Windowed summarization: decides when history is compressed and what
//! context is handed to the evaluator.
//!
//! With `n` committed turns, start threshold `S` and buffer interval `B`:
//!
//! ```text
//!   n < S                         raw history
//!   n == S, or (n - S) % B == 0   regenerate the summary over the full history
//!   otherwise                     summary + turns after start_index(n)
//!                                 start_index(n) = B * ((n - 1) / B) + 1
//! ```
//!
//! A trigger is consumed once per turn count: asking again at the same `n`
//! reuses the stored summary.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::history::{serialize_turns, DialogueHistory};
use crate::prompts::{render, PromptTemplates};
use crate::transport::{ChatMessage, GenerationRequest, TextGenerator};

const DEFAULT_START: usize = 13;
const DEFAULT_BUFFER: usize = 6;
const DEFAULT_RECENT_TURNS: usize = 8;
const DEFAULT_SUMMARY_TEMPERATURE: f32 = 0.8;

/// Thresholds controlling summary regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryPolicy {
    /// Turn count of the first summary (`S`).
    pub start: usize,
    /// Turns between regenerations (`B`).
    pub buffer: usize,
    /// Trailing turns shown to the summary model next to the full history.
    pub recent_turns: usize,
    pub temperature: f32,
}

impl Default for SummaryPolicy {
    fn default() -> Self {
        Self {
            start: DEFAULT_START,
            buffer: DEFAULT_BUFFER,
            recent_turns: DEFAULT_RECENT_TURNS,
            temperature: DEFAULT_SUMMARY_TEMPERATURE,
        }
    }
}

/// What the policy asks for at a given turn count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryDecision {
    RawHistory,
    Regenerate,
    Incremental { start_index: usize },
}

impl SummaryPolicy {
    pub fn is_trigger(&self, n: usize) -> bool {
        if n == self.start {
            return true;
        }
        n > self.start && self.buffer > 0 && (n - self.start) % self.buffer == 0
    }

    /// Position after which turns are newer than the last regeneration boundary.
    pub fn start_index(&self, n: usize) -> usize {
        if n == 0 || self.buffer == 0 {
            return 0;
        }
        self.buffer * ((n - 1) / self.buffer) + 1
    }

    pub fn decide(&self, n: usize) -> SummaryDecision {
        if n < self.start {
            SummaryDecision::RawHistory
        } else if self.is_trigger(n) {
            SummaryDecision::Regenerate
        } else {
            SummaryDecision::Incremental {
                start_index: self.start_index(n),
            }
        }
    }
}

/// Context prepared for one downstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryContext {
    /// Text handed to the evaluator: raw history, summary, or summary + delta.
    pub context: String,
    /// The running summary at this point, if any.
    pub summary: Option<String>,
    pub decision: SummaryDecision,
}

/// Applies a [`SummaryPolicy`] to a history, calling the summary model on triggers.
pub struct SummaryEngine {
    generator: Arc<dyn TextGenerator>,
    templates: Arc<PromptTemplates>,
    policy: SummaryPolicy,
}

impl SummaryEngine {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        templates: Arc<PromptTemplates>,
        policy: SummaryPolicy,
    ) -> Self {
        Self {
            generator,
            templates,
            policy,
        }
    }

    pub fn policy(&self) -> &SummaryPolicy {
        &self.policy
    }

    /// Bring the summary up to date for the current turn count and return
    /// the context to use.
    pub async fn prepare(&self, history: &mut DialogueHistory) -> SummaryContext {
        let n = history.len();
        let decision = self.policy.decide(n);

        if decision == SummaryDecision::Regenerate && history.summarized_at() != Some(n) {
            self.regenerate(history, n).await;
        }

        let context = match (decision, history.current_summary()) {
            (SummaryDecision::RawHistory, _) | (_, None) => history.to_turn_list(),
            (SummaryDecision::Regenerate, Some(summary)) => summary.to_string(),
            (SummaryDecision::Incremental { start_index }, Some(summary)) => {
                let delta = history.turns().get(start_index..).unwrap_or_default();
                let recent = serialize_turns(delta);
                render(
                    &self.templates.incremental_context,
                    &[("summary", summary), ("recent", recent.as_str())],
                )
            }
        };

        SummaryContext {
            context,
            summary: history.current_summary().map(str::to_string),
            decision,
        }
    }

    /// Regenerate only if the current turn count is an unconsumed trigger.
    /// Returns whether the summary model was called.
    pub async fn refresh(&self, history: &mut DialogueHistory) -> bool {
        let n = history.len();
        if !self.policy.is_trigger(n) || history.summarized_at() == Some(n) {
            return false;
        }
        self.regenerate(history, n).await;
        true
    }

    async fn regenerate(&self, history: &mut DialogueHistory, n: usize) {
        let turns = history.turns();
        let recent_from = turns.len().saturating_sub(self.policy.recent_turns);
        let full = serialize_turns(turns);
        let recent = serialize_turns(&turns[recent_from..]);
        let request = GenerationRequest {
            system_prompt: self.templates.summary_system.clone(),
            messages: vec![ChatMessage::user(render(
                &self.templates.summary_user,
                &[("history", full.as_str()), ("recent", recent.as_str())],
            ))],
            temperature: self.policy.temperature,
        };

        match self.generator.generate(&request).await {
            Ok(text) if !text.trim().is_empty() => {
                info!(turn = n, chars = text.len(), "Summary regenerated");
                history.record_summary(n, text.trim().to_string());
            }
            Ok(_) => {
                warn!(turn = n, "Summary model returned empty text; keeping previous summary");
                history.mark_summarized(n);
            }
            Err(e) => {
                warn!(turn = n, error = %e, "Summary generation failed; keeping previous summary");
                history.mark_summarized(n);
            }
        }
        debug!(turn = n, summaries = history.summary_history().len(), "Summary trigger consumed");
    }
}
