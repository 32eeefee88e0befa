//! Evaluator: judges one counselor draft and returns a verdict.
//!
//! ```text
//!   first evaluation ──► session-kind template + urgency tier ─┐
//!                                                              ├─► Reasoner ─► VerdictParser ─► EvaluationVerdict
//!   re-evaluation ─────► revision template + request history ──┘
//! ```
//!
//! A failed reasoner call does not abort anything: it yields a Reject
//! verdict marked invalid that carries the error.

pub mod parser;
pub mod phases;
pub mod verdict;

use std::sync::Arc;

use tracing::{debug, warn};

pub use parser::{VerdictParser, VerdictSchema};
pub use phases::{Phase, PhaseGroup, FIRST_SESSION_PHASES, FOLLOW_UP_PHASES};
pub use verdict::{Conclusion, EvaluationVerdict, ParsedVerdict, VerdictFields};

use crate::history::SessionKind;
use crate::prompts::{render, PromptTemplates};
use crate::transport::{ChatMessage, Reasoner};

/// How close the session is to its turn budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrgencyTier {
    /// More than five turns remain.
    Plenty,
    /// Zero to five turns remain.
    Approaching,
    /// The budget is already exceeded.
    OverBudget,
}

impl UrgencyTier {
    pub fn from_remaining(remaining: i64) -> Self {
        if remaining > 5 {
            Self::Plenty
        } else if remaining >= 0 {
            Self::Approaching
        } else {
            Self::OverBudget
        }
    }
}

/// Everything one evaluation needs.
#[derive(Debug, Clone)]
pub struct EvaluationRequest<'a> {
    pub session_kind: SessionKind,
    /// Counselor round being judged, for logs.
    pub round: u32,
    /// Zero-based attempt within the round.
    pub attempt: u32,
    /// True for the attempt-0 draft of a round.
    pub first_evaluation: bool,
    /// Intended session length in turns.
    pub round_budget: usize,
    /// Turns committed so far.
    pub turn_count: usize,
    /// History or summary context.
    pub context: &'a str,
    /// Suggestions already applied in this round, oldest first.
    pub prior_suggestions: &'a [String],
    pub draft: &'a str,
}

impl EvaluationRequest<'_> {
    pub fn remaining(&self) -> i64 {
        self.round_budget as i64 - self.turn_count as i64
    }

    pub fn urgency(&self) -> UrgencyTier {
        UrgencyTier::from_remaining(self.remaining())
    }
}

pub struct Evaluator {
    reasoner: Arc<dyn Reasoner>,
    templates: Arc<PromptTemplates>,
    parser: VerdictParser,
}

impl Evaluator {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        templates: Arc<PromptTemplates>,
        parser: VerdictParser,
    ) -> Self {
        Self {
            reasoner,
            templates,
            parser,
        }
    }

    pub fn parser(&self) -> &VerdictParser {
        &self.parser
    }

    /// Build the prompt for a request without sending it.
    pub fn prompt(&self, request: &EvaluationRequest<'_>) -> Vec<ChatMessage> {
        let t = &self.templates;
        let answer_format = self.parser.schema().answer_format();

        if !request.first_evaluation {
            let modifications = format_modification_history(t, request.prior_suggestions);
            return vec![
                ChatMessage::system(render(
                    &t.revision_system,
                    &[("answer_format", answer_format.as_str())],
                )),
                ChatMessage::user(render(
                    &t.revision_user,
                    &[
                        ("context", request.context),
                        ("modifications", modifications.as_str()),
                        ("draft", request.draft),
                    ],
                )),
            ];
        }

        let budget = request.round_budget.to_string();
        let remaining = request.remaining();
        let urgency = match request.urgency() {
            UrgencyTier::Plenty => render(&t.urgency_plenty, &[("budget", budget.as_str())]),
            UrgencyTier::Approaching => render(
                &t.urgency_approaching,
                &[("remaining", remaining.to_string().as_str())],
            ),
            UrgencyTier::OverBudget => render(
                &t.urgency_over,
                &[("overrun", (-remaining).to_string().as_str())],
            ),
        };
        let template = match request.session_kind {
            SessionKind::First => &t.evaluation_first_session,
            SessionKind::FollowUp => &t.evaluation_follow_up,
        };
        let phases = phases::describe(request.session_kind);
        let system = render(
            template,
            &[
                ("budget", budget.as_str()),
                ("turns", request.turn_count.to_string().as_str()),
                ("urgency", urgency.as_str()),
                ("phases", phases.as_str()),
                ("answer_format", answer_format.as_str()),
            ],
        );
        vec![
            ChatMessage::system(system),
            ChatMessage::user(render(
                &t.evaluation_user,
                &[("context", request.context), ("draft", request.draft)],
            )),
        ]
    }

    /// Judge a draft. Never fails; see the module docs.
    pub async fn evaluate(&self, request: &EvaluationRequest<'_>) -> EvaluationVerdict {
        let messages = self.prompt(request);
        match self.reasoner.evaluate(&messages).await {
            Ok(reply) => {
                let parsed = self.parser.parse(&reply.text);
                if !parsed.is_valid() {
                    debug!(raw = %reply.text, "Evaluator output degraded to heuristic parse");
                }
                EvaluationVerdict::from_parsed(parsed, reply.text, reply.trace)
            }
            Err(e) => {
                warn!(
                    round = request.round,
                    attempt = request.attempt,
                    error = %e,
                    "Evaluation call failed"
                );
                let schema = self.parser.schema();
                EvaluationVerdict::unavailable(
                    e.to_string(),
                    &schema.suggestion_placeholder,
                    &schema.phase_placeholder,
                )
            }
        }
    }
}

/// Prior suggestions as `"Request 1: …; Request 2: …"`.
pub fn format_modification_history(templates: &PromptTemplates, suggestions: &[String]) -> String {
    suggestions
        .iter()
        .enumerate()
        .map(|(i, s)| {
            render(
                &templates.modification_history_entry,
                &[("index", (i + 1).to_string().as_str()), ("suggestion", s.as_str())],
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockReasoner, MessageRole};
    use std::io;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::writer::MakeWriter;

    fn evaluator(reasoner: MockReasoner) -> Evaluator {
        Evaluator::new(
            Arc::new(reasoner),
            Arc::new(PromptTemplates::default()),
            VerdictParser::new(VerdictSchema::default()).unwrap(),
        )
    }

    fn request<'a>(first: bool, turns: usize) -> EvaluationRequest<'a> {
        EvaluationRequest {
            session_kind: SessionKind::First,
            round: 1,
            attempt: if first { 0 } else { 1 },
            first_evaluation: first,
            round_budget: 50,
            turn_count: turns,
            context: "[]",
            prior_suggestions: &[],
            draft: "How are you feeling today?",
        }
    }

    #[test]
    fn test_urgency_tiers() {
        assert_eq!(UrgencyTier::from_remaining(6), UrgencyTier::Plenty);
        assert_eq!(UrgencyTier::from_remaining(5), UrgencyTier::Approaching);
        assert_eq!(UrgencyTier::from_remaining(0), UrgencyTier::Approaching);
        assert_eq!(UrgencyTier::from_remaining(-1), UrgencyTier::OverBudget);
    }

    #[test]
    fn test_first_prompt_varies_by_tier() {
        let ev = evaluator(MockReasoner::accepting());
        let plenty = ev.prompt(&request(true, 10));
        let near = ev.prompt(&request(true, 47));
        let over = ev.prompt(&request(true, 53));
        assert_eq!(plenty[0].role, MessageRole::System);
        assert!(plenty[0].content.contains("within 50 turns"));
        assert!(near[0].content.contains("remaining 3 turns"));
        assert!(over[0].content.contains("3 turns over"));
        assert!(plenty[0].content.contains("Set the agenda"));
        assert!(plenty[1].content.contains("How are you feeling today?"));
    }

    #[test]
    fn test_follow_up_prompt_uses_follow_up_phases() {
        let ev = evaluator(MockReasoner::accepting());
        let mut req = request(true, 10);
        req.session_kind = SessionKind::FollowUp;
        let prompt = ev.prompt(&req);
        assert!(prompt[0].content.contains("follow-up"));
        assert!(prompt[0].content.contains("Review homework"));
    }

    #[test]
    fn test_revision_prompt_lists_prior_suggestions() {
        let ev = evaluator(MockReasoner::accepting());
        let suggestions = vec!["be warmer".to_string(), "ask about sleep".to_string()];
        let mut req = request(false, 10);
        req.prior_suggestions = &suggestions;
        let prompt = ev.prompt(&req);
        assert!(prompt[1]
            .content
            .contains("Request 1: be warmer; Request 2: ask about sleep"));
        assert!(!prompt[0].content.contains("Stages:"));
    }

    #[tokio::test]
    async fn test_evaluate_parses_reply() {
        let ev = evaluator(MockReasoner::rejecting("slow down"));
        let verdict = ev.evaluate(&request(true, 3)).await;
        assert_eq!(verdict.conclusion, Conclusion::Reject);
        assert_eq!(verdict.improvement_suggestion, "slow down");
        assert!(verdict.valid);
        assert_eq!(verdict.reasoning_trace.as_deref(), Some("mock trace"));
    }

    #[derive(Clone, Default)]
    struct SharedLogBuffer {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl SharedLogBuffer {
        fn as_string(&self) -> String {
            match self.inner.lock() {
                Ok(guard) => String::from_utf8_lossy(&guard).to_string(),
                Err(_) => String::new(),
            }
        }
    }

    struct SharedLogWriter {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl<'a> MakeWriter<'a> for SharedLogBuffer {
        type Writer = SharedLogWriter;

        fn make_writer(&'a self) -> Self::Writer {
            SharedLogWriter {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl io::Write for SharedLogWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.inner.lock() {
                Ok(mut guard) => {
                    guard.extend_from_slice(buf);
                    Ok(buf.len())
                }
                Err(_) => Err(io::Error::other("failed to lock shared log buffer")),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_failure_warning_names_round_and_attempt() {
        let logs = SharedLogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_writer(logs.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let ev = evaluator(MockReasoner::failing());
        let mut req = request(false, 3);
        req.round = 7;
        req.attempt = 2;
        ev.evaluate(&req).await;

        let output = logs.as_string();
        assert!(output.contains("Evaluation call failed"), "{output}");
        assert!(output.contains("round=7"), "{output}");
        assert!(output.contains("attempt=2"), "{output}");
    }

    #[tokio::test]
    async fn test_evaluate_transport_failure_degrades() {
        let ev = evaluator(MockReasoner::failing());
        let verdict = ev.evaluate(&request(true, 3)).await;
        assert_eq!(verdict.conclusion, Conclusion::Reject);
        assert!(!verdict.valid);
        assert!(verdict.error.is_some());
    }
}
