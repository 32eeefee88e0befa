//! Revision loop integration tests: counselor agent, evaluator and loop
//! wired together with deterministic mock services (no network calls).

use std::sync::Arc;

use dialogue::agents::CounselorAgent;
use dialogue::evaluator::{Evaluator, VerdictParser, VerdictSchema};
use dialogue::prompts::PromptTemplates;
use dialogue::revision::{RevisionConfig, RevisionLoop, RevisionPhase, RoundInput, RoundOutcome};
use dialogue::transport::{MockGenerator, MockReasoner};
use dialogue::{Conclusion, DialogueHistory, Mode, Role, RoundAudit, SessionKind, Turn};

const ACCEPT: &str = r#"{"verdict": "yes", "suggestion": "none", "phase": "Set the agenda"}"#;
const REJECT: &str =
    r#"{"verdict": "no", "suggestion": "reflect the client's feelings first", "phase": "Set the agenda"}"#;

fn history() -> DialogueHistory {
    let mut h = DialogueHistory::new();
    h.push(Turn::new(Role::Client, "I haven't slept properly in weeks."));
    h
}

async fn run_round(
    generator: Arc<MockGenerator>,
    reasoner: Arc<MockReasoner>,
    config: RevisionConfig,
) -> RoundAudit {
    let templates = Arc::new(PromptTemplates::default());
    let counselor = CounselorAgent::new(generator, templates.clone(), SessionKind::First, 0.8);
    let parser = VerdictParser::new(VerdictSchema::default()).unwrap();
    let evaluator = Evaluator::new(reasoner, templates.clone(), parser);
    let history = history();
    RevisionLoop::new(&counselor, &evaluator, &templates, config)
        .run(RoundInput {
            round: 1,
            history: &history,
            mode: Mode::ClientFirst,
            session_kind: SessionKind::First,
            context: "[]",
        })
        .await
        .unwrap()
}

// ── Acceptance ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_accept_on_first_draft() {
    let gen = Arc::new(MockGenerator::numbered("draft"));
    let reasoner = Arc::new(MockReasoner::accepting());
    let audit = run_round(gen.clone(), reasoner.clone(), RevisionConfig::default()).await;

    assert_eq!(audit.outcome, RoundOutcome::Accepted);
    assert_eq!(audit.final_text, "draft 1");
    assert_eq!(audit.original_draft.as_deref(), Some("draft 1"));
    assert_eq!(audit.verdicts.len(), 1);
    assert!(audit.attempts.is_empty());
    assert!(!audit.was_revised());
    assert_eq!(gen.calls(), 1);
    assert_eq!(reasoner.calls(), 1);
    assert_eq!(audit.turn_index, 1);
}

#[tokio::test]
async fn test_reject_then_accept() {
    let gen = Arc::new(MockGenerator::numbered("draft"));
    let reasoner = Arc::new(MockReasoner::scripted(vec![REJECT], ACCEPT));
    let audit = run_round(gen.clone(), reasoner.clone(), RevisionConfig::default()).await;

    assert_eq!(audit.outcome, RoundOutcome::Accepted);
    assert_eq!(audit.final_text, "draft 2");
    assert_eq!(audit.verdicts.len(), 2);
    assert_eq!(audit.verdicts[0].conclusion, Conclusion::Reject);
    assert_eq!(audit.attempts.len(), 1);
    assert_eq!(audit.attempts[0].attempt_number, 1);
    assert_eq!(audit.attempts[0].draft_before, "draft 1");
    assert_eq!(
        audit.attempts[0].suggestion_applied,
        "reflect the client's feelings first"
    );

    // The second draft is steered by the suggestion and the original draft.
    let second = &gen.requests()[1];
    assert!(second.system_prompt.contains("reflect the client's feelings first"));
    assert!(second.system_prompt.contains("draft 1"));

    // The re-evaluation carries the numbered request history.
    let prompts = reasoner.prompts();
    assert!(prompts[1][1]
        .content
        .contains("Request 1: reflect the client's feelings first"));
}

// ── Cap exhaustion ─────────────────────────────────────────────────

#[tokio::test]
async fn test_cap_exhaustion_keeps_last_draft() {
    let gen = Arc::new(MockGenerator::numbered("draft"));
    let reasoner = Arc::new(MockReasoner::rejecting("slow down"));
    let audit = run_round(gen.clone(), reasoner.clone(), RevisionConfig::default()).await;

    assert_eq!(audit.outcome, RoundOutcome::Exhausted);
    assert_eq!(audit.attempts.len(), 3);
    assert_eq!(audit.verdicts.len(), 4);
    assert_eq!(audit.final_text, "draft 4");
    assert_eq!(audit.original_draft.as_deref(), Some("draft 1"));
    let numbers: Vec<u32> = audit.attempts.iter().map(|a| a.attempt_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    let befores: Vec<&str> = audit.attempts.iter().map(|a| a.draft_before.as_str()).collect();
    assert_eq!(befores, vec!["draft 1", "draft 2", "draft 3"]);
    assert_eq!(gen.calls(), 4);
    assert_eq!(reasoner.calls(), 4);
}

#[tokio::test]
async fn test_evaluations_bounded_by_cap_plus_one() {
    for cap in 1..=5 {
        let config = RevisionConfig {
            max_attempts: cap,
            ..RevisionConfig::default()
        };
        let reasoner = Arc::new(MockReasoner::rejecting("more warmth"));
        let audit = run_round(Arc::new(MockGenerator::numbered("d")), reasoner.clone(), config).await;
        assert_eq!(audit.verdicts.len(), cap as usize + 1);
        assert_eq!(audit.attempts.len(), cap as usize);
        assert_eq!(reasoner.calls(), cap as usize + 1);
        assert_eq!(audit.final_text, format!("d {}", cap + 1));
    }
}

#[tokio::test]
async fn test_third_request_marked_current() {
    let gen = Arc::new(MockGenerator::numbered("draft"));
    let reasoner = Arc::new(MockReasoner::scripted(
        vec![
            r#"{"verdict": "no", "suggestion": "first fix", "phase": "Set the agenda"}"#,
            r#"{"verdict": "no", "suggestion": "second fix", "phase": "Set the agenda"}"#,
        ],
        ACCEPT,
    ));
    let audit = run_round(gen.clone(), reasoner, RevisionConfig::default()).await;
    assert_eq!(audit.final_text, "draft 3");

    let third = &gen.requests()[2].system_prompt;
    assert!(third.contains("Request 1: first fix"));
    assert!(third.contains("Current request (2): second fix"));
    assert!(third.contains("draft 1"));
}

// ── Degraded services ──────────────────────────────────────────────

#[tokio::test]
async fn test_generator_failure_aborts_with_apology() {
    let reasoner = Arc::new(MockReasoner::accepting());
    let audit = run_round(
        Arc::new(MockGenerator::failing()),
        reasoner.clone(),
        RevisionConfig::default(),
    )
    .await;

    assert_eq!(audit.outcome, RoundOutcome::Aborted);
    assert_eq!(audit.final_text, PromptTemplates::default().counselor_apology);
    assert!(audit.error.is_some());
    assert!(audit.original_draft.is_none());
    assert!(audit.verdicts.is_empty());
    assert_eq!(reasoner.calls(), 0);
    assert_eq!(audit.transitions.last().map(|t| t.to), Some(RevisionPhase::Aborted));
}

#[tokio::test]
async fn test_generator_failure_mid_round() {
    let gen = Arc::new(MockGenerator::scripted(
        "draft",
        vec![Ok("first try".into()), Err("connection reset".into())],
    ));
    let reasoner = Arc::new(MockReasoner::rejecting("be concrete"));
    let audit = run_round(gen, reasoner.clone(), RevisionConfig::default()).await;

    assert_eq!(audit.outcome, RoundOutcome::Aborted);
    assert_eq!(audit.original_draft.as_deref(), Some("first try"));
    assert_eq!(audit.attempts.len(), 1);
    assert_eq!(audit.verdicts.len(), 1);
    assert_eq!(reasoner.calls(), 1);
    assert!(audit.error.as_deref().unwrap_or_default().contains("connection reset"));
}

#[tokio::test]
async fn test_evaluator_outage_exhausts_with_invalid_verdicts() {
    let audit = run_round(
        Arc::new(MockGenerator::numbered("draft")),
        Arc::new(MockReasoner::failing()),
        RevisionConfig::default(),
    )
    .await;

    assert_eq!(audit.outcome, RoundOutcome::Exhausted);
    assert_eq!(audit.verdicts.len(), 4);
    assert!(audit.verdicts.iter().all(|v| !v.valid && v.error.is_some()));
    assert_eq!(audit.final_text, "draft 4");
}

#[tokio::test]
async fn test_unparseable_verdict_is_recorded_invalid() {
    let reasoner = Arc::new(MockReasoner::repeating("I think this reply is fine, yes."));
    let audit = run_round(
        Arc::new(MockGenerator::numbered("draft")),
        reasoner,
        RevisionConfig::default(),
    )
    .await;
    assert!(!audit.verdicts[0].valid);
    assert!(audit.verdicts.len() <= 4);
}
