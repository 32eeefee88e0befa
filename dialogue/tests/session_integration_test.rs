//! Mocked session integration test: runs whole counseling sessions with
//! deterministic mock services (no network calls).
//!
//! Covers: orchestrator ↔ revision loop ↔ summarizer ↔ artifacts running
//! together end to end.

use std::sync::Arc;

use dialogue::artifacts::ArtifactKind;
use dialogue::prompts::PromptTemplates;
use dialogue::session::TurnReport;
use dialogue::transport::{MessageRole, MockGenerator, MockReasoner};
use dialogue::{
    ArtifactSink, CounselingSession, DialogueConfig, EndReason, JsonDirectorySink, Mode, Role,
    SessionError, SessionKind, SessionPhase, SessionServices, SessionSpec,
};

const ACCEPT: &str = r#"{"verdict": "yes", "suggestion": "none", "phase": "Set the agenda"}"#;
const REJECT: &str = r#"{"verdict": "no", "suggestion": "ask about sleep", "phase": "Mood check"}"#;

fn spec(mode: Mode, kind: SessionKind) -> SessionSpec {
    SessionSpec {
        id: "client_042".into(),
        profile: "41-year-old teacher, recently divorced, low mood and poor sleep".into(),
        mode,
        kind,
    }
}

fn config() -> DialogueConfig {
    let mut config = DialogueConfig::default();
    config.session.opening_seed = Some(42);
    config
}

struct Fixture {
    conversation: Arc<MockGenerator>,
    summary: Arc<MockGenerator>,
    reasoner: Arc<MockReasoner>,
}

impl Fixture {
    fn new(conversation: MockGenerator, reasoner: MockReasoner) -> Self {
        Self {
            conversation: Arc::new(conversation),
            summary: Arc::new(MockGenerator::numbered("summary")),
            reasoner: Arc::new(reasoner),
        }
    }

    fn session(&self, spec: SessionSpec, config: &DialogueConfig) -> CounselingSession {
        let services = SessionServices {
            conversation: self.conversation.clone(),
            summary: self.summary.clone(),
            reasoner: self.reasoner.clone(),
        };
        CounselingSession::new(spec, config, services).unwrap()
    }
}

// ── Termination ────────────────────────────────────────────────────

#[tokio::test]
async fn test_counselor_first_runs_to_ceiling_of_fifty() {
    let fx = Fixture::new(MockGenerator::numbered("line"), MockReasoner::accepting());
    let mut session = fx.session(spec(Mode::CounselorFirst, SessionKind::First), &config());
    let artifacts = session.run().await.unwrap();

    assert_eq!(artifacts.dialogue.len(), 50);
    assert_eq!(session.end_reason(), Some(&EndReason::TurnCeiling { turns: 50 }));
    assert_eq!(session.phase(), SessionPhase::Ended);
    for (i, turn) in artifacts.dialogue.iter().enumerate() {
        let expected = if i % 2 == 0 { Role::Counselor } else { Role::Client };
        assert_eq!(turn.role, expected, "turn {i}");
    }
    // Counselor rounds at indices 2, 4, ... 48.
    assert_eq!(artifacts.reasoning.len(), 24);
    assert_eq!(artifacts.summary.rounds, 24);
}

#[tokio::test]
async fn test_farewell_only_ends_on_counselor_turn() {
    let fx = Fixture::new(
        MockGenerator::scripted(
            "line",
            vec![
                Ok("I just feel stuck.".into()),
                Ok("Tell me more about feeling stuck.".into()),
                Ok("Okay, goodbye then!".into()),
                Ok("Thank you for today. Goodbye, take care.".into()),
            ],
        ),
        MockReasoner::accepting(),
    );
    let mut session = fx.session(spec(Mode::CounselorFirst, SessionKind::First), &config());
    let artifacts = session.run().await.unwrap();

    assert_eq!(artifacts.dialogue.len(), 5);
    assert_eq!(artifacts.dialogue[3].role, Role::Client);
    assert_eq!(session.end_reason(), Some(&EndReason::Farewell { turn_index: 4 }));
}

#[tokio::test]
async fn test_farewell_phrase_is_configurable() {
    let mut config = config();
    config.session.termination_phrase = "See You Next Week".into();
    let fx = Fixture::new(
        MockGenerator::scripted(
            "line",
            vec![Ok("see you next week".into()), Ok("fine".into())],
        ),
        MockReasoner::accepting(),
    );
    let mut session = fx.session(spec(Mode::ClientFirst, SessionKind::First), &config);
    session.run().await.unwrap();
    assert_eq!(session.end_reason(), Some(&EndReason::Farewell { turn_index: 1 }));
}

#[tokio::test]
async fn test_next_turn_reports_end() {
    let fx = Fixture::new(MockGenerator::numbered("line"), MockReasoner::accepting());
    let mut session = fx.session(spec(Mode::ClientFirst, SessionKind::First), &config());

    let mut reports: Vec<TurnReport> = Vec::new();
    while !session.is_ended() {
        reports.push(session.next_turn().await.unwrap());
    }
    assert_eq!(reports.len(), 4);
    assert_eq!(reports[0].round, None);
    assert_eq!(reports[1].round, Some(1));
    assert_eq!(reports[3].round, Some(2));
    assert!(reports[..3].iter().all(|r| r.ended.is_none()));
    assert_eq!(reports[3].ended, Some(EndReason::TurnCeiling { turns: 4 }));
    assert!(matches!(
        session.next_turn().await,
        Err(SessionError::AlreadyEnded(_))
    ));
}

#[tokio::test]
async fn test_abort_mid_session() {
    let fx = Fixture::new(MockGenerator::numbered("line"), MockReasoner::accepting());
    let mut session = fx.session(spec(Mode::CounselorFirst, SessionKind::First), &config());
    session.next_turn().await.unwrap();
    session.next_turn().await.unwrap();
    session.abort("shutdown").unwrap();

    let artifacts = session.artifacts();
    assert_eq!(artifacts.dialogue.len(), 2);
    assert_eq!(
        artifacts.summary.end_reason,
        Some(EndReason::Aborted {
            reason: "shutdown".into()
        })
    );
    let phases: Vec<SessionPhase> = session.transitions().iter().map(|t| t.to).collect();
    assert_eq!(phases, vec![SessionPhase::InProgress, SessionPhase::Ended]);
}

// ── Openings and projection ────────────────────────────────────────

#[tokio::test]
async fn test_follow_up_client_opening() {
    let fx = Fixture::new(MockGenerator::numbered("line"), MockReasoner::accepting());
    let mut session = fx.session(spec(Mode::ClientFirst, SessionKind::FollowUp), &config());
    session.next_turn().await.unwrap();

    let opening = &session.history().turns()[0];
    assert_eq!(opening.role, Role::Client);
    assert!(PromptTemplates::default()
        .follow_up_openings
        .contains(&opening.content));
}

#[tokio::test]
async fn test_requests_use_each_role_perspective() {
    let fx = Fixture::new(MockGenerator::numbered("line"), MockReasoner::accepting());
    let mut session = fx.session(spec(Mode::ClientFirst, SessionKind::First), &config());
    session.run().await.unwrap();

    let requests = fx.conversation.requests();
    // Counselor draft at index 1: the client opening is the counterpart.
    let roles: Vec<MessageRole> = requests[0].messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![MessageRole::User]);
    // Client turn at index 2: opening is its own, the counselor reply is not.
    let roles: Vec<MessageRole> = requests[1].messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![MessageRole::Assistant, MessageRole::User]);
    assert!(requests[1].system_prompt.contains("recently divorced"));
}

// ── Degraded services ──────────────────────────────────────────────

#[tokio::test]
async fn test_client_failure_substitutes_fallback() {
    let fx = Fixture::new(
        MockGenerator::scripted("line", vec![Ok("How are you?".into()), Err("timeout".into())]),
        MockReasoner::accepting(),
    );
    let mut session = fx.session(spec(Mode::ClientFirst, SessionKind::First), &config());
    let artifacts = session.run().await.unwrap();

    assert_eq!(artifacts.dialogue.len(), 4);
    let fallback = &artifacts.dialogue[2];
    assert_eq!(fallback.role, Role::Client);
    assert_eq!(fallback.content, PromptTemplates::default().client_fallback);
    assert!(fallback.is_fallback());
    assert_eq!(artifacts.summary.fallback_turns, 1);
}

// ── Revision trail ─────────────────────────────────────────────────

#[tokio::test]
async fn test_original_transcript_keeps_first_drafts() {
    let fx = Fixture::new(
        MockGenerator::numbered("line"),
        MockReasoner::scripted(vec![REJECT], ACCEPT),
    );
    let mut session = fx.session(spec(Mode::ClientFirst, SessionKind::First), &config());
    let artifacts = session.run().await.unwrap();

    assert_eq!(artifacts.dialogue[1].content, "line 2");
    assert_eq!(artifacts.original_dialogue[1].content, "line 1");
    assert_eq!(artifacts.dialogue[0], artifacts.original_dialogue[0]);
    assert_eq!(artifacts.comments.len(), 1);
    assert_eq!(artifacts.comments[0].round, 1);
    assert_eq!(artifacts.comments[0].attempts[0].suggestion_applied, "ask about sleep");

    let meta = artifacts.dialogue[1].metadata.clone().unwrap();
    assert_eq!(meta.revision_attempts, Some(1));
    assert_eq!(meta.phase_label.as_deref(), Some("Set the agenda"));
    assert_eq!(meta.verdict_valid, Some(true));
    assert_eq!(artifacts.summary.revised_rounds, 1);
    assert_eq!(artifacts.summary.furthest_phase.as_deref(), Some("Set the agenda"));
}

// ── Summaries ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_summaries_fire_at_exact_turn_counts() {
    let fx = Fixture::new(MockGenerator::numbered("line"), MockReasoner::accepting());
    let mut session = fx.session(spec(Mode::CounselorFirst, SessionKind::First), &config());

    while session.history().len() < 13 {
        session.next_turn().await.unwrap();
    }
    assert_eq!(fx.summary.calls(), 1);
    assert_eq!(session.history().summarized_at(), Some(13));

    let artifacts = session.run().await.unwrap();
    // 13, 19, 25, 31, 37, 43, 49; the 50th turn ends the session.
    assert_eq!(fx.summary.calls(), 7);
    assert_eq!(artifacts.summary_history.len(), 7);
    assert_eq!(artifacts.summary_history[0], "summary 1");
    assert_eq!(artifacts.summary.summaries, 7);
}

#[tokio::test]
async fn test_evaluator_sees_summary_after_threshold() {
    let fx = Fixture::new(MockGenerator::numbered("line"), MockReasoner::accepting());
    let mut session = fx.session(spec(Mode::ClientFirst, SessionKind::First), &{
        let mut c = config();
        c.session.client_first_max_turns = 16;
        c
    });
    session.run().await.unwrap();

    // The round at n = 15 is the first after the summary at 13.
    let prompts = fx.reasoner.prompts();
    let last_user = &prompts.last().unwrap()[1].content;
    assert!(last_user.contains("summary 1"));
}

// ── Persistence ────────────────────────────────────────────────────

#[tokio::test]
async fn test_artifacts_written_as_five_files() {
    let fx = Fixture::new(
        MockGenerator::numbered("line"),
        MockReasoner::scripted(vec![REJECT], ACCEPT),
    );
    let mut session = fx.session(spec(Mode::ClientFirst, SessionKind::First), &config());
    let artifacts = session.run().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let sink = JsonDirectorySink::new(dir.path());
    assert!(!sink.exists("client_042").await);
    let written = sink.persist("client_042", &artifacts).await.unwrap();
    assert_eq!(written.len(), 5);
    assert!(sink.exists("client_042").await);

    for kind in ArtifactKind::ALL {
        assert!(kind.path(dir.path(), "client_042").exists(), "{kind} missing");
    }

    let dialogue: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(ArtifactKind::Dialogue.path(dir.path(), "client_042")).unwrap(),
    )
    .unwrap();
    assert_eq!(dialogue.as_array().map(Vec::len), Some(4));

    let summary: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(ArtifactKind::DialogueSummary.path(dir.path(), "client_042"))
            .unwrap(),
    )
    .unwrap();
    assert_eq!(summary["statistics"]["total_turns"], 4);
}

#[tokio::test]
async fn test_sink_rejects_path_like_ids() {
    let fx = Fixture::new(MockGenerator::numbered("line"), MockReasoner::accepting());
    let mut session = fx.session(spec(Mode::ClientFirst, SessionKind::First), &config());
    let artifacts = session.run().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let sink = JsonDirectorySink::new(dir.path());
    assert!(sink.persist("../escape", &artifacts).await.is_err());
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let mut config = config();
    config.revision.max_attempts = 0;
    let services = SessionServices::shared(
        Arc::new(MockGenerator::numbered("line")),
        Arc::new(MockReasoner::accepting()),
    );
    let result = CounselingSession::new(spec(Mode::ClientFirst, SessionKind::First), &config, services);
    assert!(matches!(result, Err(SessionError::Config(_))));
}
