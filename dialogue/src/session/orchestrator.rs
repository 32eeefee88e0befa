//! Session orchestrator: alternates speakers until the session ends.
//!
//! Each call to [`CounselingSession::next_turn`] commits exactly one turn.
//! Client turns are single-shot; counselor turns go through the revision
//! loop. After every append the end conditions are checked, and if the
//! session continues the summarizer gets a chance to fire.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::openings;
use super::state::{EndReason, SessionPhase, SessionTransition};
use crate::agents::{ClientAgent, CounselorAgent};
use crate::artifacts::{RoundRevisions, SessionArtifacts, SessionSummary};
use crate::config::{DialogueConfig, SessionSettings};
use crate::errors::SessionError;
use crate::evaluator::{phases, Evaluator};
use crate::history::{DialogueHistory, Mode, Role, SessionKind, Turn, TurnMetadata};
use crate::prompts::PromptTemplates;
use crate::revision::{RevisionConfig, RevisionLoop, RoundAudit, RoundInput, RoundOutcome};
use crate::summary::SummaryEngine;
use crate::transport::{Reasoner, TextGenerator};

/// External services a session talks to.
#[derive(Clone)]
pub struct SessionServices {
    /// Generates client and counselor turns.
    pub conversation: Arc<dyn TextGenerator>,
    /// Generates running summaries.
    pub summary: Arc<dyn TextGenerator>,
    /// Judges counselor drafts.
    pub reasoner: Arc<dyn Reasoner>,
}

impl SessionServices {
    /// One generator for both conversation and summaries.
    pub fn shared(generator: Arc<dyn TextGenerator>, reasoner: Arc<dyn Reasoner>) -> Self {
        Self {
            conversation: generator.clone(),
            summary: generator,
            reasoner,
        }
    }
}

/// Identity and setup of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSpec {
    /// Base identifier used for artifact names.
    pub id: String,
    /// Client profile text.
    pub profile: String,
    pub mode: Mode,
    pub kind: SessionKind,
}

/// What one `next_turn` call committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub index: usize,
    pub role: Role,
    pub fallback: bool,
    /// Counselor round number, for counselor turns after the opening.
    pub round: Option<u32>,
    /// Set when this turn ended the session.
    pub ended: Option<EndReason>,
}

pub struct CounselingSession {
    spec: SessionSpec,
    run_id: Uuid,
    settings: SessionSettings,
    revision: RevisionConfig,
    templates: Arc<PromptTemplates>,
    client: ClientAgent,
    counselor: CounselorAgent,
    evaluator: Evaluator,
    summarizer: SummaryEngine,
    rng: StdRng,
    phase: SessionPhase,
    history: DialogueHistory,
    /// Pre-revision transcript, kept in lockstep with `history`.
    original: Vec<Turn>,
    audits: Vec<RoundAudit>,
    transitions: Vec<SessionTransition>,
    end_reason: Option<EndReason>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl CounselingSession {
    pub fn new(
        spec: SessionSpec,
        config: &DialogueConfig,
        services: SessionServices,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let parser = config.verdict_parser()?;
        let templates = Arc::new(config.prompts.clone());
        let temperature = config.session.conversation_temperature;

        let client = ClientAgent::new(
            services.conversation.clone(),
            &templates,
            &spec.profile,
            temperature,
        );
        let counselor = CounselorAgent::new(
            services.conversation,
            templates.clone(),
            spec.kind,
            temperature,
        );
        let evaluator = Evaluator::new(services.reasoner, templates.clone(), parser);
        let summarizer = SummaryEngine::new(services.summary, templates.clone(), config.summary);
        let rng = match config.session.opening_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            spec,
            run_id: Uuid::new_v4(),
            settings: config.session.clone(),
            revision: config.revision,
            templates,
            client,
            counselor,
            evaluator,
            summarizer,
            rng,
            phase: SessionPhase::NotStarted,
            history: DialogueHistory::new(),
            original: Vec::new(),
            audits: Vec::new(),
            transitions: Vec::new(),
            end_reason: None,
            started_at: None,
            ended_at: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn spec(&self) -> &SessionSpec {
        &self.spec
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_ended(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn history(&self) -> &DialogueHistory {
        &self.history
    }

    pub fn original_transcript(&self) -> &[Turn] {
        &self.original
    }

    pub fn audits(&self) -> &[RoundAudit] {
        &self.audits
    }

    pub fn transitions(&self) -> &[SessionTransition] {
        &self.transitions
    }

    pub fn end_reason(&self) -> Option<&EndReason> {
        self.end_reason.as_ref()
    }

    /// Role of the next speaker: the one that did not produce the latest turn.
    pub fn next_speaker(&self) -> Role {
        match self.history.last() {
            Some(turn) => turn.role.counterpart(),
            None => self.spec.mode.opener(),
        }
    }

    /// Generate and commit exactly one turn.
    pub async fn next_turn(&mut self) -> Result<TurnReport, SessionError> {
        if self.phase.is_terminal() {
            return Err(SessionError::AlreadyEnded(self.spec.id.clone()));
        }
        if self.phase == SessionPhase::NotStarted {
            self.enter(SessionPhase::InProgress, "first turn requested")?;
            self.started_at = Some(Utc::now());
        }

        let index = self.history.len();
        let role = self.next_speaker();
        let mut round = None;

        let turn = if index == 0 {
            let opening = openings::pick(&self.templates, self.spec.mode, self.spec.kind, &mut self.rng);
            debug!(session_id = %self.spec.id, role = %role, "Opening turn selected");
            let turn = Turn::new(role, opening);
            self.original.push(turn.clone());
            turn
        } else {
            match role {
                Role::Client => self.client_turn().await,
                Role::Counselor => {
                    let (turn, number) = self.counselor_turn().await?;
                    round = Some(number);
                    turn
                }
            }
        };

        let fallback = turn.is_fallback();
        self.history.push(turn);
        debug!(session_id = %self.spec.id, turn = index, role = %role, fallback, "Turn committed");

        let ended = self.check_end();
        match &ended {
            Some(reason) => self.finish(reason.clone())?,
            None => {
                self.summarizer.refresh(&mut self.history).await;
            }
        }

        Ok(TurnReport {
            index,
            role,
            fallback,
            round,
            ended,
        })
    }

    /// Drive the session to its end and return the artifacts.
    pub async fn run(&mut self) -> Result<SessionArtifacts, SessionError> {
        info!(
            session_id = %self.spec.id,
            run_id = %self.run_id,
            mode = %self.spec.mode,
            kind = %self.spec.kind,
            "Session starting"
        );
        while !self.is_ended() {
            self.next_turn().await?;
        }
        Ok(self.artifacts())
    }

    /// End the session early. A no-op once it has ended.
    pub fn abort(&mut self, reason: impl Into<String>) -> Result<(), SessionError> {
        if self.is_ended() {
            return Ok(());
        }
        self.finish(EndReason::Aborted {
            reason: reason.into(),
        })
    }

    async fn client_turn(&mut self) -> Turn {
        let turn = match self.client.respond(&self.history, self.spec.mode).await {
            Ok(text) => Turn::new(Role::Client, text),
            Err(e) => {
                warn!(
                    session_id = %self.spec.id,
                    turn = self.history.len(),
                    error = %e,
                    "Client generation failed, substituting fallback utterance"
                );
                Turn::new(Role::Client, self.templates.client_fallback.clone()).with_metadata(
                    TurnMetadata {
                        fallback: true,
                        error: Some(e.to_string()),
                        ..TurnMetadata::default()
                    },
                )
            }
        };
        self.original.push(turn.clone());
        turn
    }

    async fn counselor_turn(&mut self) -> Result<(Turn, u32), SessionError> {
        let round = self.audits.len() as u32 + 1;
        let context = self.summarizer.prepare(&mut self.history).await;

        let revision = RevisionLoop::new(
            &self.counselor,
            &self.evaluator,
            &self.templates,
            self.revision,
        );
        let audit = revision
            .run(RoundInput {
                round,
                history: &self.history,
                mode: self.spec.mode,
                session_kind: self.spec.kind,
                context: &context.context,
            })
            .await?;

        let last = audit.last_verdict();
        let metadata = TurnMetadata {
            revision_attempts: Some(audit.attempts.len() as u32),
            phase_label: last.map(|v| v.phase_label.clone()),
            verdict_valid: last.map(|v| v.valid),
            fallback: audit.outcome == RoundOutcome::Aborted,
            error: audit.error.clone(),
        };
        let turn = Turn::new(Role::Counselor, audit.final_text.clone()).with_metadata(metadata);
        let original = audit
            .original_draft
            .clone()
            .unwrap_or_else(|| audit.final_text.clone());
        self.original.push(Turn::new(Role::Counselor, original));
        self.audits.push(audit);
        Ok((turn, round))
    }

    fn check_end(&self) -> Option<EndReason> {
        let last = self.history.last()?;
        let count = self.history.len();
        if last.role == Role::Counselor && contains_phrase(&last.content, &self.settings.termination_phrase) {
            return Some(EndReason::Farewell {
                turn_index: count - 1,
            });
        }
        if count >= self.settings.max_turns(self.spec.mode) {
            return Some(EndReason::TurnCeiling { turns: count });
        }
        None
    }

    fn finish(&mut self, reason: EndReason) -> Result<(), SessionError> {
        self.enter(SessionPhase::Ended, &reason.to_string())?;
        info!(
            session_id = %self.spec.id,
            run_id = %self.run_id,
            turns = self.history.len(),
            rounds = self.audits.len(),
            reason = %reason,
            "Session ended"
        );
        self.end_reason = Some(reason);
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    fn enter(&mut self, to: SessionPhase, reason: &str) -> Result<(), SessionError> {
        let from = self.phase;
        self.phase = from.transition(to)?;
        self.transitions.push(SessionTransition {
            from,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Snapshot of everything persisted for this session.
    pub fn artifacts(&self) -> SessionArtifacts {
        let comments = self
            .audits
            .iter()
            .filter(|a| a.was_revised())
            .map(|a| RoundRevisions {
                round: a.round,
                turn_index: a.turn_index,
                attempts: a.attempts.clone(),
            })
            .collect();

        SessionArtifacts {
            session_id: self.spec.id.clone(),
            dialogue: self.history.turns().to_vec(),
            original_dialogue: self.original.clone(),
            reasoning: self.audits.clone(),
            comments,
            summary_history: self.history.summary_history().to_vec(),
            summary: self.summary(),
        }
    }

    fn summary(&self) -> SessionSummary {
        let stats = self.history.stats();
        let count = |outcome: RoundOutcome| self.audits.iter().filter(|a| a.outcome == outcome).count();
        let furthest_phase = self
            .audits
            .iter()
            .flat_map(|a| a.verdicts.iter())
            .filter_map(|v| {
                phases::position(self.spec.kind, &v.phase_label).map(|p| (p, v.phase_label.clone()))
            })
            .max_by_key(|(p, _)| *p)
            .map(|(_, label)| label);

        SessionSummary {
            session_id: self.spec.id.clone(),
            run_id: self.run_id,
            mode: self.spec.mode,
            kind: self.spec.kind,
            total_turns: stats.total_turns,
            client_turns: stats.client_turns,
            counselor_turns: stats.counselor_turns,
            rounds: self.audits.len(),
            revised_rounds: self.audits.iter().filter(|a| a.was_revised()).count(),
            revision_attempts: self.audits.iter().map(|a| a.attempts.len()).sum(),
            exhausted_rounds: count(RoundOutcome::Exhausted),
            aborted_rounds: count(RoundOutcome::Aborted),
            degraded_verdicts: self
                .audits
                .iter()
                .flat_map(|a| a.verdicts.iter())
                .filter(|v| !v.valid)
                .count(),
            fallback_turns: self.history.turns().iter().filter(|t| t.is_fallback()).count(),
            summaries: stats.summaries,
            furthest_phase,
            end_reason: self.end_reason.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.to_lowercase().contains(&phrase.to_lowercase())
}
