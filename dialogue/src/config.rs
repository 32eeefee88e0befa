//! Dialogue configuration loaded from TOML.
//!
//! Every table is optional; missing keys fall back to the defaults below.
//!
//! ```toml
//! [session]
//! client_first_max_turns = 4
//! counselor_first_max_turns = 50
//! termination_phrase = "goodbye"
//!
//! [revision]
//! max_attempts = 3
//! round_budget = 50
//!
//! [summary]
//! start = 13
//! buffer = 6
//! recent_turns = 8
//!
//! [verdict]
//! verdict_key = "verdict"
//!
//! [prompts]
//! client_fallback = "..."
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::evaluator::{VerdictParser, VerdictSchema};
use crate::history::Mode;
use crate::prompts::PromptTemplates;
use crate::revision::RevisionConfig;
use crate::summary::SummaryPolicy;

const DEFAULT_CLIENT_FIRST_MAX_TURNS: usize = 4;
const DEFAULT_COUNSELOR_FIRST_MAX_TURNS: usize = 50;
const DEFAULT_TERMINATION_PHRASE: &str = "goodbye";
const DEFAULT_CONVERSATION_TEMPERATURE: f32 = 0.8;

/// Turn ceilings and end-of-session detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Turn ceiling for client-first demonstration sessions.
    pub client_first_max_turns: usize,
    /// Turn ceiling for counselor-first extended sessions.
    pub counselor_first_max_turns: usize,
    /// Ends the session when it appears in the latest counselor turn (case-insensitive).
    pub termination_phrase: String,
    /// Sampling temperature for both role agents.
    pub conversation_temperature: f32,
    /// Fixed seed for opening selection; random when unset.
    pub opening_seed: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            client_first_max_turns: DEFAULT_CLIENT_FIRST_MAX_TURNS,
            counselor_first_max_turns: DEFAULT_COUNSELOR_FIRST_MAX_TURNS,
            termination_phrase: DEFAULT_TERMINATION_PHRASE.to_string(),
            conversation_temperature: DEFAULT_CONVERSATION_TEMPERATURE,
            opening_seed: None,
        }
    }
}

impl SessionSettings {
    pub fn max_turns(&self, mode: Mode) -> usize {
        match mode {
            Mode::ClientFirst => self.client_first_max_turns,
            Mode::CounselorFirst => self.counselor_first_max_turns,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    pub session: SessionSettings,
    pub revision: RevisionConfig,
    pub summary: SummaryPolicy,
    pub verdict: VerdictSchema,
    pub prompts: PromptTemplates,
}

impl DialogueConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("failed to parse dialogue config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        at_least_one("session.client_first_max_turns", self.session.client_first_max_turns)?;
        at_least_one("session.counselor_first_max_turns", self.session.counselor_first_max_turns)?;
        if self.session.termination_phrase.trim().is_empty() {
            return Err(ConfigError::Empty("session.termination_phrase"));
        }
        temperature("session.conversation_temperature", self.session.conversation_temperature)?;

        at_least_one("revision.max_attempts", self.revision.max_attempts as usize)?;
        at_least_one("revision.round_budget", self.revision.round_budget)?;

        at_least_one("summary.start", self.summary.start)?;
        at_least_one("summary.buffer", self.summary.buffer)?;
        temperature("summary.temperature", self.summary.temperature)?;

        for (field, key) in [
            ("verdict.verdict_key", &self.verdict.verdict_key),
            ("verdict.suggestion_key", &self.verdict.suggestion_key),
            ("verdict.phase_key", &self.verdict.phase_key),
        ] {
            if key.trim().is_empty() {
                return Err(ConfigError::Empty(field));
            }
        }

        for (field, list) in [
            ("prompts.client_openings", &self.prompts.client_openings),
            ("prompts.follow_up_openings", &self.prompts.follow_up_openings),
            ("prompts.counselor_greetings", &self.prompts.counselor_greetings),
        ] {
            if list.is_empty() {
                return Err(ConfigError::Empty(field));
            }
        }
        Ok(())
    }

    pub fn verdict_parser(&self) -> Result<VerdictParser, ConfigError> {
        VerdictParser::new(self.verdict.clone())
            .map_err(|e| ConfigError::VerdictPattern(e.to_string()))
    }
}

fn at_least_one(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::OutOfRange {
            field,
            requirement: "at least 1",
            value: value.to_string(),
        });
    }
    Ok(())
}

fn temperature(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=2.0).contains(&value) {
        return Err(ConfigError::OutOfRange {
            field,
            requirement: "between 0.0 and 2.0",
            value: value.to_string(),
        });
    }
    Ok(())
}
