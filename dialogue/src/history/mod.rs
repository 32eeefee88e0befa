//! Dialogue history: turns, roles, session modes, and the running summary.
//!
//! History is append-only. The summary fields are written only through
//! [`DialogueHistory::record_summary`] and [`DialogueHistory::mark_summarized`],
//! which the summarizer calls when a trigger fires.

pub mod projection;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use projection::{parity_table, perspective_at, project, ParitySlot, ParityTable, Perspective};

/// One of the two dialogue parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Counselor,
}

impl Role {
    /// The other party.
    pub fn counterpart(self) -> Self {
        match self {
            Self::Client => Self::Counselor,
            Self::Counselor => Self::Client,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Counselor => write!(f, "counselor"),
        }
    }
}

/// Which party opens the session. Fixed for the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Client speaks first; short demonstration sessions.
    ClientFirst,
    /// Counselor greets first; extended sessions.
    CounselorFirst,
}

impl Mode {
    /// Role that produces turn 0.
    pub fn opener(self) -> Role {
        match self {
            Self::ClientFirst => Role::Client,
            Self::CounselorFirst => Role::Counselor,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientFirst => write!(f, "client_first"),
            Self::CounselorFirst => write!(f, "counselor_first"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "client_first" | "client" => Ok(Self::ClientFirst),
            "counselor_first" | "counselor" => Ok(Self::CounselorFirst),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

/// First intake session or a follow-up. Selects evaluator framing and phase taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    First,
    FollowUp,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::FollowUp => write!(f, "follow_up"),
        }
    }
}

impl FromStr for SessionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "first" | "intake" => Ok(Self::First),
            "follow_up" | "followup" | "second" => Ok(Self::FollowUp),
            other => Err(format!("unknown session kind: {other}")),
        }
    }
}

/// Audit details attached to a committed turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// Revision attempts spent on this counselor turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_attempts: Option<u32>,
    /// Phase label from the last verdict of the round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_label: Option<String>,
    /// Whether the last verdict of the round parsed cleanly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict_valid: Option<bool>,
    /// Content is a fixed placeholder substituted after a transport failure.
    #[serde(default)]
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single utterance. Its sequence index is its position in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TurnMetadata>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: TurnMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether this turn carries a fallback placeholder instead of generated text.
    pub fn is_fallback(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.fallback)
    }
}

/// Turn counts for statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_turns: usize,
    pub client_turns: usize,
    pub counselor_turns: usize,
    pub summaries: usize,
}

/// Ordered turns plus the running summary state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialogueHistory {
    turns: Vec<Turn>,
    current_summary: Option<String>,
    summary_history: Vec<String>,
    /// Turn count at which the last summary trigger was consumed.
    summarized_at: Option<usize>,
}

impl DialogueHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return its sequence index.
    pub fn push(&mut self, turn: Turn) -> usize {
        self.turns.push(turn);
        self.turns.len() - 1
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn current_summary(&self) -> Option<&str> {
        self.current_summary.as_deref()
    }

    pub fn summary_history(&self) -> &[String] {
        &self.summary_history
    }

    pub fn summarized_at(&self) -> Option<usize> {
        self.summarized_at
    }

    /// Store a fresh summary produced at turn count `n`.
    pub fn record_summary(&mut self, n: usize, summary: String) {
        self.summary_history.push(summary.clone());
        self.current_summary = Some(summary);
        self.summarized_at = Some(n);
    }

    /// Consume the trigger at `n` without storing a summary.
    pub fn mark_summarized(&mut self, n: usize) {
        self.summarized_at = Some(n);
    }

    /// Serialize the whole history as a turn list.
    pub fn to_turn_list(&self) -> String {
        serialize_turns(&self.turns)
    }

    pub fn stats(&self) -> HistoryStats {
        let client_turns = self
            .turns
            .iter()
            .filter(|t| t.role == Role::Client)
            .count();
        HistoryStats {
            total_turns: self.turns.len(),
            client_turns,
            counselor_turns: self.turns.len() - client_turns,
            summaries: self.summary_history.len(),
        }
    }
}

/// Serialize turns as a JSON array of single-entry `{"<role>": "<content>"}` objects.
pub fn serialize_turns(turns: &[Turn]) -> String {
    let entries: Vec<Value> = turns
        .iter()
        .map(|t| {
            let mut entry = serde_json::Map::new();
            entry.insert(t.role.to_string(), Value::String(t.content.clone()));
            Value::Object(entry)
        })
        .collect();
    Value::Array(entries).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_returns_index() {
        let mut history = DialogueHistory::new();
        assert_eq!(history.push(Turn::new(Role::Client, "hi")), 0);
        assert_eq!(history.push(Turn::new(Role::Counselor, "hello")), 1);
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().role, Role::Counselor);
    }

    #[test]
    fn test_serialize_turns_format() {
        let turns = vec![
            Turn::new(Role::Client, "I feel low"),
            Turn::new(Role::Counselor, "Tell me more"),
        ];
        let json = serialize_turns(&turns);
        let parsed: Vec<serde_json::Map<String, Value>> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["client"], "I feel low");
        assert_eq!(parsed[1]["counselor"], "Tell me more");
    }

    #[test]
    fn test_to_turn_list_through_mut_ref() {
        let mut history = DialogueHistory::new();
        history.push(Turn::new(Role::Client, "I feel low"));
        let borrowed: &mut DialogueHistory = &mut history;
        let json = borrowed.to_turn_list();
        assert_eq!(json, r#"[{"client":"I feel low"}]"#);
        assert_eq!(json, serialize_turns(borrowed.turns()));
    }

    #[test]
    fn test_record_summary_updates_state() {
        let mut history = DialogueHistory::new();
        history.record_summary(13, "summary one".into());
        assert_eq!(history.current_summary(), Some("summary one"));
        assert_eq!(history.summary_history(), ["summary one".to_string()]);
        assert_eq!(history.summarized_at(), Some(13));

        history.mark_summarized(19);
        assert_eq!(history.current_summary(), Some("summary one"));
        assert_eq!(history.summary_history().len(), 1);
        assert_eq!(history.summarized_at(), Some(19));
    }

    #[test]
    fn test_stats_counts_roles() {
        let mut history = DialogueHistory::new();
        history.push(Turn::new(Role::Counselor, "hello"));
        history.push(Turn::new(Role::Client, "hi"));
        history.push(Turn::new(Role::Counselor, "how are you"));
        let stats = history.stats();
        assert_eq!(stats.total_turns, 3);
        assert_eq!(stats.counselor_turns, 2);
        assert_eq!(stats.client_turns, 1);
    }

    #[test]
    fn test_mode_and_kind_parse() {
        assert_eq!("client-first".parse::<Mode>().unwrap(), Mode::ClientFirst);
        assert_eq!("counselor_first".parse::<Mode>().unwrap(), Mode::CounselorFirst);
        assert!("sideways".parse::<Mode>().is_err());
        assert_eq!("follow-up".parse::<SessionKind>().unwrap(), SessionKind::FollowUp);
        assert_eq!(Mode::CounselorFirst.opener(), Role::Counselor);
        assert_eq!(Role::Client.counterpart(), Role::Counselor);
    }

    #[test]
    fn test_fallback_flag() {
        let turn = Turn::new(Role::Client, "...").with_metadata(TurnMetadata {
            fallback: true,
            ..Default::default()
        });
        assert!(turn.is_fallback());
        assert!(!Turn::new(Role::Client, "hi").is_fallback());
    }
}
