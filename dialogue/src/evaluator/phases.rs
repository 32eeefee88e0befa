//! Phase taxonomies for first and follow-up sessions.
//!
//! Labels are descriptive only. The evaluator is asked to pick one, but
//! whatever text comes back is kept as-is.

use serde::{Deserialize, Serialize};

use crate::history::SessionKind;

/// Part of a follow-up session a phase belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseGroup {
    Opening,
    Middle,
    Closing,
}

impl std::fmt::Display for PhaseGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opening => write!(f, "opening"),
            Self::Middle => write!(f, "middle"),
            Self::Closing => write!(f, "closing"),
        }
    }
}

/// A named stage in a session taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    pub name: &'static str,
    pub group: Option<PhaseGroup>,
}

const fn phase(name: &'static str) -> Phase {
    Phase { name, group: None }
}

const fn grouped(group: PhaseGroup, name: &'static str) -> Phase {
    Phase {
        name,
        group: Some(group),
    }
}

/// First session, agenda-setting through homework.
pub const FIRST_SESSION_PHASES: [Phase; 8] = [
    phase("Set the agenda"),
    phase("Check the client's mood"),
    phase("Gather recent information"),
    phase("Discuss the diagnosis"),
    phase("Identify problems and set goals"),
    phase("Explain the cognitive model"),
    phase("Work on a problem or behavioral activation"),
    phase("Summarize and assign homework"),
];

/// Follow-up session, grouped into opening, middle and closing.
pub const FOLLOW_UP_PHASES: [Phase; 11] = [
    grouped(PhaseGroup::Opening, "Mood check"),
    grouped(PhaseGroup::Opening, "Set the agenda"),
    grouped(PhaseGroup::Opening, "Get an update"),
    grouped(PhaseGroup::Opening, "Review homework"),
    grouped(PhaseGroup::Opening, "Prioritize the agenda"),
    grouped(
        PhaseGroup::Middle,
        "Work on a specific problem and teach a CBT skill",
    ),
    grouped(PhaseGroup::Middle, "Follow up on related homework"),
    grouped(PhaseGroup::Middle, "Work on a second problem"),
    grouped(PhaseGroup::Closing, "Provide or elicit a summary"),
    grouped(PhaseGroup::Closing, "Review new homework"),
    grouped(PhaseGroup::Closing, "Ask for feedback"),
];

/// Ordered taxonomy for a session kind.
pub fn taxonomy(kind: SessionKind) -> &'static [Phase] {
    match kind {
        SessionKind::First => &FIRST_SESSION_PHASES,
        SessionKind::FollowUp => &FOLLOW_UP_PHASES,
    }
}

/// Numbered listing used in evaluator prompts.
pub fn describe(kind: SessionKind) -> String {
    let mut out = String::new();
    let mut current_group = None;
    for (i, phase) in taxonomy(kind).iter().enumerate() {
        if phase.group.is_some() && phase.group != current_group {
            current_group = phase.group;
            if let Some(group) = current_group {
                out.push_str(&format!("[{group}] "));
            }
        }
        out.push_str(&format!("{}. {}", i + 1, phase.name));
        out.push_str("; ");
    }
    out.trim_end_matches("; ").to_string()
}

/// Zero-based position of `label` in the taxonomy, ignoring case and
/// surrounding punctuation. `None` when the label is not a known phase.
pub fn position(kind: SessionKind, label: &str) -> Option<usize> {
    let wanted = label
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c.is_whitespace())
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace())
        .to_lowercase();
    taxonomy(kind)
        .iter()
        .position(|p| p.name.to_lowercase() == wanted)
}
