//! Opening-turn selection.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::history::{Mode, Role, SessionKind};
use crate::prompts::PromptTemplates;

/// Candidate lines for turn 0, chosen by mode and session kind.
pub fn candidates(templates: &PromptTemplates, mode: Mode, kind: SessionKind) -> &[String] {
    match (mode.opener(), kind) {
        (Role::Counselor, _) => &templates.counselor_greetings,
        (Role::Client, SessionKind::First) => &templates.client_openings,
        (Role::Client, SessionKind::FollowUp) => &templates.follow_up_openings,
    }
}

/// Pick an opening line. Empty lists yield an empty string.
pub fn pick(
    templates: &PromptTemplates,
    mode: Mode,
    kind: SessionKind,
    rng: &mut StdRng,
) -> String {
    candidates(templates, mode, kind)
        .choose(rng)
        .cloned()
        .unwrap_or_default()
}
