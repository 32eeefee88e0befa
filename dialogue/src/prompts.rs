//! Prompt templates: every piece of natural-language text the core sends.
//!
//! Templates are plain strings with `{name}` placeholders filled by
//! [`render`]. All of them can be replaced from the `[prompts]` table of the
//! config file; the defaults below are a working English set.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Template set for role turns, summaries, evaluation and fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    /// Client role instructions. Placeholder: `{profile}`.
    pub client_system: String,
    /// Counselor instructions for a first session.
    pub counselor_system: String,
    /// Counselor instructions for a follow-up session.
    pub counselor_follow_up_system: String,
    /// Appended to the counselor instructions during revision. Placeholder: `{guidance}`.
    pub guidance_block: String,

    /// Cumulative revision instruction. Placeholders: `{requests}`, `{original}`.
    pub modification_instruction: String,
    /// One earlier request inside `{requests}`. Placeholders: `{index}`, `{suggestion}`.
    pub modification_request: String,
    /// The newest request inside `{requests}`. Placeholders: `{index}`, `{suggestion}`.
    pub modification_current: String,
    /// One entry of the history shown to the revision evaluator.
    pub modification_history_entry: String,

    pub summary_system: String,
    /// Placeholders: `{history}`, `{recent}`.
    pub summary_user: String,
    /// Context handed downstream between summary triggers. Placeholders: `{summary}`, `{recent}`.
    pub incremental_context: String,

    /// First-evaluation instructions, first session.
    /// Placeholders: `{budget}`, `{turns}`, `{urgency}`, `{phases}`, `{answer_format}`.
    pub evaluation_first_session: String,
    /// First-evaluation instructions, follow-up session. Same placeholders.
    pub evaluation_follow_up: String,
    /// More than five turns remain. Placeholder: `{budget}`.
    pub urgency_plenty: String,
    /// Between zero and five turns remain. Placeholder: `{remaining}`.
    pub urgency_approaching: String,
    /// The budget is already spent. Placeholder: `{overrun}`.
    pub urgency_over: String,
    /// Placeholders: `{context}`, `{draft}`.
    pub evaluation_user: String,
    /// Revision-evaluation instructions. Placeholder: `{answer_format}`.
    pub revision_system: String,
    /// Placeholders: `{context}`, `{modifications}`, `{draft}`.
    pub revision_user: String,

    /// Substituted for a client turn whose generation failed.
    pub client_fallback: String,
    /// Substituted for a counselor turn whose generation failed.
    pub counselor_apology: String,

    /// Client opening lines for first sessions.
    pub client_openings: Vec<String>,
    /// Client opening lines for follow-up sessions.
    pub follow_up_openings: Vec<String>,
    /// Counselor greetings.
    pub counselor_greetings: Vec<String>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            client_system: "You are role-playing a person who has come to talk with a counselor. \
Stay in character, speak casually and briefly, and reveal details gradually as trust builds. \
Never mention that you are role-playing. Your background:\n{profile}"
                .to_string(),
            counselor_system: "You are an experienced counselor trained in cognitive behavioral therapy, \
meeting this client for the first time. Move the session through its stages at a natural pace, \
keep each reply short and conversational, ask one question at a time, and avoid repeating yourself. \
When the session is complete, close warmly and say goodbye."
                .to_string(),
            counselor_follow_up_system: "You are an experienced counselor trained in cognitive behavioral therapy, \
meeting this client again for a follow-up session. Check in on mood, review homework, work on a \
concrete problem, and close with a summary and new homework. Keep replies short and conversational. \
When the session is complete, close warmly and say goodbye."
                .to_string(),
            guidance_block: "\n\nYour previous reply needs revision. Follow these requests:\n{guidance}"
                .to_string(),
            modification_instruction: "{requests}\nYour original reply was: {original}".to_string(),
            modification_request: "Request {index}: {suggestion}".to_string(),
            modification_current: "Current request ({index}): {suggestion}".to_string(),
            modification_history_entry: "Request {index}: {suggestion}".to_string(),
            summary_system: "You summarize counseling conversations. Capture the client's concerns, \
emotions, key facts, what the counselor has covered so far, and any agreed next steps. \
Be concise and factual."
                .to_string(),
            summary_user: "Full conversation: {history}\nMost recent turns: {recent}\nWrite the summary."
                .to_string(),
            incremental_context: "Summary of the earlier conversation: {summary}\nCurrent chat records: {recent}"
                .to_string(),
            evaluation_first_session: "You are a senior counselor supervising a first cognitive behavioral \
therapy session. Decide whether the counselor's latest reply is appropriate for the current stage. \
If it is not, give an improvement suggestion; if the session has entered a stage, push it toward the \
next one. Do not write example replies. The session should take about {budget} turns; it is now at \
{turns}. {urgency}\nStages: {phases}\nAnswer strictly in this format: {answer_format}"
                .to_string(),
            evaluation_follow_up: "You are a senior counselor supervising a follow-up cognitive behavioral \
therapy session. Decide whether the counselor's latest reply is appropriate for the current stage. \
If it is not, give an improvement suggestion; if the session has entered a stage, push it toward the \
next one. Do not write example replies. The session should take about {budget} turns; it is now at \
{turns}. {urgency}\nStages: {phases}\nAnswer strictly in this format: {answer_format}"
                .to_string(),
            urgency_plenty: "Pace the session so it finishes within {budget} turns.".to_string(),
            urgency_approaching: "Make sure the session ends within the remaining {remaining} turns."
                .to_string(),
            urgency_over: "The session is already {overrun} turns over its length; bring it to a close now."
                .to_string(),
            evaluation_user: "Conversation so far: {context}\nCounselor reply: {draft}".to_string(),
            revision_system: "You are a senior counselor supervising a cognitive behavioral therapy session. \
Judge whether the counselor's revised reply satisfies the modification requests. If it still falls \
short, give a further suggestion. If the client is not cooperating, the stage may be skipped. \
Do not write example replies and do not push the counselor to repeat earlier moves.\n\
Answer strictly in this format: {answer_format}"
                .to_string(),
            revision_user: "Conversation so far: {context}\nModification requests: {modifications}\nCounselor reply: {draft}"
                .to_string(),
            client_fallback: "I'm not quite sure what to say right now...".to_string(),
            counselor_apology: "I need a moment to think. Let's pick this up again shortly."
                .to_string(),
            client_openings: [
                "Hi, a few things have been bothering me lately. Could we talk about them?",
                "My head has been a mess recently and I'd like some help sorting it out.",
                "I feel like my mood is off and I wanted to hear what you think.",
                "I've run into some problems I don't know how to handle.",
                "I'm a bit lost and can't tell what's going on with me.",
                "I haven't been doing well and I'd like to find a way through it.",
                "I think I might need some help, if you have time.",
                "There's a lot of pressure on me lately and I need to talk to someone.",
            ]
            .map(String::from)
            .to_vec(),
            follow_up_openings: [
                "I thought a lot after our last talk and have some new feelings to share.",
                "My mood has been up and down this week, so I wanted to come back.",
                "I tried what you suggested last time. Some of it helped, some of it was hard.",
                "I feel like I'm slipping back into my old state and it worries me.",
                "Something happened this week that I think we should talk about.",
            ]
            .map(String::from)
            .to_vec(),
            counselor_greetings: [
                "Hello, welcome. What would you like to talk about today?",
                "Hi, thanks for coming in. How have you been feeling lately?",
                "Welcome. Take your time, and tell me what brought you here today.",
                "Hello, I'm glad you came. Where would you like to start?",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([a-z_]+)\}").expect("PLACEHOLDER_RE regex should compile")
});

/// Fill `{name}` placeholders in one pass.
///
/// Unknown placeholders and literal braces are left as they are, and text
/// substituted from `vars` is never scanned again.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_known_placeholders() {
        let out = render("Hello {name}, turn {turn}", &[("name", "Ada"), ("turn", "3")]);
        assert_eq!(out, "Hello Ada, turn 3");
    }

    #[test]
    fn test_render_keeps_unknown_and_literal_braces() {
        let out = render(r#"{"verdict": "yes"} {missing}"#, &[("verdict", "x")]);
        assert_eq!(out, r#"{"verdict": "yes"} {missing}"#);
    }

    #[test]
    fn test_render_single_pass() {
        let out = render("{a} {b}", &[("a", "{b}"), ("b", "B")]);
        assert_eq!(out, "{b} B");
    }

    #[test]
    fn test_defaults_have_openings() {
        let t = PromptTemplates::default();
        assert!(!t.client_openings.is_empty());
        assert!(!t.follow_up_openings.is_empty());
        assert!(!t.counselor_greetings.is_empty());
        assert!(t.client_system.contains("{profile}"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let t: PromptTemplates = toml::from_str(r#"client_fallback = "..." "#).unwrap();
        assert_eq!(t.client_fallback, "...");
        assert_eq!(t.counselor_apology, PromptTemplates::default().counselor_apology);
    }
}
