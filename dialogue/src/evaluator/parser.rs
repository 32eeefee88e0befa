//! Verdict parser: three independent extractions from free-form text.
//!
//! Evaluator output is expected to resemble
//! `{"verdict": "...", "suggestion": "...", "phase": "..."}` but often does
//! not: fields arrive out of order, unquoted, wrapped in extra braces, or
//! followed by chatter. Each field is located by its key followed by a colon
//! and read independently. Quoted keys win over bare ones, and a bare key
//! inside a quoted value is prose, not a field. When no key/value pair is found at all, coarse
//! heuristics fill the fields and the result is tagged `Degraded`.
//!
//! Parsing never fails.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::verdict::{Conclusion, ParsedVerdict, VerdictFields};

const QUOTES: &[char] = &['"', '\'', '“', '”', '‘', '’'];
const VALUE_STOPS: &[char] = &[',', '，', '}', '\n'];

/// Field names and vocabulary the parser looks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictSchema {
    pub verdict_key: String,
    pub suggestion_key: String,
    pub phase_key: String,
    /// Tokens meaning "accept". ASCII words match on word boundaries.
    pub affirmative_tokens: Vec<String>,
    /// Tokens meaning "reject". They decide only when they lead the value.
    pub negative_tokens: Vec<String>,
    pub suggestion_placeholder: String,
    pub phase_placeholder: String,
}

impl Default for VerdictSchema {
    fn default() -> Self {
        Self {
            verdict_key: "verdict".to_string(),
            suggestion_key: "suggestion".to_string(),
            phase_key: "phase".to_string(),
            affirmative_tokens: ["yes", "accept", "accepted", "approve", "是"]
                .map(String::from)
                .to_vec(),
            negative_tokens: ["no", "not", "reject", "rejected", "否", "不是"]
                .map(String::from)
                .to_vec(),
            suggestion_placeholder: "The reply needs further improvement.".to_string(),
            phase_placeholder: "unrecognized".to_string(),
        }
    }
}

impl VerdictSchema {
    /// Output format line shown to the evaluator.
    pub fn answer_format(&self) -> String {
        format!(
            r#"{{"{}": "yes" or "no", "{}": "<what to improve>", "{}": "<stage name>"}}"#,
            self.verdict_key, self.suggestion_key, self.phase_key
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Verdict,
    Suggestion,
    Phase,
}

/// A located `key:` occurrence.
#[derive(Debug, Clone, Copy)]
struct KeyHit {
    field: Field,
    /// Where the key (with its leading boundary) starts.
    start: usize,
    /// Where the value starts, just past the colon.
    value_start: usize,
    /// Whether the key itself was quoted.
    quoted: bool,
}

pub struct VerdictParser {
    schema: VerdictSchema,
    verdict_re: Regex,
    suggestion_re: Regex,
    phase_re: Regex,
}

impl VerdictParser {
    pub fn new(schema: VerdictSchema) -> Result<Self, regex::Error> {
        Ok(Self {
            verdict_re: key_regex(&schema.verdict_key)?,
            suggestion_re: key_regex(&schema.suggestion_key)?,
            phase_re: key_regex(&schema.phase_key)?,
            schema,
        })
    }

    pub fn schema(&self) -> &VerdictSchema {
        &self.schema
    }

    pub fn parse(&self, text: &str) -> ParsedVerdict {
        let hits = self.locate_keys(text);
        let first = |field: Field| hits.iter().find(|h| h.field == field).copied();
        let region_end = |hit: KeyHit| {
            hits.iter()
                .map(|h| h.start)
                .filter(|start| *start >= hit.value_start)
                .min()
                .unwrap_or(text.len())
        };

        let verdict = first(Field::Verdict)
            .and_then(|hit| read_token(&text[hit.value_start..region_end(hit)]));
        let suggestion = first(Field::Suggestion)
            .and_then(|hit| read_span(&text[hit.value_start..region_end(hit)]));
        let phase = first(Field::Phase)
            .and_then(|hit| read_token(&text[hit.value_start..region_end(hit)]));

        if verdict.is_none() && suggestion.is_none() && phase.is_none() {
            return ParsedVerdict::Degraded(self.heuristic(text));
        }

        ParsedVerdict::Valid(VerdictFields {
            conclusion: verdict
                .map(|token| self.conclusion_of(&token))
                .unwrap_or(Conclusion::Reject),
            improvement_suggestion: suggestion
                .unwrap_or_else(|| self.schema.suggestion_placeholder.clone()),
            phase_label: phase.unwrap_or_else(|| self.schema.phase_placeholder.clone()),
        })
    }

    fn locate_keys(&self, text: &str) -> Vec<KeyHit> {
        let mut hits = Vec::new();
        for (field, re) in [
            (Field::Verdict, &self.verdict_re),
            (Field::Suggestion, &self.suggestion_re),
            (Field::Phase, &self.phase_re),
        ] {
            let mut found: Vec<KeyHit> = re
                .captures_iter(text)
                .filter_map(|caps| {
                    let m = caps.get(0)?;
                    Some(KeyHit {
                        field,
                        start: m.start(),
                        value_start: m.end(),
                        quoted: caps.get(1).is_some(),
                    })
                })
                .collect();
            if found.iter().any(|h| h.quoted) {
                found.retain(|h| h.quoted);
            }
            hits.extend(found);
        }
        hits.sort_by_key(|h| h.start);

        // Drop bare keys that sit inside a quoted value read by an earlier key.
        let mut kept: Vec<KeyHit> = Vec::with_capacity(hits.len());
        let mut covered_until = 0;
        for hit in hits {
            if !hit.quoted && hit.start < covered_until {
                continue;
            }
            if let Some(end) = quoted_value_end(text, hit.value_start) {
                covered_until = covered_until.max(end);
            }
            kept.push(hit);
        }
        kept
    }

    /// Conclusion of an extracted verdict token: a leading negative rejects,
    /// otherwise any affirmative accepts.
    fn conclusion_of(&self, token: &str) -> Conclusion {
        let token = token.to_lowercase();
        let token = token.trim_start_matches(|c: char| !c.is_alphanumeric());
        if leads_with_any(token, &self.schema.negative_tokens) {
            Conclusion::Reject
        } else if contains_any(token, &self.schema.affirmative_tokens) {
            Conclusion::Accept
        } else {
            Conclusion::Reject
        }
    }

    fn heuristic(&self, text: &str) -> VerdictFields {
        let lowered = text.to_lowercase();
        let conclusion = if contains_any(&lowered, &self.schema.affirmative_tokens) {
            Conclusion::Accept
        } else {
            Conclusion::Reject
        };
        VerdictFields {
            conclusion,
            improvement_suggestion: loose_value(text, &self.schema.suggestion_key)
                .unwrap_or_else(|| self.schema.suggestion_placeholder.clone()),
            phase_label: loose_value(text, &self.schema.phase_key)
                .unwrap_or_else(|| self.schema.phase_placeholder.clone()),
        }
    }
}

/// `key` (optionally quoted) followed by a colon, not preceded by a word
/// character. Group 1 holds the opening quote when there is one.
fn key_regex(key: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r#"(?i)(?:^|[^\p{{L}}\p{{N}}_])(["'“”])?{}["'“”]?\s*[:：]"#,
        regex::escape(key)
    ))
}

/// A short value: quoted string, or text up to the next delimiter.
fn read_token(region: &str) -> Option<String> {
    let region = region.trim_start();
    let raw = match region.chars().next() {
        Some(c) if QUOTES.contains(&c) => quoted(&region[c.len_utf8()..]),
        _ => region.split(VALUE_STOPS).next().unwrap_or_default(),
    };
    clean(raw)
}

/// A long value: quoted string, or everything up to a closing brace.
fn read_span(region: &str) -> Option<String> {
    let region = region.trim_start();
    let raw = match region.chars().next() {
        Some(c) if QUOTES.contains(&c) => quoted(&region[c.len_utf8()..]),
        _ => region.split('}').next().unwrap_or_default(),
    };
    clean(raw)
}

/// Body of a quoted value whose opening quote is already consumed.
///
/// The closing quote is the first one followed by a delimiter or the end of
/// the region, so quotes inside the value survive.
fn quoted(body: &str) -> &str {
    for (i, c) in body.char_indices() {
        if QUOTES.contains(&c) {
            let after = body[i + c.len_utf8()..].trim_start();
            if after.is_empty() || after.starts_with(VALUE_STOPS) {
                return &body[..i];
            }
        }
    }
    body
}

/// End offset of the quoted value starting at `value_start`, if it is quoted.
fn quoted_value_end(text: &str, value_start: usize) -> Option<usize> {
    let region = text.get(value_start..)?;
    let trimmed = region.trim_start();
    let open = trimmed.chars().next().filter(|c| QUOTES.contains(c))?;
    let body_start = value_start + (region.len() - trimmed.len()) + open.len_utf8();
    Some(body_start + quoted(&text[body_start..]).len())
}

fn clean(raw: &str) -> Option<String> {
    let value = raw
        .trim()
        .trim_end_matches(|c: char| c.is_whitespace() || VALUE_STOPS.contains(&c) || c == '{')
        .trim_matches(|c: char| c.is_whitespace() || QUOTES.contains(&c))
        .trim_matches(|c: char| c == '(' || c == ')' || c == '（' || c == '）')
        .trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Text after the first delimiter following `key`, for degraded output.
fn loose_value(text: &str, key: &str) -> Option<String> {
    let lowered = text.to_lowercase();
    let at = lowered.find(&key.to_lowercase())?;
    // Lowercasing can shift byte offsets for some scripts.
    let after = text.get(at + key.len()..)?;
    let delim = after.find([':', '：', '=', '-'])?;
    let rest = &after[delim..];
    let rest = rest
        .char_indices()
        .nth(1)
        .map(|(i, _)| &rest[i..])
        .unwrap_or_default();
    clean(rest.split(VALUE_STOPS).next().unwrap_or_default())
}

/// Whether `haystack` starts with any token, as a whole word for ASCII tokens.
fn leads_with_any(haystack: &str, tokens: &[String]) -> bool {
    tokens.iter().any(|token| {
        let token = token.to_lowercase();
        if token.is_empty() || !haystack.starts_with(&token) {
            return false;
        }
        if !token.chars().all(|c| c.is_ascii_alphabetic()) {
            return true;
        }
        !haystack[token.len()..]
            .chars()
            .next()
            .is_some_and(char::is_alphanumeric)
    })
}

/// Whether `haystack` contains any token. ASCII-alphabetic tokens must
/// stand as whole words; others match as substrings.
fn contains_any(haystack: &str, tokens: &[String]) -> bool {
    tokens.iter().any(|token| {
        let token = token.to_lowercase();
        if token.is_empty() {
            return false;
        }
        if !token.chars().all(|c| c.is_ascii_alphabetic()) {
            return haystack.contains(&token);
        }
        haystack.match_indices(&token).any(|(i, _)| {
            let before = haystack[..i].chars().next_back();
            let after = haystack[i + token.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
    })
}
