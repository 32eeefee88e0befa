//! Evaluation verdicts: parsed judgments of a counselor draft.

use serde::{Deserialize, Serialize};

/// Accept or reject a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Accept,
    Reject,
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// The three fields extracted from evaluator output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictFields {
    pub conclusion: Conclusion,
    pub improvement_suggestion: String,
    pub phase_label: String,
}

/// Parse result, tagged by how much of the expected shape was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "fields", rename_all = "snake_case")]
pub enum ParsedVerdict {
    /// At least one field was found in key/value form.
    Valid(VerdictFields),
    /// Nothing matched the key/value form; fields are heuristic guesses.
    Degraded(VerdictFields),
}

impl ParsedVerdict {
    pub fn fields(&self) -> &VerdictFields {
        match self {
            Self::Valid(fields) | Self::Degraded(fields) => fields,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn into_fields(self) -> VerdictFields {
        match self {
            Self::Valid(fields) | Self::Degraded(fields) => fields,
        }
    }
}

/// One evaluator judgment. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    pub conclusion: Conclusion,
    pub improvement_suggestion: String,
    pub phase_label: String,
    /// Evaluator output exactly as received.
    pub raw_text: String,
    /// Opaque reasoning trace, stored for audit only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_trace: Option<String>,
    pub valid: bool,
    /// Set when the evaluation call itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationVerdict {
    pub fn from_parsed(parsed: ParsedVerdict, raw_text: String, trace: Option<String>) -> Self {
        let valid = parsed.is_valid();
        let fields = parsed.into_fields();
        Self {
            conclusion: fields.conclusion,
            improvement_suggestion: fields.improvement_suggestion,
            phase_label: fields.phase_label,
            raw_text,
            reasoning_trace: trace,
            valid,
            error: None,
        }
    }

    /// Conservative verdict for an evaluation call that never returned.
    pub fn unavailable(error: String, suggestion: &str, phase: &str) -> Self {
        Self {
            conclusion: Conclusion::Reject,
            improvement_suggestion: suggestion.to_string(),
            phase_label: phase.to_string(),
            raw_text: String::new(),
            reasoning_trace: None,
            valid: false,
            error: Some(error),
        }
    }

    pub fn is_accept(&self) -> bool {
        self.conclusion == Conclusion::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(conclusion: Conclusion) -> VerdictFields {
        VerdictFields {
            conclusion,
            improvement_suggestion: "slow down".into(),
            phase_label: "Set the agenda".into(),
        }
    }

    #[test]
    fn test_from_parsed_carries_validity() {
        let v = EvaluationVerdict::from_parsed(
            ParsedVerdict::Degraded(fields(Conclusion::Accept)),
            "raw".into(),
            None,
        );
        assert!(!v.valid);
        assert!(v.is_accept());
        assert_eq!(v.raw_text, "raw");
    }

    #[test]
    fn test_unavailable_rejects() {
        let v = EvaluationVerdict::unavailable("timeout".into(), "improve", "unrecognized");
        assert_eq!(v.conclusion, Conclusion::Reject);
        assert!(!v.valid);
        assert_eq!(v.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_parsed_verdict_serde_tag() {
        let json = serde_json::to_string(&ParsedVerdict::Valid(fields(Conclusion::Reject))).unwrap();
        assert!(json.contains(r#""status":"valid""#));
        assert!(json.contains(r#""conclusion":"reject""#));
    }
}
