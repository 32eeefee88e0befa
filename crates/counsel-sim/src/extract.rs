//! Post-run extraction of per-round phase labels and applied suggestions
//! from the reasoning artifacts of finished sessions.
//!
//! Each `<id>_reasoning.json` holds one [`RoundAudit`] per counselor round.
//! Extraction keeps that round structure: one phase label per round and one
//! list of applied suggestions per round, so the outputs line up with the
//! dialogue they came from.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dialogue::{ArtifactKind, RoundAudit};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Folder the extracted files go to under the output root.
pub const EXTRACT_FOLDER: &str = "extracted_files";
const EXTRACT_SUFFIX: &str = "extracted";

/// Round-aligned extraction for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionExtract {
    pub session_id: String,
    /// Phase label of the verdict that closed each round. `None` when the
    /// round never reached the evaluator.
    pub phase_labels: Vec<Option<String>>,
    /// Suggestions applied in each round, oldest first. Empty for rounds
    /// accepted on the first draft.
    pub suggestions_applied: Vec<Vec<String>>,
}

impl SessionExtract {
    pub fn from_audits(session_id: impl Into<String>, audits: &[RoundAudit]) -> Self {
        Self {
            session_id: session_id.into(),
            phase_labels: audits
                .iter()
                .map(|audit| audit.last_verdict().map(|v| v.phase_label.clone()))
                .collect(),
            suggestions_applied: audits
                .iter()
                .map(|audit| {
                    audit
                        .attempts
                        .iter()
                        .map(|a| a.suggestion_applied.clone())
                        .collect()
                })
                .collect(),
        }
    }

    pub fn rounds(&self) -> usize {
        self.phase_labels.len()
    }
}

/// Outcome of one extraction pass.
#[derive(Debug, Default, Serialize)]
pub struct ExtractReport {
    pub total: usize,
    pub extracted: usize,
    /// Reasoning files that could not be read or decoded.
    pub failed: Vec<String>,
    pub output_dir: PathBuf,
}

/// Session id of a reasoning artifact file name, if it is one.
fn session_id_of(file_name: &str) -> Option<&str> {
    let suffix = format!("_{}.json", ArtifactKind::Reasoning.suffix());
    file_name
        .strip_suffix(suffix.as_str())
        .filter(|id| !id.is_empty())
}

/// Read and decode one reasoning artifact.
pub async fn read_reasoning(path: &Path) -> Result<Vec<RoundAudit>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid reasoning file {}", path.display()))
}

/// Extract every `*_reasoning.json` in `reasoning_dir` into
/// `<output_dir>/<id>_extracted.json`. Undecodable files are reported, not fatal.
pub async fn extract_dir(reasoning_dir: &Path, output_dir: &Path) -> Result<ExtractReport> {
    let mut entries = tokio::fs::read_dir(reasoning_dir)
        .await
        .with_context(|| format!("failed to list reasoning files in {}", reasoning_dir.display()))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(id) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(session_id_of)
        else {
            continue;
        };
        files.push((id.to_string(), path));
    }
    files.sort();

    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let mut report = ExtractReport {
        total: files.len(),
        output_dir: output_dir.to_path_buf(),
        ..ExtractReport::default()
    };
    for (id, path) in files {
        let audits = match read_reasoning(&path).await {
            Ok(audits) => audits,
            Err(e) => {
                warn!(id = %id, error = %format!("{e:#}"), "Skipping reasoning file");
                report.failed.push(id);
                continue;
            }
        };
        let extract = SessionExtract::from_audits(&id, &audits);
        let target = output_dir.join(format!("{id}_{EXTRACT_SUFFIX}.json"));
        tokio::fs::write(&target, serde_json::to_string_pretty(&extract)?)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;
        report.extracted += 1;
    }

    info!(
        total = report.total,
        extracted = report.extracted,
        failed = report.failed.len(),
        output = %output_dir.display(),
        "Extraction complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_of_reasoning_names() {
        assert_eq!(session_id_of("alice_reasoning.json"), Some("alice"));
        assert_eq!(session_id_of("a_b_reasoning.json"), Some("a_b"));
        assert_eq!(session_id_of("alice_dialogue.json"), None);
        assert_eq!(session_id_of("_reasoning.json"), None);
    }

    #[test]
    fn test_empty_audits_extract_nothing() {
        let extract = SessionExtract::from_audits("x", &[]);
        assert_eq!(extract.rounds(), 0);
        assert!(extract.suggestions_applied.is_empty());
    }

    #[tokio::test]
    async fn test_missing_folder_is_an_error() {
        let out = tempfile::tempdir().unwrap();
        let missing = out.path().join("nope");
        assert!(extract_dir(&missing, out.path()).await.is_err());
    }
}
