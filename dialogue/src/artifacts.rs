//! Session artifacts: the five outputs written once a session ends.
//!
//! | Kind               | Folder               | File                           |
//! |--------------------|----------------------|--------------------------------|
//! | final transcript   | `dialogue_files`     | `{id}_dialogue.json`           |
//! | original transcript| `original_files`     | `{id}_original_dialogue.json`  |
//! | per-round verdicts | `reasoning_files`    | `{id}_reasoning.json`          |
//! | revision attempts  | `modification_files` | `{id}_comment.json`            |
//! | summary history    | `summary_files`      | `{id}_dialogue_summary.json`   |

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::PersistenceError;
use crate::history::{Mode, SessionKind, Turn};
use crate::revision::{RevisionAttempt, RoundAudit};
use crate::session::EndReason;

/// One of the five named artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Dialogue,
    OriginalDialogue,
    Reasoning,
    Comment,
    DialogueSummary,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        Self::Dialogue,
        Self::OriginalDialogue,
        Self::Reasoning,
        Self::Comment,
        Self::DialogueSummary,
    ];

    pub fn folder(self) -> &'static str {
        match self {
            Self::Dialogue => "dialogue_files",
            Self::OriginalDialogue => "original_files",
            Self::Reasoning => "reasoning_files",
            Self::Comment => "modification_files",
            Self::DialogueSummary => "summary_files",
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Dialogue => "dialogue",
            Self::OriginalDialogue => "original_dialogue",
            Self::Reasoning => "reasoning",
            Self::Comment => "comment",
            Self::DialogueSummary => "dialogue_summary",
        }
    }

    /// Path of this artifact for `base_id` under `root`.
    pub fn path(self, root: &Path, base_id: &str) -> PathBuf {
        root.join(self.folder())
            .join(format!("{}_{}.json", base_id, self.suffix()))
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Revision attempts of one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRevisions {
    pub round: u32,
    pub turn_index: usize,
    pub attempts: Vec<RevisionAttempt>,
}

/// Statistics for a finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    /// Distinguishes reruns of the same profile.
    pub run_id: Uuid,
    pub mode: Mode,
    pub kind: SessionKind,
    pub total_turns: usize,
    pub client_turns: usize,
    pub counselor_turns: usize,
    pub rounds: usize,
    /// Rounds with at least one revision.
    pub revised_rounds: usize,
    pub revision_attempts: usize,
    pub exhausted_rounds: usize,
    pub aborted_rounds: usize,
    /// Verdicts that fell back to heuristic parsing or a failed call.
    pub degraded_verdicts: usize,
    pub fallback_turns: usize,
    pub summaries: usize,
    /// Latest phase in the taxonomy any verdict reported.
    pub furthest_phase: Option<String>,
    pub end_reason: Option<EndReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Everything persisted for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionArtifacts {
    pub session_id: String,
    /// Post-revision transcript.
    pub dialogue: Vec<Turn>,
    /// Pre-revision transcript: counselor turns hold their attempt-0 drafts.
    pub original_dialogue: Vec<Turn>,
    /// One audit per counselor round, with every verdict.
    pub reasoning: Vec<RoundAudit>,
    pub comments: Vec<RoundRevisions>,
    pub summary_history: Vec<String>,
    pub summary: SessionSummary,
}

impl SessionArtifacts {
    /// JSON payload of one artifact.
    pub fn payload(&self, kind: ArtifactKind) -> Result<String, PersistenceError> {
        let result = match kind {
            ArtifactKind::Dialogue => serde_json::to_string_pretty(&self.dialogue),
            ArtifactKind::OriginalDialogue => serde_json::to_string_pretty(&self.original_dialogue),
            ArtifactKind::Reasoning => serde_json::to_string_pretty(&self.reasoning),
            ArtifactKind::Comment => serde_json::to_string_pretty(&self.comments),
            ArtifactKind::DialogueSummary => serde_json::to_string_pretty(&SummaryPayload {
                summary_history: &self.summary_history,
                statistics: &self.summary,
            }),
        };
        result.map_err(|source| PersistenceError::Serialize {
            artifact: kind.to_string(),
            source,
        })
    }
}

#[derive(Serialize)]
struct SummaryPayload<'a> {
    summary_history: &'a [String],
    statistics: &'a SessionSummary,
}

/// Receives session artifacts at session end.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn persist(
        &self,
        base_id: &str,
        artifacts: &SessionArtifacts,
    ) -> Result<Vec<PathBuf>, PersistenceError>;

    /// Whether artifacts for `base_id` already exist.
    async fn exists(&self, base_id: &str) -> bool;
}

/// Writes each artifact as pretty JSON under `root/<folder>/<id>_<suffix>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirectorySink {
    root: PathBuf,
}

impl JsonDirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn check_id(base_id: &str) -> Result<(), PersistenceError> {
    let bad = base_id.trim().is_empty()
        || base_id.contains(['/', '\\'])
        || base_id == "."
        || base_id == "..";
    if bad {
        return Err(PersistenceError::InvalidId(base_id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ArtifactSink for JsonDirectorySink {
    async fn persist(
        &self,
        base_id: &str,
        artifacts: &SessionArtifacts,
    ) -> Result<Vec<PathBuf>, PersistenceError> {
        check_id(base_id)?;
        let mut written = Vec::with_capacity(ArtifactKind::ALL.len());
        for kind in ArtifactKind::ALL {
            let payload = artifacts.payload(kind)?;
            let path = kind.path(&self.root, base_id);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| PersistenceError::Write {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
            tokio::fs::write(&path, payload)
                .await
                .map_err(|source| PersistenceError::Write {
                    path: path.clone(),
                    source,
                })?;
            written.push(path);
        }
        info!(id = base_id, root = %self.root.display(), "Session artifacts written");
        Ok(written)
    }

    async fn exists(&self, base_id: &str) -> bool {
        let path = ArtifactKind::Dialogue.path(&self.root, base_id);
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_paths() {
        let root = Path::new("/out");
        assert_eq!(
            ArtifactKind::Dialogue.path(root, "p7"),
            PathBuf::from("/out/dialogue_files/p7_dialogue.json")
        );
        assert_eq!(
            ArtifactKind::Comment.path(root, "p7"),
            PathBuf::from("/out/modification_files/p7_comment.json")
        );
        assert_eq!(
            ArtifactKind::DialogueSummary.path(root, "p7"),
            PathBuf::from("/out/summary_files/p7_dialogue_summary.json")
        );
    }

    #[test]
    fn test_invalid_ids() {
        assert!(check_id("patient_01").is_ok());
        assert!(check_id("").is_err());
        assert!(check_id("../etc").is_err());
        assert!(check_id("..").is_err());
    }
}
