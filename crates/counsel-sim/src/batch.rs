//! Batch runner: one session per profile file, several at a time.
//!
//! Every profile goes through the ledger: claim, run, persist, mark. A
//! failed profile releases its claim and is reported in its
//! [`BatchItemResult`]; the rest of the batch keeps going.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use dialogue::{
    ArtifactSink, CounselingSession, DialogueConfig, Mode, ProcessedLedger, SessionKind,
    SessionServices, SessionSpec,
};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

/// A profile file found in the input folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFile {
    /// File stem; names the artifacts and keys the ledger.
    pub id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Completed,
    /// Already processed, claimed by another worker, or artifacts present.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItemResult {
    pub id: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turns: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItemResult {
    fn completed(id: &str, turns: usize) -> Self {
        Self {
            id: id.to_string(),
            status: ItemStatus::Completed,
            turns: Some(turns),
            error: None,
        }
    }

    fn skipped(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: ItemStatus::Skipped,
            turns: None,
            error: None,
        }
    }

    fn failed(id: &str, error: impl std::fmt::Display) -> Self {
        Self {
            id: id.to_string(),
            status: ItemStatus::Failed,
            turns: None,
            error: Some(format!("{error:#}")),
        }
    }
}

/// Totals over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub items: Vec<BatchItemResult>,
}

impl BatchReport {
    pub fn from_items(mut items: Vec<BatchItemResult>) -> Self {
        items.sort_by(|a, b| a.id.cmp(&b.id));
        let count = |status: ItemStatus| items.iter().filter(|i| i.status == status).count();
        Self {
            total: items.len(),
            completed: count(ItemStatus::Completed),
            skipped: count(ItemStatus::Skipped),
            failed: count(ItemStatus::Failed),
            items,
        }
    }
}

pub struct BatchRunner {
    config: Arc<DialogueConfig>,
    services: SessionServices,
    sink: Arc<dyn ArtifactSink>,
    ledger: Arc<ProcessedLedger>,
    mode: Mode,
    kind: SessionKind,
    workers: usize,
    skip_existing: bool,
}

impl BatchRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<DialogueConfig>,
        services: SessionServices,
        sink: Arc<dyn ArtifactSink>,
        ledger: Arc<ProcessedLedger>,
        mode: Mode,
        kind: SessionKind,
        workers: usize,
        skip_existing: bool,
    ) -> Self {
        Self {
            config,
            services,
            sink,
            ledger,
            mode,
            kind,
            workers: workers.max(1),
            skip_existing,
        }
    }

    /// Run every profile in `dir` with the given extension.
    pub async fn run_dir(&self, dir: &Path, extension: &str) -> Result<BatchReport> {
        let profiles = discover_profiles(dir, extension).await?;
        info!(
            dir = %dir.display(),
            profiles = profiles.len(),
            workers = self.workers,
            mode = %self.mode,
            kind = %self.kind,
            "Batch starting"
        );
        let report = self.run(profiles).await;
        info!(
            completed = report.completed,
            skipped = report.skipped,
            failed = report.failed,
            "Batch finished"
        );
        Ok(report)
    }

    pub async fn run(&self, profiles: Vec<ProfileFile>) -> BatchReport {
        let items = stream::iter(profiles)
            .map(|profile| self.run_one(profile))
            .buffer_unordered(self.workers)
            .collect::<Vec<_>>()
            .await;
        BatchReport::from_items(items)
    }

    async fn run_one(&self, profile: ProfileFile) -> BatchItemResult {
        let id = profile.id.as_str();
        if !self.ledger.try_claim(id).await {
            info!(id, "Skipping processed or claimed profile");
            return BatchItemResult::skipped(id);
        }
        if self.skip_existing && self.sink.exists(id).await {
            info!(id, "Artifacts already present, marking processed");
            return match self.ledger.mark_processed(id).await {
                Ok(()) => BatchItemResult::skipped(id),
                Err(e) => {
                    self.ledger.release(id).await;
                    BatchItemResult::failed(id, e)
                }
            };
        }

        match self.process(&profile).await {
            Ok(turns) => BatchItemResult::completed(id, turns),
            Err(e) => {
                error!(id, error = %format!("{e:#}"), "Profile failed");
                self.ledger.release(id).await;
                BatchItemResult::failed(id, e)
            }
        }
    }

    async fn process(&self, profile: &ProfileFile) -> Result<usize> {
        let text = tokio::fs::read_to_string(&profile.path)
            .await
            .with_context(|| format!("failed to read profile {}", profile.path.display()))?;
        let text = text.trim();
        if text.is_empty() {
            anyhow::bail!("profile {} is empty", profile.path.display());
        }

        let spec = SessionSpec {
            id: profile.id.clone(),
            profile: text.to_string(),
            mode: self.mode,
            kind: self.kind,
        };
        let mut session = CounselingSession::new(spec, &self.config, self.services.clone())?;
        let artifacts = session.run().await?;
        self.sink
            .persist(&profile.id, &artifacts)
            .await
            .context("failed to persist artifacts")?;
        self.ledger.mark_processed(&profile.id).await?;
        Ok(artifacts.dialogue.len())
    }
}

/// Profile files in `dir` with `extension`, sorted by id.
pub async fn discover_profiles(dir: &Path, extension: &str) -> Result<Vec<ProfileFile>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to list profiles in {}", dir.display()))?;
    let mut profiles = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!(path = %path.display(), "Skipping profile with non-UTF-8 name");
            continue;
        };
        if matches {
            profiles.push(ProfileFile {
                id: id.to_string(),
                path,
            });
        }
    }
    profiles.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(profiles)
}
