//! Processed ledger: which session ids are done, shared by concurrent workers.
//!
//! Ids move `unclaimed → in flight → processed`. A claim is exclusive; a
//! failed session releases its claim so a later run can retry it. Processed
//! ids are write-once and appended to a plain log file, one id per line.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::LedgerError;

#[derive(Debug, Default)]
struct LedgerState {
    processed: HashSet<String>,
    in_flight: HashSet<String>,
}

#[derive(Debug)]
pub struct ProcessedLedger {
    path: Option<PathBuf>,
    state: Mutex<LedgerState>,
}

impl ProcessedLedger {
    /// Open (or start) a ledger backed by `path`. A missing file is an empty ledger.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let processed = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(source) => return Err(LedgerError::Io { path, source }),
        };
        info!(path = %path.display(), processed = processed.len(), "Processed ledger loaded");
        Ok(Self {
            path: Some(path),
            state: Mutex::new(LedgerState {
                processed,
                in_flight: HashSet::new(),
            }),
        })
    }

    /// A ledger that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn is_processed(&self, id: &str) -> bool {
        self.state.lock().await.processed.contains(id)
    }

    /// Claim `id` for this worker. False if it is processed or claimed elsewhere.
    pub async fn try_claim(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.processed.contains(id) || state.in_flight.contains(id) {
            debug!(id, "Ledger claim refused");
            return false;
        }
        state.in_flight.insert(id.to_string())
    }

    /// Record `id` as processed and drop its claim. Repeated calls are no-ops.
    pub async fn mark_processed(&self, id: &str) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        state.in_flight.remove(id);
        if state.processed.contains(id) {
            return Ok(());
        }
        if let Some(path) = &self.path {
            append_line(path, id).await?;
        }
        state.processed.insert(id.to_string());
        Ok(())
    }

    /// Give up a claim without marking the id processed.
    pub async fn release(&self, id: &str) {
        self.state.lock().await.in_flight.remove(id);
    }

    /// Number of processed ids.
    pub async fn len(&self) -> usize {
        self.state.lock().await.processed.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

async fn append_line(path: &Path, id: &str) -> Result<(), LedgerError> {
    let io_err = |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(io_err)?;
    file.write_all(format!("{id}\n").as_bytes())
        .await
        .map_err(io_err)?;
    file.flush().await.map_err(io_err)
}
