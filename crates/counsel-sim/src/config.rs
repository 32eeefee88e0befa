//! Runner configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (e.g. `COUNSEL_SIM_LOCAL_BASE_URL`)
//! 2. Values in the TOML file
//! 3. Built-in defaults (one local chat backend, one local reasoning backend)
//!
//! ## Environment overrides
//!
//! | Variable                          | Overrides                         |
//! |-----------------------------------|-----------------------------------|
//! | `COUNSEL_SIM_<NAME>_BASE_URL`     | `base_url` of backend `<name>`    |
//! | `COUNSEL_SIM_<NAME>_MODEL`        | `model` of backend `<name>`       |
//! | `COUNSEL_SIM_<NAME>_API_KEY`      | `api_key` of backend `<name>`     |
//! | `COUNSEL_SIM_OUTPUT_DIR`          | `output_dir`                      |
//! | `COUNSEL_SIM_WORKERS`             | `batch.workers`                   |
//!
//! `<NAME>` is the backend name upper-cased with `-` replaced by `_`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use dialogue::{DialogueConfig, Mode, SessionKind};
use serde::{Deserialize, Serialize};

use crate::backend::{BackendKind, BackendPlan, BackendSpec, RoleBindings};
use crate::retry::RetryPolicy;

const DEFAULT_CHAT_BASE_URL: &str = "http://localhost:8000/v1";
const DEFAULT_CHAT_MODEL: &str = "qwen-turbo";
const DEFAULT_REASONING_BASE_URL: &str = "http://localhost:8001/v1";
const DEFAULT_REASONING_MODEL: &str = "deepseek-r1";
const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_LEDGER_FILE: &str = "processed_file.log";
/// Kept low to stay under provider rate limits.
const DEFAULT_WORKERS: usize = 3;

const ENV_PREFIX: &str = "COUNSEL_SIM";
const ENV_OUTPUT_DIR: &str = "COUNSEL_SIM_OUTPUT_DIR";
const ENV_WORKERS: &str = "COUNSEL_SIM_WORKERS";

/// Batch processing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Sessions run concurrently.
    pub workers: usize,
    /// Profile file extension, without the dot.
    pub profile_extension: String,
    /// Processed ledger; relative paths resolve against `output_dir`.
    pub ledger_file: PathBuf,
    /// Skip profiles whose dialogue artifact already exists.
    pub skip_existing: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            profile_extension: "txt".to_string(),
            ledger_file: PathBuf::from(DEFAULT_LEDGER_FILE),
            skip_existing: true,
        }
    }
}

/// Session defaults used when the CLI does not override them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    pub mode: Mode,
    pub kind: SessionKind,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            mode: Mode::CounselorFirst,
            kind: SessionKind::First,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub output_dir: PathBuf,
    pub backends: Vec<BackendSpec>,
    pub roles: RoleBindings,
    pub retry: RetryPolicy,
    pub batch: BatchSettings,
    pub session: SessionDefaults,
    pub dialogue: DialogueConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        let mut reasoning = BackendSpec::new(
            "reasoner",
            BackendKind::Reasoning,
            DEFAULT_REASONING_BASE_URL,
            DEFAULT_REASONING_MODEL,
        );
        // Reasoning models think before answering.
        reasoning.timeout_secs = 300;
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            backends: vec![
                BackendSpec::new("local", BackendKind::Chat, DEFAULT_CHAT_BASE_URL, DEFAULT_CHAT_MODEL),
                reasoning,
            ],
            roles: RoleBindings {
                conversation: "local".to_string(),
                summary: "local".to_string(),
                evaluator: "reasoner".to_string(),
            },
            retry: RetryPolicy::default(),
            batch: BatchSettings::default(),
            session: SessionDefaults::default(),
            dialogue: DialogueConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("failed to parse runner config")
    }

    /// Load `path` (or defaults when `None`), apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                Self::from_toml_str(&text)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, usually `std::env::var`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for backend in &mut self.backends {
            let prefix = format!("{ENV_PREFIX}_{}", env_name(&backend.name));
            if let Some(url) = lookup(&format!("{prefix}_BASE_URL")) {
                backend.base_url = url;
            }
            if let Some(model) = lookup(&format!("{prefix}_MODEL")) {
                backend.model = model;
            }
            if let Some(key) = lookup(&format!("{prefix}_API_KEY")) {
                backend.api_key = Some(key);
            }
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(workers) = lookup(ENV_WORKERS).and_then(|w| w.trim().parse().ok()) {
            self.batch.workers = workers;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            bail!("at least one backend must be configured");
        }
        for backend in &self.backends {
            if backend.name.trim().is_empty() {
                bail!("backend names must not be empty");
            }
            if !backend.base_url.starts_with("http://") && !backend.base_url.starts_with("https://") {
                bail!(
                    "backend {:?}: base_url must start with http:// or https://, got {:?}",
                    backend.name,
                    backend.base_url
                );
            }
            if backend.model.trim().is_empty() {
                bail!("backend {:?}: model must not be empty", backend.name);
            }
            if backend.timeout_secs == 0 {
                bail!("backend {:?}: timeout_secs must be > 0", backend.name);
            }
        }
        if self.batch.workers == 0 {
            bail!("batch.workers must be > 0");
        }
        if self.retry.base_backoff_ms > self.retry.max_backoff_ms {
            bail!(
                "retry.base_backoff_ms ({}) must not exceed retry.max_backoff_ms ({})",
                self.retry.base_backoff_ms,
                self.retry.max_backoff_ms
            );
        }
        self.plan()?;
        self.dialogue
            .validate()
            .context("invalid [dialogue] section")?;
        Ok(())
    }

    /// Role bindings resolved against the backend registry.
    pub fn plan(&self) -> Result<BackendPlan<'_>> {
        BackendPlan::resolve(&self.backends, &self.roles).context("invalid role bindings")
    }

    /// Ledger path with relative paths resolved against the output directory.
    pub fn ledger_path(&self) -> PathBuf {
        if self.batch.ledger_file.is_absolute() {
            self.batch.ledger_file.clone()
        } else {
            self.output_dir.join(&self.batch.ledger_file)
        }
    }
}

fn env_name(backend: &str) -> String {
    backend
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}
