use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use counsel_sim::extract::EXTRACT_FOLDER;
use counsel_sim::{extract_dir, BatchRunner, ResolvedBackends, SimConfig};
use dialogue::{
    ArtifactKind, ArtifactSink, CounselingSession, JsonDirectorySink, Mode, ProcessedLedger,
    SessionKind, SessionSpec,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Runner config (TOML). Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root folder for session artifacts.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one session for a single profile file.
    Run {
        /// Client profile text file.
        profile: PathBuf,
        /// Artifact id; defaults to the profile file stem.
        #[arg(long)]
        id: Option<String>,
        /// `client-first` or `counselor-first`.
        #[arg(long)]
        mode: Option<Mode>,
        /// `first` or `follow-up`.
        #[arg(long)]
        kind: Option<SessionKind>,
    },
    /// Run every profile in a folder, skipping ones already processed.
    Batch {
        /// Folder of profile files.
        profiles: PathBuf,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        mode: Option<Mode>,
        #[arg(long)]
        kind: Option<SessionKind>,
        /// Re-run profiles even when their artifacts already exist.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Pull per-round phase labels and applied suggestions out of finished
    /// sessions' reasoning files.
    Extract {
        /// Reasoning folder; defaults to `<output-dir>/reasoning_files`.
        #[arg(long)]
        reasoning: Option<PathBuf>,
        /// Destination; defaults to `<output-dir>/extracted_files`.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Validate the configuration and print the resolved backends.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = SimConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }

    match args.command {
        Command::Check => check(&config),
        Command::Extract { reasoning, out } => {
            let reasoning = reasoning
                .unwrap_or_else(|| config.output_dir.join(ArtifactKind::Reasoning.folder()));
            let out = out.unwrap_or_else(|| config.output_dir.join(EXTRACT_FOLDER));
            let report = extract_dir(&reasoning, &out).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Run {
            profile,
            id,
            mode,
            kind,
        } => {
            run_single(
                &config,
                &profile,
                id,
                mode.unwrap_or(config.session.mode),
                kind.unwrap_or(config.session.kind),
            )
            .await
        }
        Command::Batch {
            profiles,
            workers,
            mode,
            kind,
            force,
        } => {
            if let Some(workers) = workers {
                config.batch.workers = workers;
            }
            config.validate()?;
            run_batch(
                &config,
                &profiles,
                mode.unwrap_or(config.session.mode),
                kind.unwrap_or(config.session.kind),
                !force && config.batch.skip_existing,
            )
            .await
        }
    }
}

fn check(config: &SimConfig) -> Result<()> {
    let plan = config.plan()?;
    println!("Configuration OK");
    println!("  output dir: {}", config.output_dir.display());
    println!("  ledger:     {}", config.ledger_path().display());
    println!("  workers:    {}", config.batch.workers);
    println!(
        "  session:    {} / {}",
        config.session.mode, config.session.kind
    );
    for line in plan.describe() {
        println!("  {line}");
    }
    Ok(())
}

async fn run_single(
    config: &SimConfig,
    profile: &Path,
    id: Option<String>,
    mode: Mode,
    kind: SessionKind,
) -> Result<()> {
    let text = tokio::fs::read_to_string(profile)
        .await
        .with_context(|| format!("failed to read profile {}", profile.display()))?;
    if text.trim().is_empty() {
        bail!("profile {} is empty", profile.display());
    }
    let id = match id {
        Some(id) => id,
        None => profile
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .context("profile path has no usable file name")?,
    };

    let backends = ResolvedBackends::build(&config.plan()?, config.retry)?;
    let spec = SessionSpec {
        id: id.clone(),
        profile: text.trim().to_string(),
        mode,
        kind,
    };
    let mut session = CounselingSession::new(spec, &config.dialogue, backends.services())?;
    let artifacts = session.run().await?;

    let sink = JsonDirectorySink::new(&config.output_dir);
    let written = sink.persist(&id, &artifacts).await?;
    info!(
        id = %id,
        turns = artifacts.dialogue.len(),
        files = written.len(),
        output = %config.output_dir.display(),
        "Session complete"
    );
    Ok(())
}

async fn run_batch(
    config: &SimConfig,
    profiles: &Path,
    mode: Mode,
    kind: SessionKind,
    skip_existing: bool,
) -> Result<()> {
    let backends = ResolvedBackends::build(&config.plan()?, config.retry)?;
    let ledger = ProcessedLedger::open(config.ledger_path()).await?;
    let runner = BatchRunner::new(
        Arc::new(config.dialogue.clone()),
        backends.services(),
        Arc::new(JsonDirectorySink::new(&config.output_dir)),
        Arc::new(ledger),
        mode,
        kind,
        config.batch.workers,
        skip_existing,
    );
    let report = runner
        .run_dir(profiles, &config.batch.profile_extension)
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.failed > 0 {
        bail!("{} of {} profiles failed", report.failed, report.total);
    }
    Ok(())
}
