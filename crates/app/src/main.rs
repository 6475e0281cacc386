mod cli;
mod commands;
mod config;
mod jobs;
mod state;
mod wiring;

use clap::Parser;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::commands::CommandError;
use crate::config::ConfigError;
use crate::jobs::JobError;
use crate::wiring::{RunFlags, WiringError};
use mirror_core::domain::sync::RunSummary;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("wiring error: {0}")]
    Wiring(#[from] WiringError),
    #[error("job error: {0}")]
    Jobs(#[from] JobError),
    #[error("command error: {0}")]
    Command(#[from] CommandError),
    #[error("{failed} of {total} post/platform pairs failed to sync")]
    PairsFailed { failed: usize, total: usize },
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    config::load_dotenv()?;
    let config = config::AppConfig::from_env()?;
    let flags = RunFlags {
        dry_run: cli.dry_run,
        prefer_manifest: cli.prefer_manifest,
    };
    let state = wiring::build_state(config, flags)?;
    if cli.command.needs_sync_state() {
        info!(
            manifest = %state.config.manifest_path.display(),
            snapshot = %state.snapshot.path().display(),
            sources = state.sources.len(),
            dry_run = flags.dry_run,
            policy = ?state.conflict_policy,
            "comment mirror configured"
        );
    }

    match cli.command {
        Command::Sync => {
            let summary = jobs::tasks::comments_sync::run(&state).await?;
            info!(?summary, "comment sync complete");
            check_summary(&summary)?;
        }
        Command::Run => {
            tokio::select! {
                _ = shutdown_signal() => {
                    info!("shutdown signal received");
                }
                res = jobs::start(state) => {
                    res?;
                }
            }
        }
        Command::DestinationThreads => commands::destination_threads(&state).await?,
        Command::DestinationPosts { thread } => {
            commands::destination_posts(&state, &thread).await?
        }
        Command::SourcePosts => commands::source_posts(&state).await?,
        Command::Auth { provider } => commands::auth(&state, provider).await?,
    }

    Ok(())
}

/// A one-shot sync fails the process when any pair failed.
fn check_summary(summary: &RunSummary) -> Result<(), AppError> {
    if summary.pairs_failed == 0 {
        return Ok(());
    }
    Err(AppError::PairsFailed {
        failed: summary.pairs_failed,
        total: summary.pairs_failed + summary.pairs_synced,
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install ctrl-c handler");
    }
}
