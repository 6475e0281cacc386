pub mod scheduler;
pub mod tasks;

use thiserror::Error;
use tracing::info;

use crate::state::AppState;
use mirror_core::error::CoreError;
use mirror_infra::store::{ManifestError, SnapshotError};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("registry error: {0}")]
    Registry(#[from] CoreError),
    #[error("no destination configured; set the DISQUS_* variables including DISQUS_ACCESS_TOKEN, or use --dry-run")]
    NoDestination,
}

/// Syncs on the configured interval until the task is dropped.
pub async fn start(state: AppState) -> Result<(), JobError> {
    if state.destination.is_none() {
        return Err(JobError::NoDestination);
    }
    tasks::comments_sync::load_snapshot(&state).await?;
    let interval = state.config.poll_interval;
    info!(interval_secs = interval.as_secs(), "comment sync loop starting");
    scheduler::run_interval("comments_sync", interval, move || {
        let state = state.clone();
        async move {
            let summary = tasks::comments_sync::run(&state).await?;
            info!(?summary, "comment sync run complete");
            Ok(())
        }
    })
    .await
}
