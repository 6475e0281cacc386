use tracing::{info, warn};

use crate::jobs::JobError;
use crate::state::AppState;
use mirror_core::domain::ports::SourceProvider;
use mirror_core::domain::registry::PostRegistry;
use mirror_core::domain::sync::{RunSummary, SyncEngine, SyncOptions};
use mirror_infra::store::load_manifest;

/// Loads the snapshot into memory unless a previous run already did.
/// An unreadable snapshot is an error; a missing one starts empty.
pub async fn load_snapshot(state: &AppState) -> Result<(), JobError> {
    let mut slot = state.registry.lock().await;
    if slot.is_none() {
        let registry = state.snapshot.load()?.unwrap_or_default();
        info!(
            path = %state.snapshot.path().display(),
            posts = registry.len(),
            "registry restored"
        );
        *slot = Some(registry);
    }
    Ok(())
}

/// One pass: reload the manifest, reconcile, persist, then sync every
/// active post against every enabled source.
pub async fn run(state: &AppState) -> Result<RunSummary, JobError> {
    let Some(destination) = state.destination.as_deref() else {
        return Err(JobError::NoDestination);
    };
    load_snapshot(state).await?;

    let manifest = load_manifest(&state.config.manifest_path)?;
    let mut slot = state.registry.lock().await;
    // A failed reconcile leaves the slot empty so the next run reloads
    // the snapshot from disk.
    let previous = slot.take();
    let (mut registry, stats) =
        PostRegistry::reconcile(previous, &manifest, state.conflict_policy)?;
    info!(
        created = stats.created,
        restored = stats.restored,
        relinked = stats.relinked,
        retired = stats.retired,
        "registry reconciled"
    );
    if let Err(err) = state.snapshot.save(&registry) {
        *slot = Some(registry);
        return Err(err.into());
    }

    let sources: Vec<&dyn SourceProvider> =
        state.sources.iter().map(|source| source.as_ref()).collect();
    let engine = SyncEngine::new(
        destination,
        state.snapshot.as_ref(),
        SyncOptions {
            create_delay: state.config.create_delay,
        },
    );
    let summary = engine.sync_registry(&mut registry, &sources).await;
    for unhandled in &summary.report.unhandled {
        warn!(
            thread_id = %unhandled.thread_id,
            reason = %unhandled.reason,
            detail = %unhandled.detail,
            "comment not copied"
        );
    }
    *slot = Some(registry);
    Ok(summary)
}
