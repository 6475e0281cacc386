use std::sync::Arc;

use reqwest::Client;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::state::AppState;
use mirror_core::domain::ports::{DestinationProvider, DryRunDestination, SourceProvider};
use mirror_core::domain::registry::ConflictPolicy;
use mirror_infra::disqus::DisqusClient;
use mirror_infra::facebook::FacebookClient;
use mirror_infra::forum::ForumScraper;
use mirror_infra::store::SnapshotStore;

const USER_AGENT: &str = concat!("comment-mirror/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum WiringError {
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunFlags {
    pub dry_run: bool,
    pub prefer_manifest: bool,
}

pub fn build_state(config: AppConfig, flags: RunFlags) -> Result<AppState, WiringError> {
    let client = Client::builder()
        .timeout(config.request_timeout)
        .user_agent(USER_AGENT)
        .build()?;

    let disqus = config
        .disqus
        .clone()
        .map(|credentials| Arc::new(DisqusClient::new(client.clone(), credentials)));
    let facebook = config
        .facebook
        .clone()
        .map(|credentials| Arc::new(FacebookClient::new(client.clone(), credentials)));

    let mut sources: Vec<Arc<dyn SourceProvider>> = Vec::new();
    match facebook.as_ref() {
        Some(facebook) => sources.push(facebook.clone()),
        None => warn!("facebook credentials incomplete; facebook source disabled"),
    }
    sources.push(Arc::new(ForumScraper::new(
        client.clone(),
        config.ea_forum_owner.clone(),
    )));

    let destination: Option<Arc<dyn DestinationProvider>> = if flags.dry_run {
        info!("dry run: destination writes and snapshot saves are disabled");
        Some(Arc::new(DryRunDestination))
    } else {
        match disqus.as_ref() {
            Some(disqus) if disqus.can_moderate() => {
                Some(disqus.clone() as Arc<dyn DestinationProvider>)
            }
            Some(_) => {
                // Guest copies need approval; an unapproved copy is never recorded.
                warn!("DISQUS_ACCESS_TOKEN missing; disqus cannot serve as destination");
                None
            }
            None => None,
        }
    };

    let snapshot = if flags.dry_run {
        SnapshotStore::read_only(&config.snapshot_path)
    } else {
        SnapshotStore::new(&config.snapshot_path)
    };
    let conflict_policy = if flags.prefer_manifest || config.prefer_manifest {
        ConflictPolicy::PreferManifest
    } else {
        ConflictPolicy::Fail
    };

    Ok(AppState {
        config: Arc::new(config),
        disqus,
        facebook,
        sources,
        destination,
        snapshot: Arc::new(snapshot),
        conflict_policy,
        registry: Arc::default(),
    })
}
