use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::AppConfig;
use mirror_core::domain::ports::{DestinationProvider, SourceProvider};
use mirror_core::domain::registry::{ConflictPolicy, PostRegistry};
use mirror_infra::disqus::DisqusClient;
use mirror_infra::facebook::FacebookClient;
use mirror_infra::store::SnapshotStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub disqus: Option<Arc<DisqusClient>>,
    pub facebook: Option<Arc<FacebookClient>>,
    pub sources: Vec<Arc<dyn SourceProvider>>,
    pub destination: Option<Arc<dyn DestinationProvider>>,
    pub snapshot: Arc<SnapshotStore>,
    pub conflict_policy: ConflictPolicy,
    /// Registry from the previous run; `None` until the snapshot is loaded.
    pub registry: Arc<Mutex<Option<PostRegistry>>>,
}
