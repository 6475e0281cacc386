use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::domain::registry::PostRegistry;
use crate::domain::tree::CommentTree;
use crate::types::platform::SourcePlatform;

/// Error raised by a provider implementation. Transport and auth failures
/// travel through here; malformed records never do.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync>;

pub const DRY_RUN_ID_PREFIX: &str = "dry-run:";

/// Reads one platform's comment threads.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    fn platform(&self) -> SourcePlatform;

    /// Builds the thread's comment tree. Records that cannot be classified
    /// come back as placeholders.
    async fn fetch_comment_tree(&self, thread_id: &str) -> Result<CommentTree, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewComment<'a> {
    pub author_name: &'a str,
    pub body_html: &'a str,
    pub thread_id: &'a str,
    pub parent_id: Option<&'a str>,
    pub as_owner: bool,
}

/// Writes comments into the destination system.
#[async_trait]
pub trait DestinationProvider: Send + Sync {
    async fn create_comment(&self, comment: NewComment<'_>) -> Result<String, ProviderError>;

    async fn approve_comment(&self, comment_id: &str) -> Result<(), ProviderError>;

    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Durable storage for the registry, written after every creation.
pub trait Checkpoint: Send + Sync {
    fn save(&self, registry: &PostRegistry) -> Result<(), ProviderError>;
}

/// Destination that performs no calls and hands out sentinel ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunDestination;

#[async_trait]
impl DestinationProvider for DryRunDestination {
    async fn create_comment(&self, comment: NewComment<'_>) -> Result<String, ProviderError> {
        let id = format!("{DRY_RUN_ID_PREFIX}{}", Uuid::new_v4());
        info!(
            author = comment.author_name,
            thread_id = comment.thread_id,
            parent_id = comment.parent_id.unwrap_or("-"),
            as_owner = comment.as_owner,
            sentinel = %id,
            "dry run: skipping create comment"
        );
        Ok(id)
    }

    async fn approve_comment(&self, comment_id: &str) -> Result<(), ProviderError> {
        info!(comment_id, "dry run: skipping approve comment");
        Ok(())
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

pub fn is_dry_run_id(id: &str) -> bool {
    id.starts_with(DRY_RUN_ID_PREFIX)
}
