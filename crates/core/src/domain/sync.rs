use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::comments::{Comment, RealComment, truncate_chars};
use crate::domain::ledger::CopiedComment;
use crate::domain::message::OutgoingMessage;
use crate::domain::ports::{
    Checkpoint, DestinationProvider, NewComment, ProviderError, SourceProvider,
};
use crate::domain::registry::PostRegistry;
use crate::domain::tree::{CommentTree, NodeId};
use crate::error::CoreError;
use crate::types::platform::SourcePlatform;

const RAW_LOG_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetch {platform} thread {thread_id} failed: {source}")]
    Fetch {
        platform: SourcePlatform,
        thread_id: String,
        #[source]
        source: ProviderError,
    },
    #[error("create comment {comment_id} from {platform} thread {thread_id} failed: {source}")]
    Create {
        platform: SourcePlatform,
        thread_id: String,
        comment_id: String,
        #[source]
        source: ProviderError,
    },
    #[error(
        "approve {destination_id} for comment {comment_id} from {platform} thread {thread_id} failed: {source}"
    )]
    Approve {
        platform: SourcePlatform,
        thread_id: String,
        comment_id: String,
        destination_id: String,
        #[source]
        source: ProviderError,
    },
    #[error(
        "checkpoint after copying comment {comment_id} from {platform} thread {thread_id} failed: {source}"
    )]
    Checkpoint {
        platform: SourcePlatform,
        thread_id: String,
        comment_id: String,
        #[source]
        source: ProviderError,
    },
    #[error("recording comment {comment_id} from {platform} thread {thread_id} failed: {source}")]
    Ledger {
        platform: SourcePlatform,
        thread_id: String,
        comment_id: String,
        #[source]
        source: CoreError,
    },
    #[error("registry error: {0}")]
    Registry(#[from] CoreError),
}

impl SyncError {
    /// Source thread the failure happened in, when one was being synced.
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            SyncError::Fetch { thread_id, .. }
            | SyncError::Create { thread_id, .. }
            | SyncError::Approve { thread_id, .. }
            | SyncError::Checkpoint { thread_id, .. }
            | SyncError::Ledger { thread_id, .. } => Some(thread_id),
            SyncError::Registry(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Pause after each created comment, as a courtesy to the destination.
    pub create_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            create_delay: Duration::from_secs(10),
        }
    }
}

/// A source record that was not copied because it could not be classified
/// or because an ancestor could not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnhandledComment {
    pub thread_id: String,
    pub reason: String,
    pub detail: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub threads: usize,
    pub created: usize,
    pub already_copied: usize,
    pub redacted: usize,
    pub unhandled: Vec<UnhandledComment>,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.threads += other.threads;
        self.created += other.created;
        self.already_copied += other.already_copied;
        self.redacted += other.redacted;
        self.unhandled.extend(other.unhandled);
    }
}

#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub pairs_synced: usize,
    pub pairs_failed: usize,
    pub report: SyncReport,
}

/// Copies source comment trees into the destination, one post and one
/// platform at a time, consulting and extending the post's ledger.
pub struct SyncEngine<'a> {
    destination: &'a dyn DestinationProvider,
    checkpoint: &'a dyn Checkpoint,
    options: SyncOptions,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        destination: &'a dyn DestinationProvider,
        checkpoint: &'a dyn Checkpoint,
        options: SyncOptions,
    ) -> Self {
        Self {
            destination,
            checkpoint,
            options,
        }
    }

    /// Syncs every active post against every source. A failing pair is
    /// logged and counted; the remaining pairs still run.
    pub async fn sync_registry(
        &self,
        registry: &mut PostRegistry,
        sources: &[&dyn SourceProvider],
    ) -> RunSummary {
        let post_ids: Vec<String> = registry
            .active_posts()
            .map(|post| post.destination_post_id.clone())
            .collect();
        let mut summary = RunSummary::default();
        for post_id in &post_ids {
            for source in sources {
                match self.sync_post(registry, post_id, *source).await {
                    Ok(report) => {
                        summary.pairs_synced += 1;
                        summary.report.absorb(report);
                    }
                    Err(err) => {
                        summary.pairs_failed += 1;
                        warn!(
                            error = %err,
                            platform = %source.platform(),
                            post_id = %post_id,
                            thread_id = err.thread_id().unwrap_or("-"),
                            "post sync failed"
                        );
                    }
                }
            }
        }
        summary
    }

    /// Copies the not-yet-copied comments of every thread the post links
    /// for the source's platform. No-op when the post has no such link.
    pub async fn sync_post(
        &self,
        registry: &mut PostRegistry,
        post_id: &str,
        source: &dyn SourceProvider,
    ) -> Result<SyncReport, SyncError> {
        let platform = source.platform();
        let post = registry.get(post_id).ok_or_else(|| CoreError::UnknownPost {
            post_id: post_id.to_string(),
        })?;
        let Some(thread_ids) = post.thread_ids(platform).cloned() else {
            debug!(post_id, platform = %platform, "no linked threads");
            return Ok(SyncReport::default());
        };

        let mut report = SyncReport::default();
        for thread_id in thread_ids.iter() {
            let tree = source
                .fetch_comment_tree(thread_id)
                .await
                .map_err(|source| SyncError::Fetch {
                    platform,
                    thread_id: thread_id.to_string(),
                    source,
                })?;
            debug!(
                post_id,
                platform = %platform,
                thread_id,
                comments = tree.len(),
                "fetched comment tree"
            );
            let mut ctx = ThreadContext {
                post_id,
                platform,
                thread_id,
                report: &mut report,
            };
            self.copy_tree(registry, &tree, &mut ctx).await?;
            report.threads += 1;
        }
        Ok(report)
    }

    /// Pre-order walk. A node's destination id is settled (looked up or
    /// created and recorded) before any of its children are visited.
    async fn copy_tree(
        &self,
        registry: &mut PostRegistry,
        tree: &CommentTree,
        ctx: &mut ThreadContext<'_, '_>,
    ) -> Result<(), SyncError> {
        let mut stack: Vec<(NodeId, Option<String>)> =
            tree.roots().iter().rev().map(|node| (*node, None)).collect();

        while let Some((node, parent)) = stack.pop() {
            let Some(comment) = tree.comment(node) else {
                continue;
            };
            let comment = match comment {
                Comment::Real(comment) => comment,
                Comment::Placeholder(placeholder) => {
                    warn!(
                        platform = %ctx.platform,
                        thread_id = ctx.thread_id,
                        reason = %placeholder.reason,
                        raw = %truncate_chars(&placeholder.raw, RAW_LOG_CHARS),
                        "skipping unparsed comment"
                    );
                    ctx.report.unhandled.push(UnhandledComment {
                        thread_id: ctx.thread_id.to_string(),
                        reason: placeholder.reason.clone(),
                        detail: placeholder.raw.clone(),
                    });
                    self.skip_descendants(tree, node, ctx);
                    continue;
                }
            };

            let existing = registry
                .copied_destination(ctx.post_id, ctx.platform, &comment.source_comment_id)
                .map(str::to_string);
            let destination_id = match existing {
                Some(existing) => {
                    debug!(
                        platform = %ctx.platform,
                        post_id = ctx.post_id,
                        comment_id = %comment.source_comment_id,
                        destination_id = %existing,
                        author = %comment.author_display_name,
                        comment = %comment.summary(),
                        "already copied"
                    );
                    ctx.report.already_copied += 1;
                    existing
                }
                None => {
                    self.copy_comment(registry, comment, parent.as_deref(), ctx)
                        .await?
                }
            };

            for child in tree.children(node).iter().rev() {
                stack.push((*child, Some(destination_id.clone())));
            }
        }
        Ok(())
    }

    async fn copy_comment(
        &self,
        registry: &mut PostRegistry,
        comment: &RealComment,
        parent: Option<&str>,
        ctx: &mut ThreadContext<'_, '_>,
    ) -> Result<String, SyncError> {
        let message = OutgoingMessage::for_comment(comment);
        let request = NewComment {
            author_name: &comment.author_display_name,
            body_html: &message.body_html,
            thread_id: ctx.post_id,
            parent_id: parent,
            as_owner: comment.is_owner,
        };
        let destination_id = self
            .destination
            .create_comment(request)
            .await
            .map_err(|source| SyncError::Create {
                platform: ctx.platform,
                thread_id: ctx.thread_id.to_string(),
                comment_id: comment.source_comment_id.clone(),
                source,
            })?;
        if !comment.is_owner {
            self.destination
                .approve_comment(&destination_id)
                .await
                .map_err(|source| SyncError::Approve {
                    platform: ctx.platform,
                    thread_id: ctx.thread_id.to_string(),
                    comment_id: comment.source_comment_id.clone(),
                    destination_id: destination_id.clone(),
                    source,
                })?;
        }

        registry
            .record_copy(
                ctx.post_id,
                ctx.platform,
                &comment.source_comment_id,
                CopiedComment {
                    destination_id: destination_id.clone(),
                    copied_at: Utc::now(),
                    redacted: message.redacted,
                    dry_run: self.destination.is_dry_run(),
                },
            )
            .map_err(|source| SyncError::Ledger {
                platform: ctx.platform,
                thread_id: ctx.thread_id.to_string(),
                comment_id: comment.source_comment_id.clone(),
                source,
            })?;
        self.checkpoint
            .save(registry)
            .map_err(|source| SyncError::Checkpoint {
                platform: ctx.platform,
                thread_id: ctx.thread_id.to_string(),
                comment_id: comment.source_comment_id.clone(),
                source,
            })?;

        info!(
            platform = %ctx.platform,
            post_id = ctx.post_id,
            comment_id = %comment.source_comment_id,
            destination_id = %destination_id,
            parent_id = parent.unwrap_or("-"),
            owner = comment.is_owner,
            redacted = message.redacted,
            comment = %comment.summary(),
            "copied comment"
        );
        ctx.report.created += 1;
        if message.redacted {
            ctx.report.redacted += 1;
        }
        if !self.options.create_delay.is_zero() {
            tokio::time::sleep(self.options.create_delay).await;
        }
        Ok(destination_id)
    }

    fn skip_descendants(&self, tree: &CommentTree, node: NodeId, ctx: &mut ThreadContext<'_, '_>) {
        for descendant in tree.subtree(node).into_iter().skip(1) {
            let Some(comment) = tree.comment(descendant) else {
                continue;
            };
            let (reason, detail) = match comment {
                Comment::Real(real) => ("ancestor could not be parsed".to_string(), real.summary()),
                Comment::Placeholder(placeholder) => {
                    (placeholder.reason.clone(), placeholder.raw.clone())
                }
            };
            warn!(
                platform = %ctx.platform,
                thread_id = ctx.thread_id,
                reason = %reason,
                "skipping reply under unparsed comment"
            );
            ctx.report.unhandled.push(UnhandledComment {
                thread_id: ctx.thread_id.to_string(),
                reason,
                detail,
            });
        }
    }
}

struct ThreadContext<'p, 'r> {
    post_id: &'p str,
    platform: SourcePlatform,
    thread_id: &'p str,
    report: &'r mut SyncReport,
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{SyncEngine, SyncError, SyncOptions};
    use crate::domain::comments::{Comment, PlaceholderComment, RealComment};
    use crate::domain::message::{REDACT_MARKER, REDACTED_BODY};
    use crate::domain::ports::{
        Checkpoint, DestinationProvider, DryRunDestination, NewComment, ProviderError,
        SourceProvider,
    };
    use crate::domain::registry::{ConflictPolicy, ManifestEntry, PostRegistry};
    use crate::domain::tree::CommentTree;
    use crate::types::platform::SourcePlatform;
    use crate::types::thread_ids::ThreadIds;

    const POST: &str = "5397217386";
    const THREAD: &str = "https://forum.example/ea/154/post/";

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct CreateCall {
        author: String,
        body: String,
        thread_id: String,
        parent_id: Option<String>,
        as_owner: bool,
    }

    #[derive(Default)]
    struct FakeSource {
        threads: Mutex<HashMap<String, CommentTree>>,
        platform: Option<SourcePlatform>,
    }

    impl FakeSource {
        fn for_platform(platform: SourcePlatform) -> Self {
            Self {
                platform: Some(platform),
                ..Self::default()
            }
        }

        fn set(&self, thread_id: &str, tree: CommentTree) {
            self.threads
                .lock()
                .unwrap()
                .insert(thread_id.to_string(), tree);
        }
    }

    #[async_trait]
    impl SourceProvider for FakeSource {
        fn platform(&self) -> SourcePlatform {
            self.platform.unwrap_or(SourcePlatform::EaForum)
        }

        async fn fetch_comment_tree(&self, thread_id: &str) -> Result<CommentTree, ProviderError> {
            self.threads
                .lock()
                .unwrap()
                .get(thread_id)
                .cloned()
                .ok_or_else(|| format!("thread {thread_id} unreachable").into())
        }
    }

    #[derive(Default)]
    struct FakeDestination {
        creates: Mutex<Vec<CreateCall>>,
        approvals: Mutex<Vec<String>>,
        fail_author: Option<String>,
        fail_approve: bool,
    }

    impl FakeDestination {
        fn creates(&self) -> Vec<CreateCall> {
            self.creates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DestinationProvider for FakeDestination {
        async fn create_comment(&self, comment: NewComment<'_>) -> Result<String, ProviderError> {
            if self.fail_author.as_deref() == Some(comment.author_name) {
                return Err("status 500".into());
            }
            let mut creates = self.creates.lock().unwrap();
            creates.push(CreateCall {
                author: comment.author_name.to_string(),
                body: comment.body_html.to_string(),
                thread_id: comment.thread_id.to_string(),
                parent_id: comment.parent_id.map(str::to_string),
                as_owner: comment.as_owner,
            });
            Ok(format!("d{}", comment.author_name))
        }

        async fn approve_comment(&self, comment_id: &str) -> Result<(), ProviderError> {
            if self.fail_approve {
                return Err("approve rejected".into());
            }
            self.approvals.lock().unwrap().push(comment_id.to_string());
            Ok(())
        }
    }

    /// Records the ledger size seen at every save.
    #[derive(Default)]
    struct RecordingCheckpoint {
        saves: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl Checkpoint for RecordingCheckpoint {
        fn save(&self, registry: &PostRegistry) -> Result<(), ProviderError> {
            if self.fail {
                return Err("disk full".into());
            }
            let copied = registry.posts().iter().map(|post| post.copied_count()).sum();
            self.saves.lock().unwrap().push(copied);
            Ok(())
        }
    }

    fn real(id: &str, body: &str) -> Comment {
        Comment::Real(RealComment {
            source_platform: SourcePlatform::EaForum,
            source_post_id: THREAD.to_string(),
            source_comment_id: id.to_string(),
            permalink_url: format!("{THREAD}#{id}"),
            // The fake destination derives ids from the author name.
            author_display_name: id.to_string(),
            is_owner: id == "owner",
            body_html: body.to_string(),
        })
    }

    fn placeholder() -> Comment {
        Comment::Placeholder(PlaceholderComment::new(
            SourcePlatform::EaForum,
            THREAD,
            "missing author",
            "<div class=\"entry\"></div>",
        ))
    }

    fn chain(ids: &[&str]) -> CommentTree {
        let mut tree = CommentTree::new();
        let mut parent: Option<&str> = None;
        for id in ids {
            tree.push_with_parent_ref(real(id, &format!("<p>{id}</p>")), parent)
                .unwrap();
            parent = Some(id);
        }
        tree
    }

    fn registry() -> PostRegistry {
        let mut sources = BTreeMap::new();
        sources.insert(SourcePlatform::EaForum, ThreadIds::new([THREAD]));
        let manifest = [ManifestEntry {
            destination: POST.to_string(),
            sources,
        }];
        PostRegistry::reconcile(None, &manifest, ConflictPolicy::Fail)
            .unwrap()
            .0
    }

    fn options() -> SyncOptions {
        SyncOptions {
            create_delay: Duration::ZERO,
        }
    }

    fn ledger_pairs(registry: &PostRegistry) -> Vec<(String, String)> {
        registry
            .get(POST)
            .and_then(|post| post.ledger(SourcePlatform::EaForum))
            .map(|ledger| {
                ledger
                    .iter()
                    .map(|(source, copied)| (source.to_string(), copied.destination_id.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn pair(source: &str, destination: &str) -> (String, String) {
        (source.to_string(), destination.to_string())
    }

    #[tokio::test]
    async fn chain_is_created_parent_first() {
        let source = FakeSource::default();
        source.set(THREAD, chain(&["A", "B", "C"]));
        let destination = FakeDestination::default();
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());
        let mut registry = registry();

        let report = engine.sync_post(&mut registry, POST, &source).await.unwrap();

        assert_eq!(report.created, 3);
        let creates = destination.creates();
        let order: Vec<_> = creates.iter().map(|call| call.author.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
        assert_eq!(creates[0].parent_id, None);
        assert_eq!(creates[1].parent_id.as_deref(), Some("dA"));
        assert_eq!(creates[2].parent_id.as_deref(), Some("dB"));
        assert!(creates.iter().all(|call| call.thread_id == POST));
        assert_eq!(
            ledger_pairs(&registry),
            vec![pair("A", "dA"), pair("B", "dB"), pair("C", "dC")]
        );
        // One save per creation, each seeing the entry it follows.
        assert_eq!(*checkpoint.saves.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(destination.approvals.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn second_sync_of_unchanged_thread_creates_nothing() {
        let source = FakeSource::default();
        source.set(THREAD, chain(&["A", "B", "C"]));
        let destination = FakeDestination::default();
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());
        let mut registry = registry();

        engine.sync_post(&mut registry, POST, &source).await.unwrap();
        let ledger_before = ledger_pairs(&registry);
        let report = engine.sync_post(&mut registry, POST, &source).await.unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.already_copied, 3);
        assert_eq!(destination.creates().len(), 3);
        assert_eq!(ledger_pairs(&registry), ledger_before);
    }

    #[tokio::test]
    async fn new_reply_is_attached_to_recorded_parent() {
        let source = FakeSource::default();
        source.set(THREAD, chain(&["A", "B", "C"]));
        let destination = FakeDestination::default();
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());
        let mut registry = registry();
        engine.sync_post(&mut registry, POST, &source).await.unwrap();

        let mut grown = chain(&["A", "B", "C"]);
        grown
            .push_with_parent_ref(real("D", "<p>D</p>"), Some("B"))
            .unwrap();
        source.set(THREAD, grown);
        let report = engine.sync_post(&mut registry, POST, &source).await.unwrap();

        assert_eq!(report.created, 1);
        let creates = destination.creates();
        let last = creates.last().unwrap();
        assert_eq!(last.author, "D");
        assert_eq!(last.parent_id.as_deref(), Some("dB"));
        assert_eq!(ledger_pairs(&registry).len(), 4);
    }

    #[tokio::test]
    async fn redacted_comment_keeps_its_place_in_the_tree() {
        let mut tree = CommentTree::new();
        tree.push_with_parent_ref(real("E", &format!("<p>private {REDACT_MARKER}</p>")), None)
            .unwrap();
        tree.push_with_parent_ref(real("F", "<p>reply</p>"), Some("E"))
            .unwrap();
        let source = FakeSource::default();
        source.set(THREAD, tree);
        let destination = FakeDestination::default();
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());
        let mut registry = registry();

        let report = engine.sync_post(&mut registry, POST, &source).await.unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(report.redacted, 1);
        let creates = destination.creates();
        assert!(creates[0].body.ends_with(REDACTED_BODY));
        assert!(!creates[0].body.contains("private"));
        assert_eq!(creates[1].parent_id.as_deref(), Some("dE"));
        let entry = registry
            .get(POST)
            .and_then(|post| post.ledger(SourcePlatform::EaForum))
            .and_then(|ledger| ledger.get("E"))
            .cloned()
            .unwrap();
        assert_eq!(entry.destination_id, "dE");
        assert!(entry.redacted);
    }

    #[tokio::test]
    async fn placeholder_does_not_block_siblings() {
        let mut tree = CommentTree::new();
        tree.push_top_level(real("A", "<p>a</p>"));
        let broken = tree.push_top_level(placeholder());
        tree.push_reply(broken, real("orphan", "<p>o</p>")).unwrap();
        tree.push_top_level(real("B", "<p>b</p>"));
        tree.push_top_level(real("C", "<p>c</p>"));
        let source = FakeSource::default();
        source.set(THREAD, tree);
        let destination = FakeDestination::default();
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());
        let mut registry = registry();

        let report = engine.sync_post(&mut registry, POST, &source).await.unwrap();

        assert_eq!(report.created, 3);
        assert_eq!(report.unhandled.len(), 2);
        let authors: Vec<_> = destination
            .creates()
            .into_iter()
            .map(|call| call.author)
            .collect();
        assert_eq!(authors, vec!["A", "B", "C"]);
        assert_eq!(ledger_pairs(&registry).len(), 3);
    }

    #[tokio::test]
    async fn owner_comments_skip_approval() {
        let mut tree = CommentTree::new();
        tree.push_top_level(real("owner", "<p>mine</p>"));
        let source = FakeSource::default();
        source.set(THREAD, tree);
        let destination = FakeDestination::default();
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());
        let mut registry = registry();

        engine.sync_post(&mut registry, POST, &source).await.unwrap();

        assert!(destination.creates()[0].as_owner);
        assert!(destination.approvals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_create_is_not_recorded_and_stops_the_pair() {
        let source = FakeSource::default();
        source.set(THREAD, chain(&["A", "B", "C"]));
        let destination = FakeDestination {
            fail_author: Some("B".to_string()),
            ..FakeDestination::default()
        };
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());
        let mut registry = registry();

        let err = engine
            .sync_post(&mut registry, POST, &source)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Create { ref comment_id, .. } if comment_id == "B"));
        assert_eq!(ledger_pairs(&registry), vec![pair("A", "dA")]);
    }

    #[tokio::test]
    async fn failed_approval_is_not_recorded() {
        let source = FakeSource::default();
        source.set(THREAD, chain(&["A"]));
        let destination = FakeDestination {
            fail_approve: true,
            ..FakeDestination::default()
        };
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());
        let mut registry = registry();

        let err = engine
            .sync_post(&mut registry, POST, &source)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Approve { .. }));
        assert!(ledger_pairs(&registry).is_empty());
        assert!(checkpoint.saves.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn post_without_platform_link_is_a_no_op() {
        let mut sources = BTreeMap::new();
        sources.insert(SourcePlatform::Facebook, ThreadIds::new(["10_20"]));
        let manifest = [ManifestEntry {
            destination: POST.to_string(),
            sources,
        }];
        let mut registry = PostRegistry::reconcile(None, &manifest, ConflictPolicy::Fail)
            .unwrap()
            .0;
        let source = FakeSource::default();
        let destination = FakeDestination::default();
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());

        let report = engine.sync_post(&mut registry, POST, &source).await.unwrap();

        assert_eq!(report.threads, 0);
        assert!(destination.creates().is_empty());
    }

    #[tokio::test]
    async fn failing_pair_does_not_stop_other_posts() {
        let mut first = BTreeMap::new();
        first.insert(SourcePlatform::EaForum, ThreadIds::new(["missing"]));
        let mut second = BTreeMap::new();
        second.insert(SourcePlatform::EaForum, ThreadIds::new([THREAD]));
        let manifest = [
            ManifestEntry {
                destination: "broken".to_string(),
                sources: first,
            },
            ManifestEntry {
                destination: POST.to_string(),
                sources: second,
            },
        ];
        let mut registry = PostRegistry::reconcile(None, &manifest, ConflictPolicy::Fail)
            .unwrap()
            .0;
        let source = FakeSource::default();
        source.set(THREAD, chain(&["A"]));
        let destination = FakeDestination::default();
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());

        let summary = engine.sync_registry(&mut registry, &[&source]).await;

        assert_eq!(summary.pairs_failed, 1);
        assert_eq!(summary.pairs_synced, 1);
        assert_eq!(summary.report.created, 1);
        assert_eq!(ledger_pairs(&registry), vec![pair("A", "dA")]);
    }

    #[tokio::test]
    async fn dry_run_entries_are_flagged() {
        let source = FakeSource::default();
        source.set(THREAD, chain(&["A", "B"]));
        let destination = DryRunDestination;
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());
        let mut registry = registry();

        engine.sync_post(&mut registry, POST, &source).await.unwrap();

        let ledger = registry
            .get(POST)
            .and_then(|post| post.ledger(SourcePlatform::EaForum))
            .unwrap();
        assert!(ledger.iter().all(|(_, copied)| copied.dry_run));
        assert_eq!(registry.discard_dry_run(), 2);
    }

    #[tokio::test]
    async fn threads_of_one_platform_share_a_ledger() {
        const SECOND: &str = "https://forum.example/ea/154/post-mirror/";
        let mut sources = BTreeMap::new();
        sources.insert(SourcePlatform::EaForum, ThreadIds::new([THREAD, SECOND]));
        let manifest = [ManifestEntry {
            destination: POST.to_string(),
            sources,
        }];
        let mut registry = PostRegistry::reconcile(None, &manifest, ConflictPolicy::Fail)
            .unwrap()
            .0;
        let source = FakeSource::default();
        source.set(THREAD, chain(&["A", "B"]));
        let mut second = CommentTree::new();
        second.push_top_level(real("A", "<p>A</p>"));
        second.push_top_level(real("G", "<p>G</p>"));
        source.set(SECOND, second);
        let destination = FakeDestination::default();
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());

        let report = engine.sync_post(&mut registry, POST, &source).await.unwrap();

        assert_eq!(report.threads, 2);
        assert_eq!(report.created, 3);
        assert_eq!(report.already_copied, 1);
        let authors: Vec<_> = destination
            .creates()
            .into_iter()
            .map(|call| call.author)
            .collect();
        assert_eq!(authors, vec!["A", "B", "G"]);
        assert_eq!(
            ledger_pairs(&registry),
            vec![pair("A", "dA"), pair("B", "dB"), pair("G", "dG")]
        );
    }

    #[tokio::test]
    async fn registry_sync_covers_every_source_and_skips_retired_posts() {
        let mut links = BTreeMap::new();
        links.insert(SourcePlatform::EaForum, ThreadIds::new([THREAD]));
        links.insert(SourcePlatform::Facebook, ThreadIds::new(["10_20"]));
        let mut retired_links = BTreeMap::new();
        retired_links.insert(SourcePlatform::EaForum, ThreadIds::new([THREAD]));
        let snapshot = PostRegistry::reconcile(
            None,
            &[ManifestEntry {
                destination: "gone".to_string(),
                sources: retired_links,
            }],
            ConflictPolicy::Fail,
        )
        .unwrap()
        .0;
        let manifest = [ManifestEntry {
            destination: POST.to_string(),
            sources: links,
        }];
        let (mut registry, stats) =
            PostRegistry::reconcile(Some(snapshot), &manifest, ConflictPolicy::Fail).unwrap();
        assert_eq!(stats.retired, 1);

        let forum = FakeSource::default();
        forum.set(THREAD, chain(&["A"]));
        let facebook = FakeSource::for_platform(SourcePlatform::Facebook);
        facebook.set("10_20", chain(&["F"]));
        let destination = FakeDestination::default();
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());

        let summary = engine
            .sync_registry(&mut registry, &[&forum, &facebook])
            .await;

        assert_eq!(summary.pairs_synced, 2);
        assert_eq!(summary.pairs_failed, 0);
        assert_eq!(summary.report.created, 2);
        let post = registry.get(POST).unwrap();
        assert_eq!(
            post.ledger(SourcePlatform::Facebook)
                .and_then(|ledger| ledger.destination_id("F")),
            Some("dF")
        );
        assert_eq!(registry.get("gone").map(|post| post.copied_count()), Some(0));
    }

    #[tokio::test]
    async fn retired_post_is_never_synced() {
        let snapshot = registry();
        let (mut registry, _) =
            PostRegistry::reconcile(Some(snapshot), &[], ConflictPolicy::Fail).unwrap();
        let source = FakeSource::default();
        source.set(THREAD, chain(&["A", "B"]));
        let destination = FakeDestination::default();
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());

        let summary = engine.sync_registry(&mut registry, &[&source]).await;

        assert_eq!(summary.pairs_synced, 0);
        assert_eq!(summary.report.created, 0);
        assert!(destination.creates().is_empty());
    }

    #[tokio::test]
    async fn checkpoint_failure_names_the_thread() {
        let source = FakeSource::default();
        source.set(THREAD, chain(&["A"]));
        let destination = FakeDestination::default();
        let checkpoint = RecordingCheckpoint {
            fail: true,
            ..RecordingCheckpoint::default()
        };
        let engine = SyncEngine::new(&destination, &checkpoint, options());
        let mut registry = registry();

        let err = engine
            .sync_post(&mut registry, POST, &source)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Checkpoint { .. }));
        assert_eq!(err.thread_id(), Some(THREAD));
        assert!(err.to_string().contains(THREAD));
    }

    #[tokio::test]
    async fn unknown_post_has_no_thread() {
        let source = FakeSource::default();
        let destination = FakeDestination::default();
        let checkpoint = RecordingCheckpoint::default();
        let engine = SyncEngine::new(&destination, &checkpoint, options());
        let mut registry = registry();

        let err = engine
            .sync_post(&mut registry, "absent", &source)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Registry(_)));
        assert_eq!(err.thread_id(), None);
    }
}
