use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::ledger::{CopiedComment, CopyLedger};
use crate::error::CoreError;
use crate::types::platform::SourcePlatform;
use crate::types::thread_ids::ThreadIds;

/// A destination post and the source threads mirrored into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub destination_post_id: String,
    pub other_ids: BTreeMap<SourcePlatform, ThreadIds>,
    #[serde(default)]
    pub ledgers: BTreeMap<SourcePlatform, CopyLedger>,
    /// Set when the post is no longer listed in the manifest. Its ledgers
    /// are kept but it is not synced.
    #[serde(default, skip_serializing_if = "is_false")]
    pub retired: bool,
}

impl Post {
    pub fn new(
        destination_post_id: impl Into<String>,
        other_ids: BTreeMap<SourcePlatform, ThreadIds>,
    ) -> Self {
        let ledgers = other_ids
            .keys()
            .map(|platform| (*platform, CopyLedger::new()))
            .collect();
        Self {
            destination_post_id: destination_post_id.into(),
            other_ids,
            ledgers,
            retired: false,
        }
    }

    pub fn thread_ids(&self, platform: SourcePlatform) -> Option<&ThreadIds> {
        self.other_ids.get(&platform).filter(|ids| !ids.is_empty())
    }

    pub fn ledger(&self, platform: SourcePlatform) -> Option<&CopyLedger> {
        self.ledgers.get(&platform)
    }

    pub fn ledger_mut(&mut self, platform: SourcePlatform) -> &mut CopyLedger {
        self.ledgers.entry(platform).or_default()
    }

    pub fn has_same_links(&self, other_ids: &BTreeMap<SourcePlatform, ThreadIds>) -> bool {
        &self.other_ids == other_ids
    }

    pub fn copied_count(&self) -> usize {
        self.ledgers.values().map(CopyLedger::len).sum()
    }

    fn relink(&mut self, other_ids: BTreeMap<SourcePlatform, ThreadIds>) {
        for platform in other_ids.keys() {
            self.ledgers.entry(*platform).or_default();
        }
        self.other_ids = other_ids;
    }
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "post {} ({} copied comments)",
            self.destination_post_id,
            self.copied_count()
        )
    }
}

/// One manifest line: which source threads feed a destination post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(alias = "disqus")]
    pub destination: String,
    #[serde(alias = "others", default)]
    pub sources: BTreeMap<SourcePlatform, ThreadIds>,
}

/// What to do when the manifest and the snapshot disagree on a post's links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    #[default]
    Fail,
    PreferManifest,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub restored: usize,
    pub relinked: usize,
    pub retired: usize,
}

/// All posts, in manifest order followed by retired posts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostRegistry {
    posts: Vec<Post>,
    index: HashMap<String, usize>,
}

impl PostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_posts(posts: Vec<Post>) -> Result<Self, CoreError> {
        let mut registry = Self::new();
        for post in posts {
            registry.insert(post)?;
        }
        Ok(registry)
    }

    /// Merges the previous run's state with the current manifest.
    ///
    /// The snapshot is authoritative for ledgers, the manifest for links.
    /// Snapshot posts missing from the manifest are kept as retired.
    pub fn reconcile(
        snapshot: Option<PostRegistry>,
        manifest: &[ManifestEntry],
        policy: ConflictPolicy,
    ) -> Result<(Self, ReconcileStats), CoreError> {
        let mut previous = snapshot.unwrap_or_default();
        let mut registry = Self::new();
        let mut stats = ReconcileStats::default();
        let mut seen = HashSet::new();

        for entry in manifest {
            let post_id = normalize_post_id(&entry.destination)?;
            if !seen.insert(post_id.clone()) {
                return Err(CoreError::DuplicateManifestPost(post_id));
            }
            let post = match previous.remove(&post_id) {
                Some(mut old) => {
                    if !old.has_same_links(&entry.sources) {
                        match policy {
                            ConflictPolicy::Fail => {
                                return Err(CoreError::ConflictingLinks {
                                    post_id,
                                    snapshot: format!("{:?}", old.other_ids),
                                    manifest: format!("{:?}", entry.sources),
                                });
                            }
                            ConflictPolicy::PreferManifest => {
                                warn!(
                                    post_id = %post_id,
                                    snapshot = ?old.other_ids,
                                    manifest = ?entry.sources,
                                    "post links changed; adopting manifest and keeping ledgers"
                                );
                                old.relink(entry.sources.clone());
                                stats.relinked += 1;
                            }
                        }
                    }
                    if old.retired {
                        info!(post_id = %post_id, "retired post listed again in manifest");
                        old.retired = false;
                    }
                    stats.restored += 1;
                    old
                }
                None => {
                    stats.created += 1;
                    Post::new(post_id, entry.sources.clone())
                }
            };
            registry.insert(post)?;
        }

        for mut post in previous.posts {
            if !post.retired {
                warn!(
                    post_id = %post.destination_post_id,
                    copied = post.copied_count(),
                    "post missing from manifest; keeping its ledgers as retired"
                );
                post.retired = true;
            }
            stats.retired += 1;
            registry.insert(post)?;
        }

        Ok((registry, stats))
    }

    pub fn get(&self, post_id: &str) -> Option<&Post> {
        self.index.get(post_id).map(|idx| &self.posts[*idx])
    }

    pub fn get_mut(&mut self, post_id: &str) -> Option<&mut Post> {
        let idx = *self.index.get(post_id)?;
        self.posts.get_mut(idx)
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn active_posts(&self) -> impl Iterator<Item = &Post> {
        self.posts.iter().filter(|post| !post.retired)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Looks up the destination id for an already copied source comment.
    pub fn copied_destination(
        &self,
        post_id: &str,
        platform: SourcePlatform,
        source_comment_id: &str,
    ) -> Option<&str> {
        self.get(post_id)?
            .ledger(platform)?
            .destination_id(source_comment_id)
    }

    pub fn record_copy(
        &mut self,
        post_id: &str,
        platform: SourcePlatform,
        source_comment_id: &str,
        copied: CopiedComment,
    ) -> Result<(), CoreError> {
        let post = self.get_mut(post_id).ok_or_else(|| CoreError::UnknownPost {
            post_id: post_id.to_string(),
        })?;
        post.ledger_mut(platform)
            .record(platform, source_comment_id, copied)
    }

    /// Removes every ledger entry created by a dry run.
    pub fn discard_dry_run(&mut self) -> usize {
        self.posts
            .iter_mut()
            .flat_map(|post| post.ledgers.values_mut())
            .map(CopyLedger::discard_dry_run)
            .sum()
    }

    fn insert(&mut self, post: Post) -> Result<(), CoreError> {
        let post_id = normalize_post_id(&post.destination_post_id)?;
        if self.index.contains_key(&post_id) {
            return Err(CoreError::DuplicateManifestPost(post_id));
        }
        self.index.insert(post_id, self.posts.len());
        self.posts.push(post);
        Ok(())
    }

    fn remove(&mut self, post_id: &str) -> Option<Post> {
        let idx = self.index.remove(post_id)?;
        let post = self.posts.remove(idx);
        for value in self.index.values_mut() {
            if *value > idx {
                *value -= 1;
            }
        }
        Some(post)
    }
}

fn normalize_post_id(value: &str) -> Result<String, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(CoreError::InvalidPostId(value.to_string()));
    }
    Ok(trimmed.to_string())
}

fn is_false(value: &bool) -> bool {
    !*value
}
