use thiserror::Error;

use crate::types::platform::SourcePlatform;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid post id: {0}")]
    InvalidPostId(String),
    #[error("unknown parent id {parent_id} for comment {comment_id}")]
    UnknownParent {
        comment_id: String,
        parent_id: String,
    },
    #[error("comment {comment_id} from {platform} already copied as {existing}")]
    AlreadyCopied {
        platform: SourcePlatform,
        comment_id: String,
        existing: String,
    },
    #[error("post {0} listed more than once in manifest")]
    DuplicateManifestPost(String),
    #[error("post {post_id} not found in registry")]
    UnknownPost { post_id: String },
    #[error(
        "post {post_id} has different links in snapshot and manifest\nsnapshot: {snapshot}\nmanifest: {manifest}"
    )]
    ConflictingLinks {
        post_id: String,
        snapshot: String,
        manifest: String,
    },
}
