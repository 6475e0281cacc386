use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use mirror_core::domain::ports::{Checkpoint, ProviderError};
use mirror_core::domain::registry::{Post, PostRegistry};
use mirror_core::error::CoreError;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("snapshot json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    #[error("snapshot checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("snapshot registry error: {0}")]
    Registry(#[from] CoreError),
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    checksum: String,
    posts: &'a RawValue,
}

#[derive(Deserialize)]
struct SnapshotIn {
    version: u32,
    checksum: String,
    posts: Box<RawValue>,
}

/// File-backed registry snapshot.
///
/// A read-only store loads normally but never writes; dry runs use it.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    read_only: bool,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_only: false,
        }
    }

    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_only: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` when no snapshot has been written yet.
    pub fn load(&self) -> Result<Option<PostRegistry>, SnapshotError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no snapshot yet; starting empty");
                return Ok(None);
            }
            Err(source) => {
                return Err(SnapshotError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let file: SnapshotIn = serde_json::from_slice(&bytes)?;
        if file.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(file.version));
        }
        let actual = checksum(file.posts.get());
        if !actual.eq_ignore_ascii_case(&file.checksum) {
            return Err(SnapshotError::ChecksumMismatch {
                expected: file.checksum,
                actual,
            });
        }

        let posts: Vec<Post> = serde_json::from_str(file.posts.get())?;
        let mut registry = PostRegistry::from_posts(posts)?;
        let discarded = registry.discard_dry_run();
        if discarded > 0 {
            warn!(discarded, "dropped dry-run entries from snapshot");
        }
        debug!(path = %self.path.display(), posts = registry.len(), "snapshot loaded");
        Ok(Some(registry))
    }

    /// Replaces the snapshot atomically: temp file, fsync, rename.
    pub fn save(&self, registry: &PostRegistry) -> Result<(), SnapshotError> {
        if self.read_only {
            debug!(path = %self.path.display(), "read-only snapshot; skipping save");
            return Ok(());
        }

        let posts = serde_json::to_string(registry.posts())?;
        let posts = RawValue::from_string(posts)?;
        let document = SnapshotOut {
            version: SNAPSHOT_VERSION,
            checksum: checksum(posts.get()),
            posts: &posts,
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(parent, source))?;
        }
        let tmp_path = self.tmp_path();
        let mut file = File::create(&tmp_path).map_err(|source| self.io_error(&tmp_path, source))?;
        file.write_all(&bytes)
            .and_then(|()| file.sync_all())
            .map_err(|source| self.io_error(&tmp_path, source))?;
        drop(file);
        fs::rename(&tmp_path, &self.path).map_err(|source| self.io_error(&self.path, source))?;
        debug!(path = %self.path.display(), posts = registry.len(), "snapshot saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl Checkpoint for SnapshotStore {
    fn save(&self, registry: &PostRegistry) -> Result<(), ProviderError> {
        SnapshotStore::save(self, registry).map_err(Into::into)
    }
}

fn checksum(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}
