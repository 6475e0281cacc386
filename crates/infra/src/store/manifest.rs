use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use mirror_core::domain::registry::ManifestEntry;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid manifest {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads the list of destination posts and their source threads.
pub fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(&content).map_err(|source| ManifestError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(path = %path.display(), posts = entries.len(), "manifest loaded");
    Ok(entries)
}
