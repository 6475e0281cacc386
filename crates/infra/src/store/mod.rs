pub mod manifest;
pub mod snapshot;

pub use manifest::{ManifestError, load_manifest};
pub use snapshot::{SNAPSHOT_VERSION, SnapshotError, SnapshotStore};
