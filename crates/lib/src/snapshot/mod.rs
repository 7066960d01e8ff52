//! Snapshot backends.
//!
//! The transaction engine only talks to the [`SnapshotStore`] trait. Two backends
//! are provided:
//! - [`SnapperStore`]: btrfs snapshots managed through `snapper`
//! - [`DirectoryStore`]: plain directory trees, for systems without btrfs and for tests

mod directory;
mod snapper;
mod types;

pub use directory::DirectoryStore;
pub use snapper::SnapperStore;
pub use types::{SnapshotError, SnapshotHandle, SnapshotInfo, validate_id};

use std::path::PathBuf;

use crate::config::{Backend, Config};

/// Operations the transaction engine needs from a snapshot backend.
pub trait SnapshotStore {
  /// Create a new writable snapshot branched from `basis` and mark it as an open
  /// transaction. `basis` may be an id, `default` or `latest`.
  fn create(&self, basis: &str) -> Result<SnapshotHandle, SnapshotError>;

  /// Returns where the snapshot `id` is accessible on the host.
  fn mount_path_of(&self, id: &str) -> Result<PathBuf, SnapshotError>;

  /// Returns `true` if `id` exists and has not been finalized yet.
  fn is_open(&self, id: &str) -> Result<bool, SnapshotError>;

  /// Make `id` the default snapshot and clear its open-transaction mark.
  fn set_default(&self, id: &str) -> Result<(), SnapshotError>;

  /// Delete the snapshot `id`.
  fn delete(&self, id: &str) -> Result<(), SnapshotError>;

  /// Resolve `default`, `latest` or a literal id to a concrete id.
  fn resolve(&self, name: &str) -> Result<String, SnapshotError>;
}

/// Build the backend selected by `config`.
pub fn open_store(config: &Config) -> Box<dyn SnapshotStore> {
  match config.backend {
    Backend::Snapper => Box::new(SnapperStore::new(config.snapshot_root.clone())),
    Backend::Directory => Box::new(DirectoryStore::new(config.snapshot_root.clone())),
  }
}
