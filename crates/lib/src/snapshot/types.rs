use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A freshly created snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
  pub id: String,
  pub mount_path: PathBuf,
}

/// Per-snapshot metadata kept by the directory backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
  pub id: String,
  pub basis: Option<String>,
  pub created_at: u64,
  pub description: String,
  /// Set while the snapshot is an open transaction.
  pub open: bool,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("snapshot not found: {0}")]
  NotFound(String),

  #[error("invalid snapshot id: '{0}'")]
  InvalidId(String),

  #[error("refusing to delete the default snapshot {0}")]
  DeleteDefault(String),

  #[error("failed to create snapshot directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to read snapshot metadata: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write snapshot metadata: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse snapshot metadata: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize snapshot metadata: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported snapshot index version: {0}")]
  UnsupportedVersion(u32),

  #[error("failed to copy {path}: {source}")]
  Copy {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove snapshot {id}: {source}")]
  Remove {
    id: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to run {command}: {source}")]
  Spawn {
    command: String,
    #[source]
    source: io::Error,
  },

  #[error("{command} failed with exit code {code:?}: {stderr}")]
  Backend {
    command: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("unexpected output from {command}: {output}")]
  UnexpectedOutput { command: String, output: String },
}

/// Snapshot ids are decimal numbers; anything else could escape the snapshot root.
pub fn validate_id(id: &str) -> Result<(), SnapshotError> {
  if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
    return Err(SnapshotError::InvalidId(id.to_string()));
  }
  Ok(())
}
