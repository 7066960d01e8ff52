//! Plain directory snapshot backend.
//!
//! Each snapshot is a full copy of its basis tree. Slow and space hungry compared to
//! btrfs, but it works on any filesystem.
//!
//! # Storage Layout
//!
//! ```text
//! {root}/
//! ├── index.json          # { version, default }
//! └── <id>/
//!     ├── info.json       # SnapshotInfo
//!     └── snapshot/       # the tree commands run against
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::consts::SNAPSHOT_DESCRIPTION;

use super::SnapshotStore;
use super::types::{SnapshotError, SnapshotHandle, SnapshotInfo, validate_id};

const INDEX_FILENAME: &str = "index.json";
const INFO_FILENAME: &str = "info.json";
const TREE_DIR: &str = "snapshot";
const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct DirectoryIndex {
  version: u32,
  default: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DirectoryStore {
  root: PathBuf,
}

impl DirectoryStore {
  pub fn new(root: PathBuf) -> Self {
    Self { root }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn snapshot_dir(&self, id: &str) -> PathBuf {
    self.root.join(id)
  }

  fn tree_path(&self, id: &str) -> PathBuf {
    self.snapshot_dir(id).join(TREE_DIR)
  }

  fn info_path(&self, id: &str) -> PathBuf {
    self.snapshot_dir(id).join(INFO_FILENAME)
  }

  fn index_path(&self) -> PathBuf {
    self.root.join(INDEX_FILENAME)
  }

  fn load_index(&self) -> Result<DirectoryIndex, SnapshotError> {
    let content = match fs::read_to_string(self.index_path()) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        return Ok(DirectoryIndex {
          version: INDEX_VERSION,
          default: None,
        });
      }
      Err(e) => return Err(SnapshotError::Read(e)),
    };

    let index: DirectoryIndex = serde_json::from_str(&content).map_err(SnapshotError::Parse)?;
    if index.version != INDEX_VERSION {
      return Err(SnapshotError::UnsupportedVersion(index.version));
    }
    Ok(index)
  }

  fn save_index(&self, index: &DirectoryIndex) -> Result<(), SnapshotError> {
    fs::create_dir_all(&self.root).map_err(SnapshotError::CreateDir)?;
    let content = serde_json::to_string_pretty(index).map_err(SnapshotError::Serialize)?;
    write_atomic(&self.index_path(), &content)
  }

  /// Load the metadata of snapshot `id`.
  pub fn load_info(&self, id: &str) -> Result<SnapshotInfo, SnapshotError> {
    validate_id(id)?;
    let content = fs::read_to_string(self.info_path(id)).map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        SnapshotError::NotFound(id.to_string())
      } else {
        SnapshotError::Read(e)
      }
    })?;
    serde_json::from_str(&content).map_err(SnapshotError::Parse)
  }

  fn save_info(&self, info: &SnapshotInfo) -> Result<(), SnapshotError> {
    let content = serde_json::to_string_pretty(info).map_err(SnapshotError::Serialize)?;
    write_atomic(&self.info_path(&info.id), &content)
  }

  /// Ids of all snapshots, ascending.
  pub fn ids(&self) -> Result<Vec<u64>, SnapshotError> {
    self.numeric_dirs(true)
  }

  /// Numeric directory names under the root, ascending. With `complete_only`,
  /// directories without `info.json` (a crashed create) are skipped.
  fn numeric_dirs(&self, complete_only: bool) -> Result<Vec<u64>, SnapshotError> {
    let entries = match fs::read_dir(&self.root) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(SnapshotError::Read(e)),
    };

    let mut ids: Vec<u64> = entries
      .filter_map(|entry| entry.ok())
      .filter(|entry| entry.path().is_dir())
      .filter(|entry| !complete_only || entry.path().join(INFO_FILENAME).is_file())
      .filter_map(|entry| entry.file_name().to_str().and_then(|name| name.parse().ok()))
      .collect();
    ids.sort_unstable();
    Ok(ids)
  }

  /// Id of the current default snapshot, if one has been set.
  pub fn default_id(&self) -> Result<Option<String>, SnapshotError> {
    Ok(self.load_index()?.default)
  }

  fn next_id(&self) -> Result<String, SnapshotError> {
    let next = self.numeric_dirs(false)?.last().map_or(1, |last| last + 1);
    Ok(next.to_string())
  }

  /// Create an empty, closed snapshot to branch transactions from.
  ///
  /// Becomes the default if no default exists yet.
  pub fn create_base(&self, description: &str) -> Result<SnapshotHandle, SnapshotError> {
    let id = self.next_id()?;
    let mount_path = self.tree_path(&id);
    fs::create_dir_all(&mount_path).map_err(SnapshotError::CreateDir)?;

    self.save_info(&SnapshotInfo {
      id: id.clone(),
      basis: None,
      created_at: now_unix(),
      description: description.to_string(),
      open: false,
    })?;

    let mut index = self.load_index()?;
    if index.default.is_none() {
      index.default = Some(id.clone());
      self.save_index(&index)?;
    }

    info!(id = %id, "created base snapshot");
    Ok(SnapshotHandle { id, mount_path })
  }

  fn create_from(&self, basis_id: &str) -> Result<SnapshotHandle, SnapshotError> {
    let source = self.tree_path(basis_id);
    let id = self.next_id()?;
    let target = self.tree_path(&id);

    fs::create_dir_all(&self.root).map_err(SnapshotError::CreateDir)?;
    fs::create_dir(self.snapshot_dir(&id)).map_err(SnapshotError::CreateDir)?;
    copy_tree(&source, &target)?;
    self.save_info(&SnapshotInfo {
      id: id.clone(),
      basis: Some(basis_id.to_string()),
      created_at: now_unix(),
      description: SNAPSHOT_DESCRIPTION.to_string(),
      open: true,
    })?;

    Ok(SnapshotHandle { id, mount_path: target })
  }

  fn remove_partial(&self, id: &str) {
    if let Err(e) = fs::remove_dir_all(self.snapshot_dir(id))
      && e.kind() != io::ErrorKind::NotFound
    {
      warn!(id = %id, error = %e, "failed to clean up partially created snapshot");
    }
  }
}

impl SnapshotStore for DirectoryStore {
  fn create(&self, basis: &str) -> Result<SnapshotHandle, SnapshotError> {
    let basis_id = self.resolve(basis)?;
    let expected_id = self.next_id()?;

    match self.create_from(&basis_id) {
      Ok(handle) => {
        info!(id = %handle.id, basis = %basis_id, "created snapshot");
        Ok(handle)
      }
      Err(e) => {
        self.remove_partial(&expected_id);
        Err(e)
      }
    }
  }

  fn mount_path_of(&self, id: &str) -> Result<PathBuf, SnapshotError> {
    validate_id(id)?;
    let path = self.tree_path(id);
    if !path.is_dir() {
      return Err(SnapshotError::NotFound(id.to_string()));
    }
    Ok(path)
  }

  fn is_open(&self, id: &str) -> Result<bool, SnapshotError> {
    if validate_id(id).is_err() {
      return Ok(false);
    }
    match self.load_info(id) {
      Ok(info) => Ok(info.open),
      Err(SnapshotError::NotFound(_)) => Ok(false),
      Err(e) => Err(e),
    }
  }

  fn set_default(&self, id: &str) -> Result<(), SnapshotError> {
    let mut info = self.load_info(id)?;

    // Promote first; the open mark must survive a failed promotion.
    let mut index = self.load_index()?;
    index.default = Some(id.to_string());
    self.save_index(&index)?;

    info.open = false;
    self.save_info(&info)?;

    info!(id = %id, "set default snapshot");
    Ok(())
  }

  fn delete(&self, id: &str) -> Result<(), SnapshotError> {
    validate_id(id)?;
    if self.load_index()?.default.as_deref() == Some(id) {
      return Err(SnapshotError::DeleteDefault(id.to_string()));
    }

    match fs::remove_dir_all(self.snapshot_dir(id)) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(SnapshotError::NotFound(id.to_string())),
      Err(source) => {
        return Err(SnapshotError::Remove {
          id: id.to_string(),
          source,
        });
      }
    }

    info!(id = %id, "deleted snapshot");
    Ok(())
  }

  fn resolve(&self, name: &str) -> Result<String, SnapshotError> {
    match name {
      "default" => self
        .default_id()?
        .ok_or_else(|| SnapshotError::NotFound("default".to_string())),
      "latest" => self
        .ids()?
        .last()
        .map(|id| id.to_string())
        .ok_or_else(|| SnapshotError::NotFound("latest".to_string())),
      id => {
        validate_id(id)?;
        if !self.info_path(id).is_file() {
          return Err(SnapshotError::NotFound(id.to_string()));
        }
        Ok(id.to_string())
      }
    }
  }
}

/// Write `content` to a temp file next to `path`, then rename it into place.
fn write_atomic(path: &Path, content: &str) -> Result<(), SnapshotError> {
  let mut temp_path = path.as_os_str().to_owned();
  temp_path.push(".tmp");
  let temp_path = PathBuf::from(temp_path);

  fs::write(&temp_path, content).map_err(SnapshotError::Write)?;
  fs::rename(&temp_path, path).map_err(SnapshotError::Write)?;
  Ok(())
}

fn now_unix() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}

/// Copy the tree at `source` to `target`, keeping symlinks and permissions.
fn copy_tree(source: &Path, target: &Path) -> Result<(), SnapshotError> {
  let copy_err = |path: &Path, source: io::Error| SnapshotError::Copy {
    path: path.to_path_buf(),
    source,
  };

  let mut dirs = Vec::new();

  for entry in WalkDir::new(source).follow_links(false) {
    let entry = entry.map_err(|e| {
      let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| source.to_path_buf());
      SnapshotError::Copy {
        path,
        source: e.into(),
      }
    })?;

    let relative = entry.path().strip_prefix(source).unwrap_or(Path::new(""));
    let dest = target.join(relative);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&dest).map_err(|e| copy_err(entry.path(), e))?;
      let permissions = entry.metadata().map_err(|e| copy_err(entry.path(), e.into()))?.permissions();
      dirs.push((dest, permissions));
    } else if file_type.is_symlink() {
      let link = fs::read_link(entry.path()).map_err(|e| copy_err(entry.path(), e))?;
      symlink(&link, &dest).map_err(|e| copy_err(entry.path(), e))?;
    } else {
      fs::copy(entry.path(), &dest).map_err(|e| copy_err(entry.path(), e))?;
    }
  }

  // Applied last so read-only directories can still be filled.
  for (dir, permissions) in dirs.into_iter().rev() {
    fs::set_permissions(&dir, permissions).map_err(|e| copy_err(&dir, e))?;
  }

  debug!(from = %source.display(), to = %target.display(), "copied snapshot tree");
  Ok(())
}

#[cfg(unix)]
fn symlink(link: &Path, dest: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(link, dest)
}

#[cfg(not(unix))]
fn symlink(_link: &Path, dest: &Path) -> io::Result<()> {
  Err(io::Error::new(
    io::ErrorKind::Unsupported,
    format!("cannot copy symlink {}", dest.display()),
  ))
}
