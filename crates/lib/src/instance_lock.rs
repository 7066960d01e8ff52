//! System-wide single-instance guard.
//!
//! Only one tukit process may manipulate snapshots at a time. The guard takes a
//! non-blocking exclusive `flock` on the configured lock file and removes the file
//! again when dropped.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
}

#[derive(Debug, Error)]
pub enum InstanceLockError {
  #[error("Another instance of tukit is already running: {command} (PID {pid}, started at Unix timestamp {started_at})")]
  AlreadyRunning {
    command: String,
    pid: u32,
    started_at: u64,
    lock_path: PathBuf,
  },

  #[error("Another instance of tukit is already running (lock file {lock_path})")]
  AlreadyRunningUnknown { lock_path: PathBuf },

  #[error("Could not create lock file '{path}': {source}")]
  OpenFile {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("Failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("Failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

impl InstanceLockError {
  /// Returns `true` if the lock is held by another process.
  pub fn is_already_running(&self) -> bool {
    matches!(
      self,
      InstanceLockError::AlreadyRunning { .. } | InstanceLockError::AlreadyRunningUnknown { .. }
    )
  }
}

/// Held exclusive lock. Released and removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
  file: File,
  lock_path: PathBuf,
}

impl InstanceLock {
  /// Acquire the lock at `lock_path`, recording `command` as the holder.
  ///
  /// Fails immediately if another process (or another guard in this process)
  /// holds it; the holder's file is left untouched. If locking fails for any other
  /// reason, or the metadata cannot be written, the lock file is removed.
  pub fn acquire(lock_path: &Path, command: &str) -> Result<Self, InstanceLockError> {
    if let Some(parent) = lock_path.parent()
      && !parent.as_os_str().is_empty()
      && !parent.exists()
    {
      std::fs::create_dir_all(parent).map_err(|source| InstanceLockError::OpenFile {
        path: lock_path.to_path_buf(),
        source,
      })?;
    }

    let file = lock_current_file(lock_path)?;

    if let Err(err) = write_metadata(&file, command) {
      drop(file);
      remove_lock_file(lock_path);
      return Err(err);
    }

    debug!(path = %lock_path.display(), "acquired instance lock");
    Ok(InstanceLock {
      file,
      lock_path: lock_path.to_path_buf(),
    })
  }

  /// Reads the lock metadata from the held file handle.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

impl Drop for InstanceLock {
  fn drop(&mut self) {
    remove_lock_file(&self.lock_path);
    debug!(path = %self.lock_path.display(), "released instance lock");
  }
}

/// Open and lock the file at `lock_path`.
///
/// A departing holder unlinks its file before closing it, so the file we locked may
/// already be gone from the path; in that case start over with the new file.
fn lock_current_file(lock_path: &Path) -> Result<File, InstanceLockError> {
  const ATTEMPTS: usize = 3;

  for _ in 0..ATTEMPTS {
    let file = open_lock_file(lock_path).map_err(|source| InstanceLockError::OpenFile {
      path: lock_path.to_path_buf(),
      source,
    })?;

    if let Err(err) = try_lock(&file) {
      // On contention the file belongs to the holder and must stay in place.
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(read_contention_error(lock_path));
      }
      drop(file);
      remove_lock_file(lock_path);
      return Err(InstanceLockError::LockFailed(err));
    }

    if is_linked_at(&file, lock_path) {
      return Ok(file);
    }
    debug!(path = %lock_path.display(), "lock file was replaced while locking, retrying");
  }

  Err(InstanceLockError::AlreadyRunningUnknown {
    lock_path: lock_path.to_path_buf(),
  })
}

#[cfg(unix)]
fn is_linked_at(file: &File, lock_path: &Path) -> bool {
  use std::os::unix::fs::MetadataExt;

  match (file.metadata(), std::fs::metadata(lock_path)) {
    (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
    _ => false,
  }
}

#[cfg(not(unix))]
fn is_linked_at(_file: &File, lock_path: &Path) -> bool {
  lock_path.exists()
}

#[cfg(unix)]
fn open_lock_file(path: &Path) -> io::Result<File> {
  use std::os::unix::fs::OpenOptionsExt;

  OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .truncate(false)
    .mode(0o600)
    .open(path)
}

#[cfg(not(unix))]
fn open_lock_file(path: &Path) -> io::Result<File> {
  OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .truncate(false)
    .open(path)
}

fn write_metadata(file: &File, command: &str) -> Result<(), InstanceLockError> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    command: command.to_string(),
  };

  file.set_len(0).map_err(InstanceLockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata)
    .map_err(|e| InstanceLockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(InstanceLockError::WriteMetadata)?;

  Ok(())
}

fn read_contention_error(lock_path: &Path) -> InstanceLockError {
  if let Ok(mut file) = File::open(lock_path) {
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_ok()
      && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
    {
      return InstanceLockError::AlreadyRunning {
        command: metadata.command,
        pid: metadata.pid,
        started_at: metadata.started_at_unix,
        lock_path: lock_path.to_path_buf(),
      };
    }
  }

  InstanceLockError::AlreadyRunningUnknown {
    lock_path: lock_path.to_path_buf(),
  }
}

fn remove_lock_file(lock_path: &Path) {
  match std::fs::remove_file(lock_path) {
    Ok(()) => {}
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(e) => warn!(path = %lock_path.display(), error = %e, "failed to remove lock file"),
  }
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> io::Result<()> {
  Err(io::Error::new(io::ErrorKind::Unsupported, "file locking requires a unix system"))
}
