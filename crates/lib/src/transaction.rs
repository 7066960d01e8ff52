//! Transaction lifecycle engine.
//!
//! A [`Transaction`] ties a snapshot to one tukit invocation:
//!
//! ```text
//! Uninitialized --init/resume--> Open --finalize--> Finalized
//!                                  |
//!                                  +--(dropped, not retained) / abort--> Discarded
//! ```
//!
//! `init` creates a fresh snapshot that is deleted again when the transaction goes
//! out of scope without `finalize` or `keep`. `resume` reattaches to a snapshot
//! created by an earlier process; such a transaction is retained unless it is
//! explicitly aborted. Disposal runs exactly once, from [`Transaction::release`] or
//! from `Drop`, so every exit path (early return, `?`, interrupted child) cleans up.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::placeholder;
use crate::runner::{Invocation, ProcessRunner, RunnerError};
use crate::snapshot::{SnapshotError, SnapshotStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
  Uninitialized,
  Open,
  Finalized,
  Discarded,
}

impl fmt::Display for TransactionState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      TransactionState::Uninitialized => "uninitialized",
      TransactionState::Open => "open",
      TransactionState::Finalized => "finalized",
      TransactionState::Discarded => "discarded",
    };
    write!(f, "{}", name)
  }
}

/// What happened to the snapshot when the transaction was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
  /// No snapshot was ever attached.
  Unused,
  /// The snapshot became the new default.
  Promoted,
  /// The snapshot was left in place for a later `resume`.
  Retained,
  /// The snapshot was deleted.
  Deleted,
}

#[derive(Debug, Error)]
pub enum TransactionError {
  #[error("cannot {operation} a transaction that is {state}")]
  InvalidState {
    operation: &'static str,
    state: TransactionState,
  },

  #[error("could not create a new snapshot from '{basis}': {source}")]
  SnapshotCreation {
    basis: String,
    #[source]
    source: SnapshotError,
  },

  #[error("unknown transaction '{id}'")]
  UnknownTransaction {
    id: String,
    #[source]
    source: Option<SnapshotError>,
  },

  #[error("could not set snapshot {id} as the new default: {source}")]
  Finalize {
    id: String,
    #[source]
    source: SnapshotError,
  },

  #[error("could not delete snapshot {id}: {source}")]
  Discard {
    id: String,
    #[source]
    source: SnapshotError,
  },

  #[error(transparent)]
  Runner(#[from] RunnerError),

  #[error(transparent)]
  Store(#[from] SnapshotError),
}

/// One transaction, bound to a snapshot store and a process runner.
pub struct Transaction<'a, S: SnapshotStore + ?Sized, R: ProcessRunner + ?Sized> {
  store: &'a S,
  runner: &'a R,
  state: TransactionState,
  id: Option<String>,
  basis: Option<String>,
  mount_path: Option<PathBuf>,
  retain: bool,
  released: bool,
}

impl<'a, S: SnapshotStore + ?Sized, R: ProcessRunner + ?Sized> Transaction<'a, S, R> {
  pub fn new(store: &'a S, runner: &'a R) -> Self {
    Self {
      store,
      runner,
      state: TransactionState::Uninitialized,
      id: None,
      basis: None,
      mount_path: None,
      retain: false,
      released: false,
    }
  }

  pub fn state(&self) -> TransactionState {
    self.state
  }

  /// Snapshot id; `None` until `init` or `resume` succeeded.
  pub fn snapshot(&self) -> Option<&str> {
    self.id.as_deref()
  }

  /// Snapshot the transaction was branched from, when created by `init`.
  pub fn basis(&self) -> Option<&str> {
    self.basis.as_deref()
  }

  /// Where the snapshot is mounted; only while the transaction is open.
  pub fn mount_path(&self) -> Option<&Path> {
    match self.state {
      TransactionState::Open => self.mount_path.as_deref(),
      _ => None,
    }
  }

  pub fn is_retained(&self) -> bool {
    self.retain
  }

  fn require(&self, operation: &'static str, expected: TransactionState) -> Result<(), TransactionError> {
    if self.state != expected || self.released {
      return Err(TransactionError::InvalidState {
        operation,
        state: self.state,
      });
    }
    Ok(())
  }

  fn open_snapshot(&self, operation: &'static str) -> Result<(&str, &Path), TransactionError> {
    self.require(operation, TransactionState::Open)?;
    match (self.id.as_deref(), self.mount_path.as_deref()) {
      (Some(id), Some(path)) => Ok((id, path)),
      _ => Err(TransactionError::InvalidState {
        operation,
        state: self.state,
      }),
    }
  }

  /// Open a new transaction on a fresh snapshot branched from `basis`.
  pub fn init(&mut self, basis: &str) -> Result<(), TransactionError> {
    self.require("initialize", TransactionState::Uninitialized)?;

    let handle = self
      .store
      .create(basis)
      .map_err(|source| TransactionError::SnapshotCreation {
        basis: basis.to_string(),
        source,
      })?;

    info!(basis = %basis, id = %handle.id, "Using snapshot {} as base for new snapshot {}", basis, handle.id);
    self.id = Some(handle.id);
    self.basis = Some(basis.to_string());
    self.mount_path = Some(handle.mount_path);
    self.retain = false;
    self.state = TransactionState::Open;
    Ok(())
  }

  /// Reattach to the open transaction `id` created by an earlier process.
  pub fn resume(&mut self, id: &str) -> Result<(), TransactionError> {
    self.require("resume", TransactionState::Uninitialized)?;

    let unknown = |source: Option<SnapshotError>| TransactionError::UnknownTransaction {
      id: id.to_string(),
      source,
    };

    if id.is_empty() || !self.store.is_open(id).map_err(|e| unknown(Some(e)))? {
      return Err(unknown(None));
    }
    let mount_path = self.store.mount_path_of(id).map_err(|e| unknown(Some(e)))?;

    info!(id = %id, "Resuming transaction {}", id);
    self.id = Some(id.to_string());
    self.mount_path = Some(mount_path);
    self.retain = true;
    self.state = TransactionState::Open;
    Ok(())
  }

  /// Run `argv` chrooted into the snapshot; an empty `argv` opens a login shell.
  ///
  /// Returns the child's exit status without changing the transaction state.
  pub fn execute(&self, argv: &[String]) -> Result<i32, TransactionError> {
    let (id, mount_path) = self.open_snapshot("execute in")?;
    let invocation = Invocation::new(argv).chrooted(mount_path);

    debug!(id = %id, command = %invocation, "executing in snapshot");
    Ok(self.runner.run(&invocation)?)
  }

  /// Run `argv` on the host with every `{}` replaced by the snapshot mount path.
  ///
  /// An empty `argv` opens a login shell on the host inside the mount path.
  pub fn call_ext(&self, argv: &[String]) -> Result<i32, TransactionError> {
    let (id, mount_path) = self.open_snapshot("call into")?;
    let invocation = if argv.is_empty() {
      Invocation::new(argv).in_dir(mount_path)
    } else {
      Invocation::new(&placeholder::substitute(argv, mount_path))
    };

    debug!(id = %id, command = %invocation, "executing on host");
    Ok(self.runner.run(&invocation)?)
  }

  /// Promote the snapshot to the new default.
  ///
  /// If the backend refuses, the transaction stays open and is retained so the
  /// snapshot can be inspected or the close retried.
  pub fn finalize(&mut self) -> Result<(), TransactionError> {
    let (id, _) = self.open_snapshot("finalize")?;
    let id = id.to_string();

    if let Err(source) = self.store.set_default(&id) {
      self.retain = true;
      warn!(id = %id, "finalize failed, keeping snapshot {}", id);
      return Err(TransactionError::Finalize { id, source });
    }

    info!(id = %id, "New default snapshot is #{}", id);
    self.state = TransactionState::Finalized;
    Ok(())
  }

  /// Keep the snapshot when the transaction goes out of scope.
  pub fn keep(&mut self) -> Result<(), TransactionError> {
    self.require("keep", TransactionState::Open)?;
    self.retain = true;
    Ok(())
  }

  /// Delete the snapshot now, regardless of how the transaction was opened.
  pub fn abort(&mut self) -> Result<(), TransactionError> {
    self.require("abort", TransactionState::Open)?;
    self.retain = false;
    self.release().map(|_| ())
  }

  /// Apply the disposal rule: delete an open snapshot unless it is retained.
  ///
  /// Only the first call acts; later calls, including the one from `Drop`,
  /// report the outcome without touching the store again.
  pub fn release(&mut self) -> Result<Disposition, TransactionError> {
    if self.released {
      return Ok(self.disposition());
    }
    self.released = true;

    if self.state == TransactionState::Open && !self.retain {
      let id = self.id.clone().unwrap_or_default();
      info!(id = %id, "Discarding snapshot {}", id);
      self
        .store
        .delete(&id)
        .map_err(|source| TransactionError::Discard { id, source })?;
      self.state = TransactionState::Discarded;
    }

    Ok(self.disposition())
  }

  fn disposition(&self) -> Disposition {
    match self.state {
      TransactionState::Uninitialized => Disposition::Unused,
      TransactionState::Open => Disposition::Retained,
      TransactionState::Finalized => Disposition::Promoted,
      TransactionState::Discarded => Disposition::Deleted,
    }
  }
}

impl<S: SnapshotStore + ?Sized, R: ProcessRunner + ?Sized> Drop for Transaction<'_, S, R> {
  fn drop(&mut self) {
    match self.release() {
      Ok(Disposition::Retained) => {
        if let Some(id) = &self.id {
          debug!(id = %id, "snapshot retained for later use");
        }
      }
      Ok(_) => {}
      Err(e) => error!(error = %e, "failed to dispose of transaction"),
    }
  }
}

impl<S: SnapshotStore + ?Sized, R: ProcessRunner + ?Sized> fmt::Debug for Transaction<'_, S, R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Transaction")
      .field("state", &self.state)
      .field("id", &self.id)
      .field("basis", &self.basis)
      .field("mount_path", &self.mount_path)
      .field("retain", &self.retain)
      .finish()
  }
}
