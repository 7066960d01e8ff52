//! The tukit commands, each a fixed sequence of [`Transaction`] operations.
//!
//! | command   | sequence                                             |
//! |-----------|------------------------------------------------------|
//! | `execute` | init, execute, finalize on status 0 (else discard)   |
//! | `open`    | init, keep                                           |
//! | `call`    | resume, execute, keep                                |
//! | `callext` | resume, call_ext, keep                               |
//! | `close`   | resume, finalize                                     |
//! | `abort`   | resume, abort                                        |

use thiserror::Error;
use tracing::info;

use crate::runner::ProcessRunner;
use crate::snapshot::SnapshotStore;
use crate::transaction::{Transaction, TransactionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionCommand {
  Execute { argv: Vec<String> },
  Open,
  Call { id: String, argv: Vec<String> },
  CallExt { id: String, argv: Vec<String> },
  Close { id: String },
  Abort { id: String },
}

impl TransactionCommand {
  pub fn name(&self) -> &'static str {
    match self {
      TransactionCommand::Execute { .. } => "execute",
      TransactionCommand::Open => "open",
      TransactionCommand::Call { .. } => "call",
      TransactionCommand::CallExt { .. } => "callext",
      TransactionCommand::Close { .. } => "close",
      TransactionCommand::Abort { .. } => "abort",
    }
  }
}

/// Result of a successfully dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  /// The command finished; nothing to report beyond success.
  Completed,
  /// A new transaction was opened and kept.
  Opened { id: String },
  /// A command ran inside a resumed transaction and exited with this status.
  Exited(i32),
}

impl Outcome {
  /// Process exit status tukit should report.
  pub fn exit_status(&self) -> i32 {
    match self {
      Outcome::Exited(status) => *status,
      Outcome::Completed | Outcome::Opened { .. } => 0,
    }
  }
}

#[derive(Debug, Error)]
pub enum CommandError {
  #[error("Application returned with exit status {0}")]
  ApplicationFailed(i32),

  #[error(transparent)]
  Transaction(#[from] TransactionError),
}

/// Run `command` against `store`, branching new snapshots from `basis`.
pub fn run_command<S, R>(
  command: &TransactionCommand,
  basis: &str,
  store: &S,
  runner: &R,
) -> Result<Outcome, CommandError>
where
  S: SnapshotStore + ?Sized,
  R: ProcessRunner + ?Sized,
{
  let mut tx = Transaction::new(store, runner);

  match command {
    TransactionCommand::Execute { argv } => {
      tx.init(basis)?;
      let status = tx.execute(argv)?;
      if status != 0 {
        return Err(CommandError::ApplicationFailed(status));
      }
      tx.finalize()?;
      Ok(Outcome::Completed)
    }
    TransactionCommand::Open => {
      tx.init(basis)?;
      tx.keep()?;
      let id = tx.snapshot().unwrap_or_default().to_string();
      info!(id = %id, "opened transaction");
      Ok(Outcome::Opened { id })
    }
    TransactionCommand::Call { id, argv } => {
      tx.resume(id)?;
      let status = tx.execute(argv)?;
      tx.keep()?;
      Ok(Outcome::Exited(status))
    }
    TransactionCommand::CallExt { id, argv } => {
      tx.resume(id)?;
      let status = tx.call_ext(argv)?;
      tx.keep()?;
      Ok(Outcome::Exited(status))
    }
    TransactionCommand::Close { id } => {
      tx.resume(id)?;
      tx.finalize()?;
      Ok(Outcome::Completed)
    }
    TransactionCommand::Abort { id } => {
      tx.resume(id)?;
      tx.abort()?;
      Ok(Outcome::Completed)
    }
  }
}
