//! Implementation of the `tukit close` command.

use anyhow::Result;

use tukit_lib::{TransactionCommand, run_command};

use super::Session;

/// Finalize transaction `id`, making it the default snapshot.
pub fn cmd_close(session: &Session, id: String) -> Result<i32> {
  run_command(
    &TransactionCommand::Close { id },
    &session.basis,
    session.store.as_ref(),
    &session.runner,
  )?;
  Ok(0)
}
