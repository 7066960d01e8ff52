//! Implementation of the `tukit abort` command.

use anyhow::Result;

use tukit_lib::{TransactionCommand, run_command};

use super::Session;

pub fn cmd_abort(session: &Session, id: String) -> Result<i32> {
  run_command(
    &TransactionCommand::Abort { id },
    &session.basis,
    session.store.as_ref(),
    &session.runner,
  )?;
  Ok(0)
}
