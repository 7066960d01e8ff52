//! Implementation of the `tukit open` command.

use anyhow::{Result, bail};

use tukit_lib::{Outcome, TransactionCommand, run_command};

use crate::output::print_transaction_id;

use super::Session;

/// Open a new transaction and keep it for later `call`, `callext`, `close` or `abort`.
///
/// The id goes to stdout as `ID: <id>`.
pub fn cmd_open(session: &Session) -> Result<i32> {
  match run_command(
    &TransactionCommand::Open,
    &session.basis,
    session.store.as_ref(),
    &session.runner,
  )? {
    Outcome::Opened { id } => {
      print_transaction_id(&id);
      Ok(0)
    }
    other => bail!("unexpected outcome of open: {:?}", other),
  }
}
