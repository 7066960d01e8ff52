//! Implementation of the `tukit execute` command.
//!
//! Opens a new snapshot, runs the command chrooted inside it and makes the snapshot
//! the new default if the command succeeded. Any failure discards the snapshot.

use anyhow::Result;

use tukit_lib::{TransactionCommand, platform, run_command};

use crate::output::print_warning;

use super::Session;

pub fn cmd_execute(session: &Session, argv: Vec<String>) -> Result<i32> {
  if !platform::is_elevated() {
    print_warning("not running as root, chrooting into the snapshot will most likely fail");
  }

  let outcome = run_command(
    &TransactionCommand::Execute { argv },
    &session.basis,
    session.store.as_ref(),
    &session.runner,
  )?;

  Ok(outcome.exit_status())
}
