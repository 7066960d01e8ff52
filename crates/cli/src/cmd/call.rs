//! Implementation of the `tukit call` and `tukit callext` commands.
//!
//! Both resume an open transaction, run one command and keep the transaction open
//! regardless of the command's exit status, which becomes tukit's own.

use anyhow::Result;

use tukit_lib::{TransactionCommand, placeholder, platform, run_command};

use crate::output::print_warning;

use super::Session;

/// Run `argv` chrooted inside transaction `id`.
pub fn cmd_call(session: &Session, id: String, argv: Vec<String>) -> Result<i32> {
  if !platform::is_elevated() {
    print_warning("not running as root, chrooting into the snapshot will most likely fail");
  }
  run(session, TransactionCommand::Call { id, argv })
}

/// Run `argv` on the host with every `{}` replaced by the mount path of transaction `id`.
pub fn cmd_callext(session: &Session, id: String, argv: Vec<String>) -> Result<i32> {
  if !argv.is_empty() && !placeholder::contains_placeholder(&argv) {
    print_warning("command does not contain {}, it will not see the snapshot's path");
  }
  run(session, TransactionCommand::CallExt { id, argv })
}

fn run(session: &Session, command: TransactionCommand) -> Result<i32> {
  let outcome = run_command(&command, &session.basis, session.store.as_ref(), &session.runner)?;
  Ok(outcome.exit_status())
}
