mod abort;
mod call;
mod close;
mod execute;
mod open;

pub use abort::cmd_abort;
pub use call::{cmd_call, cmd_callext};
pub use close::cmd_close;
pub use execute::cmd_execute;
pub use open::cmd_open;

use tukit_lib::snapshot::{SnapshotStore, open_store};
use tukit_lib::{Config, HostRunner};

/// Everything a command handler needs: the configured backend, a runner and the
/// snapshot new transactions branch from.
pub struct Session {
  pub store: Box<dyn SnapshotStore>,
  pub runner: HostRunner,
  pub basis: String,
}

impl Session {
  pub fn new(config: &Config, basis: impl Into<String>) -> Self {
    Self {
      store: open_store(config),
      runner: HostRunner::new(config.shell.clone()),
      basis: basis.into(),
    }
  }
}
