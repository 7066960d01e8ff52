//! Termination signal relay.
//!
//! Commands run in the same process group as tukit, so an interrupt from the
//! terminal or a `kill` of the group already reaches the child. tukit itself must
//! stay alive until the child has exited and the transaction has been disposed,
//! otherwise the snapshot and the lock file would be left behind. [`install`]
//! replaces the default disposition of SIGINT, SIGHUP, SIGQUIT and SIGTERM with a
//! handler that only records the signal.

use std::sync::Once;
use std::sync::atomic::{AtomicI32, Ordering};

use thiserror::Error;
use tracing::debug;

static INSTALL: Once = Once::new();
static LAST_SIGNAL: AtomicI32 = AtomicI32::new(0);

#[derive(Debug, Error)]
pub enum SignalError {
  #[error("failed to install handler for {signal}: {source}")]
  Install {
    signal: &'static str,
    #[source]
    source: std::io::Error,
  },
}

#[cfg(unix)]
extern "C" fn record(signal: std::ffi::c_int) {
  LAST_SIGNAL.store(signal, Ordering::SeqCst);
}

/// Install the relay handlers. Only the first call has an effect.
#[cfg(unix)]
pub fn install() -> Result<(), SignalError> {
  use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

  let mut result = Ok(());
  INSTALL.call_once(|| {
    // Must not be SIG_IGN: an ignored disposition is inherited across exec.
    let action = SigAction::new(SigHandler::Handler(record), SaFlags::SA_RESTART, SigSet::empty());
    for signal in [Signal::SIGINT, Signal::SIGHUP, Signal::SIGQUIT, Signal::SIGTERM] {
      // SAFETY: `record` only performs an atomic store, which is async-signal-safe.
      if let Err(errno) = unsafe { sigaction(signal, &action) } {
        result = Err(SignalError::Install {
          signal: signal.as_str(),
          source: std::io::Error::from(errno),
        });
        return;
      }
    }
    debug!("signal relay installed");
  });
  result
}

#[cfg(not(unix))]
pub fn install() -> Result<(), SignalError> {
  Ok(())
}

/// Returns the most recent signal received since the last call, if any.
pub fn take_received() -> Option<i32> {
  match LAST_SIGNAL.swap(0, Ordering::SeqCst) {
    0 => None,
    signal => Some(signal),
  }
}

/// Log and clear a pending signal.
pub fn log_received() {
  if let Some(signal) = take_received() {
    debug!(signal, "tukit: received signal");
  }
}
