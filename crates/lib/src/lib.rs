//! tukit-lib: transactional updates on top of filesystem snapshots
//!
//! This crate provides the pieces `tukit` is built from:
//! - `Transaction`: the lifecycle engine that opens, resumes, finalizes and discards snapshots
//! - `command`: the tukit commands as fixed sequences of transaction operations
//! - `SnapshotStore`: the backend contract, with snapper and plain-directory implementations
//! - `ProcessRunner`: spawns commands chrooted into a snapshot or against the host
//! - `InstanceLock`: system-wide single-instance guard
//! - `signals`: keeps the parent alive while a child handles termination signals

pub mod command;
pub mod config;
pub mod consts;
pub mod instance_lock;
pub mod placeholder;
pub mod platform;
pub mod runner;
pub mod signals;
pub mod snapshot;
pub mod transaction;

#[cfg(test)]
mod util;

pub use command::{CommandError, Outcome, TransactionCommand, run_command};
pub use config::{Backend, Config, ConfigError};
pub use instance_lock::{InstanceLock, InstanceLockError};
pub use runner::{HostRunner, Invocation, ProcessRunner, RunnerError};
pub use snapshot::{SnapshotError, SnapshotHandle, SnapshotStore};
pub use transaction::{Disposition, Transaction, TransactionError, TransactionState};
