//! Test utilities for tukit-lib.
//!
//! In-memory stand-ins for the snapshot backend and the process runner that record
//! every call, so tests can assert on the exact sequence of side effects.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use crate::runner::{Invocation, ProcessRunner, RunnerError};
use crate::snapshot::{SnapshotError, SnapshotHandle, SnapshotStore};

/// Returns an argument vector from string slices.
pub fn argv(list: &[&str]) -> Vec<String> {
  list.iter().map(|s| s.to_string()).collect()
}

/// Returns the argument vector that runs `script` through `/bin/sh`.
pub fn shell_cmd(script: &str) -> Vec<String> {
  argv(&["/bin/sh", "-c", script])
}

/// A call made against [`FakeStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
  Create(String),
  SetDefault(String),
  Delete(String),
}

#[derive(Debug, Default)]
struct FakeState {
  /// id -> open flag
  snapshots: BTreeMap<u64, bool>,
  default: Option<String>,
  next_id: u64,
  calls: Vec<StoreCall>,
  fail_create: bool,
  fail_set_default: bool,
  fail_delete: bool,
}

/// In-memory snapshot store.
#[derive(Debug)]
pub struct FakeStore {
  state: RefCell<FakeState>,
}

impl FakeStore {
  /// A store whose default snapshot is `default_id`; new snapshots get the ids after it.
  pub fn with_default(default_id: u64) -> Self {
    let mut snapshots = BTreeMap::new();
    snapshots.insert(default_id, false);
    Self {
      state: RefCell::new(FakeState {
        snapshots,
        default: Some(default_id.to_string()),
        next_id: default_id + 1,
        ..FakeState::default()
      }),
    }
  }

  /// Force the next id handed out by `create`.
  pub fn set_next_id(&self, id: u64) {
    self.state.borrow_mut().next_id = id;
  }

  pub fn fail_create(&self) {
    self.state.borrow_mut().fail_create = true;
  }

  pub fn fail_set_default(&self, fail: bool) {
    self.state.borrow_mut().fail_set_default = fail;
  }

  pub fn fail_delete(&self) {
    self.state.borrow_mut().fail_delete = true;
  }

  pub fn calls(&self) -> Vec<StoreCall> {
    self.state.borrow().calls.clone()
  }

  pub fn exists(&self, id: &str) -> bool {
    id.parse::<u64>()
      .map(|n| self.state.borrow().snapshots.contains_key(&n))
      .unwrap_or(false)
  }

  pub fn default_id(&self) -> Option<String> {
    self.state.borrow().default.clone()
  }

  fn path(id: &str) -> PathBuf {
    PathBuf::from("/.snapshots").join(id).join("snapshot")
  }
}

impl SnapshotStore for FakeStore {
  fn create(&self, basis: &str) -> Result<SnapshotHandle, SnapshotError> {
    let basis_id = self.resolve(basis)?;
    let mut state = self.state.borrow_mut();
    state.calls.push(StoreCall::Create(basis_id));
    if state.fail_create {
      return Err(SnapshotError::Backend {
        command: "create".to_string(),
        code: Some(1),
        stderr: "no space left on device".to_string(),
      });
    }
    let id = state.next_id;
    state.next_id += 1;
    state.snapshots.insert(id, true);
    let id = id.to_string();
    Ok(SnapshotHandle {
      mount_path: Self::path(&id),
      id,
    })
  }

  fn mount_path_of(&self, id: &str) -> Result<PathBuf, SnapshotError> {
    if !self.exists(id) {
      return Err(SnapshotError::NotFound(id.to_string()));
    }
    Ok(Self::path(id))
  }

  fn is_open(&self, id: &str) -> Result<bool, SnapshotError> {
    let Ok(n) = id.parse::<u64>() else {
      return Ok(false);
    };
    Ok(self.state.borrow().snapshots.get(&n).copied().unwrap_or(false))
  }

  fn set_default(&self, id: &str) -> Result<(), SnapshotError> {
    let mut state = self.state.borrow_mut();
    state.calls.push(StoreCall::SetDefault(id.to_string()));
    if state.fail_set_default {
      return Err(SnapshotError::Backend {
        command: "set-default".to_string(),
        code: Some(1),
        stderr: "read-only filesystem".to_string(),
      });
    }
    let n: u64 = id.parse().map_err(|_| SnapshotError::InvalidId(id.to_string()))?;
    match state.snapshots.get_mut(&n) {
      Some(open) => *open = false,
      None => return Err(SnapshotError::NotFound(id.to_string())),
    }
    state.default = Some(id.to_string());
    Ok(())
  }

  fn delete(&self, id: &str) -> Result<(), SnapshotError> {
    let mut state = self.state.borrow_mut();
    state.calls.push(StoreCall::Delete(id.to_string()));
    if state.fail_delete {
      return Err(SnapshotError::Backend {
        command: "delete".to_string(),
        code: Some(1),
        stderr: "device busy".to_string(),
      });
    }
    let n: u64 = id.parse().map_err(|_| SnapshotError::InvalidId(id.to_string()))?;
    if state.snapshots.remove(&n).is_none() {
      return Err(SnapshotError::NotFound(id.to_string()));
    }
    Ok(())
  }

  fn resolve(&self, name: &str) -> Result<String, SnapshotError> {
    let state = self.state.borrow();
    match name {
      "default" => state.default.clone().ok_or_else(|| SnapshotError::NotFound(name.to_string())),
      "latest" => state
        .snapshots
        .keys()
        .last()
        .map(|n| n.to_string())
        .ok_or_else(|| SnapshotError::NotFound(name.to_string())),
      id => match id.parse::<u64>() {
        Ok(n) if state.snapshots.contains_key(&n) => Ok(id.to_string()),
        _ => Err(SnapshotError::NotFound(id.to_string())),
      },
    }
  }
}

/// Process runner that records invocations and replays scripted exit statuses.
#[derive(Debug, Default)]
pub struct RecordingRunner {
  invocations: RefCell<Vec<Invocation>>,
  statuses: RefCell<VecDeque<Result<i32, String>>>,
}

impl RecordingRunner {
  /// Every run exits with `status`.
  pub fn exiting(status: i32) -> Self {
    let runner = Self::default();
    runner.push_status(status);
    runner
  }

  /// Every run fails to spawn.
  pub fn failing(message: &str) -> Self {
    let runner = Self::default();
    runner.statuses.borrow_mut().push_back(Err(message.to_string()));
    runner
  }

  pub fn push_status(&self, status: i32) {
    self.statuses.borrow_mut().push_back(Ok(status));
  }

  pub fn invocations(&self) -> Vec<Invocation> {
    self.invocations.borrow().clone()
  }
}

impl ProcessRunner for RecordingRunner {
  fn run(&self, invocation: &Invocation) -> Result<i32, RunnerError> {
    self.invocations.borrow_mut().push(invocation.clone());
    let mut statuses = self.statuses.borrow_mut();
    // The last scripted status repeats.
    let next = if statuses.len() > 1 {
      statuses.pop_front()
    } else {
      statuses.front().cloned()
    };
    match next.unwrap_or(Ok(0)) {
      Ok(status) => Ok(status),
      Err(message) => Err(RunnerError::Spawn {
        program: "fake".to_string(),
        source: std::io::Error::other(message),
      }),
    }
  }
}
