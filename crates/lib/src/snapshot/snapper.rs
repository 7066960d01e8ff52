//! btrfs snapshots through the `snapper` command line tool.
//!
//! Open transactions carry the `transactional-update-in-progress=yes` userdata so a
//! later process can tell them apart from finalized snapshots.

use std::path::PathBuf;
use std::process::Command;

use tracing::{debug, info};

use crate::consts::{IN_PROGRESS_KEY, SNAPSHOT_DESCRIPTION};

use super::SnapshotStore;
use super::types::{SnapshotError, SnapshotHandle, validate_id};

#[derive(Debug, Clone)]
pub struct SnapperStore {
  /// Directory holding `<id>/snapshot` subvolumes, usually `/.snapshots`.
  root: PathBuf,
  snapper: String,
  btrfs: String,
}

impl SnapperStore {
  pub fn new(root: PathBuf) -> Self {
    Self {
      root,
      snapper: "snapper".to_string(),
      btrfs: "btrfs".to_string(),
    }
  }

  fn tree_path(&self, id: &str) -> PathBuf {
    self.root.join(id).join("snapshot")
  }

  fn snapper(&self, args: &[&str]) -> Result<String, SnapshotError> {
    run_capture(&self.snapper, args)
  }

  fn default_id(&self) -> Result<String, SnapshotError> {
    let fs_root = self.root.parent().unwrap_or(&self.root).to_string_lossy().into_owned();
    let output = run_capture(&self.btrfs, &["subvolume", "get-default", &fs_root])?;
    parse_default_subvolume(&output).ok_or_else(|| SnapshotError::UnexpectedOutput {
      command: format!("{} subvolume get-default", self.btrfs),
      output,
    })
  }

  fn list_userdata(&self) -> Result<Vec<(String, String)>, SnapshotError> {
    let output = self.snapper(&["--csvout", "list", "--columns", "number,userdata"])?;
    Ok(parse_userdata_list(&output))
  }
}

impl SnapshotStore for SnapperStore {
  fn create(&self, basis: &str) -> Result<SnapshotHandle, SnapshotError> {
    let basis_id = self.resolve(basis)?;
    let userdata = format!("{}=yes", IN_PROGRESS_KEY);

    let output = self.snapper(&[
      "create",
      "--from",
      &basis_id,
      "--read-write",
      "--print-number",
      "--description",
      SNAPSHOT_DESCRIPTION,
      "--userdata",
      &userdata,
    ])?;

    let id = output.trim().to_string();
    if validate_id(&id).is_err() {
      return Err(SnapshotError::UnexpectedOutput {
        command: "snapper create".to_string(),
        output,
      });
    }

    info!(id = %id, basis = %basis_id, "created snapshot");
    let mount_path = self.tree_path(&id);
    Ok(SnapshotHandle { id, mount_path })
  }

  fn mount_path_of(&self, id: &str) -> Result<PathBuf, SnapshotError> {
    validate_id(id)?;
    let path = self.tree_path(id);
    if !path.is_dir() {
      return Err(SnapshotError::NotFound(id.to_string()));
    }
    Ok(path)
  }

  fn is_open(&self, id: &str) -> Result<bool, SnapshotError> {
    if validate_id(id).is_err() {
      return Ok(false);
    }
    let marker = format!("{}=yes", IN_PROGRESS_KEY);
    Ok(
      self
        .list_userdata()?
        .iter()
        .any(|(number, userdata)| number == id && userdata.split(',').any(|kv| kv.trim() == marker)),
    )
  }

  fn set_default(&self, id: &str) -> Result<(), SnapshotError> {
    validate_id(id)?;
    // Promote first; the open mark must survive a failed promotion.
    self.snapper(&["modify", "--default", id])?;
    let clear = format!("{}=", IN_PROGRESS_KEY);
    self.snapper(&["modify", "--userdata", &clear, id])?;
    info!(id = %id, "set default snapshot");
    Ok(())
  }

  fn delete(&self, id: &str) -> Result<(), SnapshotError> {
    validate_id(id)?;
    self.snapper(&["delete", id])?;
    info!(id = %id, "deleted snapshot");
    Ok(())
  }

  fn resolve(&self, name: &str) -> Result<String, SnapshotError> {
    match name {
      "default" => self.default_id(),
      "latest" => {
        let output = self.snapper(&["--csvout", "list", "--columns", "number"])?;
        parse_latest(&output).ok_or_else(|| SnapshotError::NotFound("latest".to_string()))
      }
      id => {
        validate_id(id)?;
        if !self.tree_path(id).is_dir() {
          return Err(SnapshotError::NotFound(id.to_string()));
        }
        Ok(id.to_string())
      }
    }
  }
}

fn run_capture(program: &str, args: &[&str]) -> Result<String, SnapshotError> {
  let command_line = format!("{} {}", program, args.join(" "));
  debug!(command = %command_line, "running snapshot backend command");

  let output = Command::new(program)
    .args(args)
    .output()
    .map_err(|source| SnapshotError::Spawn {
      command: command_line.clone(),
      source,
    })?;

  if !output.status.success() {
    return Err(SnapshotError::Backend {
      command: command_line,
      code: output.status.code(),
      stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    });
  }

  Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extract the snapshot number from `btrfs subvolume get-default` output, e.g.
/// `ID 268 gen 1205 top level 267 path @/.snapshots/5/snapshot`.
fn parse_default_subvolume(output: &str) -> Option<String> {
  let path = output.split_whitespace().last()?;
  let mut components = path.split('/').rev();
  if components.next()? != "snapshot" {
    return None;
  }
  let id = components.next()?;
  validate_id(id).ok()?;
  Some(id.to_string())
}

/// Parse `snapper --csvout list --columns number,userdata` into (number, userdata) pairs.
fn parse_userdata_list(output: &str) -> Vec<(String, String)> {
  output
    .lines()
    .filter_map(|line| {
      let (number, userdata) = line.split_once(',').unwrap_or((line, ""));
      let number = number.trim();
      validate_id(number).ok()?;
      Some((number.to_string(), userdata.trim().trim_matches('"').to_string()))
    })
    .collect()
}

/// Highest snapshot number in `snapper --csvout list --columns number` output.
fn parse_latest(output: &str) -> Option<String> {
  output
    .lines()
    .filter_map(|line| line.trim().parse::<u64>().ok())
    .max()
    .map(|n| n.to_string())
}
