//! Child process execution.
//!
//! Commands are spawned in tukit's own process group so terminal and group signals
//! reach them directly, and tukit blocks until they exit. A command either runs
//! chrooted into a snapshot or on the host.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use thiserror::Error;
use tracing::{debug, info};

use crate::signals;

#[derive(Debug, Error)]
pub enum RunnerError {
  #[error("failed to execute '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("invalid chroot directory {0}")]
  InvalidRoot(PathBuf),
}

/// What to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
  /// The configured shell as an interactive login shell.
  LoginShell,
  /// An explicit argument vector; the first element is the program.
  Argv(Vec<String>),
}

/// A single command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub program: Program,
  /// Directory to chroot into before exec.
  pub root: Option<PathBuf>,
  /// Working directory on the host; ignored when `root` is set.
  pub cwd: Option<PathBuf>,
}

impl Invocation {
  /// Run `argv`, or a login shell when `argv` is empty.
  pub fn new(argv: &[String]) -> Self {
    let program = if argv.is_empty() {
      Program::LoginShell
    } else {
      Program::Argv(argv.to_vec())
    };
    Self {
      program,
      root: None,
      cwd: None,
    }
  }

  pub fn chrooted(mut self, root: &Path) -> Self {
    self.root = Some(root.to_path_buf());
    self
  }

  pub fn in_dir(mut self, cwd: &Path) -> Self {
    self.cwd = Some(cwd.to_path_buf());
    self
  }
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.program {
      Program::LoginShell => write!(f, "<login shell>")?,
      Program::Argv(argv) => write!(f, "{}", argv.join(" "))?,
    }
    if let Some(root) = &self.root {
      write!(f, " (chroot {})", root.display())?;
    }
    Ok(())
  }
}

/// Spawns commands and reports their exit status.
pub trait ProcessRunner {
  /// Run the invocation to completion and return its exit status.
  ///
  /// A child killed by a signal reports `128 + signal`, like a shell does.
  fn run(&self, invocation: &Invocation) -> Result<i32, RunnerError>;
}

/// Runs commands on this machine with `std::process::Command`.
#[derive(Debug, Clone)]
pub struct HostRunner {
  shell: PathBuf,
}

impl HostRunner {
  pub fn new(shell: impl Into<PathBuf>) -> Self {
    Self { shell: shell.into() }
  }

  fn resolve_program(&self, program: &Program) -> (OsString, Vec<OsString>) {
    match program {
      Program::LoginShell => (self.shell.clone().into_os_string(), vec![OsString::from("-l")]),
      Program::Argv(argv) => {
        let mut iter = argv.iter().map(OsString::from);
        let program = iter.next().unwrap_or_default();
        (program, iter.collect())
      }
    }
  }
}

impl ProcessRunner for HostRunner {
  fn run(&self, invocation: &Invocation) -> Result<i32, RunnerError> {
    let (program, args) = self.resolve_program(&invocation.program);
    let program_name = program.to_string_lossy().into_owned();

    let mut command = Command::new(&program);
    command.args(&args);

    match &invocation.root {
      Some(root) => chroot_before_exec(&mut command, root)?,
      None => {
        if let Some(cwd) = &invocation.cwd {
          command.current_dir(cwd);
        }
      }
    }

    info!(command = %invocation, "executing");
    let status = command.status().map_err(|source| RunnerError::Spawn {
      program: program_name,
      source,
    })?;
    signals::log_received();

    let code = exit_code(status);
    debug!(status = code, "command finished");
    Ok(code)
  }
}

#[cfg(unix)]
fn chroot_before_exec(command: &mut Command, root: &Path) -> Result<(), RunnerError> {
  use std::ffi::CString;
  use std::os::unix::ffi::OsStrExt;
  use std::os::unix::process::CommandExt;

  let root_c =
    CString::new(root.as_os_str().as_bytes()).map_err(|_| RunnerError::InvalidRoot(root.to_path_buf()))?;

  // SAFETY: the closure runs between fork and exec; it only issues the chroot and
  // chdir syscalls on a pre-built C string and does not allocate.
  unsafe {
    command.pre_exec(move || {
      rustix::process::chroot(root_c.as_c_str())?;
      rustix::process::chdir(c"/")?;
      Ok(())
    });
  }
  Ok(())
}

#[cfg(not(unix))]
fn chroot_before_exec(_command: &mut Command, root: &Path) -> Result<(), RunnerError> {
  Err(RunnerError::InvalidRoot(root.to_path_buf()))
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
  use std::os::unix::process::ExitStatusExt;

  status
    .code()
    .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
  status.code().unwrap_or(1)
}
