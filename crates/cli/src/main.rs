mod cmd;
mod output;

use std::ffi::OsString;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tukit_lib::consts::{APP_NAME, DEFAULT_BASIS};
use tukit_lib::{Config, InstanceLock, signals};

use crate::cmd::Session;
use crate::output::{exit_code, print_error};

/// tukit - apply updates to a snapshot instead of the running system
#[derive(Parser)]
#[command(name = "tukit")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Base the new snapshot on ID instead of the default snapshot
  #[arg(
    short = 'c',
    long = "continue",
    value_name = "ID",
    num_args = 0..=1,
    require_equals = true,
    default_missing_value = DEFAULT_BASIS
  )]
  continue_from: Option<String>,

  /// Only print errors
  #[arg(short, long)]
  quiet: bool,

  /// Print debug output
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a command in a new snapshot and make it the default if it succeeds
  Execute {
    /// Command to run inside the snapshot (default: login shell)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
  },

  /// Create a new snapshot and print its ID
  Open,

  /// Run a command inside an open snapshot
  Call {
    /// Transaction ID printed by `open`
    id: String,

    /// Command to run inside the snapshot (default: login shell)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
  },

  /// Run a command on the host; `{}` is replaced with the snapshot's mount path
  #[command(name = "callext")]
  CallExt {
    /// Transaction ID printed by `open`
    id: String,

    /// Command to run, `{}` marks the snapshot path
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
  },

  /// Make an open snapshot the new default
  Close {
    /// Transaction ID printed by `open`
    id: String,
  },

  /// Delete an open snapshot
  Abort {
    /// Transaction ID printed by `open`
    id: String,
  },
}

fn init_logging(quiet: bool, verbose: bool) {
  let level = if verbose {
    "debug"
  } else if quiet {
    "error"
  } else {
    "info"
  };

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .without_time()
    .init();
}

/// Rewrite a value attached to the short continue flag (`-c5`, `-qc5`) into the
/// `-c=5` form the parser accepts. Only tokens before the command are touched.
fn attach_continue_value<I: IntoIterator<Item = OsString>>(args: I) -> Vec<OsString> {
  let mut args = args.into_iter();
  let mut out: Vec<OsString> = args.next().into_iter().collect();
  let mut in_options = true;

  for arg in args {
    if in_options {
      match arg.to_str() {
        Some("--") => in_options = false,
        Some(s) if !s.starts_with('-') => in_options = false,
        Some(s) if !s.starts_with("--") => {
          if let Some(pos) = s[1..].find('c').map(|p| p + 1) {
            let value = &s[pos + 1..];
            if !value.is_empty() && !value.starts_with('=') {
              out.push(OsString::from(format!("{}={}", &s[..=pos], value)));
              continue;
            }
          }
        }
        _ => {}
      }
    }
    out.push(arg);
  }
  out
}

fn main() -> ExitCode {
  let cli = Cli::parse_from(attach_continue_value(std::env::args_os()));
  init_logging(cli.quiet, cli.verbose);

  match run(cli) {
    Ok(status) => exit_code(status),
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<i32> {
  signals::install().context("Failed to install signal handlers")?;

  let config = Config::load().context("Failed to load configuration")?;
  let options = std::env::args().skip(1).collect::<Vec<_>>().join(" ");

  let _lock = match InstanceLock::acquire(&config.lockfile, &format!("{} {}", APP_NAME, options)) {
    Ok(lock) => lock,
    Err(e) if e.is_already_running() => return Err(e.into()),
    Err(e) => {
      return Err(anyhow::Error::new(e).context(format!("Failed to lock {}", config.lockfile.display())));
    }
  };

  info!("{} {} started", APP_NAME, env!("CARGO_PKG_VERSION"));
  info!("Options: {}", options);

  let basis = cli.continue_from.unwrap_or_else(|| DEFAULT_BASIS.to_string());
  let session = Session::new(&config, basis);

  let status = match cli.command {
    Commands::Execute { command } => cmd::cmd_execute(&session, command)?,
    Commands::Open => cmd::cmd_open(&session)?,
    Commands::Call { id, command } => cmd::cmd_call(&session, id, command)?,
    Commands::CallExt { id, command } => cmd::cmd_callext(&session, id, command)?,
    Commands::Close { id } => cmd::cmd_close(&session, id)?,
    Commands::Abort { id } => cmd::cmd_abort(&session, id)?,
  };

  info!("Transaction completed.");
  Ok(status)
}
