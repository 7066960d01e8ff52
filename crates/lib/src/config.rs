//! Runtime configuration.
//!
//! Settings come from an optional TOML file (see [`paths::config_file`]) and are then
//! overridden by environment variables:
//!
//! ```text
//! lockfile      = "/var/run/tukit.lock"   # TUKIT_LOCKFILE
//! backend       = "snapper"               # TUKIT_BACKEND (snapper | directory)
//! snapshot_root = "/.snapshots"           # TUKIT_SNAPSHOT_ROOT
//! shell         = "/bin/bash"             # TUKIT_SHELL
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::platform::paths;

/// Snapshot backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
  /// btrfs snapshots managed through the `snapper` CLI.
  #[default]
  Snapper,
  /// Plain directory copies; useful on non-btrfs systems and in tests.
  Directory,
}

impl Backend {
  pub fn as_str(&self) -> &'static str {
    match self {
      Backend::Snapper => "snapper",
      Backend::Directory => "directory",
    }
  }

  fn default_root(&self) -> PathBuf {
    match self {
      Backend::Snapper => paths::default_snapper_root(),
      Backend::Directory => paths::default_directory_root(),
    }
  }
}

impl fmt::Display for Backend {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for Backend {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "snapper" => Ok(Backend::Snapper),
      "directory" | "dir" => Ok(Backend::Directory),
      other => Err(ConfigError::InvalidBackend(other.to_string())),
    }
  }
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("unknown snapshot backend '{0}' (expected 'snapper' or 'directory')")]
  InvalidBackend(String),
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  pub lockfile: PathBuf,
  pub backend: Backend,
  pub snapshot_root: PathBuf,
  pub shell: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
  lockfile: Option<PathBuf>,
  backend: Option<Backend>,
  snapshot_root: Option<PathBuf>,
  shell: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    let backend = Backend::default();
    Self {
      lockfile: paths::default_lock_file(),
      backend,
      snapshot_root: backend.default_root(),
      shell: PathBuf::from("/bin/bash"),
    }
  }
}

impl Config {
  /// Load configuration from the default location plus environment overrides.
  ///
  /// A missing config file is not an error.
  pub fn load() -> Result<Self, ConfigError> {
    Self::from_file(&paths::config_file())
  }

  /// Load configuration from `path` plus environment overrides.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let file = match fs::read_to_string(path) {
      Ok(content) => {
        debug!(path = %path.display(), "loading config file");
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
          path: path.to_path_buf(),
          source,
        })?
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => ConfigFile::default(),
      Err(source) => {
        return Err(ConfigError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };

    Self::resolve(file)
  }

  fn resolve(file: ConfigFile) -> Result<Self, ConfigError> {
    let backend = match std::env::var("TUKIT_BACKEND") {
      Ok(value) => value.parse()?,
      Err(_) => file.backend.unwrap_or_default(),
    };

    let lockfile = env_path("TUKIT_LOCKFILE")
      .or(file.lockfile)
      .unwrap_or_else(paths::default_lock_file);
    let snapshot_root = env_path("TUKIT_SNAPSHOT_ROOT")
      .or(file.snapshot_root)
      .unwrap_or_else(|| backend.default_root());
    let shell = env_path("TUKIT_SHELL")
      .or(file.shell)
      .unwrap_or_else(|| PathBuf::from("/bin/bash"));

    Ok(Self {
      lockfile,
      backend,
      snapshot_root,
      shell,
    })
  }
}

fn env_path(var: &str) -> Option<PathBuf> {
  std::env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}
