use crate::consts::APP_NAME;
use std::path::PathBuf;

/// Returns the configuration file location.
///
/// `TUKIT_CONFIG` takes precedence over `/etc/tukit.conf`.
pub fn config_file() -> PathBuf {
  if let Ok(path) = std::env::var("TUKIT_CONFIG") {
    return PathBuf::from(path);
  }
  PathBuf::from("/etc").join(format!("{}.conf", APP_NAME))
}

/// Returns the default single-instance lock file.
pub fn default_lock_file() -> PathBuf {
  PathBuf::from("/var/run").join(format!("{}.lock", APP_NAME))
}

/// Returns the directory snapper keeps its snapshots in.
pub fn default_snapper_root() -> PathBuf {
  PathBuf::from("/.snapshots")
}

/// Returns the directory the plain-directory backend keeps its snapshots in.
pub fn default_directory_root() -> PathBuf {
  PathBuf::from("/var/lib").join(APP_NAME).join("snapshots")
}
