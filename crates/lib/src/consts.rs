//! Crate-wide constants.

/// Application name, used for default paths and log lines.
pub const APP_NAME: &str = "tukit";

/// Token in `callext` arguments that is replaced with the snapshot mount path.
pub const MOUNT_PLACEHOLDER: &str = "{}";

/// Basis used when no `--continue` snapshot is requested.
pub const DEFAULT_BASIS: &str = "default";

/// Snapper userdata key marking a snapshot as an open transaction.
pub const IN_PROGRESS_KEY: &str = "transactional-update-in-progress";

/// Description attached to snapshots created for a transaction.
pub const SNAPSHOT_DESCRIPTION: &str = "Transactional update";
