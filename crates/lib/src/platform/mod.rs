pub mod paths;

/// Returns `true` when running with an effective user id of root.
///
/// Chrooting into a snapshot requires it; callers use this to warn early.
#[cfg(unix)]
pub fn is_elevated() -> bool {
  rustix::process::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
  false
}
