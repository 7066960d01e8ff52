//! Mount path substitution for host-context commands.
//!
//! `callext` runs a command against the host filesystem but lets it refer to the
//! transaction's snapshot through the `{}` token. Every occurrence of the token in
//! every argument is replaced, so both `{}` and `--root={}` work.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use tukit_lib::placeholder::substitute;
//!
//! let args = vec!["zypper".to_string(), "--root={}".to_string(), "up".to_string()];
//! let out = substitute(&args, Path::new("/.snapshots/7/snapshot"));
//! assert_eq!(out[1], "--root=/.snapshots/7/snapshot");
//! ```

use std::path::Path;

use crate::consts::MOUNT_PLACEHOLDER;

/// Replace every placeholder token in `args` with `mount_path`.
pub fn substitute(args: &[String], mount_path: &Path) -> Vec<String> {
  let replacement = mount_path.to_string_lossy();
  args
    .iter()
    .map(|arg| arg.replace(MOUNT_PLACEHOLDER, &replacement))
    .collect()
}

/// Returns `true` if any argument references the mount path.
pub fn contains_placeholder(args: &[String]) -> bool {
  args.iter().any(|arg| arg.contains(MOUNT_PLACEHOLDER))
}
