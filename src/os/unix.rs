//! Unix-specific filesystem checks.

use nix::unistd::{AccessFlags, access};
use std::path::Path;

/// Ask the kernel whether the effective user may write to `path`.
///
/// Directories additionally need search permission for entries to be created or removed.
pub fn is_writable(path: &Path) -> bool {
    let flags = if path.is_dir() {
        AccessFlags::W_OK | AccessFlags::X_OK
    } else {
        AccessFlags::W_OK
    };
    access(path, flags).is_ok()
}
