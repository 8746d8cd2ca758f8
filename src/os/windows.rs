//! Windows-specific filesystem checks.

use std::fs;
use std::path::Path;

/// Windows has no cheap ACL probe here; fall back to the read-only attribute.
pub fn is_writable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}
