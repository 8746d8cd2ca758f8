//! Platform-specific filesystem capabilities.
//!
//! The pipeline never touches `std::fs` for metadata questions directly; it goes through
//! [`FsProbe`] so a platform (or a test) can answer existence and writability its own way.

#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub mod unix;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Directory metadata used for album dates and sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirMetadata {
    pub size: u64,
    pub created: i64,
    pub modified: i64,
}

/// Filesystem metadata capability
pub trait FsProbe: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Whether the current process may create or remove entries in `path`
    fn is_writable(&self, path: &Path) -> bool;

    fn dir_metadata(&self, path: &Path) -> Option<DirMetadata>;

    /// Writability of `path`, or of its nearest existing ancestor when it does not exist yet
    fn is_writable_or_creatable(&self, path: &Path) -> bool {
        match nearest_existing_ancestor(self, path) {
            Some(existing) => self.is_writable(&existing),
            None => false,
        }
    }
}

/// Walk up from `path` to the first ancestor that exists
pub fn nearest_existing_ancestor<P: FsProbe + ?Sized>(probe: &P, path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && probe.exists(p))
        .map(Path::to_path_buf)
}

/// [`FsProbe`] backed by the host filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

impl FsProbe for RealFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_writable(&self, path: &Path) -> bool {
        is_writable(path)
    }

    fn dir_metadata(&self, path: &Path) -> Option<DirMetadata> {
        let metadata = fs::metadata(path).ok()?;
        let modified = metadata.modified().map(system_time_millis).unwrap_or(0);
        let created = metadata
            .created()
            .map(system_time_millis)
            .unwrap_or(modified);
        Some(DirMetadata {
            size: metadata.len(),
            created,
            modified,
        })
    }
}

/// Check whether the current process can write into `path`.
#[cfg(unix)]
pub fn is_writable(path: &Path) -> bool {
    unix::is_writable(path)
}

/// Check whether the current process can write into `path`.
#[cfg(windows)]
pub fn is_writable(path: &Path) -> bool {
    windows::is_writable(path)
}

/// Convert a `SystemTime` to milliseconds since the Unix epoch (negative before 1970)
pub fn system_time_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_real_fs_probe() {
        let dir = TempDir::new().unwrap();
        let probe = RealFs;

        assert!(probe.exists(dir.path()));
        assert!(probe.is_dir(dir.path()));
        assert!(probe.is_writable(dir.path()));
        assert!(probe.dir_metadata(dir.path()).is_some());

        let missing = dir.path().join("a").join("b");
        assert!(!probe.exists(&missing));
        assert!(probe.dir_metadata(&missing).is_none());
        assert!(probe.is_writable_or_creatable(&missing));
        assert_eq!(
            nearest_existing_ancestor(&probe, &missing).as_deref(),
            Some(dir.path())
        );
    }

    #[test]
    fn test_system_time_millis() {
        assert_eq!(system_time_millis(UNIX_EPOCH), 0);
        let later = UNIX_EPOCH + std::time::Duration::from_millis(1500);
        assert_eq!(system_time_millis(later), 1500);
    }
}
