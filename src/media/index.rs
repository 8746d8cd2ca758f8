//! Media index reader
//!
//! Produces raw [`FileRecord`]s for every eligible media file under the configured storage
//! roots. Unreadable entries are skipped, never fatal. A cancelled scan yields
//! [`Error::Cancelled`] and no partial result.

use crate::cancel::CancelToken;
use crate::config::Settings;
use crate::error::Result;
use crate::media::{FileRecord, MediaType, StorageClass};
use crate::os::system_time_millis;
use crate::time::{self, video};
use rayon::prelude::*;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{Level, debug, info, span, warn};
use walkdir::WalkDir;

/// Platform media index
pub trait MediaIndex: Send + Sync {
    /// Read every eligible media file across all storage roots
    fn scan(&self, cancel: &CancelToken) -> Result<Vec<FileRecord>>;

    /// Read eligible media files below `root` only
    fn scan_root(&self, root: &Path, cancel: &CancelToken) -> Result<Vec<FileRecord>> {
        let mut files = self.scan(cancel)?;
        files.retain(|f| f.path.starts_with(root));
        Ok(files)
    }
}

/// [`MediaIndex`] that walks the host filesystem
#[derive(Debug, Clone)]
pub struct FsMediaIndex {
    settings: Settings,
}

impl FsMediaIndex {
    pub fn new(settings: &Settings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    /// Walk `root` and collect candidate media paths
    fn collect_candidates(
        &self,
        root: &Path,
        cancel: &CancelToken,
    ) -> Result<Vec<(PathBuf, MediaType)>> {
        if !root.exists() {
            warn!(?root, "Storage root does not exist, skipping");
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.is_excluded_dir(e.path()))
        {
            cancel.check()?;
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(media_type) = self.settings.extensions.media_type_of(entry.path()) {
                candidates.push((entry.into_path(), media_type));
            }
        }
        Ok(candidates)
    }

    /// Check if a path should be excluded based on the exclude_dirs setting
    fn is_excluded_dir(&self, path: &Path) -> bool {
        self.settings.exclude_dirs.iter().any(|exclude| {
            if exclude.is_absolute() {
                path.starts_with(exclude)
            } else {
                exclude.file_name().is_some_and(|exclude_name| {
                    path.components()
                        .any(|c| matches!(c, Component::Normal(name) if name == exclude_name))
                })
            }
        })
    }

    fn read_record(
        &self,
        path: &Path,
        media_type: MediaType,
        class: StorageClass,
    ) -> Option<FileRecord> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                debug!(?path, error = %e, "Skipping file with unreadable metadata");
                return None;
            }
        };

        let probe = if self.settings.probe_videos && media_type == MediaType::Video {
            video::probe_video(path)
                .inspect_err(|e| debug!(?path, error = %e, "Video probe failed"))
                .ok()
        } else {
            None
        };

        let created = time::creation_time(
            path,
            media_type,
            &metadata,
            self.settings.read_embedded_dates,
            probe.and_then(|p| p.created),
        );

        Some(FileRecord {
            path: path.to_path_buf(),
            size: metadata.len(),
            creation_date: created.timestamp,
            modification_date: metadata.modified().map(system_time_millis).unwrap_or(0),
            storage: class,
            duration: probe.and_then(|p| p.duration_ms),
        })
    }

    fn scan_paths(
        &self,
        root: &Path,
        class: StorageClass,
        cancel: &CancelToken,
    ) -> Result<Vec<FileRecord>> {
        let candidates = self.collect_candidates(root, cancel)?;
        debug!(?root, count = candidates.len(), "Collected media candidates");

        let records: Vec<FileRecord> = candidates
            .par_iter()
            .filter_map(|(path, media_type)| {
                if cancel.is_cancelled() {
                    return None;
                }
                self.read_record(path, *media_type, class)
            })
            .collect();

        cancel.check()?;
        Ok(records)
    }
}

impl MediaIndex for FsMediaIndex {
    fn scan(&self, cancel: &CancelToken) -> Result<Vec<FileRecord>> {
        let _span = span!(Level::INFO, "media_scan").entered();

        let mut records = Vec::new();
        let roots = &self.settings.storage_roots;
        for root in roots {
            records.extend(self.scan_paths(&root.path, root.class, cancel)?);
        }
        info!(count = records.len(), roots = roots.len(), "Scanned media index");
        Ok(records)
    }

    fn scan_root(&self, root: &Path, cancel: &CancelToken) -> Result<Vec<FileRecord>> {
        let _span = span!(Level::INFO, "media_scan_root", ?root).entered();

        let records = self.scan_paths(
            root,
            self.settings.storage_class_of(root).unwrap_or_default(),
            cancel,
        )?;
        info!(count = records.len(), "Scanned media under root");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageRoot;
    use crate::error::Error;
    use tempfile::TempDir;

    fn index_for(root: &Path, exclude: Vec<PathBuf>) -> FsMediaIndex {
        let settings = Settings {
            storage_roots: vec![StorageRoot {
                path: root.to_path_buf(),
                class: StorageClass::Pluggable,
            }],
            exclude_dirs: exclude,
            read_embedded_dates: false,
            ..Settings::default()
        };
        FsMediaIndex::new(&settings)
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"data").unwrap();
    }

    #[test]
    fn test_scan_collects_only_media() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.jpg"));
        touch(&dir.path().join("b.txt"));
        touch(&dir.path().join("sub").join("c.MP4"));
        touch(&dir.path().join("sub").join(".hidden").join("d.gif"));

        let index = index_for(dir.path(), vec![]);
        let mut records = index.scan(&CancelToken::new()).unwrap();
        records.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.storage == StorageClass::Pluggable));
        assert!(records.iter().all(|r| r.size == 4));
        assert!(!records.iter().any(|r| r.path.ends_with("b.txt")));
    }

    #[test]
    fn test_excluded_dirs_are_skipped() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("keep").join("a.jpg"));
        touch(&dir.path().join(".thumbnails").join("t.jpg"));
        touch(&dir.path().join("skip").join("b.jpg"));

        let index = index_for(
            dir.path(),
            vec![PathBuf::from(".thumbnails"), dir.path().join("skip")],
        );
        let records = index.scan(&CancelToken::new()).unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].path.ends_with("keep/a.jpg"));
    }

    #[test]
    fn test_scan_root_limits_to_subtree() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("one").join("a.jpg"));
        touch(&dir.path().join("two").join("b.jpg"));

        let index = index_for(dir.path(), vec![]);
        let records = index
            .scan_root(&dir.path().join("two"), &CancelToken::new())
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].storage, StorageClass::Pluggable);
    }

    #[test]
    fn test_cancelled_scan_yields_no_result() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.jpg"));

        let index = index_for(dir.path(), vec![]);
        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(matches!(index.scan(&cancel), Err(Error::Cancelled)));
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let index = index_for(&dir.path().join("missing"), vec![]);
        assert!(index.scan(&CancelToken::new()).unwrap().is_empty());
    }
}
