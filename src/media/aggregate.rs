//! Album aggregation
//!
//! Groups raw file records below a root directory into album records. In tree mode only the
//! immediate children of the root are emitted and each child album sums everything beneath
//! it. In plain mode every directory below the root that holds media, directly or in any
//! subdirectory, becomes its own flat album counting everything beneath it.

use crate::config::{MediaExtensions, ViewMode};
use crate::media::{AlbumCounts, AlbumRecord, FileRecord, MediaRecord, StorageClass};
use crate::os::FsProbe;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, Default)]
struct AlbumAccumulator {
    storage: StorageClass,
    counts: AlbumCounts,
    nested: BTreeSet<OsString>,
    newest: Option<(i64, PathBuf)>,
}

impl AlbumAccumulator {
    fn new(storage: StorageClass) -> Self {
        Self {
            storage,
            ..Self::default()
        }
    }

    fn track_thumbnail(&mut self, file: &FileRecord) {
        let newer = match &self.newest {
            Some((modified, _)) => file.modification_date > *modified,
            None => true,
        };
        if newer {
            self.newest = Some((file.modification_date, file.path.clone()));
        }
    }

    fn into_record(self, path: PathBuf, probe: &dyn FsProbe) -> AlbumRecord {
        let metadata = probe.dir_metadata(&path).unwrap_or_default();
        let mut counts = self.counts;
        counts.nested_albums = self.nested.len() as u64;
        AlbumRecord {
            path,
            size: metadata.size,
            creation_date: metadata.created,
            modification_date: metadata.modified,
            storage: self.storage,
            counts,
            thumbnail: self.newest.map(|(_, p)| p),
        }
    }
}

/// Build the records shown for `root` in the given view mode, sorted by path
pub fn aggregate(
    files: &[FileRecord],
    root: &Path,
    mode: ViewMode,
    extensions: &MediaExtensions,
    probe: &dyn FsProbe,
) -> Vec<MediaRecord> {
    let mut records = Vec::new();
    let mut albums: BTreeMap<PathBuf, AlbumAccumulator> = BTreeMap::new();

    for file in files {
        let Ok(relative) = file.path.strip_prefix(root) else {
            continue;
        };
        let Some(media_type) = extensions.media_type_of(&file.path) else {
            continue;
        };
        let segments: Vec<_> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name),
                _ => None,
            })
            .collect();

        match segments.len() {
            0 => continue,
            1 => records.push(MediaRecord::File(file.clone())),
            depth => {
                let album_paths = match mode {
                    ViewMode::Tree => vec![root.join(segments[0])],
                    // Every directory on the way down, each counting the file
                    ViewMode::Plain => (1..depth)
                        .map(|n| segments[..n].iter().fold(root.to_path_buf(), |p, s| p.join(s)))
                        .collect(),
                };
                for album_path in album_paths {
                    let album = albums
                        .entry(album_path)
                        .or_insert_with(|| AlbumAccumulator::new(file.storage));
                    album.counts.add(media_type);
                    if mode == ViewMode::Tree && depth >= 3 {
                        album.nested.insert(segments[1].to_os_string());
                    }
                    album.track_thumbnail(file);
                }
            }
        }
    }

    debug!(
        ?root,
        ?mode,
        files = records.len(),
        albums = albums.len(),
        "Aggregated records"
    );

    records.extend(
        albums
            .into_iter()
            .map(|(path, acc)| MediaRecord::Album(acc.into_record(path, probe))),
    );
    records.sort_by(|a, b| a.path().cmp(b.path()));
    records
}
