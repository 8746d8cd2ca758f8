//! Media records and items
//!
//! A [`MediaRecord`] is what the index and the aggregation stage produce: raw facts about a
//! file or a directory. A [`MediaItem`] is the UI-facing projection built by
//! [`mapper::MediaItemMapper`], carrying fields derived from the record (name, media type,
//! hidden state, owning volume). Derived fields are computed once and only exposed through
//! accessors.

pub mod aggregate;
pub mod index;
pub mod mapper;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use aggregate::aggregate;
pub use index::{FsMediaIndex, MediaIndex};
pub use mapper::MediaItemMapper;

/// Kind of media, derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Gif,
}

/// Where a volume lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    /// Built-in storage
    #[default]
    Device,
    /// Removable storage (SD card, USB drive)
    Pluggable,
}

/// Raw file record as read from the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    pub creation_date: i64,
    /// Milliseconds since the Unix epoch
    pub modification_date: i64,
    pub storage: StorageClass,
    /// Playback duration in milliseconds, when known
    pub duration: Option<u64>,
}

/// Per-album aggregate counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlbumCounts {
    pub images: u64,
    pub videos: u64,
    pub gifs: u64,
    pub nested_albums: u64,
}

impl AlbumCounts {
    /// Count one file of the given type
    pub fn add(&mut self, media_type: MediaType) {
        match media_type {
            MediaType::Image => self.images += 1,
            MediaType::Video => self.videos += 1,
            MediaType::Gif => self.gifs += 1,
        }
    }

    /// Number of media files (nested albums excluded)
    pub fn files(&self) -> u64 {
        self.images + self.videos + self.gifs
    }

    /// Count of files of the given type
    pub fn of(&self, media_type: MediaType) -> u64 {
        match media_type {
            MediaType::Image => self.images,
            MediaType::Video => self.videos,
            MediaType::Gif => self.gifs,
        }
    }
}

/// Raw album record built by aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRecord {
    pub path: PathBuf,
    pub size: u64,
    pub creation_date: i64,
    pub modification_date: i64,
    pub storage: StorageClass,
    pub counts: AlbumCounts,
    /// Most recently modified descendant file
    pub thumbnail: Option<PathBuf>,
}

/// Raw record: a media file or an album directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaRecord {
    File(FileRecord),
    Album(AlbumRecord),
}

impl MediaRecord {
    pub fn path(&self) -> &Path {
        match self {
            MediaRecord::File(f) => &f.path,
            MediaRecord::Album(a) => &a.path,
        }
    }

    pub fn is_album(&self) -> bool {
        matches!(self, MediaRecord::Album(_))
    }
}

/// Variant-specific part of a [`MediaItem`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ItemDetails {
    File {
        extension: String,
        media_type: MediaType,
        mime_type: String,
        duration: Option<u64>,
    },
    Album {
        counts: AlbumCounts,
        files_count: u64,
        is_volume: bool,
        thumbnail: Option<PathBuf>,
    },
}

/// UI-facing media entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    path: PathBuf,
    name: String,
    size: u64,
    creation_date: i64,
    modification_date: i64,
    storage: StorageClass,
    hidden: bool,
    volume: Option<PathBuf>,
    details: ItemDetails,
}

impl MediaItem {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        path: PathBuf,
        name: String,
        size: u64,
        creation_date: i64,
        modification_date: i64,
        storage: StorageClass,
        hidden: bool,
        volume: Option<PathBuf>,
        details: ItemDetails,
    ) -> Self {
        Self {
            path,
            name,
            size,
            creation_date,
            modification_date,
            storage,
            hidden,
            volume,
            details,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn creation_date(&self) -> i64 {
        self.creation_date
    }

    pub fn modification_date(&self) -> i64 {
        self.modification_date
    }

    pub fn storage(&self) -> StorageClass {
        self.storage
    }

    /// Whether any path segment starts with a dot
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Storage root this item belongs to
    pub fn volume(&self) -> Option<&Path> {
        self.volume.as_deref()
    }

    pub fn details(&self) -> &ItemDetails {
        &self.details
    }

    pub fn is_album(&self) -> bool {
        matches!(self.details, ItemDetails::Album { .. })
    }

    /// File extension; empty for albums
    pub fn extension(&self) -> &str {
        match &self.details {
            ItemDetails::File { extension, .. } => extension,
            ItemDetails::Album { .. } => "",
        }
    }

    /// Media type of a file; `None` for albums
    pub fn media_type(&self) -> Option<MediaType> {
        match &self.details {
            ItemDetails::File { media_type, .. } => Some(*media_type),
            ItemDetails::Album { .. } => None,
        }
    }

    /// Aggregate counts of an album; `None` for files
    pub fn counts(&self) -> Option<&AlbumCounts> {
        match &self.details {
            ItemDetails::Album { counts, .. } => Some(counts),
            ItemDetails::File { .. } => None,
        }
    }

    /// Whether this album is a volume root or a non-writable directory
    pub fn is_volume(&self) -> bool {
        matches!(self.details, ItemDetails::Album { is_volume: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_album_counts() {
        let mut counts = AlbumCounts::default();
        counts.add(MediaType::Image);
        counts.add(MediaType::Image);
        counts.add(MediaType::Gif);
        counts.nested_albums = 4;

        assert_eq!(counts.files(), 3);
        assert_eq!(counts.of(MediaType::Image), 2);
        assert_eq!(counts.of(MediaType::Video), 0);
    }

    #[test]
    fn test_record_path() {
        let record = MediaRecord::File(FileRecord {
            path: PathBuf::from("/pics/a.jpg"),
            size: 1,
            creation_date: 0,
            modification_date: 0,
            storage: StorageClass::Device,
            duration: None,
        });
        assert_eq!(record.path(), Path::new("/pics/a.jpg"));
        assert!(!record.is_album());
    }
}
