//! Configuration types for the media gallery
//!
//! Two documents live here:
//! - [`Preferences`]: the user's view preferences (mode, sorting, filters), persisted by
//!   [`crate::prefs::PreferencesStore`] on every change.
//! - [`Settings`]: process settings (storage roots, extension tables, worker count), loaded
//!   once at startup from a TOML file and overridable from the command line.

use crate::media::{MediaType, StorageClass};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Whether albums nest or are flattened
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Only immediate children of the root; albums carry recursive counts
    #[default]
    Tree,
    /// Every directory holding media is listed as its own album
    Plain,
}

/// Field used to order items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Name,
    Size,
    CreationDate,
    ModificationDate,
    Extension,
    /// Reshuffled on every invocation
    Random,
}

/// Partition applied after sorting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PlaceOnTop {
    None,
    #[default]
    AlbumsOnTop,
    FilesOnTop,
}

/// Inclusion filters. An item is shown only if it passes every group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    pub images: bool,
    pub videos: bool,
    pub gifs: bool,
    pub files: bool,
    pub albums: bool,
    pub hidden: bool,
    pub unhidden: bool,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            images: true,
            videos: true,
            gifs: true,
            files: true,
            albums: true,
            hidden: false,
            unhidden: true,
        }
    }
}

impl Filters {
    /// Whether the media type flag for `media_type` is enabled
    pub fn includes_type(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Image => self.images,
            MediaType::Video => self.videos,
            MediaType::Gif => self.gifs,
        }
    }
}

/// Grid column counts per orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridColumns {
    pub portrait: u8,
    pub landscape: u8,
}

impl Default for GridColumns {
    fn default() -> Self {
        Self {
            portrait: 3,
            landscape: 5,
        }
    }
}

/// User view preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Preferences {
    pub mode: ViewMode,
    pub sort_order: SortOrder,
    pub descend_sorting: bool,
    pub place_on_top: PlaceOnTop,
    pub columns: GridColumns,
    pub filters: Filters,
}

impl Preferences {
    /// Parse preferences from TOML text
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize preferences to TOML text
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Extension tables used to classify media files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaExtensions {
    pub images: Vec<String>,
    pub videos: Vec<String>,
    pub gifs: Vec<String>,
}

impl Default for MediaExtensions {
    fn default() -> Self {
        let owned = |list: &[&str]| list.iter().map(|e| e.to_string()).collect();
        Self {
            images: owned(&[
                "jpg", "jpeg", "png", "bmp", "webp", "heic", "heif", "avif", "tiff", "tif", "raw",
                "arw", "cr2", "cr3", "nef", "orf", "rw2", "dng", "raf", "srw", "pef",
            ]),
            videos: owned(&[
                "mp4", "mov", "avi", "mkv", "wmv", "flv", "m4v", "3gp", "webm",
            ]),
            gifs: owned(&["gif"]),
        }
    }
}

impl MediaExtensions {
    /// Classify an extension, case-insensitively
    pub fn media_type(&self, ext: &str) -> Option<MediaType> {
        let ext_lower = ext.to_lowercase();
        if self.gifs.iter().any(|e| e == &ext_lower) {
            Some(MediaType::Gif)
        } else if self.videos.iter().any(|e| e == &ext_lower) {
            Some(MediaType::Video)
        } else if self.images.iter().any(|e| e == &ext_lower) {
            Some(MediaType::Image)
        } else {
            None
        }
    }

    /// Classify a path by its extension
    pub fn media_type_of(&self, path: &Path) -> Option<MediaType> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| self.media_type(e))
    }
}

/// A mounted volume to scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRoot {
    pub path: PathBuf,
    #[serde(default)]
    pub class: StorageClass,
}

/// Process settings for the media gallery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directories to exclude from scanning (absolute paths or folder names)
    pub exclude_dirs: Vec<PathBuf>,

    /// Directory holding preferences, job records and logs
    pub data_dir: Option<PathBuf>,

    /// Number of concurrent file-operation workers (0 = number of CPUs)
    pub workers: usize,

    /// Read video duration and creation time with ffprobe
    pub probe_videos: bool,

    /// Read EXIF dates and filename timestamps for creation dates
    pub read_embedded_dates: bool,

    /// Volumes to scan for media
    pub storage_roots: Vec<StorageRoot>,

    /// Media classification tables
    pub extensions: MediaExtensions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            exclude_dirs: vec![],
            data_dir: None,
            workers: 0,
            probe_videos: false,
            read_embedded_dates: true,
            storage_roots: vec![],
            extensions: MediaExtensions::default(),
        }
    }
}

impl Settings {
    /// Resolved worker count
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }

    /// Data directory, falling back to `default_dir`
    pub fn data_dir_or(&self, default_dir: &Path) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| default_dir.to_path_buf())
    }

    /// Path of the persisted preferences document inside `data_dir`
    pub fn preferences_path(data_dir: &Path) -> PathBuf {
        data_dir.join("preferences.toml")
    }

    /// Directory of durable job records inside `data_dir`
    pub fn jobs_dir(data_dir: &Path) -> PathBuf {
        data_dir.join("jobs")
    }

    /// Storage class of the configured root containing `path`, if any
    pub fn storage_class_of(&self, path: &Path) -> Option<StorageClass> {
        self.storage_roots
            .iter()
            .filter(|root| path.starts_with(&root.path))
            .max_by_key(|root| root.path.components().count())
            .map(|root| root.class)
    }

    /// Load settings from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(settings)
    }

    /// Save settings to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError { source: e })?;

        fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Generate a sample settings file content
    pub fn sample_config() -> String {
        r#"# Media Gallery Settings
# This file uses TOML format (https://toml.io)

# Directories to exclude from scanning
# Folder names match anywhere, absolute paths match as prefixes
exclude_dirs = [".thumbnails", "@eaDir"]

# Directory for preferences, job records and logs (defaults next to the executable)
# data_dir = "/var/lib/media-gallery"

# Concurrent file-operation workers (0 = number of CPUs)
workers = 0

# Read video duration/creation time with ffprobe (slower scans)
probe_videos = false

# Use EXIF and filename timestamps as creation dates
read_embedded_dates = true

# Volumes to scan. "class" is "device" (internal storage) or "pluggable" (SD card, USB).
[[storage_roots]]
path = "/storage/emulated/0"
class = "device"

[[storage_roots]]
path = "/storage/ABCD-1234"
class = "pluggable"

[extensions]
images = ["jpg", "jpeg", "png", "bmp", "webp", "heic", "heif", "avif", "tiff", "tif", "dng"]
videos = ["mp4", "mov", "avi", "mkv", "m4v", "3gp", "webm"]
gifs = ["gif"]
"#
        .to_string()
    }
}

/// Errors that can occur when loading or saving settings
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read settings file
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse settings file
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to write settings file
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to serialize settings
    SerializeError { source: toml::ser::Error },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError { path, source } => {
                write!(f, "Failed to read settings file '{}': {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse settings file '{}': {}", path.display(), source)
            }
            ConfigError::WriteError { path, source } => {
                write!(f, "Failed to write settings file '{}': {}", path.display(), source)
            }
            ConfigError::SerializeError { source } => {
                write!(f, "Failed to serialize settings: {}", source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::WriteError { source, .. } => Some(source),
            ConfigError::SerializeError { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_media_type_classification() {
        let ext = MediaExtensions::default();
        assert_eq!(ext.media_type("JPG"), Some(MediaType::Image));
        assert_eq!(ext.media_type("mp4"), Some(MediaType::Video));
        assert_eq!(ext.media_type("gif"), Some(MediaType::Gif));
        assert_eq!(ext.media_type("txt"), None);
        assert_eq!(
            ext.media_type_of(Path::new("/a/b/clip.MOV")),
            Some(MediaType::Video)
        );
        assert_eq!(ext.media_type_of(Path::new("/a/b/noext")), None);
    }

    #[test]
    fn test_preferences_toml_round_trip() {
        let prefs = Preferences {
            mode: ViewMode::Plain,
            sort_order: SortOrder::ModificationDate,
            descend_sorting: true,
            place_on_top: PlaceOnTop::FilesOnTop,
            columns: GridColumns {
                portrait: 4,
                landscape: 7,
            },
            filters: Filters {
                gifs: false,
                hidden: true,
                ..Filters::default()
            },
        };

        let text = prefs.to_toml().unwrap();
        assert_eq!(Preferences::from_toml(&text).unwrap(), prefs);
    }

    #[test]
    fn test_preferences_partial_document_uses_defaults() {
        let prefs = Preferences::from_toml("sort_order = \"size\"\n").unwrap();
        assert_eq!(prefs.sort_order, SortOrder::Size);
        assert_eq!(prefs.mode, ViewMode::Tree);
        assert_eq!(prefs.filters, Filters::default());
    }

    #[test]
    fn test_sample_config_parses() {
        let settings: Settings = toml::from_str(&Settings::sample_config()).unwrap();
        assert_eq!(settings.storage_roots.len(), 2);
        assert_eq!(settings.storage_roots[1].class, StorageClass::Pluggable);
        assert!(settings.read_embedded_dates);
    }

    #[test]
    fn test_settings_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let settings = Settings {
            workers: 3,
            exclude_dirs: vec![PathBuf::from(".thumbnails")],
            ..Settings::default()
        };
        settings.save_to_file(&path).unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded.workers, 3);
        assert_eq!(loaded.worker_count(), 3);
        assert_eq!(loaded.exclude_dirs, vec![PathBuf::from(".thumbnails")]);
    }

    #[test]
    fn test_storage_class_of_prefers_longest_root() {
        let settings = Settings {
            storage_roots: vec![
                StorageRoot {
                    path: PathBuf::from("/mnt"),
                    class: StorageClass::Device,
                },
                StorageRoot {
                    path: PathBuf::from("/mnt/sdcard"),
                    class: StorageClass::Pluggable,
                },
            ],
            ..Settings::default()
        };
        assert_eq!(
            settings.storage_class_of(Path::new("/mnt/sdcard/DCIM/a.jpg")),
            Some(StorageClass::Pluggable)
        );
        assert_eq!(
            settings.storage_class_of(Path::new("/mnt/other/a.jpg")),
            Some(StorageClass::Device)
        );
        assert_eq!(settings.storage_class_of(Path::new("/home/a.jpg")), None);
    }
}
