//! Raw record to UI item mapping
//!
//! Every derived field of a [`MediaItem`] is computed here and nowhere else.

use crate::config::{MediaExtensions, Settings};
use crate::media::{ItemDetails, MediaItem, MediaRecord, MediaType};
use crate::os::FsProbe;
use rayon::prelude::*;
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock};

/// Android-style volume roots: `/storage/emulated/<user>` and `/storage/XXXX-XXXX`
static VOLUME_ROOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(/storage/(?:emulated/\d+|[0-9A-Za-z]{4}-[0-9A-Za-z]{4}))(?:/|$)")
        .expect("static volume pattern")
});

/// Builds [`MediaItem`]s from [`MediaRecord`]s
#[derive(Clone)]
pub struct MediaItemMapper {
    extensions: MediaExtensions,
    roots: Vec<PathBuf>,
    probe: Arc<dyn FsProbe>,
}

impl std::fmt::Debug for MediaItemMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaItemMapper")
            .field("roots", &self.roots)
            .finish_non_exhaustive()
    }
}

impl MediaItemMapper {
    pub fn new(settings: &Settings, probe: Arc<dyn FsProbe>) -> Self {
        Self {
            extensions: settings.extensions.clone(),
            roots: settings
                .storage_roots
                .iter()
                .map(|r| r.path.clone())
                .collect(),
            probe,
        }
    }

    pub fn extensions(&self) -> &MediaExtensions {
        &self.extensions
    }

    /// Storage root `path` belongs to: the deepest configured root, else the volume pattern
    pub fn volume_of(&self, path: &Path) -> Option<PathBuf> {
        if let Some(root) = self
            .roots
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
        {
            return Some(root.clone());
        }
        let text = path.to_string_lossy();
        VOLUME_ROOT
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .map(|m| PathBuf::from(m.as_str()))
    }

    /// Whether a directory is protected: a volume root or not writable
    pub fn is_volume(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        let trimmed = text.trim_end_matches('/');
        let is_root_pattern = VOLUME_ROOT
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .is_some_and(|m| m.as_str() == trimmed);

        is_root_pattern || self.roots.iter().any(|r| r == path) || !self.probe.is_writable(path)
    }

    /// Whether any path segment below the owning volume starts with a dot
    pub fn is_hidden(&self, path: &Path) -> bool {
        let relative = self
            .volume_of(path)
            .and_then(|volume| path.strip_prefix(&volume).ok().map(Path::to_path_buf))
            .unwrap_or_else(|| path.to_path_buf());

        relative.components().any(|c| match c {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        })
    }

    /// Map one record; files with an unknown media type yield `None`
    pub fn map(&self, record: &MediaRecord) -> Option<MediaItem> {
        let path = record.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let hidden = self.is_hidden(path);
        let volume = self.volume_of(path);

        let item = match record {
            MediaRecord::File(file) => {
                let extension = path
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                let media_type = self.extensions.media_type(&extension)?;
                MediaItem::new(
                    file.path.clone(),
                    name,
                    file.size,
                    file.creation_date,
                    file.modification_date,
                    file.storage,
                    hidden,
                    volume,
                    ItemDetails::File {
                        mime_type: mime_type_for(&extension, media_type),
                        extension,
                        media_type,
                        duration: file.duration,
                    },
                )
            }
            MediaRecord::Album(album) => MediaItem::new(
                album.path.clone(),
                name,
                album.size,
                album.creation_date,
                album.modification_date,
                album.storage,
                hidden,
                volume,
                ItemDetails::Album {
                    counts: album.counts,
                    files_count: album.counts.files(),
                    is_volume: self.is_volume(&album.path),
                    thumbnail: album.thumbnail.clone(),
                },
            ),
        };
        Some(item)
    }

    /// Map a batch of records in parallel, preserving order
    pub fn map_all(&self, records: &[MediaRecord]) -> Vec<MediaItem> {
        records.par_iter().filter_map(|r| self.map(r)).collect()
    }
}

fn mime_type_for(extension: &str, media_type: MediaType) -> String {
    match mime_guess::from_ext(extension).first_raw() {
        Some(mime) => mime.to_string(),
        None => match media_type {
            MediaType::Image => "image/*".to_string(),
            MediaType::Video => "video/*".to_string(),
            MediaType::Gif => "image/gif".to_string(),
        },
    }
}
