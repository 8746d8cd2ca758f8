//! Creation time resolution for media files
//!
//! The resolution order is:
//! 1. EXIF metadata (images)
//! 2. Container metadata via FFprobe (videos, when probing is enabled)
//! 3. Filename timestamp
//! 4. File system birth time, then modification time

pub mod exif;
pub mod filename;
pub mod video;

use crate::media::MediaType;
use crate::os::system_time_millis;
use chrono::NaiveDateTime;
use std::fs::Metadata;
use std::path::Path;
use tracing::trace;

/// Source of the resolved timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    Exif,
    VideoMetadata,
    Filename,
    FileSystem,
}

/// Resolved creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractedTime {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub source: TimeSource,
}

/// Resolve the creation time of a media file.
///
/// `embedded` enables EXIF and filename parsing; `video_created` is the container date when
/// the caller already probed the video.
pub fn creation_time(
    path: &Path,
    media_type: MediaType,
    metadata: &Metadata,
    embedded: bool,
    video_created: Option<NaiveDateTime>,
) -> ExtractedTime {
    if embedded && media_type == MediaType::Image {
        match exif::extract_exif_time(path) {
            Ok(dt) => return extracted(dt, TimeSource::Exif),
            Err(e) => trace!(?path, error = %e, "No EXIF time"),
        }
    }

    if let Some(dt) = video_created {
        return extracted(dt, TimeSource::VideoMetadata);
    }

    if embedded
        && let Some(name) = path.file_name().and_then(|f| f.to_str())
        && let Some(dt) = filename::parse_filename_time(name)
    {
        return extracted(dt, TimeSource::Filename);
    }

    let timestamp = metadata
        .created()
        .or_else(|_| metadata.modified())
        .map(system_time_millis)
        .unwrap_or(0);

    ExtractedTime {
        timestamp,
        source: TimeSource::FileSystem,
    }
}

fn extracted(dt: NaiveDateTime, source: TimeSource) -> ExtractedTime {
    ExtractedTime {
        timestamp: dt.and_utc().timestamp_millis(),
        source,
    }
}
