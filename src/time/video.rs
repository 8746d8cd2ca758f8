//! Video duration and creation time via FFprobe

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime};
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;
use tracing::{debug, trace};

/// Metadata keys carrying the recording date
const CREATION_DATE_KEYS: &[&str] = &[
    "creation_time",
    "com.apple.quicktime.creationdate",
    "date",
];

static FFPROBE_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Check if ffprobe is available (cached)
pub fn is_ffprobe_available() -> bool {
    *FFPROBE_AVAILABLE.get_or_init(|| Command::new("ffprobe").arg("-version").output().is_ok())
}

/// What ffprobe could tell about a video container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoProbe {
    /// Duration in milliseconds
    pub duration_ms: Option<u64>,
    /// Recording date (UTC)
    pub created: Option<NaiveDateTime>,
}

/// Run ffprobe on `path` and pick out duration and creation time
pub fn probe_video(path: &Path) -> Result<VideoProbe> {
    if !is_ffprobe_available() {
        return Err(Error::FfprobeNotFound);
    }

    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .output()
        .map_err(|e| Error::VideoMetadata {
            path: path.to_path_buf(),
            message: format!("Failed to execute ffprobe: {}", e),
        })?;

    if !output.status.success() {
        return Err(Error::VideoMetadata {
            path: path.to_path_buf(),
            message: format!("FFprobe failed: {}", String::from_utf8_lossy(&output.stderr)),
        });
    }

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).map_err(|e| Error::VideoMetadata {
            path: path.to_path_buf(),
            message: format!("Failed to parse FFprobe JSON: {}", e),
        })?;
    trace!(?path, %json, "FFprobe output");

    let probe = parse_probe(&json);
    debug!(?path, ?probe, "Probed video");
    Ok(probe)
}

fn parse_probe(json: &serde_json::Value) -> VideoProbe {
    let format = json.get("format");

    let duration_ms = format
        .and_then(|f| f.get("duration"))
        .and_then(|d| d.as_str())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| (secs * 1000.0).round() as u64);

    let created = format.and_then(|f| f.get("tags")).and_then(|tags| {
        CREATION_DATE_KEYS.iter().find_map(|key| {
            tags.get(*key)
                .or_else(|| tags.get(key.to_uppercase()))
                .and_then(|v| v.as_str())
                .and_then(parse_video_datetime)
        })
    });

    VideoProbe {
        duration_ms,
        created,
    }
}

/// Parse container timestamps; offsets are normalized to UTC
pub fn parse_video_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}
