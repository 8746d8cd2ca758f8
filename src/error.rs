//! Error types for the media gallery

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for media gallery operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for scanning, aggregation and persistence
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read EXIF data from {path}: {message}")]
    ExifRead { path: PathBuf, message: String },

    #[error("Failed to extract video metadata from {path}: {message}")]
    VideoMetadata { path: PathBuf, message: String },

    #[error("FFprobe not found. Please install FFmpeg and ensure ffprobe is in PATH")]
    FfprobeNotFound,

    #[error("Job record error: {0}")]
    JobRecord(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Scan was cancelled by a newer request")]
    Cancelled,
}

impl Error {
    /// Whether this error only means the work was superseded
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Batch-level rejection of a file operation request.
///
/// These are raised before any item is queued, so the filesystem is untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("Write permission denied for: {}", display_paths(.0))]
    PermissionDenied(Vec<PathBuf>),

    #[error("Protected items require confirmation: {}", display_paths(.0))]
    ProtectedItems(Vec<PathBuf>),

    #[error("Invalid operation request: {0}")]
    InvalidRequest(String),

    #[error("Failed to journal operation: {0}")]
    Journal(String),
}

/// Terminal failure of a single operation item
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ItemFailure {
    #[error("Not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O failure on {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Conflict on {0} was left unresolved")]
    Unresolved(PathBuf),
}

impl ItemFailure {
    /// Classify an I/O error raised while working on `path`
    pub fn from_io(path: &std::path::Path, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            ItemFailure::NotFound(path.to_path_buf())
        } else {
            ItemFailure::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
