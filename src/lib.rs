//! Media Gallery - the core of a photo and video gallery
//!
//! This library provides:
//! - A media index over storage roots, with EXIF, ffprobe and filename dates
//! - Album aggregation in tree or flat (plain) layout
//! - Preference-driven filtering, sorting and placement
//! - Persistent preferences with replay-latest subscriptions
//! - A reactive repository with latest-request-wins cancellation
//! - Journaled copy/move/rename/delete batches with conflict handling

// Initialize i18n with locale files
rust_i18n::i18n!("locales", fallback = "en");

pub mod cancel;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod i18n;
pub mod media;
pub mod ops;
pub mod os;
pub mod prefs;
pub mod repo;
pub mod time;

pub use cancel::CancelToken;
pub use cli::Cli;
pub use config::{ConfigError, Preferences, Settings};
pub use error::{Error, ItemFailure, OperationError, Result};
pub use i18n::init_locale;
pub use media::{FsMediaIndex, MediaIndex, MediaItem, MediaItemMapper, MediaRecord};
pub use ops::{FileOperation, FileOperationExecutor, OperationHandle};
pub use os::{FsProbe, RealFs};
pub use prefs::PreferencesStore;
pub use repo::{MediaRepository, Pipeline, Resource};
