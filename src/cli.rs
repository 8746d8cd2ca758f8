//! CLI argument parsing with clap

use crate::config::{PlaceOnTop, Preferences, Settings, SortOrder, StorageRoot, ViewMode};
use crate::media::StorageClass;
use crate::ops::{Confirmation, ConflictResolution};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Media Gallery - browse albums and run file operations on your photo library
///
/// Groups images, videos and gifs into albums, filters and sorts them by your saved
/// preferences, and copies, moves, renames or deletes them as resumable jobs.
#[derive(Parser, Debug)]
#[command(name = "media-gallery")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to settings file (TOML format)
    ///
    /// CLI arguments override settings from the file.
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for preferences, job records and logs
    #[arg(short = 'D', long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Number of concurrent file-operation workers (0 = auto)
    #[arg(short = 'w', long, global = true)]
    pub workers: Option<usize>,

    /// Read video duration and creation time with ffprobe
    #[arg(long, global = true)]
    pub probe_videos: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output log format as JSON
    #[arg(long, global = true)]
    pub json_log: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List albums and media below a directory
    List(ListArgs),

    /// Show or change the saved view preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// Copy files or albums into a directory
    Copy(TransferArgs),

    /// Move files or albums into a directory
    Move(TransferArgs),

    /// Rename a file or album
    Rename {
        source: PathBuf,

        /// New name, or a full new path
        new_name: PathBuf,

        #[command(flatten)]
        options: OperationOptions,
    },

    /// Delete files or albums
    Delete {
        #[arg(required = true, num_args = 1..)]
        sources: Vec<PathBuf>,

        #[command(flatten)]
        options: OperationOptions,
    },

    /// Show journaled jobs, or one job in detail
    Status { job: Option<Uuid> },

    /// Resume jobs interrupted before they finished
    Resume,

    /// Delete records of finished jobs
    Prune,

    /// Write a sample settings file
    InitConfig {
        #[arg(default_value = "media-gallery.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Command {
    /// Short name used for log file naming
    pub fn name(&self) -> &'static str {
        match self {
            Command::List(_) => "list",
            Command::Prefs { .. } => "prefs",
            Command::Copy(_) => "copy",
            Command::Move(_) => "move",
            Command::Rename { .. } => "rename",
            Command::Delete { .. } => "delete",
            Command::Status { .. } => "status",
            Command::Resume => "resume",
            Command::Prune => "prune",
            Command::InitConfig { .. } => "init-config",
        }
    }
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Directory to list
    pub root: PathBuf,

    /// Only show items whose name contains this text
    #[arg(short, long)]
    pub search: Option<String>,

    /// Print items as JSON
    #[arg(long)]
    pub json: bool,

    /// One-off preference overrides (not saved)
    #[command(flatten)]
    pub overrides: PrefsArgs,
}

#[derive(Subcommand, Debug)]
pub enum PrefsAction {
    /// Print the saved preferences
    Show,
    /// Change and save preferences
    Set(PrefsArgs),
    /// Restore the default preferences
    Reset,
}

/// Preference fields; only the given ones change
#[derive(Args, Debug, Default, Clone)]
pub struct PrefsArgs {
    /// Album layout
    #[arg(short = 'M', long, value_enum)]
    pub mode: Option<ViewMode>,

    /// Sort field
    #[arg(long, value_enum)]
    pub sort: Option<SortOrder>,

    /// Sort descending
    #[arg(long)]
    pub descending: Option<bool>,

    /// Group albums or files first
    #[arg(long, value_enum)]
    pub place_on_top: Option<PlaceOnTop>,

    #[arg(long)]
    pub portrait_columns: Option<u8>,

    #[arg(long)]
    pub landscape_columns: Option<u8>,

    #[arg(long)]
    pub images: Option<bool>,

    #[arg(long)]
    pub videos: Option<bool>,

    #[arg(long)]
    pub gifs: Option<bool>,

    /// Show plain files
    #[arg(long)]
    pub files: Option<bool>,

    /// Show albums
    #[arg(long)]
    pub albums: Option<bool>,

    /// Show hidden items
    #[arg(long)]
    pub hidden: Option<bool>,

    /// Show non-hidden items
    #[arg(long)]
    pub unhidden: Option<bool>,
}

impl PrefsArgs {
    /// Apply the given fields to `prefs`
    pub fn apply(&self, prefs: &mut Preferences) {
        if let Some(mode) = self.mode {
            prefs.mode = mode;
        }
        if let Some(sort) = self.sort {
            prefs.sort_order = sort;
        }
        if let Some(descending) = self.descending {
            prefs.descend_sorting = descending;
        }
        if let Some(place) = self.place_on_top {
            prefs.place_on_top = place;
        }
        if let Some(n) = self.portrait_columns {
            prefs.columns.portrait = n;
        }
        if let Some(n) = self.landscape_columns {
            prefs.columns.landscape = n;
        }

        let filters = &mut prefs.filters;
        let flags = [
            (self.images, &mut filters.images),
            (self.videos, &mut filters.videos),
            (self.gifs, &mut filters.gifs),
            (self.files, &mut filters.files),
            (self.albums, &mut filters.albums),
            (self.hidden, &mut filters.hidden),
            (self.unhidden, &mut filters.unhidden),
        ];
        for (value, slot) in flags {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

#[derive(Args, Debug)]
pub struct TransferArgs {
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<PathBuf>,

    /// Target directory
    #[arg(short, long)]
    pub destination: PathBuf,

    #[command(flatten)]
    pub options: OperationOptions,
}

#[derive(Args, Debug, Default)]
pub struct OperationOptions {
    /// Resolve every conflict this way instead of asking
    #[arg(long, value_enum)]
    pub on_conflict: Option<ConflictResolution>,

    /// Also operate on protected volumes and read-only albums
    #[arg(long, conflicts_with = "exclude_protected")]
    pub include_protected: bool,

    /// Leave protected volumes and read-only albums out
    #[arg(long)]
    pub exclude_protected: bool,
}

impl OperationOptions {
    pub fn confirmation(&self) -> Confirmation {
        if self.include_protected {
            Confirmation::Include
        } else if self.exclude_protected {
            Confirmation::Exclude
        } else {
            Confirmation::Reject
        }
    }
}

impl Cli {
    /// Merge CLI arguments with settings from file
    /// CLI arguments take precedence over file settings
    pub fn merge_with_settings(&self, mut settings: Settings) -> Settings {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = Some(data_dir.clone());
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if self.probe_videos {
            settings.probe_videos = true;
        }
        if let Command::List(args) = &self.command {
            ensure_storage_root(&mut settings, &args.root);
        }
        settings
    }
}

/// Register `root` as a storage root unless a configured one already covers it
fn ensure_storage_root(settings: &mut Settings, root: &Path) {
    if settings.storage_class_of(root).is_none() {
        settings.storage_roots.push(StorageRoot {
            path: root.to_path_buf(),
            class: StorageClass::Device,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_copy_with_options() {
        let cli = Cli::try_parse_from([
            "media-gallery",
            "copy",
            "a.jpg",
            "b.jpg",
            "-d",
            "/out",
            "--on-conflict",
            "keep-both",
            "--exclude-protected",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Command::Copy(args) => {
                assert_eq!(args.sources.len(), 2);
                assert_eq!(args.destination, PathBuf::from("/out"));
                assert_eq!(args.options.on_conflict, Some(ConflictResolution::KeepBoth));
                assert_eq!(args.options.confirmation(), Confirmation::Exclude);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_protected_flags_conflict() {
        let result = Cli::try_parse_from([
            "media-gallery",
            "delete",
            "a.jpg",
            "--include-protected",
            "--exclude-protected",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_prefs_args_apply_only_given_fields() {
        let cli = Cli::try_parse_from([
            "media-gallery",
            "prefs",
            "set",
            "--sort",
            "creation-date",
            "--hidden",
            "true",
        ])
        .unwrap();
        let Command::Prefs {
            action: PrefsAction::Set(args),
        } = cli.command
        else {
            panic!("expected prefs set");
        };

        let mut prefs = Preferences::default();
        args.apply(&mut prefs);
        assert_eq!(prefs.sort_order, SortOrder::CreationDate);
        assert!(prefs.filters.hidden);
        assert!(prefs.filters.unhidden);
        assert_eq!(prefs.mode, ViewMode::Tree);
    }

    #[test]
    fn test_merge_registers_list_root() {
        let cli = Cli::try_parse_from(["media-gallery", "list", "/photos", "-w", "3"]).unwrap();
        let settings = cli.merge_with_settings(Settings::default());

        assert_eq!(settings.workers, 3);
        assert_eq!(settings.storage_roots.len(), 1);
        assert_eq!(settings.storage_roots[0].path, PathBuf::from("/photos"));

        let mut configured = Settings::default();
        configured.storage_roots.push(StorageRoot {
            path: PathBuf::from("/"),
            class: StorageClass::Pluggable,
        });
        let merged = cli.merge_with_settings(configured);
        assert_eq!(merged.storage_roots.len(), 1);
    }
}
