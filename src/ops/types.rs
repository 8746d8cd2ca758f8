//! Type definitions for file operations.

use crate::error::ItemFailure;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Requests
// ============================================================================

/// Kind of file operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Copy,
    Move,
    Rename,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Copy => "copy",
            OperationKind::Move => "move",
            OperationKind::Rename => "rename",
            OperationKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// How to handle a destination that already exists
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Leave the destination alone and mark the item skipped
    Skip,
    /// Replace the destination
    Overwrite,
    /// Keep both: the new entry gets a `_1`, `_2`, ... suffix
    KeepBoth,
}

/// Caller's answer to the protected-items check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Confirmation {
    /// Reject the batch if any source is protected
    #[default]
    Reject,
    /// Operate on protected sources too
    Include,
    /// Drop protected sources and operate on the rest
    Exclude,
}

/// One request of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOperation {
    pub kind: OperationKind,
    pub sources: Vec<PathBuf>,
    /// Target directory for copy/move, new path or new name for rename
    pub destination: Option<PathBuf>,
    /// Applied to every conflicting item of this operation
    pub resolution: Option<ConflictResolution>,
}

impl FileOperation {
    pub fn copy(sources: Vec<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            kind: OperationKind::Copy,
            sources,
            destination: Some(destination.into()),
            resolution: None,
        }
    }

    pub fn move_to(sources: Vec<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            kind: OperationKind::Move,
            sources,
            destination: Some(destination.into()),
            resolution: None,
        }
    }

    pub fn rename(source: impl Into<PathBuf>, new_name: impl Into<PathBuf>) -> Self {
        Self {
            kind: OperationKind::Rename,
            sources: vec![source.into()],
            destination: Some(new_name.into()),
            resolution: None,
        }
    }

    pub fn delete(sources: Vec<PathBuf>) -> Self {
        Self {
            kind: OperationKind::Delete,
            sources,
            destination: None,
            resolution: None,
        }
    }

    pub fn with_resolution(mut self, resolution: ConflictResolution) -> Self {
        self.resolution = Some(resolution);
        self
    }
}

// ============================================================================
// Item state
// ============================================================================

/// Lifecycle of one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ItemState {
    Queued,
    Running,
    /// Waiting for a resolution; the worker slot is released meanwhile
    Conflict { destination: PathBuf },
    Succeeded { destination: Option<PathBuf> },
    Skipped,
    Failed { failure: ItemFailure },
    /// Never started because the batch was stopped
    Cancelled,
}

impl ItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemState::Succeeded { .. }
                | ItemState::Skipped
                | ItemState::Failed { .. }
                | ItemState::Cancelled
        )
    }
}

/// A single source path of a batch, as journaled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationItem {
    pub id: usize,
    pub kind: OperationKind,
    pub source: PathBuf,
    /// Planned destination path; `None` for delete
    pub target: Option<PathBuf>,
    pub resolution: Option<ConflictResolution>,
    pub state: ItemState,
}

impl OperationItem {
    /// Paths this item claims while running; a claim also covers everything below it
    pub fn lock_keys(&self) -> Vec<PathBuf> {
        let mut keys: Vec<PathBuf> = std::iter::once(self.source.clone())
            .chain(self.target.clone())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Directories this item creates or removes entries in
    pub fn written_dirs(&self) -> Vec<PathBuf> {
        let source_parent = self.source.parent().map(Path::to_path_buf);
        let target_parent = self
            .target
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);

        let dirs = match self.kind {
            OperationKind::Copy => vec![target_parent],
            OperationKind::Move | OperationKind::Rename => vec![target_parent, source_parent],
            OperationKind::Delete => vec![source_parent],
        };
        dirs.into_iter().flatten().collect()
    }
}

// ============================================================================
// Events
// ============================================================================

/// Final counts of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn from_items(items: &[OperationItem]) -> Self {
        let mut summary = Self::default();
        for item in items {
            match item.state {
                ItemState::Succeeded { .. } => summary.succeeded += 1,
                ItemState::Skipped => summary.skipped += 1,
                ItemState::Failed { .. } => summary.failed += 1,
                ItemState::Cancelled => summary.cancelled += 1,
                _ => {}
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed + self.cancelled
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Succeeded: {}, Skipped: {}, Failed: {}, Cancelled: {}",
            self.succeeded, self.skipped, self.failed, self.cancelled
        )
    }
}

/// Progress event emitted by a running batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationEvent {
    ItemUpdate {
        item: usize,
        source: PathBuf,
        state: ItemState,
    },
    /// Every item reached a terminal state
    Finished(BatchSummary),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: OperationKind, source: &str, target: Option<&str>) -> OperationItem {
        OperationItem {
            id: 0,
            kind,
            source: PathBuf::from(source),
            target: target.map(PathBuf::from),
            resolution: None,
            state: ItemState::Queued,
        }
    }

    #[test]
    fn test_written_dirs_per_kind() {
        let copy = item(OperationKind::Copy, "/a/x.jpg", Some("/b/x.jpg"));
        assert_eq!(copy.written_dirs(), vec![PathBuf::from("/b")]);

        let mv = item(OperationKind::Move, "/a/x.jpg", Some("/b/x.jpg"));
        assert_eq!(
            mv.written_dirs(),
            vec![PathBuf::from("/b"), PathBuf::from("/a")]
        );

        let delete = item(OperationKind::Delete, "/a/x.jpg", None);
        assert_eq!(delete.written_dirs(), vec![PathBuf::from("/a")]);
    }

    #[test]
    fn test_lock_keys_are_sorted() {
        let mv = item(OperationKind::Move, "/z/x.jpg", Some("/a/x.jpg"));
        assert_eq!(
            mv.lock_keys(),
            vec![PathBuf::from("/a/x.jpg"), PathBuf::from("/z/x.jpg")]
        );
    }

    #[test]
    fn test_summary_counts_terminal_states() {
        let mut items = vec![
            item(OperationKind::Copy, "/a/1", Some("/b/1")),
            item(OperationKind::Copy, "/a/2", Some("/b/2")),
            item(OperationKind::Copy, "/a/3", Some("/b/3")),
            item(OperationKind::Copy, "/a/4", Some("/b/4")),
        ];
        items[0].state = ItemState::Succeeded { destination: None };
        items[1].state = ItemState::Skipped;
        items[2].state = ItemState::Failed {
            failure: ItemFailure::NotFound(PathBuf::from("/a/3")),
        };

        let summary = BatchSummary::from_items(&items);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.failed, 1);
        assert!(!items[3].state.is_terminal());
        assert!(items[1].state.is_terminal());
    }
}
