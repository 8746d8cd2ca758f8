//! Durable job records
//!
//! Every batch is persisted as `<jobs_dir>/<uuid>.json` and rewritten on each item state
//! change, so an interrupted process can report on or resume its batches.

use crate::error::{Error, Result};
use crate::ops::types::{BatchSummary, OperationItem};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Current job record version
const JOB_RECORD_VERSION: u32 = 1;

/// How often a running batch re-stamps its owner
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Missed heartbeats after which the owner is presumed dead
const STALE_HEARTBEATS: i64 = 3;

/// Process executing a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOwner {
    pub pid: u32,
    pub heartbeat: DateTime<Utc>,
}

impl JobOwner {
    /// This process, now
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            heartbeat: Utc::now(),
        }
    }
}

/// Persisted batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub version: u32,
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set while some process runs the batch; cleared once it finished
    #[serde(default)]
    pub owner: Option<JobOwner>,
    pub items: Vec<OperationItem>,
}

impl JobRecord {
    pub fn new(items: Vec<OperationItem>) -> Self {
        let now = Utc::now();
        Self {
            version: JOB_RECORD_VERSION,
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            owner: None,
            items,
        }
    }

    /// Whether every item reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.items.iter().all(|item| item.state.is_terminal())
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_items(&self.items)
    }

    /// Whether a process heartbeat at `now` is recent enough to treat the batch as running
    pub fn is_owned_at(&self, now: DateTime<Utc>) -> bool {
        let interval = HEARTBEAT_INTERVAL.as_secs() as i64;
        let stale_after = TimeDelta::seconds(interval * STALE_HEARTBEATS);
        self.owner
            .is_some_and(|owner| now.signed_duration_since(owner.heartbeat) < stale_after)
    }

    /// Items not yet in a terminal state
    pub fn pending_items(&self) -> impl Iterator<Item = &OperationItem> {
        self.items.iter().filter(|item| !item.state.is_terminal())
    }
}

/// Directory of job records
#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_of(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Write a record atomically
    pub fn save(&self, record: &JobRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_of(record.id);

        // Write to a temporary file first, then rename for atomicity
        let temp_path = path.with_extension("json.tmp");
        let file = File::create(&temp_path).map_err(|e| {
            Error::JobRecord(format!("Failed to create temp job record: {}", e))
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, record)?;
        writer.flush()?;
        fs::rename(&temp_path, &path).map_err(|e| {
            Error::JobRecord(format!("Failed to rename temp job record: {}", e))
        })?;
        Ok(())
    }

    pub fn load(&self, id: Uuid) -> Result<JobRecord> {
        load_record(&self.path_of(id))
    }

    /// Every readable record, oldest first
    pub fn list(&self) -> Result<Vec<JobRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match load_record(&path) {
                Ok(record) => records.push(record),
                Err(e) => warn!(?path, error = %e, "Skipping unreadable job record"),
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    pub fn remove(&self, id: Uuid) -> Result<()> {
        fs::remove_file(self.path_of(id))?;
        debug!(job = %id, "Removed job record");
        Ok(())
    }
}

fn load_record(path: &Path) -> Result<JobRecord> {
    let file = File::open(path)
        .map_err(|e| Error::JobRecord(format!("Failed to open {}: {}", path.display(), e)))?;
    let record: JobRecord = serde_json::from_reader(BufReader::new(file))?;

    if record.version != JOB_RECORD_VERSION {
        return Err(Error::JobRecord(format!(
            "Unsupported job record version {} in {}",
            record.version,
            path.display()
        )));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::types::{ItemState, OperationKind};
    use tempfile::tempdir;

    fn record(states: Vec<ItemState>) -> JobRecord {
        JobRecord::new(
            states
                .into_iter()
                .enumerate()
                .map(|(id, state)| OperationItem {
                    id,
                    kind: OperationKind::Delete,
                    source: PathBuf::from(format!("/pics/{}.jpg", id)),
                    target: None,
                    resolution: None,
                    state,
                })
                .collect(),
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path().join("jobs"));
        let job = record(vec![ItemState::Queued, ItemState::Skipped]);

        journal.save(&job).unwrap();
        let loaded = journal.load(job.id).unwrap();

        assert_eq!(loaded, job);
        assert!(!loaded.is_finished());
        assert_eq!(loaded.pending_items().count(), 1);
        assert!(!journal.path_of(job.id).with_extension("json.tmp").exists());
    }

    #[test]
    fn test_list_skips_garbage() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path());
        let job = record(vec![ItemState::Cancelled]);
        journal.save(&job).unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let records = journal.list().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_finished());
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path());
        let mut job = record(vec![ItemState::Queued]);
        job.version = 99;
        journal.save(&job).unwrap();

        assert!(matches!(journal.load(job.id), Err(Error::JobRecord(_))));
    }

    #[test]
    fn test_owner_heartbeat_goes_stale() {
        let mut job = record(vec![ItemState::Running]);
        let now = Utc::now();
        assert!(!job.is_owned_at(now));

        job.owner = Some(JobOwner {
            pid: 1,
            heartbeat: now - TimeDelta::seconds(5),
        });
        assert!(job.is_owned_at(now));
        assert!(!job.is_owned_at(now + TimeDelta::minutes(5)));
    }

    #[test]
    fn test_record_without_owner_field_loads() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path());
        let job = record(vec![ItemState::Queued]);
        let mut value = serde_json::to_value(&job).unwrap();
        value.as_object_mut().unwrap().remove("owner");
        fs::write(journal.path_of(job.id), value.to_string()).unwrap();

        assert_eq!(journal.load(job.id).unwrap().owner, None);
    }

    #[test]
    fn test_missing_dir_lists_nothing() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path().join("absent"));
        assert!(journal.list().unwrap().is_empty());
    }
}
