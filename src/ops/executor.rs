//! Batch executor for file operations
//!
//! A submitted batch is validated, checked for protected sources and write access, journaled,
//! and then run as one detached task per item. Items whose paths are equal or nested are
//! serialized through path claims; the worker semaphore bounds how many run at once. An item
//! that hits an existing destination gives its worker slot back and waits for a resolution.
//! A per-job writer task keeps the journal current and heartbeats the owning process, so
//! `resume` leaves batches alone while another process still runs them.

use crate::cancel::CancelToken;
use crate::error::{ItemFailure, OperationError, Result};
use crate::media::MediaItemMapper;
use crate::ops::journal::{HEARTBEAT_INTERVAL, JobOwner, JobRecord, Journal};
use crate::ops::perform::{self, Outcome};
use crate::ops::types::{
    BatchSummary, Confirmation, ConflictResolution, FileOperation, ItemState, OperationEvent,
    OperationItem, OperationKind,
};
use crate::os::FsProbe;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Notify, Semaphore, mpsc, oneshot, watch};
use tracing::{Level, debug, info, span, warn};
use uuid::Uuid;

// ============================================================================
// Path locks
// ============================================================================

/// Path claims; two claims conflict when one path contains the other
#[derive(Debug, Default)]
struct PathLocks {
    held: Mutex<Vec<PathBuf>>,
    released: Notify,
}

fn overlaps(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

impl PathLocks {
    /// Wait until no held claim overlaps any of `keys`, then claim them all at once
    async fn lock_all(self: &Arc<Self>, keys: Vec<PathBuf>) -> PathClaim {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            {
                let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
                let busy = keys.iter().any(|key| held.iter().any(|h| overlaps(key, h)));
                if !busy {
                    held.extend(keys.iter().cloned());
                    return PathClaim {
                        locks: Arc::clone(self),
                        keys,
                    };
                }
                // Registered before the lock is released so no release is missed
                released.as_mut().enable();
            }
            released.await;
        }
    }
}

/// Paths held by one running item; released on drop
struct PathClaim {
    locks: Arc<PathLocks>,
    keys: Vec<PathBuf>,
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock().unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            if let Some(pos) = held.iter().position(|h| h == key) {
                held.swap_remove(pos);
            }
        }
        drop(held);
        self.locks.released.notify_waiters();
    }
}

// ============================================================================
// Running job
// ============================================================================

struct JobState {
    record: JobRecord,
    finished: Option<BatchSummary>,
}

#[derive(Default)]
struct Conflicts {
    waiting: HashMap<usize, oneshot::Sender<Option<ConflictResolution>>>,
    apply_to_all: Option<ConflictResolution>,
}

struct Job {
    id: Uuid,
    journal: Arc<Journal>,
    cancel: CancelToken,
    state: Mutex<JobState>,
    conflicts: Mutex<Conflicts>,
    events: mpsc::UnboundedSender<OperationEvent>,
    /// Bumped on every state change; the journal writer persists the latest record
    dirty: watch::Sender<()>,
}

impl Job {
    fn item(&self, id: usize) -> Option<OperationItem> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.record.items.get(id).cloned()
    }

    fn snapshot(&self) -> JobRecord {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.record.clone()
    }

    fn apply_to_all(&self) -> Option<ConflictResolution> {
        self.conflicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply_to_all
    }

    /// Record and announce a state change; the journal write happens off this thread
    fn set_state(&self, id: usize, new_state: ItemState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(item) = state.record.items.get_mut(id) else {
            return;
        };
        item.state = new_state.clone();
        let source = item.source.clone();
        state.record.updated_at = Utc::now();

        debug!(job = %self.id, item = id, state = ?new_state, "Item state changed");
        let _ = self.events.send(OperationEvent::ItemUpdate {
            item: id,
            source,
            state: new_state,
        });

        if state.finished.is_none() && state.record.is_finished() {
            let summary = state.record.summary();
            state.finished = Some(summary);
            info!(job = %self.id, %summary, "Batch finished");
        }
        self.dirty.send_replace(());
    }

    /// Park an item in `Conflict` until a resolution arrives; `None` means abandoned
    async fn await_resolution(
        &self,
        id: usize,
        destination: PathBuf,
    ) -> Option<ConflictResolution> {
        let rx = {
            let mut conflicts = self.conflicts.lock().unwrap_or_else(PoisonError::into_inner);
            if self.cancel.is_cancelled() {
                return None;
            }
            if let Some(resolution) = conflicts.apply_to_all {
                return Some(resolution);
            }
            let (tx, rx) = oneshot::channel();
            conflicts.waiting.insert(id, tx);
            rx
        };

        self.set_state(id, ItemState::Conflict { destination });
        rx.await.ok().flatten()
    }

    fn resolve(&self, id: usize, resolution: ConflictResolution, apply_to_all: bool) -> bool {
        let mut conflicts = self.conflicts.lock().unwrap_or_else(PoisonError::into_inner);
        let was_waiting = conflicts.waiting.contains_key(&id);

        if apply_to_all {
            conflicts.apply_to_all = Some(resolution);
            for (_, tx) in conflicts.waiting.drain() {
                let _ = tx.send(Some(resolution));
            }
        } else if let Some(tx) = conflicts.waiting.remove(&id) {
            let _ = tx.send(Some(resolution));
        }
        was_waiting
    }

    fn stop(&self) {
        let mut conflicts = self.conflicts.lock().unwrap_or_else(PoisonError::into_inner);
        self.cancel.cancel();
        for (_, tx) in conflicts.waiting.drain() {
            let _ = tx.send(None);
        }
        info!(job = %self.id, "Batch stop requested");
    }
}

/// Journal writer of one job.
///
/// Writes the latest record after every state change and on each heartbeat tick, stamping
/// this process as owner. `Finished` is announced only once the finished record is on disk.
async fn persist_job(job: Arc<Job>, mut dirty: watch::Receiver<()>) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            changed = dirty.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = heartbeat.tick() => {}
        }

        let mut record = job.snapshot();
        let finished = record.is_finished();
        record.owner = (!finished).then(JobOwner::current);

        let journal = Arc::clone(&job.journal);
        match tokio::task::spawn_blocking(move || journal.save(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(job = %job.id, error = %e, "Failed to journal job state"),
            Err(e) => warn!(job = %job.id, error = %e, "Journal write task failed"),
        }

        if finished {
            let summary = job
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .finished;
            if let Some(summary) = summary {
                let _ = job.events.send(OperationEvent::Finished(summary));
            }
            return;
        }
    }
}

async fn run_item(job: Arc<Job>, workers: Arc<Semaphore>, locks: Arc<PathLocks>, id: usize) {
    let Some(item) = job.item(id) else {
        return;
    };
    let mut resolution = item.resolution;
    let mut started = false;

    loop {
        let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
            job.set_state(id, ItemState::Cancelled);
            return;
        };
        if !started && job.cancel.is_cancelled() {
            job.set_state(id, ItemState::Cancelled);
            return;
        }
        started = true;

        let effective = resolution.or_else(|| job.apply_to_all());
        let claim = locks.lock_all(item.lock_keys()).await;
        job.set_state(id, ItemState::Running);

        let work = item.clone();
        let outcome =
            tokio::task::spawn_blocking(move || perform::perform(&work, effective)).await;
        drop(claim);
        drop(permit);

        let state = match outcome {
            Ok(Ok(Outcome::Done(destination))) => ItemState::Succeeded { destination },
            Ok(Ok(Outcome::Skipped)) => ItemState::Skipped,
            Ok(Ok(Outcome::Conflict(destination))) => {
                match job.await_resolution(id, destination.clone()).await {
                    Some(chosen) => {
                        resolution = Some(chosen);
                        continue;
                    }
                    None => ItemState::Failed {
                        failure: ItemFailure::Unresolved(destination),
                    },
                }
            }
            Ok(Err(failure)) => ItemState::Failed { failure },
            Err(e) => ItemState::Failed {
                failure: ItemFailure::Io {
                    path: item.source.clone(),
                    message: e.to_string(),
                },
            },
        };
        job.set_state(id, state);
        return;
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Caller's view of a running batch.
///
/// Dropping the handle does not stop the batch.
pub struct OperationHandle {
    job_id: Uuid,
    events: mpsc::UnboundedReceiver<OperationEvent>,
    job: Arc<Job>,
}

impl OperationHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Next progress event; `None` once the batch finished and every event was read
    pub async fn next_event(&mut self) -> Option<OperationEvent> {
        self.events.recv().await
    }

    /// Answer a pending conflict; with `apply_to_all` the answer also covers later conflicts
    pub fn resolve(
        &self,
        item: usize,
        resolution: ConflictResolution,
        apply_to_all: bool,
    ) -> bool {
        self.job.resolve(item, resolution, apply_to_all)
    }

    /// Stop admitting queued items and abandon pending conflicts
    pub fn stop(&self) {
        self.job.stop();
    }

    pub fn item_state(&self, item: usize) -> Option<ItemState> {
        self.job.item(item).map(|i| i.state)
    }

    pub fn items(&self) -> Vec<OperationItem> {
        let state = self.job.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.record.items.clone()
    }

    /// Summary once every item is terminal
    pub fn summary(&self) -> Option<BatchSummary> {
        self.job
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finished
    }

    /// Drain events until the batch finishes
    pub async fn wait(mut self) -> BatchSummary {
        while let Some(event) = self.events.recv().await {
            if let OperationEvent::Finished(summary) = event {
                return summary;
            }
        }
        self.summary().unwrap_or_default()
    }
}

// ============================================================================
// Executor
// ============================================================================

/// The only component that mutates the filesystem
pub struct FileOperationExecutor {
    mapper: MediaItemMapper,
    probe: Arc<dyn FsProbe>,
    journal: Arc<Journal>,
    workers: Arc<Semaphore>,
    locks: Arc<PathLocks>,
}

impl FileOperationExecutor {
    pub fn new(
        mapper: MediaItemMapper,
        probe: Arc<dyn FsProbe>,
        journal: Journal,
        worker_count: usize,
    ) -> Self {
        Self {
            mapper,
            probe,
            journal: Arc::new(journal),
            workers: Arc::new(Semaphore::new(worker_count.max(1))),
            locks: Arc::new(PathLocks::default()),
        }
    }

    /// Validate, admit, journal and start a batch
    pub fn submit(
        &self,
        operations: Vec<FileOperation>,
        confirmation: Confirmation,
    ) -> std::result::Result<OperationHandle, OperationError> {
        let _span = span!(Level::INFO, "submit_batch", operations = operations.len()).entered();

        validate(&operations)?;

        let protected = self.protected_sources(&operations);
        let excluded: BTreeSet<PathBuf> = match (protected.is_empty(), confirmation) {
            (true, _) | (false, Confirmation::Include) => BTreeSet::new(),
            (false, Confirmation::Reject) => {
                warn!(count = protected.len(), "Rejecting batch with protected items");
                return Err(OperationError::ProtectedItems(protected));
            }
            (false, Confirmation::Exclude) => protected.into_iter().collect(),
        };

        let items = plan(&operations, &excluded)?;
        if items.is_empty() {
            return Err(OperationError::InvalidRequest(
                "no items left after excluding protected sources".to_string(),
            ));
        }

        self.admit(&items)?;

        let mut record = JobRecord::new(items);
        record.owner = Some(JobOwner::current());
        self.journal
            .save(&record)
            .map_err(|e| OperationError::Journal(e.to_string()))?;

        Ok(self.start(record))
    }

    /// Read the durable record of a batch
    pub fn status(&self, job_id: Uuid) -> Result<JobRecord> {
        self.journal.load(job_id)
    }

    /// Every journaled batch, oldest first
    pub fn jobs(&self) -> Result<Vec<JobRecord>> {
        self.journal.list()
    }

    /// Restart the non-terminal items of interrupted batches
    pub fn resume_pending(&self) -> Result<Vec<OperationHandle>> {
        let mut handles = Vec::new();
        let now = Utc::now();
        for mut record in self.journal.list()? {
            if record.is_finished() {
                continue;
            }
            if record.is_owned_at(now) {
                debug!(job = %record.id, owner = ?record.owner, "Batch owned by a live process");
                continue;
            }

            for item in record.items.iter_mut() {
                if !item.state.is_terminal() {
                    item.state = ItemState::Queued;
                }
            }
            let pending: Vec<OperationItem> = record.pending_items().cloned().collect();
            if let Err(e) = self.admit(&pending) {
                warn!(job = %record.id, error = %e, "Interrupted batch no longer admissible");
                continue;
            }

            record.owner = Some(JobOwner::current());
            self.journal.save(&record)?;
            info!(job = %record.id, items = pending.len(), "Resuming interrupted batch");
            handles.push(self.start(record));
        }
        Ok(handles)
    }

    /// Delete the records of finished batches
    pub fn prune_finished(&self) -> Result<usize> {
        let mut removed = 0;
        for record in self.journal.list()? {
            if record.is_finished() {
                self.journal.remove(record.id)?;
                removed += 1;
            }
        }
        info!(removed, "Pruned finished job records");
        Ok(removed)
    }

    fn protected_sources(&self, operations: &[FileOperation]) -> Vec<PathBuf> {
        let protected: BTreeSet<PathBuf> = operations
            .iter()
            .flat_map(|op| op.sources.iter())
            .filter(|source| self.probe.is_dir(source) && self.mapper.is_volume(source))
            .cloned()
            .collect();
        protected.into_iter().collect()
    }

    fn admit(&self, items: &[OperationItem]) -> std::result::Result<(), OperationError> {
        let dirs: BTreeSet<PathBuf> = items.iter().flat_map(|i| i.written_dirs()).collect();
        let denied: Vec<PathBuf> = dirs
            .into_iter()
            .filter(|dir| !self.probe.is_writable_or_creatable(dir))
            .collect();

        if denied.is_empty() {
            Ok(())
        } else {
            warn!(?denied, "Rejecting batch without write access");
            Err(OperationError::PermissionDenied(denied))
        }
    }

    fn start(&self, record: JobRecord) -> OperationHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let job_id = record.id;
        let ids: Vec<usize> = record.pending_items().map(|i| i.id).collect();

        let job = Arc::new(Job {
            id: job_id,
            journal: Arc::clone(&self.journal),
            cancel: CancelToken::new(),
            state: Mutex::new(JobState {
                record,
                finished: None,
            }),
            conflicts: Mutex::new(Conflicts::default()),
            events: tx,
            dirty: watch::Sender::new(()),
        });

        info!(job = %job_id, items = ids.len(), "Batch started");
        tokio::spawn(persist_job(Arc::clone(&job), job.dirty.subscribe()));
        for id in ids {
            tokio::spawn(run_item(
                Arc::clone(&job),
                Arc::clone(&self.workers),
                Arc::clone(&self.locks),
                id,
            ));
        }

        OperationHandle {
            job_id,
            events: rx,
            job,
        }
    }
}

fn validate(operations: &[FileOperation]) -> std::result::Result<(), OperationError> {
    if operations.is_empty() {
        return Err(OperationError::InvalidRequest("empty batch".to_string()));
    }

    for op in operations {
        if op.sources.is_empty() {
            return Err(OperationError::InvalidRequest(format!(
                "{} without sources",
                op.kind
            )));
        }
        match op.kind {
            OperationKind::Rename if op.sources.len() != 1 => {
                return Err(OperationError::InvalidRequest(
                    "rename takes exactly one source".to_string(),
                ));
            }
            OperationKind::Copy | OperationKind::Move | OperationKind::Rename
                if op.destination.is_none() =>
            {
                return Err(OperationError::InvalidRequest(format!(
                    "{} without destination",
                    op.kind
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Expand operations into items, skipping excluded sources
fn plan(
    operations: &[FileOperation],
    excluded: &BTreeSet<PathBuf>,
) -> std::result::Result<Vec<OperationItem>, OperationError> {
    let mut items = Vec::new();
    for op in operations {
        for source in op.sources.iter().filter(|s| !excluded.contains(*s)) {
            let target = target_for(op, source)?;
            if let Some(target) = &target
                && target != source
                && target.starts_with(source)
            {
                return Err(OperationError::InvalidRequest(format!(
                    "cannot {} {} into itself",
                    op.kind,
                    source.display()
                )));
            }
            items.push(OperationItem {
                id: items.len(),
                kind: op.kind,
                source: source.clone(),
                target,
                resolution: op.resolution,
                state: ItemState::Queued,
            });
        }
    }
    Ok(items)
}

fn target_for(
    op: &FileOperation,
    source: &Path,
) -> std::result::Result<Option<PathBuf>, OperationError> {
    let Some(destination) = &op.destination else {
        return Ok(None);
    };

    match op.kind {
        OperationKind::Delete => Ok(None),
        OperationKind::Copy | OperationKind::Move => {
            let name = source.file_name().ok_or_else(|| {
                OperationError::InvalidRequest(format!("{} has no file name", source.display()))
            })?;
            Ok(Some(destination.join(name)))
        }
        OperationKind::Rename => {
            // A bare name stays next to the source
            let is_bare_name = destination
                .parent()
                .is_none_or(|parent| parent.as_os_str().is_empty());
            if is_bare_name {
                let parent = source.parent().unwrap_or_else(|| Path::new(""));
                Ok(Some(parent.join(destination)))
            } else {
                Ok(Some(destination.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, StorageRoot};
    use crate::media::StorageClass;
    use crate::media::mapper::tests::FakeProbe;
    use crate::os::RealFs;
    use std::fs;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    fn executor_with(
        settings: &Settings,
        probe: Arc<dyn FsProbe>,
        jobs: &Path,
    ) -> FileOperationExecutor {
        let mapper = MediaItemMapper::new(settings, Arc::clone(&probe));
        FileOperationExecutor::new(mapper, probe, Journal::new(jobs), 2)
    }

    fn real_executor(dir: &TempDir) -> FileOperationExecutor {
        executor_with(&Settings::default(), Arc::new(RealFs), &dir.path().join("jobs"))
    }

    fn write(path: &Path, content: &[u8]) -> PathBuf {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        path.to_path_buf()
    }

    async fn next(handle: &mut OperationHandle) -> OperationEvent {
        tokio::time::timeout(Duration::from_secs(5), handle.next_event())
            .await
            .expect("no event in time")
            .expect("event stream closed")
    }

    #[tokio::test]
    async fn test_conflict_does_not_block_other_items() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        let a = write(&src.join("a.jpg"), b"a");
        let b = write(&src.join("b.jpg"), b"b");
        let c = write(&src.join("c.jpg"), b"c");
        write(&dest.join("c.jpg"), b"old");

        let executor = real_executor(&dir);
        let mut handle = executor
            .submit(vec![FileOperation::copy(vec![a, b, c], &dest)], Confirmation::Reject)
            .unwrap();

        let mut succeeded = 0;
        let mut conflicted = None;
        while succeeded < 2 || conflicted.is_none() {
            match next(&mut handle).await {
                OperationEvent::ItemUpdate {
                    item,
                    state: ItemState::Succeeded { .. },
                    ..
                } => {
                    assert_ne!(item, 2);
                    succeeded += 1;
                }
                OperationEvent::ItemUpdate {
                    item,
                    state: ItemState::Conflict { destination },
                    ..
                } => {
                    assert_eq!(destination, dest.join("c.jpg"));
                    conflicted = Some(item);
                }
                OperationEvent::Finished(_) => panic!("batch finished with a pending conflict"),
                _ => {}
            }
        }

        assert_eq!(conflicted, Some(2));
        assert!(matches!(handle.item_state(2), Some(ItemState::Conflict { .. })));
        assert!(handle.summary().is_none());
        assert_eq!(fs::read(dest.join("c.jpg")).unwrap(), b"old");

        assert!(handle.resolve(2, ConflictResolution::KeepBoth, false));
        let summary = handle.wait().await;
        assert_eq!(summary.succeeded, 3);
        assert_eq!(fs::read(dest.join("c_1.jpg")).unwrap(), b"c");
    }

    #[tokio::test]
    async fn test_stop_abandons_pending_conflict() {
        let dir = tempdir().unwrap();
        let source = write(&dir.path().join("a.jpg"), b"new");
        write(&dir.path().join("b.jpg"), b"old");

        let executor = real_executor(&dir);
        let mut handle = executor
            .submit(
                vec![FileOperation::rename(&source, "b.jpg")],
                Confirmation::Reject,
            )
            .unwrap();

        loop {
            if let OperationEvent::ItemUpdate {
                state: ItemState::Conflict { .. },
                ..
            } = next(&mut handle).await
            {
                break;
            }
        }
        handle.stop();

        let job_id = handle.job_id();
        let summary = handle.wait().await;
        assert_eq!(summary.failed, 1);

        let record = executor.status(job_id).unwrap();
        assert_eq!(
            record.items[0].state,
            ItemState::Failed {
                failure: ItemFailure::Unresolved(dir.path().join("b.jpg"))
            }
        );
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_stop_before_start_cancels_queued_items() {
        let dir = tempdir().unwrap();
        let a = write(&dir.path().join("a.jpg"), b"a");
        let b = write(&dir.path().join("b.jpg"), b"b");

        let executor = real_executor(&dir);
        let handle = executor
            .submit(vec![FileOperation::delete(vec![a.clone(), b.clone()])], Confirmation::Reject)
            .unwrap();
        // Item tasks have not been polled yet on this single-threaded runtime
        handle.stop();

        let summary = handle.wait().await;
        assert_eq!(summary.cancelled, 2);
        assert!(a.exists() && b.exists());
    }

    #[tokio::test]
    async fn test_protected_items_require_confirmation() {
        let dir = tempdir().unwrap();
        let volume = dir.path().join("volume");
        let photo = write(&volume.join("a.jpg"), b"a");
        let settings = Settings {
            storage_roots: vec![StorageRoot {
                path: volume.clone(),
                class: StorageClass::Pluggable,
            }],
            ..Settings::default()
        };
        let executor = executor_with(&settings, Arc::new(RealFs), &dir.path().join("jobs"));

        let result = executor.submit(
            vec![FileOperation::delete(vec![volume.clone(), photo.clone()])],
            Confirmation::Reject,
        );
        assert_eq!(
            result.err(),
            Some(OperationError::ProtectedItems(vec![volume.clone()]))
        );
        assert!(photo.exists());
        assert!(executor.jobs().unwrap().is_empty());

        let handle = executor
            .submit(
                vec![FileOperation::delete(vec![volume.clone(), photo.clone()])],
                Confirmation::Exclude,
            )
            .unwrap();
        let summary = handle.wait().await;
        assert_eq!(summary.succeeded, 1);
        assert!(volume.exists());
        assert!(!photo.exists());
    }

    #[tokio::test]
    async fn test_admission_rejects_whole_batch() {
        let probe = Arc::new(FakeProbe::default());
        probe.existing.lock().unwrap().extend([
            PathBuf::from("/"),
            PathBuf::from("/pics"),
            PathBuf::from("/locked"),
        ]);
        probe
            .read_only
            .lock()
            .unwrap()
            .insert(PathBuf::from("/locked"));
        let dir = tempdir().unwrap();
        let executor = executor_with(&Settings::default(), probe, &dir.path().join("jobs"));

        let result = executor.submit(
            vec![
                FileOperation::copy(vec![PathBuf::from("/pics/a.jpg")], "/pics/copies"),
                FileOperation::move_to(vec![PathBuf::from("/pics/b.jpg")], "/locked/new"),
            ],
            Confirmation::Reject,
        );

        assert_eq!(
            result.err(),
            Some(OperationError::PermissionDenied(vec![PathBuf::from("/locked/new")]))
        );
        assert!(executor.jobs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let dir = tempdir().unwrap();
        let executor = real_executor(&dir);

        let no_dest = FileOperation {
            kind: OperationKind::Copy,
            sources: vec![dir.path().join("a.jpg")],
            destination: None,
            resolution: None,
        };
        assert!(matches!(
            executor.submit(vec![no_dest], Confirmation::Reject),
            Err(OperationError::InvalidRequest(_))
        ));

        let into_itself =
            FileOperation::move_to(vec![dir.path().join("album")], dir.path().join("album/sub"));
        assert!(matches!(
            executor.submit(vec![into_itself], Confirmation::Reject),
            Err(OperationError::InvalidRequest(_))
        ));

        assert!(matches!(
            executor.submit(vec![], Confirmation::Reject),
            Err(OperationError::InvalidRequest(_))
        ));

        let trip = write(&dir.path().join("Trip").join("a.jpg"), b"a")
            .parent()
            .unwrap()
            .to_path_buf();
        let into_subtree = FileOperation::rename(&trip, trip.join("sub").join("Trip"));
        assert!(matches!(
            executor.submit(vec![into_subtree], Confirmation::Reject),
            Err(OperationError::InvalidRequest(_))
        ));
        assert!(!trip.join("sub").exists());
        assert!(executor.jobs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keep_both_copy_into_own_album() {
        let dir = tempdir().unwrap();
        let album = dir.path().join("album");
        let photo = write(&album.join("a.jpg"), b"a");

        let executor = real_executor(&dir);
        let handle = executor
            .submit(
                vec![
                    FileOperation::copy(vec![photo.clone()], &album)
                        .with_resolution(ConflictResolution::KeepBoth),
                ],
                Confirmation::Reject,
            )
            .unwrap();
        let summary = handle.wait().await;

        assert_eq!(summary.succeeded, 1);
        assert_eq!(fs::read(album.join("a_1.jpg")).unwrap(), b"a");
        assert_eq!(fs::read(&photo).unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_nested_paths_are_serialized() {
        let locks = Arc::new(PathLocks::default());
        let album = locks.lock_all(vec![PathBuf::from("/pics/Trip")]).await;

        let unrelated = tokio::time::timeout(
            Duration::from_millis(50),
            locks.lock_all(vec![PathBuf::from("/pics/Other")]),
        )
        .await;
        assert!(unrelated.is_ok());

        let inner = Arc::clone(&locks);
        let mut nested = tokio::spawn(async move {
            inner
                .lock_all(vec![PathBuf::from("/b/x.jpg"), PathBuf::from("/pics/Trip/x.jpg")])
                .await;
        });
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut nested)
                .await
                .is_err()
        );

        drop(album);
        tokio::time::timeout(Duration::from_secs(5), nested)
            .await
            .expect("nested claim never acquired")
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_source_fails_item_only() {
        let dir = tempdir().unwrap();
        let present = write(&dir.path().join("a.jpg"), b"a");
        let missing = dir.path().join("gone.jpg");
        let dest = dir.path().join("out");

        let executor = real_executor(&dir);
        let handle = executor
            .submit(
                vec![FileOperation::move_to(vec![present, missing.clone()], &dest)],
                Confirmation::Reject,
            )
            .unwrap();
        let job_id = handle.job_id();
        let summary = handle.wait().await;

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        // Finished is only announced once the final record is on disk
        let record = executor.status(job_id).unwrap();
        assert!(record.is_finished());
        assert_eq!(record.owner, None);
        assert_eq!(
            record.items[1].state,
            ItemState::Failed {
                failure: ItemFailure::NotFound(missing)
            }
        );
        assert!(dest.join("a.jpg").exists());
    }

    #[tokio::test]
    async fn test_resume_and_prune() {
        let dir = tempdir().unwrap();
        let a = write(&dir.path().join("a.jpg"), b"a");
        let b = write(&dir.path().join("b.jpg"), b"b");
        let journal = Journal::new(dir.path().join("jobs"));

        // An interrupted batch: one item done, one left running
        let mut record = JobRecord::new(vec![
            OperationItem {
                id: 0,
                kind: OperationKind::Delete,
                source: a.clone(),
                target: None,
                resolution: None,
                state: ItemState::Succeeded { destination: None },
            },
            OperationItem {
                id: 1,
                kind: OperationKind::Delete,
                source: b.clone(),
                target: None,
                resolution: None,
                state: ItemState::Running,
            },
        ]);
        record.updated_at = Utc::now();
        record.owner = Some(JobOwner {
            pid: 0,
            heartbeat: Utc::now() - chrono::TimeDelta::minutes(5),
        });
        journal.save(&record).unwrap();

        // A batch another live process is still running
        let c = write(&dir.path().join("c.jpg"), b"c");
        let mut live = JobRecord::new(vec![OperationItem {
            id: 0,
            kind: OperationKind::Delete,
            source: c.clone(),
            target: None,
            resolution: None,
            state: ItemState::Running,
        }]);
        live.owner = Some(JobOwner {
            pid: 0,
            heartbeat: Utc::now(),
        });
        journal.save(&live).unwrap();

        let executor = real_executor(&dir);
        let handles = executor.resume_pending().unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].job_id(), record.id);

        let summary = handles.into_iter().next().unwrap().wait().await;
        assert_eq!(summary.succeeded, 2);
        assert!(a.exists());
        assert!(!b.exists());

        assert!(c.exists());

        assert_eq!(executor.prune_finished().unwrap(), 1);
        let remaining = executor.jobs().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, live.id);
    }

    #[test]
    fn test_rename_target_for_bare_name() {
        let op = FileOperation::rename("/pics/a.jpg", "b.jpg");
        assert_eq!(
            target_for(&op, Path::new("/pics/a.jpg")).unwrap(),
            Some(PathBuf::from("/pics/b.jpg"))
        );

        let op = FileOperation::rename("/pics/a.jpg", "/other/b.jpg");
        assert_eq!(
            target_for(&op, Path::new("/pics/a.jpg")).unwrap(),
            Some(PathBuf::from("/other/b.jpg"))
        );
    }
}
