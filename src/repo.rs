//! Reactive media repository
//!
//! [`MediaRepository`] turns (root, search, preferences) into a stream of
//! [`Resource<Vec<MediaItem>>`]. Every change of the query, of the preferences or a
//! [`MediaRepository::rescan`] request publishes [`Resource::Loading`], cancels the in-flight
//! computation and starts a new one. Only the latest request ever publishes its outcome.
//!
//! Aggregated records are kept per (root, view mode), so a change that only touches
//! filtering, sorting or the search string re-runs the engine without walking storage again.

use crate::cancel::CancelToken;
use crate::config::{Preferences, ViewMode};
use crate::engine;
use crate::error::{Error, Result};
use crate::media::{MediaIndex, MediaItem, MediaItemMapper, MediaRecord, aggregate};
use crate::os::FsProbe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Level, debug, info, span, warn};

/// State of an asynchronously computed value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource<T> {
    Loading,
    Success(T),
    /// Human-readable failure message
    Error(String),
}

impl<T> Resource<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading)
    }
}

/// Root directory and optional search string the repository is asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub root: PathBuf,
    pub search: Option<String>,
}

/// Synchronous scan, aggregate, map and engine pipeline
#[derive(Clone)]
pub struct Pipeline {
    index: Arc<dyn MediaIndex>,
    probe: Arc<dyn FsProbe>,
    mapper: MediaItemMapper,
}

impl Pipeline {
    pub fn new(
        index: Arc<dyn MediaIndex>,
        probe: Arc<dyn FsProbe>,
        mapper: MediaItemMapper,
    ) -> Self {
        Self {
            index,
            probe,
            mapper,
        }
    }

    pub fn probe(&self) -> &Arc<dyn FsProbe> {
        &self.probe
    }

    /// Scan `root` and aggregate it for `mode`
    pub fn records(
        &self,
        root: &Path,
        mode: ViewMode,
        cancel: &CancelToken,
    ) -> Result<Vec<MediaRecord>> {
        let files = self.index.scan_root(root, cancel)?;
        cancel.check()?;
        let records = aggregate(
            &files,
            root,
            mode,
            self.mapper.extensions(),
            self.probe.as_ref(),
        );
        cancel.check()?;
        Ok(records)
    }

    /// Map records and run them through the filter/sort engine
    pub fn present(
        &self,
        records: &[MediaRecord],
        prefs: &Preferences,
        search: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Vec<MediaItem>> {
        let items = self.mapper.map_all(records);
        cancel.check()?;
        Ok(engine::apply(items, prefs, search))
    }

    /// Run the whole pipeline once
    pub fn load_items(
        &self,
        root: &Path,
        prefs: &Preferences,
        search: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<Vec<MediaItem>> {
        let records = self.records(root, prefs.mode, cancel)?;
        self.present(&records, prefs, search, cancel)
    }
}

struct CachedRecords {
    root: PathBuf,
    mode: ViewMode,
    records: Arc<Vec<MediaRecord>>,
}

struct InFlight {
    generation: u64,
    cancel: CancelToken,
}

struct Shared {
    pipeline: Pipeline,
    output: watch::Sender<Resource<Vec<MediaItem>>>,
    current: Mutex<InFlight>,
    cache: Mutex<Option<CachedRecords>>,
}

impl Shared {
    fn new(pipeline: Pipeline) -> Self {
        let (output, _) = watch::channel(Resource::Loading);
        Self {
            pipeline,
            output,
            current: Mutex::new(InFlight {
                generation: 0,
                cancel: CancelToken::new(),
            }),
            cache: Mutex::new(None),
        }
    }

    fn cached(&self, root: &Path, mode: ViewMode) -> Option<Arc<Vec<MediaRecord>>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|c| c.root == root && c.mode == mode)
            .map(|c| Arc::clone(&c.records))
    }

    fn clear_cache(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn load(
        &self,
        query: &Query,
        prefs: &Preferences,
        generation: u64,
        cancel: &CancelToken,
    ) -> Result<Vec<MediaItem>> {
        let _span = span!(Level::INFO, "repository_load", root = ?query.root).entered();

        let records = match self.cached(&query.root, prefs.mode) {
            Some(records) => {
                debug!(count = records.len(), "Reusing aggregated records");
                records
            }
            None => {
                let records = Arc::new(self.pipeline.records(&query.root, prefs.mode, cancel)?);
                cancel.check()?;
                // A superseded load must not refill a cache a rescan just cleared
                let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
                if current.generation == generation {
                    *self.cache.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(CachedRecords {
                            root: query.root.clone(),
                            mode: prefs.mode,
                            records: Arc::clone(&records),
                        });
                }
                records
            }
        };

        self.pipeline
            .present(&records, prefs, query.search.as_deref(), cancel)
    }

    fn trigger(self: &Arc<Self>, query: Query, prefs: Preferences, rescan: bool) {
        let (generation, cancel) = {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            if rescan {
                self.clear_cache();
            }
            current.cancel.cancel();
            current.generation += 1;
            current.cancel = CancelToken::new();
            self.output.send_replace(Resource::Loading);
            (current.generation, current.cancel.clone())
        };
        debug!(generation, root = ?query.root, "Repository request started");

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let worker = Arc::clone(&shared);
            let result = tokio::task::spawn_blocking(move || {
                worker.load(&query, &prefs, generation, &cancel)
            })
            .await
            .unwrap_or_else(|e| Err(Error::from(e)));
            shared.publish(generation, result);
        });
    }

    fn publish(&self, generation: u64, result: Result<Vec<MediaItem>>) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.generation != generation {
            debug!(generation, latest = current.generation, "Dropping superseded result");
            return;
        }

        match result {
            Ok(items) => {
                info!(generation, count = items.len(), "Media items ready");
                self.output.send_replace(Resource::Success(items));
            }
            Err(e) if e.is_cancelled() => {
                debug!(generation, "Latest request was cancelled");
            }
            Err(e) => {
                warn!(generation, error = %e, "Failed to load media items");
                self.output.send_replace(Resource::Error(e.to_string()));
            }
        }
    }
}

/// Reactive front of the media pipeline
pub struct MediaRepository {
    shared: Arc<Shared>,
    query_tx: watch::Sender<Option<Query>>,
    rescan_tx: watch::Sender<u64>,
    driver: JoinHandle<()>,
}

impl MediaRepository {
    /// Start the repository driver on the current tokio runtime
    pub fn spawn(pipeline: Pipeline, prefs_rx: watch::Receiver<Preferences>) -> Self {
        let shared = Arc::new(Shared::new(pipeline));

        let (query_tx, query_rx) = watch::channel(None);
        let (rescan_tx, rescan_rx) = watch::channel(0);
        let driver = tokio::spawn(drive(Arc::clone(&shared), prefs_rx, query_rx, rescan_rx));

        Self {
            shared,
            query_tx,
            rescan_tx,
            driver,
        }
    }

    /// Replay-latest stream of results
    pub fn observe(&self) -> watch::Receiver<Resource<Vec<MediaItem>>> {
        self.shared.output.subscribe()
    }

    pub fn set_query(&self, root: impl Into<PathBuf>, search: Option<String>) {
        self.query_tx.send_replace(Some(Query {
            root: root.into(),
            search,
        }));
    }

    /// Drop cached records and walk storage again
    pub fn rescan(&self) {
        self.rescan_tx.send_modify(|n| *n += 1);
    }

    pub fn check_existence(&self, path: &Path) -> bool {
        self.shared.pipeline.probe().exists(path)
    }

    pub fn check_write_access(&self, path: &Path) -> bool {
        self.shared.pipeline.probe().is_writable(path)
    }
}

impl Drop for MediaRepository {
    fn drop(&mut self) {
        self.driver.abort();
        self.shared
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel
            .cancel();
    }
}

async fn drive(
    shared: Arc<Shared>,
    mut prefs_rx: watch::Receiver<Preferences>,
    mut query_rx: watch::Receiver<Option<Query>>,
    mut rescan_rx: watch::Receiver<u64>,
) {
    let mut prefs_open = true;
    loop {
        let mut rescan = false;
        tokio::select! {
            changed = prefs_rx.changed(), if prefs_open => {
                if changed.is_err() {
                    debug!("Preferences channel closed");
                    prefs_open = false;
                    continue;
                }
            }
            changed = query_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = rescan_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                rescan = true;
            }
        }

        let query = query_rx.borrow().clone();
        let Some(query) = query else {
            if rescan {
                shared.clear_cache();
            }
            continue;
        };
        let prefs = prefs_rx.borrow().clone();
        shared.trigger(query, prefs, rescan);
    }
    debug!("Repository driver stopped");
}
