//! Persistent view preferences with replay-latest subscriptions.
//!
//! The store owns a single [`Preferences`] value. Subscribers get the current value on
//! subscription and every later one. Writes go to disk first (temp file + rename) and are
//! published only once persisted.

use crate::config::Preferences;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    tx: watch::Sender<Preferences>,
    write_lock: Mutex<()>,
}

impl PreferencesStore {
    /// Open the store backed by `path`; missing or malformed documents yield defaults
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initial = load(&path);
        let (tx, _rx) = watch::channel(initial);
        Self {
            path,
            tx,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value
    pub fn get(&self) -> Preferences {
        self.tx.borrow().clone()
    }

    /// Receiver that sees the current value immediately and every later change
    pub fn subscribe(&self) -> watch::Receiver<Preferences> {
        self.tx.subscribe()
    }

    /// Persist and publish a whole new value
    pub fn replace(&self, prefs: Preferences) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        persist(&self.path, &prefs)?;
        self.tx.send_replace(prefs);
        Ok(())
    }

    /// Modify the current value in place, persist it and publish it
    pub fn update<F>(&self, f: F) -> Result<Preferences>
    where
        F: FnOnce(&mut Preferences),
    {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut prefs = self.tx.borrow().clone();
        f(&mut prefs);
        persist(&self.path, &prefs)?;
        self.tx.send_replace(prefs.clone());
        Ok(prefs)
    }

    /// Restore defaults
    pub fn reset(&self) -> Result<()> {
        self.replace(Preferences::default())
    }
}

fn load(path: &Path) -> Preferences {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(?path, "No preferences file, using defaults");
            return Preferences::default();
        }
        Err(e) => {
            warn!(?path, error = %e, "Failed to read preferences, using defaults");
            return Preferences::default();
        }
    };

    match Preferences::from_toml(&content) {
        Ok(prefs) => prefs,
        Err(e) => {
            warn!(?path, error = %e, "Malformed preferences, using defaults");
            Preferences::default()
        }
    }
}

fn persist(path: &Path, prefs: &Preferences) -> Result<()> {
    let content = prefs
        .to_toml()
        .map_err(|e| Error::Config(format!("Failed to serialize preferences: {}", e)))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Write to a temporary file first, then rename for atomicity
    let temp_path = path.with_extension("toml.tmp");
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;

    info!(?path, "Preferences saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlaceOnTop, SortOrder, ViewMode};
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let store = PreferencesStore::open(dir.path().join("preferences.toml"));
        assert_eq!(store.get(), Preferences::default());
    }

    #[test]
    fn test_malformed_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        fs::write(&path, "mode = [not valid").unwrap();

        let store = PreferencesStore::open(&path);
        assert_eq!(store.get(), Preferences::default());
    }

    #[test]
    fn test_round_trip_through_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.toml");

        let mut prefs = Preferences {
            mode: ViewMode::Plain,
            sort_order: SortOrder::ModificationDate,
            descend_sorting: true,
            place_on_top: PlaceOnTop::FilesOnTop,
            ..Preferences::default()
        };
        prefs.columns.portrait = 4;
        prefs.columns.landscape = 7;
        prefs.filters.hidden = true;
        prefs.filters.gifs = false;

        let store = PreferencesStore::open(&path);
        store.replace(prefs.clone()).unwrap();

        let reopened = PreferencesStore::open(&path);
        assert_eq!(reopened.get(), prefs);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_subscribers_replay_latest() {
        let dir = tempdir().unwrap();
        let store = PreferencesStore::open(dir.path().join("preferences.toml"));

        store
            .update(|p| p.sort_order = SortOrder::Size)
            .unwrap();

        // A late subscriber still sees the latest value
        let rx = store.subscribe();
        assert_eq!(rx.borrow().sort_order, SortOrder::Size);

        let mut rx = store.subscribe();
        store.update(|p| p.descend_sorting = true).unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().descend_sorting);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preferences.toml");
        let store = PreferencesStore::open(&path);
        store.update(|p| p.mode = ViewMode::Plain).unwrap();

        store.reset().unwrap();
        assert_eq!(PreferencesStore::open(&path).get(), Preferences::default());
    }
}
