//! Durable set of favorite artist ids.
//!
//! The in-memory set is authoritative. A mutation updates it under the lock,
//! snapshots it, and hands the snapshot to a background save thread, so callers
//! never wait on disk. Saves are serialized and numbered; a snapshot older than
//! the last one written is discarded. Save failures are logged and swallowed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use log::{debug, warn};

use crate::error::FavoritesError;

/// Ordering state shared by background saves.
#[derive(Default)]
struct SaveQueue {
    /// Sequence number of the newest snapshot that was written (or attempted).
    written: Mutex<u64>,
    settled: Condvar,
}

struct CurrentSet {
    ids: BTreeSet<u32>,
    /// Sequence number of the latest mutation.
    sequence: u64,
}

pub struct FavoritesStore {
    path: PathBuf,
    current: Mutex<CurrentSet>,
    saves: Arc<SaveQueue>,
}

impl FavoritesStore {
    /// Loads `path`; a missing or corrupt file yields an empty set.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = match Self::read_ids(&path) {
            Ok(ids) => ids.into_iter().collect(),
            Err(FavoritesError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                debug!("No favorites file at {}; starting empty", path.display());
                BTreeSet::new()
            }
            Err(error) => {
                warn!("Ignoring unreadable favorites file: {error}");
                BTreeSet::new()
            }
        };
        Self {
            path,
            current: Mutex::new(CurrentSet { ids, sequence: 0 }),
            saves: Arc::new(SaveQueue::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_current(&self) -> MutexGuard<'_, CurrentSet> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_ids(path: &Path) -> Result<Vec<u32>, FavoritesError> {
        let content = std::fs::read_to_string(path).map_err(|source| FavoritesError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| FavoritesError::Format {
            path: path.display().to_string(),
            source,
        })
    }

    fn write_ids(path: &Path, ids: &BTreeSet<u32>) -> Result<(), FavoritesError> {
        let io_error = |source| FavoritesError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let list: Vec<u32> = ids.iter().copied().collect();
        let serialized = serde_json::to_string(&list).map_err(|source| FavoritesError::Format {
            path: path.display().to_string(),
            source,
        })?;
        std::fs::write(path, serialized).map_err(io_error)
    }

    /// Queues a save of the set as it stands after the caller's mutation.
    fn schedule_save(&self, current: &mut CurrentSet) {
        current.sequence += 1;
        let sequence = current.sequence;
        let snapshot = current.ids.clone();
        let path = self.path.clone();
        let saves = Arc::clone(&self.saves);
        thread::spawn(move || {
            let mut written = saves.written.lock().unwrap_or_else(PoisonError::into_inner);
            if *written < sequence {
                if let Err(error) = Self::write_ids(&path, &snapshot) {
                    warn!("Failed to save favorites: {error}");
                }
                *written = sequence;
            } else {
                debug!("Skipping superseded favorites save #{sequence}");
            }
            saves.settled.notify_all();
        });
    }

    /// Blocks until every save queued so far has been written or has failed.
    pub fn flush(&self) {
        let target = self.lock_current().sequence;
        let mut written = self
            .saves
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *written < target {
            written = self
                .saves
                .settled
                .wait(written)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn is_favorite(&self, artist_id: u32) -> bool {
        self.lock_current().ids.contains(&artist_id)
    }

    /// Flips membership and returns the new state.
    pub fn toggle(&self, artist_id: u32) -> bool {
        let mut current = self.lock_current();
        let now_favorite = if current.ids.remove(&artist_id) {
            false
        } else {
            current.ids.insert(artist_id);
            true
        };
        self.schedule_save(&mut current);
        now_favorite
    }

    /// Ids in ascending order.
    pub fn export_all(&self) -> Vec<u32> {
        self.lock_current().ids.iter().copied().collect()
    }

    /// Replaces the whole set.
    pub fn import_all(&self, artist_ids: &[u32]) {
        let mut current = self.lock_current();
        current.ids = artist_ids.iter().copied().collect();
        self.schedule_save(&mut current);
    }

    pub fn clear(&self) {
        self.import_all(&[]);
    }

    pub fn len(&self) -> usize {
        self.lock_current().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current set for bulk filtering.
    pub fn snapshot(&self) -> BTreeSet<u32> {
        self.lock_current().ids.clone()
    }

    /// Writes a backup file the user picked.
    pub fn export_to_file(&self, path: &Path) -> Result<(), FavoritesError> {
        let ids = self.snapshot();
        Self::write_ids(path, &ids)
    }

    /// Replaces the set with a backup file's content and returns the new size.
    pub fn import_from_file(&self, path: &Path) -> Result<usize, FavoritesError> {
        let imported = Self::read_ids(path)?;
        self.import_all(&imported);
        Ok(self.len())
    }
}
