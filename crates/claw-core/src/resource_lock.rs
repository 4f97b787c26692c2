//! Per-path serialization of read-modify-write mutations.
//!
//! Several branches of a run may finish at the same time and append to the
//! same PRD document. `PathLocks` hands out one fair async mutex per path:
//! mutations on a path run one at a time in the order they queued, while
//! different paths never wait on each other.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

type PathMutex = Arc<tokio::sync::Mutex<()>>;

#[derive(Clone, Default)]
pub struct PathLocks {
    locks: Arc<Mutex<HashMap<PathBuf, PathMutex>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `mutation` while holding the lock for `path`.
    pub async fn with_lock<F, Fut, T>(&self, path: impl AsRef<Path>, mutation: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let path = path.as_ref().to_path_buf();
        let entry = self.acquire_entry(&path);

        let result = {
            // tokio's Mutex grants the lock in FIFO order.
            let _guard = entry.lock().await;
            mutation().await
        };

        self.release_entry(&path, entry);
        result
    }

    /// Number of paths currently tracked (held or awaited).
    pub fn active_paths(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    fn acquire_entry(&self, path: &Path) -> PathMutex {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn release_entry(&self, path: &Path, entry: PathMutex) {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // The map and this caller are the last two holders: nobody is queued.
        if Arc::strong_count(&entry) == 2 {
            locks.remove(path);
        }
    }
}
