//! Per-folder serialization.
//!
//! Two tasks whose archives land in the same category folder must not run
//! image reconciliation, duplicate resolution or the summary recompute for
//! that folder at the same time. [`FolderLocks`] hands out one async mutex
//! per folder path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default, Clone)]
pub struct FolderLocks {
    locks: Arc<std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl FolderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `folder`.
    ///
    /// The registry lock is held only while looking up the folder's mutex,
    /// never across the wait.
    pub async fn lock(&self, folder: &Path) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(folder.to_path_buf()).or_default())
        };

        mutex.lock_owned().await
    }

    /// Number of folders seen so far.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
