use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use blockrelay_common::storage::{JsonMapStore, StorageError};

/// Last processed source block per bridge direction, written through to disk.
pub struct CursorStore {
    store: JsonMapStore<String, u64>,
    cursors: Mutex<BTreeMap<String, u64>>,
}

impl CursorStore {
    pub async fn open(store: JsonMapStore<String, u64>) -> Result<Self, StorageError> {
        let cursors = store.load().await?;
        debug!(path = ?store.path(), cursors = cursors.len(), "cursors loaded");
        Ok(Self { store, cursors: Mutex::new(cursors) })
    }

    pub async fn get(&self, key: &str) -> Option<u64> {
        self.cursors.lock().await.get(key).copied()
    }

    /// Moves `key` forward to `block` and saves the whole map. Returns false when the
    /// cursor is already there or beyond; a lower value is never stored.
    pub async fn advance(&self, key: &str, block: u64) -> Result<bool, StorageError> {
        let mut cursors = self.cursors.lock().await;
        match cursors.get(key) {
            Some(current) if block < *current => {
                warn!(key, current, block, "refusing to move cursor backwards");
                return Ok(false);
            },
            Some(current) if block == *current => return Ok(false),
            _ => {},
        }
        let previous = cursors.insert(key.to_string(), block);
        if let Err(e) = self.store.save(&cursors).await {
            match previous {
                Some(previous) => cursors.insert(key.to_string(), previous),
                None => cursors.remove(key),
            };
            return Err(e);
        }
        Ok(true)
    }
}
