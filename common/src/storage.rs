//! Small JSON maps persisted between runs.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::ErrorKind as IoErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Classify, ErrorKind};

#[derive(thiserror::Error, Debug)]
/// Errors that can arise while reading or writing persisted state.
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("serde error on {path}: {source}")]
    Serde { path: PathBuf, source: serde_json::Error },
}

impl Classify for StorageError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Transient
    }
}

/// A `BTreeMap` stored as one JSON object, always rewritten whole. Clones share one
/// write lock, so saves through them never interleave.
#[derive(Debug, Clone)]
pub struct JsonMapStore<K, V> {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
    _entry: PhantomData<(K, V)>,
}

impl<K, V> JsonMapStore<K, V>
where
    K: Ord + Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Arc::new(Mutex::new(())), _entry: PhantomData }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the map; a missing file is an empty map.
    pub async fn load(&self) -> Result<BTreeMap<K, V>, StorageError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(StorageError::Io { path: self.path.clone(), source }),
        };
        serde_json::from_slice(&content)
            .map_err(|source| StorageError::Serde { path: self.path.clone(), source })
    }

    /// Writes to a sibling temp file and renames it over the target.
    pub async fn save(&self, map: &BTreeMap<K, V>) -> Result<(), StorageError> {
        let io_err = |source: std::io::Error| StorageError::Io { path: self.path.clone(), source };
        let content = serde_json::to_vec_pretty(map)
            .map_err(|source| StorageError::Serde { path: self.path.clone(), source })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let _guard = self.write_lock.lock().await;
        tokio::fs::write(&tmp, content).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        debug!(path = %self.path.display(), entries = map.len(), "state saved");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn should_round_trip_numeric_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonMapStore::<u64, u64>::new(dir.path().join("state/attested.json"));
        assert!(store.load().await.unwrap().is_empty());

        let mut map = BTreeMap::new();
        map.insert(1, 1000);
        map.insert(122, 2000);
        store.save(&map).await.unwrap();
        assert_eq!(store.load().await.unwrap(), map);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"122\""));
        assert!(!dir.path().join("state/attested.json.tmp").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonMapStore::<u64, u64>::new(dir.path().join("attested.json"));
        for round in 0..100u64 {
            let saves: Vec<_> = (0..4u64)
                .map(|chain| {
                    let store = store.clone();
                    tokio::spawn(async move {
                        store.save(&BTreeMap::from([(chain, round)])).await
                    })
                })
                .collect();
            for save in saves {
                save.await.unwrap().unwrap();
            }
            assert_eq!(store.load().await.unwrap().len(), 1);
        }
        assert!(!dir.path().join("attested.json.tmp").exists());
    }

    #[tokio::test]
    async fn should_report_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cursor.json");
        std::fs::write(&path, "not json").unwrap();
        let store = JsonMapStore::<String, u64>::new(path);
        assert!(matches!(store.load().await, Err(StorageError::Serde { .. })));
    }
}
