//! The persistent-store capability behind disk-backed caches.
//!
//! The cache talks to disk through the small [`DiskStore`] contract: `put`,
//! `get`, `remove`, `iterate`, `commit`. [`NullStore`] is the memory-only
//! implementation, so cache code never branches on "is there a disk?".
//! [`JsonFileStore`] is the shipped durable implementation; the byte layout
//! of other backends is deliberately out of scope.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Non-fatal disk failure. Callers log it and fall back to memory.
#[derive(Debug, Error, Diagnostic)]
#[error("cache store failure: {message}")]
#[diagnostic(code(pathguard::cache::io))]
pub struct CacheIoError {
    pub message: String,
}

impl CacheIoError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CacheIoError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for CacheIoError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Key/value persistence consumed by a cache.
///
/// Writes become durable at `commit`; a crash between `put` and `commit`
/// may lose the write, which is acceptable because memory stays the
/// authority.
pub trait DiskStore<K, V>: Send {
    /// Whether this store actually persists anything.
    fn is_persistent(&self) -> bool;

    fn put(&mut self, key: &K, value: &V) -> Result<(), CacheIoError>;

    fn get(&self, key: &K) -> Result<Option<V>, CacheIoError>;

    fn remove(&mut self, key: &K) -> Result<Option<V>, CacheIoError>;

    fn iterate(&self) -> Result<Vec<(K, V)>, CacheIoError>;

    fn commit(&mut self) -> Result<(), CacheIoError>;

    fn clear(&mut self) -> Result<(), CacheIoError>;

    fn len(&self) -> Result<usize, CacheIoError> {
        Ok(self.iterate()?.len())
    }

    fn contains(&self, key: &K) -> Result<bool, CacheIoError> {
        Ok(self.get(key)?.is_some())
    }
}

/// The no-op store backing memory-only caches.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStore;

impl<K, V> DiskStore<K, V> for NullStore {
    fn is_persistent(&self) -> bool {
        false
    }

    fn put(&mut self, _key: &K, _value: &V) -> Result<(), CacheIoError> {
        Ok(())
    }

    fn get(&self, _key: &K) -> Result<Option<V>, CacheIoError> {
        Ok(None)
    }

    fn remove(&mut self, _key: &K) -> Result<Option<V>, CacheIoError> {
        Ok(None)
    }

    fn iterate(&self) -> Result<Vec<(K, V)>, CacheIoError> {
        Ok(Vec::new())
    }

    fn commit(&mut self) -> Result<(), CacheIoError> {
        Ok(())
    }

    fn clear(&mut self) -> Result<(), CacheIoError> {
        Ok(())
    }

    fn len(&self) -> Result<usize, CacheIoError> {
        Ok(0)
    }

    fn contains(&self, _key: &K) -> Result<bool, CacheIoError> {
        Ok(false)
    }
}

/// Durable store keeping the whole table in memory and snapshotting it to a
/// JSON file on `commit`. One file per cache name.
pub struct JsonFileStore<K, V> {
    path: PathBuf,
    entries: FxHashMap<K, V>,
    dirty: bool,
}

impl<K, V> JsonFileStore<K, V>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Open (or create) the store file for `name` under `dir`.
    pub fn open(dir: &Path, name: &str) -> Result<Self, CacheIoError> {
        fs::create_dir_all(dir)?;
        let path = crate::config::store_file(dir, name);
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let pairs: Vec<(K, V)> = serde_json::from_str(&raw)?;
            pairs.into_iter().collect()
        } else {
            FxHashMap::default()
        };
        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    fn persist(&self) -> Result<(), CacheIoError> {
        let pairs: Vec<(&K, &V)> = self.entries.iter().collect();
        let raw = serde_json::to_string(&pairs)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl<K, V> DiskStore<K, V> for JsonFileStore<K, V>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned + Send,
    V: Clone + Serialize + DeserializeOwned + Send,
{
    fn is_persistent(&self) -> bool {
        true
    }

    fn put(&mut self, key: &K, value: &V) -> Result<(), CacheIoError> {
        self.entries.insert(key.clone(), value.clone());
        self.dirty = true;
        Ok(())
    }

    fn get(&self, key: &K) -> Result<Option<V>, CacheIoError> {
        Ok(self.entries.get(key).cloned())
    }

    fn remove(&mut self, key: &K) -> Result<Option<V>, CacheIoError> {
        let prior = self.entries.remove(key);
        if prior.is_some() {
            self.dirty = true;
        }
        Ok(prior)
    }

    fn iterate(&self) -> Result<Vec<(K, V)>, CacheIoError> {
        Ok(self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn commit(&mut self) -> Result<(), CacheIoError> {
        if self.dirty {
            self.persist()?;
            self.dirty = false;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), CacheIoError> {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.dirty = true;
        }
        Ok(())
    }

    fn len(&self) -> Result<usize, CacheIoError> {
        Ok(self.entries.len())
    }

    fn contains(&self, key: &K) -> Result<bool, CacheIoError> {
        Ok(self.entries.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_commit_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut store: JsonFileStore<String, u32> =
            JsonFileStore::open(dir.path(), "trip").unwrap();
        store.put(&"a".to_owned(), &1).unwrap();
        store.put(&"b".to_owned(), &2).unwrap();
        store.commit().unwrap();

        let reopened: JsonFileStore<String, u32> =
            JsonFileStore::open(dir.path(), "trip").unwrap();
        assert_eq!(reopened.get(&"a".to_owned()).unwrap(), Some(1));
        assert_eq!(reopened.len().unwrap(), 2);
    }

    #[test]
    fn uncommitted_writes_are_not_durable() {
        let dir = tempfile::tempdir().unwrap();
        let mut store: JsonFileStore<String, u32> =
            JsonFileStore::open(dir.path(), "volatile").unwrap();
        store.put(&"a".to_owned(), &1).unwrap();
        drop(store);

        let reopened: JsonFileStore<String, u32> =
            JsonFileStore::open(dir.path(), "volatile").unwrap();
        assert_eq!(reopened.len().unwrap(), 0);
    }

    #[test]
    fn remove_and_clear_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let mut store: JsonFileStore<String, u32> =
            JsonFileStore::open(dir.path(), "rm").unwrap();
        store.put(&"a".to_owned(), &1).unwrap();
        assert_eq!(store.remove(&"a".to_owned()).unwrap(), Some(1));
        store.put(&"b".to_owned(), &2).unwrap();
        store.clear().unwrap();
        store.commit().unwrap();

        let reopened: JsonFileStore<String, u32> =
            JsonFileStore::open(dir.path(), "rm").unwrap();
        assert_eq!(reopened.len().unwrap(), 0);
    }
}
