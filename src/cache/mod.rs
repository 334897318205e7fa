//! Named concurrent caches with LRU bounding, expiration, soft-value
//! reclamation, optional disk persistence, listeners, and counters.
//!
//! A cache is either unbounded (a concurrent map) or LRU-bounded (an ordered
//! map behind a short-lived lock); the choice is made once at build time
//! from [`CacheSettings::memory_limit`]. Disk persistence sits behind the
//! [`DiskStore`] capability and is serialized on the cache's own monitor,
//! because the store itself is not concurrent.
//!
//! # Examples
//!
//! ```
//! use pathguard::cache::Cache;
//!
//! let cache: std::sync::Arc<Cache<String, u32>> = Cache::builder("demo")
//!     .max_in_memory(2)
//!     .build();
//!
//! cache.put("k1".into(), 1);
//! cache.put("k2".into(), 2);
//! cache.put("k3".into(), 3);
//! assert_eq!(cache.get(&"k1".into()), None); // evicted, least recently used
//! assert_eq!(cache.get(&"k3".into()), Some(3));
//! ```

pub mod line;
pub mod listener;
pub mod manager;
pub mod stats;
pub mod store;

pub use line::CacheLine;
pub use listener::CacheListener;
pub use manager::{CacheManager, ManagedCache};
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use store::{CacheIoError, DiskStore, JsonFileStore, NullStore};

use crate::config::{CacheSettings, EngineSettings};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

enum Backing<K, V> {
    Unbounded(DashMap<K, CacheLine<V>>),
    Bounded(Mutex<LruCache<K, CacheLine<V>>>),
}

enum Lookup<V> {
    Live(V),
    Expired,
    Reclaimed,
    Absent,
}

/// A named cache of `K -> V`.
///
/// `get`/`put`/`put_if_absent`/`remove` are linearizable per key; `len` and
/// `values` are best-effort snapshots. Values should be cheap to clone;
/// wrap heavyweight payloads in `Arc`.
pub struct Cache<K, V> {
    name: String,
    backing: Backing<K, V>,
    expires_after: Option<Duration>,
    soft: bool,
    persistent: bool,
    store: Mutex<Box<dyn DiskStore<K, V>>>,
    listeners: RwLock<Vec<Arc<dyn CacheListener<K, V>>>>,
    stats: CacheStats,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    /// Start building a cache with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> CacheBuilder<K, V> {
        CacheBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn add_listener(&self, listener: Arc<dyn CacheListener<K, V>>) {
        self.listeners.write().push(listener);
    }

    /// Look up `key`, counting exactly one outcome per call.
    ///
    /// An expired line reads as a miss and is discarded from memory and
    /// disk. A memory miss with a disk hit repopulates memory and counts
    /// as a hit; that includes a reclaimed soft line whose durable copy
    /// survives. A reclaimed line counts as a soft miss only when the
    /// read ultimately misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let soft_reclaimed = match self.memory_lookup(key) {
            Lookup::Live(value) => {
                self.stats.record_hit();
                return Some(value);
            }
            Lookup::Expired => {
                self.stats.record_miss_expired();
                self.discard_persisted(key);
                return None;
            }
            Lookup::Reclaimed => true,
            Lookup::Absent => false,
        };

        if self.persistent {
            let looked_up = self.store.lock().get(key);
            match looked_up {
                Ok(Some(value)) => {
                    let line = CacheLine::new(value.clone(), self.expires_after, self.soft);
                    let (_prior, evicted) = self.install_line(key.clone(), line);
                    if let Some((evicted_key, _)) = &evicted {
                        self.notify_removed(evicted_key);
                    }
                    self.stats.record_hit();
                    return Some(value);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(cache = %self.name, error = %err, "disk read failed; treating as miss");
                }
            }
        }

        if soft_reclaimed {
            self.stats.record_miss_soft_ref();
        } else {
            self.stats.record_miss_not_found();
        }
        None
    }

    /// Store `value` under `key`, returning the live value it replaced.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let line = CacheLine::new(value.clone(), self.expires_after, self.soft);
        let (prior, evicted) = self.install_line(key.clone(), line);
        self.persist(&key, &value);
        if let Some((evicted_key, _)) = &evicted {
            self.notify_removed(evicted_key);
        }
        let prior_value = prior.and_then(|line| {
            if line.is_expired() {
                None
            } else {
                line.into_value()
            }
        });
        match &prior_value {
            Some(_) => self.notify_updated(&key, &value),
            None => self.notify_added(&key, &value),
        }
        prior_value
    }

    /// Store `value` only if no live line exists for `key`.
    ///
    /// Returns the existing value and performs no write when present. The
    /// decision is atomic against the in-memory map; an expired or
    /// reclaimed line counts as absent and is replaced.
    pub fn put_if_absent(&self, key: K, value: V) -> Option<V> {
        let mut evicted_key: Option<K> = None;
        let existing = match &self.backing {
            Backing::Unbounded(map) => match map.entry(key.clone()) {
                Entry::Occupied(mut occupied) => {
                    let live = {
                        let line = occupied.get();
                        if line.is_expired() || line.is_reclaimed() {
                            None
                        } else {
                            line.value().cloned()
                        }
                    };
                    match live {
                        Some(value) => Some(value),
                        None => {
                            occupied.insert(CacheLine::new(
                                value.clone(),
                                self.expires_after,
                                self.soft,
                            ));
                            None
                        }
                    }
                }
                Entry::Vacant(vacant) => {
                    vacant.insert(CacheLine::new(value.clone(), self.expires_after, self.soft));
                    None
                }
            },
            Backing::Bounded(lru) => {
                let mut guard = lru.lock();
                let live = match guard.peek(&key) {
                    Some(line) if !line.is_expired() && !line.is_reclaimed() => {
                        line.value().cloned()
                    }
                    _ => None,
                };
                match live {
                    Some(value) => Some(value),
                    None => {
                        match guard.push(
                            key.clone(),
                            CacheLine::new(value.clone(), self.expires_after, self.soft),
                        ) {
                            Some((old_key, _)) if old_key != key => evicted_key = Some(old_key),
                            _ => {}
                        }
                        None
                    }
                }
            }
        };

        if let Some(existing) = existing {
            return Some(existing);
        }
        self.persist(&key, &value);
        if let Some(evicted_key) = &evicted_key {
            self.notify_removed(evicted_key);
        }
        self.notify_added(&key, &value);
        None
    }

    /// Remove `key` from memory and disk, returning the value that was
    /// stored.
    pub fn remove(&self, key: &K) -> Option<V> {
        let memory_value = match &self.backing {
            Backing::Unbounded(map) => map.remove(key).map(|(_, line)| line),
            Backing::Bounded(lru) => lru.lock().pop(key),
        }
        .and_then(|line| {
            if line.is_expired() {
                None
            } else {
                line.into_value()
            }
        });

        let mut disk_value = None;
        if self.persistent {
            let mut store = self.store.lock();
            match store.remove(key).and_then(|prior| store.commit().map(|()| prior)) {
                Ok(prior) => disk_value = prior,
                Err(err) => {
                    warn!(cache = %self.name, error = %err, "disk remove failed");
                }
            }
        }

        let value = memory_value.or(disk_value);
        if value.is_some() {
            self.stats.record_remove_hit();
            self.notify_removed(key);
        } else {
            self.stats.record_remove_miss();
        }
        value
    }

    /// Drop every entry from memory and disk.
    pub fn clear(&self) {
        let keys: Vec<K> = match &self.backing {
            Backing::Unbounded(map) => {
                let keys = map.iter().map(|entry| entry.key().clone()).collect();
                map.clear();
                keys
            }
            Backing::Bounded(lru) => {
                let mut guard = lru.lock();
                let keys = guard.iter().map(|(key, _)| key.clone()).collect();
                guard.clear();
                keys
            }
        };
        if self.persistent {
            let mut store = self.store.lock();
            if let Err(err) = store.clear().and_then(|()| store.commit()) {
                warn!(cache = %self.name, error = %err, "disk clear failed");
            }
        }
        for key in &keys {
            self.notify_removed(key);
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        let live = match &self.backing {
            Backing::Unbounded(map) => map
                .get(key)
                .is_some_and(|entry| !entry.value().is_expired() && !entry.value().is_reclaimed()),
            Backing::Bounded(lru) => lru
                .lock()
                .peek(key)
                .is_some_and(|line| !line.is_expired() && !line.is_reclaimed()),
        };
        if live {
            return true;
        }
        if self.persistent {
            self.store.lock().contains(key).unwrap_or_else(|err| {
                warn!(cache = %self.name, error = %err, "disk containment check failed");
                false
            })
        } else {
            false
        }
    }

    /// Entry count; consults the disk store when persistent.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.persistent {
            match self.store.lock().len() {
                Ok(count) => return count,
                Err(err) => {
                    warn!(cache = %self.name, error = %err, "disk size failed; using memory size");
                }
            }
        }
        match &self.backing {
            Backing::Unbounded(map) => map.len(),
            Backing::Bounded(lru) => lru.lock().len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best-effort snapshot of live values.
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        if self.persistent {
            match self.store.lock().iterate() {
                Ok(pairs) => return pairs.into_iter().map(|(_, value)| value).collect(),
                Err(err) => {
                    warn!(cache = %self.name, error = %err, "disk iteration failed; using memory");
                }
            }
        }
        match &self.backing {
            Backing::Unbounded(map) => map
                .iter()
                .filter(|entry| !entry.value().is_expired())
                .filter_map(|entry| entry.value().value().cloned())
                .collect(),
            Backing::Bounded(lru) => lru
                .lock()
                .iter()
                .filter(|(_, line)| !line.is_expired())
                .filter_map(|(_, line)| line.value().cloned())
                .collect(),
        }
    }

    /// Best-effort snapshot of live keys.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        if self.persistent {
            match self.store.lock().iterate() {
                Ok(pairs) => return pairs.into_iter().map(|(key, _)| key).collect(),
                Err(err) => {
                    warn!(cache = %self.name, error = %err, "disk iteration failed; using memory");
                }
            }
        }
        match &self.backing {
            Backing::Unbounded(map) => map
                .iter()
                .filter(|entry| !entry.value().is_expired())
                .map(|entry| entry.key().clone())
                .collect(),
            Backing::Bounded(lru) => lru
                .lock()
                .iter()
                .filter(|(_, line)| !line.is_expired())
                .map(|(key, _)| key.clone())
                .collect(),
        }
    }

    /// Remove every expired line. Returns how many were purged.
    pub fn purge_expired(&self) -> usize {
        let dead: Vec<K> = match &self.backing {
            Backing::Unbounded(map) => map
                .iter()
                .filter(|entry| entry.value().is_expired())
                .map(|entry| entry.key().clone())
                .collect(),
            Backing::Bounded(lru) => lru
                .lock()
                .iter()
                .filter(|(_, line)| line.is_expired())
                .map(|(key, _)| key.clone())
                .collect(),
        };
        let mut purged = 0;
        for key in &dead {
            let removed = match &self.backing {
                Backing::Unbounded(map) => map.remove(key).is_some(),
                Backing::Bounded(lru) => lru.lock().pop(key).is_some(),
            };
            if removed {
                purged += 1;
                self.discard_persisted(key);
                self.notify_removed(key);
            }
        }
        purged
    }

    /// Drop the values of soft lines, simulating memory pressure. Returns
    /// how many values were reclaimed.
    pub fn reclaim_soft(&self) -> usize {
        match &self.backing {
            Backing::Unbounded(map) => {
                let mut reclaimed = 0;
                for mut entry in map.iter_mut() {
                    if entry.value_mut().reclaim() {
                        reclaimed += 1;
                    }
                }
                reclaimed
            }
            Backing::Bounded(lru) => {
                let mut guard = lru.lock();
                let mut reclaimed = 0;
                for (_, line) in guard.iter_mut() {
                    if line.reclaim() {
                        reclaimed += 1;
                    }
                }
                reclaimed
            }
        }
    }

    fn memory_lookup(&self, key: &K) -> Lookup<V> {
        match &self.backing {
            Backing::Unbounded(map) => {
                let state = if let Some(entry) = map.get(key) {
                    let line = entry.value();
                    if line.is_expired() {
                        Lookup::Expired
                    } else if let Some(value) = line.value() {
                        Lookup::Live(value.clone())
                    } else {
                        Lookup::Reclaimed
                    }
                } else {
                    Lookup::Absent
                };
                if matches!(state, Lookup::Expired | Lookup::Reclaimed) {
                    map.remove(key);
                }
                state
            }
            Backing::Bounded(lru) => {
                let mut guard = lru.lock();
                let state = match guard.get(key) {
                    Some(line) => {
                        if line.is_expired() {
                            Lookup::Expired
                        } else if let Some(value) = line.value() {
                            Lookup::Live(value.clone())
                        } else {
                            Lookup::Reclaimed
                        }
                    }
                    None => Lookup::Absent,
                };
                if matches!(state, Lookup::Expired | Lookup::Reclaimed) {
                    guard.pop(key);
                }
                state
            }
        }
    }

    /// Install a line, returning the prior line for the key and any entry
    /// evicted to stay under the LRU bound.
    fn install_line(
        &self,
        key: K,
        line: CacheLine<V>,
    ) -> (Option<CacheLine<V>>, Option<(K, CacheLine<V>)>) {
        match &self.backing {
            Backing::Unbounded(map) => (map.insert(key, line), None),
            Backing::Bounded(lru) => {
                let mut guard = lru.lock();
                match guard.push(key.clone(), line) {
                    Some((old_key, old_line)) if old_key == key => (Some(old_line), None),
                    Some(evicted) => (None, Some(evicted)),
                    None => (None, None),
                }
            }
        }
    }

    fn persist(&self, key: &K, value: &V) {
        if !self.persistent {
            return;
        }
        let mut store = self.store.lock();
        if let Err(err) = store.put(key, value).and_then(|()| store.commit()) {
            warn!(cache = %self.name, error = %err, "disk write failed; memory remains authoritative");
        }
    }

    fn discard_persisted(&self, key: &K) {
        if !self.persistent {
            return;
        }
        let mut store = self.store.lock();
        if let Err(err) = store.remove(key).and_then(|_| store.commit()) {
            warn!(cache = %self.name, error = %err, "disk discard failed");
        }
    }

    fn notify_added(&self, key: &K, value: &V) {
        for listener in self.listeners.read().iter() {
            listener.key_added(&self.name, key, value);
        }
    }

    fn notify_updated(&self, key: &K, value: &V) {
        for listener in self.listeners.read().iter() {
            listener.key_updated(&self.name, key, value);
        }
    }

    fn notify_removed(&self, key: &K) {
        for listener in self.listeners.read().iter() {
            listener.key_removed(&self.name, key);
        }
    }
}

/// Fluent construction of a [`Cache`].
///
/// Environment overrides for the cache name are applied at
/// [`CacheBuilder::build`], so deployment tuning beats builder arguments.
pub struct CacheBuilder<K, V> {
    name: String,
    settings: CacheSettings,
    store: Option<Box<dyn DiskStore<K, V>>>,
    listeners: Vec<Arc<dyn CacheListener<K, V>>>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: CacheSettings::default(),
            store: None,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.settings.max_size = max_size;
        self
    }

    #[must_use]
    pub fn max_in_memory(mut self, max_in_memory: usize) -> Self {
        self.settings.max_in_memory = max_in_memory;
        self
    }

    #[must_use]
    pub fn expire_after(mut self, ttl: Duration) -> Self {
        self.settings.expire_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn use_soft_reference(mut self, soft: bool) -> Self {
        self.settings.use_soft_reference = soft;
        self
    }

    #[must_use]
    pub fn disk_store(mut self, store: Box<dyn DiskStore<K, V>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the shipped JSON file store under the engine's store
    /// directory.
    pub fn file_store(mut self, engine: &EngineSettings) -> Result<Self, CacheIoError>
    where
        K: Serialize + DeserializeOwned + Send,
        V: Serialize + DeserializeOwned + Send,
    {
        let store = JsonFileStore::open(&engine.store_dir(), &self.name)?;
        self.store = Some(Box::new(store));
        Ok(self)
    }

    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn CacheListener<K, V>>) -> Self {
        self.listeners.push(listener);
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<Cache<K, V>> {
        let settings = self.settings.overlay_env(&self.name);
        if settings.use_file_store && self.store.is_none() {
            warn!(
                cache = %self.name,
                "file store requested by configuration but no DiskStore attached; staying in memory"
            );
        }
        let backing = match NonZeroUsize::new(settings.memory_limit()) {
            Some(limit) => Backing::Bounded(Mutex::new(LruCache::new(limit))),
            None => Backing::Unbounded(DashMap::new()),
        };
        let store: Box<dyn DiskStore<K, V>> = self.store.unwrap_or_else(|| Box::new(NullStore));
        let persistent = store.is_persistent();
        Arc::new(Cache {
            name: self.name,
            backing,
            expires_after: (settings.expire_ms > 0)
                .then(|| Duration::from_millis(settings.expire_ms)),
            soft: settings.use_soft_reference,
            persistent,
            store: Mutex::new(store),
            listeners: RwLock::new(self.listeners),
            stats: CacheStats::default(),
        })
    }
}
