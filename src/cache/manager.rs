//! The registry of named caches plus background maintenance.

use crate::cache::{Cache, CacheBuilder, CacheStatsSnapshot};
use crate::config::EngineSettings;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Type-erased operational view of one cache, the surface the manager keeps
/// for sweeps and introspection. Typed handles stay with the owner that
/// built the cache.
pub trait ManagedCache: Send + Sync {
    fn name(&self) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&self);

    fn purge_expired(&self) -> usize;

    fn reclaim_soft(&self) -> usize;

    fn stats(&self) -> CacheStatsSnapshot;
}

impl<K, V> ManagedCache for Cache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        Cache::name(self)
    }

    fn len(&self) -> usize {
        Cache::len(self)
    }

    fn clear(&self) {
        Cache::clear(self);
    }

    fn purge_expired(&self) -> usize {
        Cache::purge_expired(self)
    }

    fn reclaim_soft(&self) -> usize {
        Cache::reclaim_soft(self)
    }

    fn stats(&self) -> CacheStatsSnapshot {
        Cache::stats(self)
    }
}

/// Creates, registers, and sweeps named caches.
///
/// # Examples
///
/// ```
/// use pathguard::cache::CacheManager;
/// use pathguard::config::EngineSettings;
///
/// let manager = CacheManager::new(EngineSettings::default());
/// let cache = manager.cache_with::<String, u32>("lookup.codes", |b| b.max_in_memory(128));
/// cache.put("answer".into(), 42);
/// assert_eq!(manager.get("lookup.codes").map(|c| c.len()), Some(1));
/// ```
pub struct CacheManager {
    engine: EngineSettings,
    caches: DashMap<String, Arc<dyn ManagedCache>>,
}

impl CacheManager {
    #[must_use]
    pub fn new(engine: EngineSettings) -> Self {
        Self {
            engine,
            caches: DashMap::new(),
        }
    }

    /// Build a manager from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(EngineSettings::from_env())
    }

    #[must_use]
    pub fn engine_settings(&self) -> &EngineSettings {
        &self.engine
    }

    /// Create and register a cache with discovered settings only.
    pub fn cache<K, V>(&self, name: &str) -> Arc<Cache<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.cache_with(name, |builder| builder)
    }

    /// Create and register a cache, customizing the builder first.
    /// Environment overrides still apply on top at build time.
    pub fn cache_with<K, V>(
        &self,
        name: &str,
        configure: impl FnOnce(CacheBuilder<K, V>) -> CacheBuilder<K, V>,
    ) -> Arc<Cache<K, V>>
    where
        K: Eq + Hash + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let cache = configure(Cache::builder(name)).build();
        self.register(cache.clone());
        cache
    }

    /// Register an externally built cache under its own name.
    pub fn register(&self, cache: Arc<dyn ManagedCache>) {
        self.caches.insert(cache.name().to_owned(), cache);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ManagedCache>> {
        self.caches.get(name).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.caches.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Counter snapshots for every registered cache.
    #[must_use]
    pub fn stats(&self) -> Vec<(String, CacheStatsSnapshot)> {
        self.caches
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    pub fn clear_all(&self) {
        for entry in self.caches.iter() {
            entry.value().clear();
        }
    }

    /// Purge expired lines across every cache. Returns the total purged.
    pub fn purge_expired(&self) -> usize {
        self.caches
            .iter()
            .map(|entry| entry.value().purge_expired())
            .sum()
    }

    /// Reclaim soft values across every cache, simulating memory pressure.
    pub fn reclaim_soft(&self) -> usize {
        self.caches
            .iter()
            .map(|entry| entry.value().reclaim_soft())
            .sum()
    }

    /// Spawn the background sweeper that retires expired lines on a fixed
    /// cadence. Readers never depend on it; they observe expiry themselves.
    pub fn spawn_janitor(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = manager.purge_expired();
                if purged > 0 {
                    debug!(purged, "cache janitor retired expired lines");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_lists_caches() {
        let manager = CacheManager::new(EngineSettings::default());
        let cache = manager.cache::<String, u32>("a.b");
        cache.put("k".into(), 1);

        let mut names = manager.names();
        names.sort();
        assert_eq!(names, ["a.b"]);
        assert_eq!(manager.get("a.b").map(|c| c.len()), Some(1));
        assert!(manager.get("missing").is_none());
    }

    #[test]
    fn clear_all_empties_registered_caches() {
        let manager = CacheManager::new(EngineSettings::default());
        let cache = manager.cache::<String, u32>("wipe.me");
        cache.put("k".into(), 1);
        manager.clear_all();
        assert!(cache.is_empty());
    }
}
