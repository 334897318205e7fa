//! Cache change notification.

/// Observer of one cache's key population.
///
/// Callbacks run synchronously on the mutating thread, after the map has
/// been updated and outside the cache's internal locks. Implementations
/// must not call back into the same cache from a callback.
pub trait CacheListener<K, V>: Send + Sync {
    fn key_added(&self, cache: &str, key: &K, value: &V) {
        let _ = (cache, key, value);
    }

    fn key_updated(&self, cache: &str, key: &K, value: &V) {
        let _ = (cache, key, value);
    }

    fn key_removed(&self, cache: &str, key: &K) {
        let _ = (cache, key);
    }
}
