//! Environment-driven configuration.
//!
//! Settings load from the process environment (a `.env` file is honored via
//! `dotenvy`). Cache tuning is discovered per cache name at build time and
//! overrides whatever the builder was given, so deployments can retune a
//! cache without touching code.
//!
//! | Key | Meaning | Default |
//! |---|---|---|
//! | `PATHGUARD_HOME` | runtime data root | `./runtime` |
//! | `PATHGUARD_AUTHZ_DISABLED` | skip all permission checks | `false` |
//! | `PATHGUARD_AUTHZ_VERBOSE` | log resolved permission sets | `false` |
//! | `PATHGUARD_CACHE_<NAME>_MAX_SIZE` | overall entry bound | `0` |
//! | `PATHGUARD_CACHE_<NAME>_MAX_IN_MEMORY` | in-memory LRU bound | `0` |
//! | `PATHGUARD_CACHE_<NAME>_EXPIRE_MS` | line time-to-live | `0` (never) |
//! | `PATHGUARD_CACHE_<NAME>_SOFT` | soft-value policy | `false` |
//! | `PATHGUARD_CACHE_<NAME>_FILE_STORE` | disk-backed persistence | `false` |
//!
//! `<NAME>` is the cache name uppercased with `.`, `-`, and `/` mapped to
//! `_`.

use std::path::{Path, PathBuf};
use tracing::warn;

const ENV_PREFIX: &str = "PATHGUARD";

/// Engine-wide settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub home: PathBuf,
    pub authorization_disabled: bool,
    pub authorization_verbose: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            home: PathBuf::from("./runtime"),
            authorization_disabled: false,
            authorization_verbose: false,
        }
    }
}

impl EngineSettings {
    /// Read settings from the environment, loading `.env` first.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut settings = Self::default();
        if let Ok(home) = std::env::var(format!("{ENV_PREFIX}_HOME")) {
            settings.home = PathBuf::from(home);
        }
        if let Some(flag) = env_bool(&format!("{ENV_PREFIX}_AUTHZ_DISABLED")) {
            settings.authorization_disabled = flag;
        }
        if let Some(flag) = env_bool(&format!("{ENV_PREFIX}_AUTHZ_VERBOSE")) {
            settings.authorization_verbose = flag;
        }
        settings
    }

    #[must_use]
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    /// Directory disk-backed caches persist under.
    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.home.join("data").join("cache")
    }
}

/// Per-cache tuning. `max_in_memory` bounds the LRU map; when it is zero a
/// non-zero `max_size` bounds it instead; both zero means unbounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheSettings {
    pub max_size: usize,
    pub max_in_memory: usize,
    pub expire_ms: u64,
    pub use_soft_reference: bool,
    pub use_file_store: bool,
}

impl CacheSettings {
    /// The effective in-memory bound; zero means unbounded.
    #[must_use]
    pub fn memory_limit(&self) -> usize {
        if self.max_in_memory > 0 {
            self.max_in_memory
        } else {
            self.max_size
        }
    }

    /// Overlay any environment overrides for cache `name` onto `self`.
    #[must_use]
    pub fn overlay_env(mut self, name: &str) -> Self {
        if let Some(v) = env_parse(name, "MAX_SIZE") {
            self.max_size = v;
        }
        if let Some(v) = env_parse(name, "MAX_IN_MEMORY") {
            self.max_in_memory = v;
        }
        if let Some(v) = env_parse(name, "EXPIRE_MS") {
            self.expire_ms = v;
        }
        if let Some(v) = env_bool(&cache_key(name, "SOFT")) {
            self.use_soft_reference = v;
        }
        if let Some(v) = env_bool(&cache_key(name, "FILE_STORE")) {
            self.use_file_store = v;
        }
        self
    }
}

/// Map a cache name and suffix to its environment key.
#[must_use]
pub fn cache_key(name: &str, suffix: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '.' | '-' | '/' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    format!("{ENV_PREFIX}_CACHE_{sanitized}_{suffix}")
}

fn env_parse<T: std::str::FromStr>(name: &str, suffix: &str) -> Option<T> {
    let key = cache_key(name, suffix);
    let raw = std::env::var(&key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(%key, %raw, "unparseable cache setting ignored");
            None
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(%key, %raw, "unparseable boolean setting ignored");
            None
        }
    }
}

/// Join helper used by store implementations.
pub(crate) fn store_file(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_are_sanitized() {
        assert_eq!(
            cache_key("security.permissions.main", "MAX_SIZE"),
            "PATHGUARD_CACHE_SECURITY_PERMISSIONS_MAIN_MAX_SIZE"
        );
    }

    #[test]
    fn memory_limit_falls_back_to_max_size() {
        let settings = CacheSettings {
            max_size: 10,
            ..CacheSettings::default()
        };
        assert_eq!(settings.memory_limit(), 10);

        let settings = CacheSettings {
            max_size: 10,
            max_in_memory: 3,
            ..CacheSettings::default()
        };
        assert_eq!(settings.memory_limit(), 3);
    }

    #[test]
    fn env_overrides_builder_values() {
        let key = cache_key("overlay.test", "MAX_IN_MEMORY");
        unsafe { std::env::set_var(&key, "7") };
        let settings = CacheSettings {
            max_in_memory: 100,
            ..CacheSettings::default()
        }
        .overlay_env("overlay.test");
        assert_eq!(settings.max_in_memory, 7);
        unsafe { std::env::remove_var(&key) };
    }
}
