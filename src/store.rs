use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::models::{CooldownState, EndedCache};
use crate::utils::error::Result;

pub const COOLDOWN_KEY: &str = "cooldown";
pub const ENDED_CACHE_KEY: &str = "ended_cache";

/// Minimal persistent key-value interface for run state. A missing or
/// corrupt blob is treated as empty, never fatal.
pub trait KvStore: Send + Sync {
    fn load(&self, key: &str) -> Option<Vec<u8>>;
    fn save(&self, key: &str, blob: &[u8]) -> Result<()>;
}

/// One JSON file per key inside a state directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        JsonFileStore {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KvStore for JsonFileStore {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        match fs::read(self.path_for(key)) {
            Ok(blob) => Some(blob),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(key, error = %e, "failed to read state blob, treating as empty");
                None
            }
        }
    }

    fn save(&self, key: &str, blob: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), blob)?;
        Ok(())
    }
}

/// Typed accessors over the raw store. Deserialization failures fall
/// back to the default value so a corrupt file cannot wedge the watcher.
pub struct StateStore<S: KvStore> {
    inner: S,
}

impl<S: KvStore> StateStore<S> {
    pub fn new(inner: S) -> Self {
        StateStore { inner }
    }

    pub fn load_cooldown(&self) -> Option<CooldownState> {
        self.load_json(COOLDOWN_KEY)
    }

    pub fn save_cooldown(&self, cooldown: &CooldownState) -> Result<()> {
        self.save_json(COOLDOWN_KEY, cooldown)
    }

    pub fn load_ended_cache(&self) -> EndedCache {
        self.load_json(ENDED_CACHE_KEY).unwrap_or_default()
    }

    pub fn save_ended_cache(&self, cache: &EndedCache) -> Result<()> {
        self.save_json(ENDED_CACHE_KEY, cache)
    }

    fn load_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let blob = self.inner.load(key)?;
        match serde_json::from_slice(&blob) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "corrupt state blob, treating as empty");
                None
            }
        }
    }

    fn save_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let blob = serde_json::to_vec_pretty(value)?;
        self.inner.save(key, &blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use tempfile::tempdir;

    #[test]
    fn test_missing_blob_loads_as_empty() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(JsonFileStore::new(dir.path()));

        assert!(store.load_cooldown().is_none());
        assert!(store.load_ended_cache().is_empty());
    }

    #[test]
    fn test_corrupt_blob_loads_as_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("cooldown.json"), b"{ not json").unwrap();
        fs::write(dir.path().join("ended_cache.json"), b"\xff\xfe").unwrap();
        let store = StateStore::new(JsonFileStore::new(dir.path()));

        assert!(store.load_cooldown().is_none());
        assert!(store.load_ended_cache().is_empty());
    }

    #[test]
    fn test_cooldown_round_trip() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(JsonFileStore::new(dir.path()));

        let now = Utc::now();
        let cooldown = CooldownState {
            until: now + ChronoDuration::hours(5),
            reason: "HTTP 429".to_string(),
            set_at: now,
        };
        store.save_cooldown(&cooldown).unwrap();

        let loaded = store.load_cooldown().expect("cooldown persisted");
        assert_eq!(loaded.reason, "HTTP 429");
        assert_eq!(loaded.until, cooldown.until);
    }

    #[test]
    fn test_ended_cache_round_trip() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(JsonFileStore::new(dir.path()));

        let mut cache = EndedCache::default();
        cache.mark("12345678", Utc::now());
        store.save_ended_cache(&cache).unwrap();

        let loaded = store.load_ended_cache();
        assert!(loaded.contains("12345678"));
    }

    #[test]
    fn test_save_creates_state_dir() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("state");
        let store = StateStore::new(JsonFileStore::new(&nested));

        store.save_ended_cache(&EndedCache::default()).unwrap();
        assert!(nested.join("ended_cache.json").exists());
    }
}
