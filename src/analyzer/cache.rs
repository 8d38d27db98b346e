//! Bounded, thread-safe cache of analysis results.
//!
//! Keyed by `(content_hash, analyzer_version, rule_set_version)`; the entry
//! carries the full violation list plus the scope and taint summaries. The
//! in-memory LRU is the source of truth; disk persistence under `CACHE_DIR`
//! is write-behind and best-effort, correctness never depends on it.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Mutex;

use log::{debug, trace, warn};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use super::scope::ScopeSummary;
use super::taint::TaintSummary;
use super::violation::Violation;

/// Bumped whenever analysis semantics change; part of every cache key.
pub const ANALYZER_VERSION: u32 = 2;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub content_hash: String,
    pub analyzer_version: u32,
    pub rule_set_version: u32,
}

impl CacheKey {
    fn file_name(&self) -> String {
        format!(
            "{}-{}-{}.json",
            self.content_hash, self.analyzer_version, self.rule_set_version
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub violations: Vec<Violation>,
    pub scopes: ScopeSummary,
    pub taint: TaintSummary,
}

pub struct AnalysisCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    disk_dir: Option<PathBuf>,
}

impl AnalysisCache {
    pub fn new(capacity: usize, disk_dir: Option<PathBuf>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1))
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CAPACITY).unwrap());
        AnalysisCache {
            entries: Mutex::new(LruCache::new(capacity)),
            disk_dir,
        }
    }

    /// Capacity from the default, disk directory from `CACHE_DIR` when set.
    pub fn from_env() -> Self {
        let disk_dir = std::env::var_os("CACHE_DIR").map(PathBuf::from);
        Self::new(DEFAULT_CAPACITY, disk_dir)
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(entry) = entries.get(key) {
                trace!("analysis cache hit for {}", key.content_hash);
                return Some(entry.clone());
            }
        }

        let entry = self.load_from_disk(key)?;
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key.clone(), entry.clone());
        }
        Some(entry)
    }

    pub fn put(&self, key: CacheKey, entry: CacheEntry) {
        self.store_to_disk(&key, &entry);
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, entry);
        }
    }

    fn disk_path(&self, key: &CacheKey) -> Option<PathBuf> {
        self.disk_dir.as_ref().map(|dir| dir.join(key.file_name()))
    }

    fn load_from_disk(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.disk_path(key)?;
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&text) {
            Ok(entry) => {
                debug!("loaded analysis cache entry from {}", path.display());
                Some(entry)
            }
            Err(error) => {
                warn!(
                    "ignoring corrupt analysis cache entry {}: {error}",
                    path.display()
                );
                None
            }
        }
    }

    fn store_to_disk(&self, key: &CacheKey, entry: &CacheEntry) {
        let Some(path) = self.disk_path(key) else {
            return;
        };
        let Some(dir) = path.parent() else {
            return;
        };
        let result = std::fs::create_dir_all(dir)
            .and_then(|_| serde_json::to_string(entry).map_err(std::io::Error::from))
            .and_then(|json| std::fs::write(&path, json));
        if let Err(error) = result {
            warn!(
                "could not persist analysis cache entry {}: {error}",
                path.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(hash: &str) -> CacheKey {
        CacheKey {
            content_hash: hash.to_owned(),
            analyzer_version: ANALYZER_VERSION,
            rule_set_version: 1,
        }
    }

    fn entry() -> CacheEntry {
        CacheEntry {
            violations: vec![],
            scopes: ScopeSummary::default(),
            taint: TaintSummary::default(),
        }
    }

    #[test]
    fn test_roundtrip_in_memory() {
        let cache = AnalysisCache::new(4, None);
        assert!(cache.get(&key("a")).is_none());
        cache.put(key("a"), entry());
        assert!(cache.get(&key("a")).is_some());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = AnalysisCache::new(2, None);
        cache.put(key("a"), entry());
        cache.put(key("b"), entry());
        cache.put(key("c"), entry());
        assert!(cache.get(&key("a")).is_none());
        assert!(cache.get(&key("c")).is_some());
    }

    #[test]
    fn test_version_is_part_of_the_key() {
        let cache = AnalysisCache::new(4, None);
        cache.put(key("a"), entry());
        let other = CacheKey {
            rule_set_version: 2,
            ..key("a")
        };
        assert!(cache.get(&other).is_none());
    }

    #[test]
    fn test_disk_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::new(4, Some(dir.path().to_path_buf()));
        cache.put(key("a"), entry());

        // a fresh cache instance reads the entry back from disk
        let fresh = AnalysisCache::new(4, Some(dir.path().to_path_buf()));
        assert!(fresh.get(&key("a")).is_some());
    }
}
