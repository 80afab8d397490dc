//! Result cache service
//!
//! Completed results are expensive (many minutes and paid quota), so callers
//! look them up by request fingerprint before submitting. Entries expire
//! after a fixed window and are only evicted lazily, when a lookup finds
//! them stale. Every persistence failure is logged and degrades to a miss or
//! a no-op; the cache never fails a research job.

use chrono::{DateTime, TimeDelta, Utc};
use lens_core::Fingerprint;
use lens_core::domain::job::JobResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::store::KeyValueStore;

/// Prefix for every key the cache writes
pub const CACHE_PREFIX: &str = "lens-navigator-cache:";

/// Age after which an entry is never returned
pub const CACHE_EXPIRATION_HOURS: i64 = 24;

/// Stored form of one cached result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub created_at: DateTime<Utc>,
    pub result: JobResult,
}

/// Fingerprint-keyed cache over a shared key-value store
///
/// Clones share the same store, so every controller in the process sees the
/// same entries.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn KeyValueStore>,
    expiration: TimeDelta,
}

impl ResultCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            expiration: TimeDelta::hours(CACHE_EXPIRATION_HOURS),
        }
    }

    pub fn expiration(&self) -> TimeDelta {
        self.expiration
    }

    fn key(fingerprint: &Fingerprint) -> String {
        format!("{}{}", CACHE_PREFIX, fingerprint)
    }

    /// Looks up a fresh entry for `fingerprint`
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<JobResult> {
        self.lookup_at(fingerprint, Utc::now())
    }

    /// Looks up a fresh entry as of `now`
    ///
    /// Stale and unreadable entries are removed and reported as misses.
    pub fn lookup_at(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Option<JobResult> {
        let key = Self::key(fingerprint);

        let raw = match self.store.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Error reading cached result {}: {}", fingerprint, e);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Discarding corrupted cache entry {}: {}", fingerprint, e);
                self.evict(&key);
                return None;
            }
        };

        if now.signed_duration_since(entry.created_at) > self.expiration {
            debug!("Cache entry {} expired", fingerprint);
            self.evict(&key);
            return None;
        }

        info!("Cache hit for {}", fingerprint);
        Some(entry.result)
    }

    /// Stores `result` under `fingerprint`, replacing any previous entry
    pub fn store(&self, fingerprint: &Fingerprint, result: &JobResult) {
        self.store_at(fingerprint, result, Utc::now());
    }

    /// Stores `result` as if written at `now`
    pub fn store_at(&self, fingerprint: &Fingerprint, result: &JobResult, now: DateTime<Utc>) {
        let entry = CacheEntry {
            created_at: now,
            result: result.clone(),
        };

        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Error serializing result for cache: {}", e);
                return;
            }
        };

        match self.store.set(&Self::key(fingerprint), &raw) {
            Ok(()) => debug!("Cached result for {}", fingerprint),
            Err(e) => warn!("Error caching result {}: {}", fingerprint, e),
        }
    }

    /// Async form of [`ResultCache::lookup`]
    ///
    /// Store access may block on disk, so it runs on the blocking pool.
    pub async fn fetch(&self, fingerprint: &Fingerprint) -> Option<JobResult> {
        let cache = self.clone();
        let fingerprint = fingerprint.clone();
        match tokio::task::spawn_blocking(move || cache.lookup(&fingerprint)).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Cache lookup task failed: {}", e);
                None
            }
        }
    }

    /// Async form of [`ResultCache::store`]
    pub async fn save(&self, fingerprint: &Fingerprint, result: &JobResult) {
        let cache = self.clone();
        let fingerprint = fingerprint.clone();
        let result = result.clone();
        if let Err(e) =
            tokio::task::spawn_blocking(move || cache.store(&fingerprint, &result)).await
        {
            warn!("Cache store task failed: {}", e);
        }
    }

    /// Removes every cache entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Error listing cache entries: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| k.starts_with(CACHE_PREFIX)) {
            match self.store.remove(key) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Error removing cache entry {}: {}", key, e),
            }
        }

        info!("Cleared {} cached result(s)", removed);
        removed
    }

    fn evict(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!("Error evicting cache entry {}: {}", key, e);
        }
    }
}
