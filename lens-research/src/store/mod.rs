//! Persistent key-value stores
//!
//! Stores are the persistence layer behind the result cache. They hold
//! opaque string values under string keys with no transactional guarantees;
//! concurrent writers of the same key are last-writer-wins.
//!
//! All stores are trait-based so the cache can run against memory in tests
//! and against the filesystem in the CLI.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;

/// Errors raised by a key-value store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    #[error("Store lock poisoned")]
    Poisoned,
}

/// String key-value storage shared by every cache user in the process
///
/// Calls may block on disk. Async callers go through the blocking pool, see
/// [`crate::service::ResultCache::fetch`].
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Lists every key currently stored
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}
