//! Pluggable key-value backends for the cache store.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};

/// A raw string key-value store the [`crate::CacheStore`] sits on.
///
/// The hosting environment picks the implementation: [`SqliteBackend`]
/// (durable, single file) for services, [`MemoryBackend`] for tests and
/// ephemeral hosts. Backends store opaque strings; TTL interpretation
/// happens entirely in the store layer.
pub trait CacheBackend: Send + Sync {
    /// Fetch the raw value for a key, if present.
    fn get_raw(&self, key: &str) -> Result<Option<String>>;

    /// Store a raw value, overwriting any prior entry.
    fn set_raw(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a single entry. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every entry whose key starts with `prefix`.
    ///
    /// An empty prefix removes everything.
    fn clear_prefix(&self, prefix: &str) -> Result<()>;

    /// Number of physically stored entries, including expired ones.
    fn len(&self) -> Result<usize>;
}

/// In-memory backend with an optional entry quota.
///
/// The quota mirrors the size-limited durable stores this subsystem targets:
/// inserting a new key past the limit fails with
/// [`Error::QuotaExceeded`], while overwriting an existing key always
/// succeeds.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
    max_entries: Option<usize>,
}

impl MemoryBackend {
    /// Create an unbounded in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that refuses new keys beyond `max_entries`.
    pub fn with_quota(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: Some(max_entries),
        }
    }
}

impl CacheBackend for MemoryBackend {
    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().expect("cache map poisoned");
        Ok(entries.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("cache map poisoned");
        if let Some(limit) = self.max_entries
            && entries.len() >= limit
            && !entries.contains_key(key)
        {
            return Err(Error::QuotaExceeded {
                key: key.to_string(),
                limit,
            });
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("cache map poisoned");
        entries.remove(key);
        Ok(())
    }

    fn clear_prefix(&self, prefix: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("cache map poisoned");
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let entries = self.entries.lock().expect("cache map poisoned");
        Ok(entries.len())
    }
}
