//! The namespaced TTL cache store.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::backend::CacheBackend;
use crate::error::Result;

/// Key namespace for this subsystem's entries.
///
/// The version segment is the schema marker: there is no version field
/// inside the payload, so any shape change to cached values requires
/// bumping this prefix so old-shaped entries are never misread.
pub const NAMESPACE: &str = "gymwatch.v1:";

/// Default TTL for cached device snapshots.
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default TTL for usage prediction data.
pub const PREDICTION_TTL: Duration = Duration::from_secs(15 * 60);

/// TTL for building geometry, which is effectively immutable.
pub const GEOMETRY_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// What a cached value looks like at rest: `{prefix}{key} -> {data, written_at}`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Envelope {
    data: serde_json::Value,
    written_at: i64,
}

impl Envelope {
    /// An envelope is valid iff `now - written_at <= ttl`. Expiry is
    /// evaluated here, lazily, at read time; there is no background sweep.
    fn is_valid_at(&self, ttl: Duration, now: OffsetDateTime) -> bool {
        let age = now.unix_timestamp().saturating_sub(self.written_at);
        age >= 0 && age as u64 <= ttl.as_secs()
    }
}

/// Namespaced key-value store with expiry-on-read.
///
/// Cloning is cheap; clones share the same backend.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
}

impl CacheStore {
    /// Create a store over the given backend.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Fetch a value if it is still within its TTL.
    ///
    /// Expired or undecodable entries return `None`; they are left in
    /// place until overwritten or cleared.
    pub fn get<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        self.get_at(key, ttl, OffsetDateTime::now_utc())
    }

    /// [`Self::get`] with an explicit clock, so expiry is testable.
    pub fn get_at<T: DeserializeOwned>(
        &self,
        key: &str,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Option<T> {
        let full_key = self.full_key(key);
        let raw = match self.backend.get_raw(&full_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cache read for '{}' failed: {}", key, e);
                return None;
            }
        };

        let envelope: Envelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                // An entry written by an older schema (or corrupted at
                // rest) is treated as absent, not as an error.
                warn!("Cache entry '{}' is not decodable: {}", key, e);
                return None;
            }
        };

        if !envelope.is_valid_at(ttl, now) {
            debug!("Cache entry '{}' expired", key);
            return None;
        }

        match serde_json::from_value(envelope.data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cache entry '{}' has unexpected shape: {}", key, e);
                None
            }
        }
    }

    /// Store a value with `written_at = now`, overwriting any prior entry.
    ///
    /// Never fails: a backend refusal (quota, I/O) is logged and the write
    /// is dropped, leaving the previous (possibly stale) entry in place.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        self.set_at(key, value, OffsetDateTime::now_utc());
    }

    /// [`Self::set`] with an explicit clock, so expiry is testable.
    pub fn set_at<T: Serialize>(&self, key: &str, value: &T, now: OffsetDateTime) {
        let data = match serde_json::to_value(value) {
            Ok(data) => data,
            Err(e) => {
                warn!("Cache value for '{}' is not serializable: {}", key, e);
                return;
            }
        };
        let envelope = Envelope {
            data,
            written_at: now.unix_timestamp(),
        };
        let raw = match serde_json::to_string(&envelope) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Cache envelope for '{}' failed to serialize: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.backend.set_raw(&self.full_key(key), &raw) {
            warn!("Cache write for '{}' failed: {}", key, e);
        }
    }

    /// Remove one entry.
    pub fn remove(&self, key: &str) -> Result<()> {
        self.backend.remove(&self.full_key(key))
    }

    /// Remove every entry under this subsystem's namespace.
    pub fn clear(&self) -> Result<()> {
        self.backend.clear_prefix(NAMESPACE)
    }

    /// Remove every entry in the backing store, namespaced or not.
    pub fn clear_all(&self) -> Result<()> {
        self.backend.clear_prefix("")
    }

    /// Number of physically stored entries, including expired ones.
    pub fn len(&self) -> Result<usize> {
        self.backend.len()
    }

    /// True when the backing store holds no entries at all.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn full_key(&self, key: &str) -> String {
        format!("{NAMESPACE}{key}")
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("namespace", &NAMESPACE)
            .finish()
    }
}
