//! Generic TTL layer over a key/value store.

use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use seedvault_common::Result;

use crate::store::KvStore;

/// TTL value meaning "never expires".
pub const TTL_NEVER: i64 = -1;

/// A stored cache entry with its expiry time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Unix seconds at which the entry expires; -1 means never.
    pub expires_at: i64,
    /// The cached value.
    pub value: T,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at != TTL_NEVER && self.expires_at <= now
    }
}

/// Expiring cache over an injected persistent store.
///
/// Expiry is lazy: `get` on an expired entry returns `None` without
/// deleting it. Entries are overwritten by every `set`.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn KvStore>,
}

impl TtlCache {
    /// Create a cache over the given store.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Store a value under `key` with the given TTL in seconds.
    ///
    /// `ttl_seconds == TTL_NEVER` stores a non-expiring entry.
    ///
    /// # Errors
    /// - Propagates the underlying store's I/O failure as `Fatal`
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: i64) -> Result<()> {
        let expires_at = if ttl_seconds == TTL_NEVER {
            TTL_NEVER
        } else {
            Utc::now().timestamp() + ttl_seconds
        };
        let entry = CacheEntry { expires_at, value };
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| seedvault_common::Error::Fatal(format!("Cache encode failed: {}", e)))?;
        self.store.put(key, bytes).await
    }

    /// Read a value, treating expired or undecodable entries as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };
        let entry: CacheEntry<T> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                // A corrupt entry reads as a miss; leave cleanup to the
                // next overwrite.
                debug!(key, error = %e, "Discarding undecodable cache entry");
                return Ok(None);
            }
        };
        if entry.is_expired(Utc::now().timestamp()) {
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    /// Delete a key.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key).await
    }
}
