//! TTL cache of payloads fetched from the network, keyed by URL.
//!
//! Expiry is lazy: an entry whose `expiry <= now` is deleted by the first
//! read that finds it, and [`CacheManager::sweep_expired`] removes the rest.

use crate::collections::API_CACHE;
use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use stowage_model::WriteOptions;
use stowage_storage::{KeyRange, QueryOptions, Storage};
use stowage_types::{SyncStatus, Timestamp};
use tracing::debug;

/// TTL used when the caller does not set one.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// A cached response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub payload: Value,
    /// Content type of the payload.
    #[serde(rename = "type")]
    pub content_type: String,
    /// When the entry was stored.
    pub timestamp: Timestamp,
    pub expiry: Timestamp,
    /// Serialized payload size in bytes.
    pub size: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiry <= now
    }
}

/// Options for [`CacheManager::put`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOptions {
    pub content_type: String,
    pub ttl: Duration,
    pub headers: BTreeMap<String, String>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            content_type: "application/json".to_string(),
            ttl: DEFAULT_CACHE_TTL,
            headers: BTreeMap::new(),
        }
    }
}

impl CacheOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Cache operations over the `apiCache` collection.
#[derive(Debug, Clone)]
pub struct CacheManager {
    storage: Storage,
}

impl CacheManager {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Stores `payload` under `url`, replacing any previous entry.
    pub async fn put(
        &self,
        url: &str,
        payload: Value,
        options: CacheOptions,
    ) -> EngineResult<CacheEntry> {
        let now = self.storage.now();
        let size = serde_json::to_vec(&payload)?.len() as u64;
        let entry = CacheEntry {
            url: url.to_string(),
            payload,
            content_type: options.content_type,
            timestamp: now,
            expiry: now.saturating_add(options.ttl),
            size,
            headers: options.headers,
        };
        let write = WriteOptions::default().with_sync_status(SyncStatus::Synced);
        self.storage
            .put(API_CACHE, serde_json::to_value(&entry)?, write)
            .await?;
        Ok(entry)
    }

    /// The cached payload, or `None` when absent or expired.
    pub async fn get(&self, url: &str) -> EngineResult<Option<Value>> {
        Ok(self.get_entry(url).await?.map(|entry| entry.payload))
    }

    /// The full cache entry, with the same expiry rules as [`Self::get`].
    pub async fn get_entry(&self, url: &str) -> EngineResult<Option<CacheEntry>> {
        let Some(entry) = self.storage.get_as::<CacheEntry>(API_CACHE, url).await? else {
            return Ok(None);
        };
        if entry.is_expired(self.storage.now()) {
            debug!("cache entry for {url} expired at {}", entry.expiry);
            self.storage.delete(API_CACHE, url).await?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Removes every expired entry. Returns how many were removed.
    ///
    /// Expiry is checked in the deleting transaction, so an entry refreshed
    /// by a concurrent `put` is kept.
    pub async fn sweep_expired(&self) -> EngineResult<usize> {
        let now = self.storage.now();
        let removed = self
            .storage
            .delete_matching(
                API_CACHE,
                QueryOptions::new()
                    .index("expiry")
                    .range(KeyRange::upper_bound(now.as_millis(), false)),
            )
            .await?;
        if !removed.is_empty() {
            debug!("swept {} expired cache entries", removed.len());
        }
        Ok(removed.len())
    }

    /// Drops one entry. Returns whether it existed.
    pub async fn invalidate(&self, url: &str) -> EngineResult<bool> {
        Ok(self.storage.delete(API_CACHE, url).await?)
    }

    /// Drops every entry. Returns how many there were.
    pub async fn clear(&self) -> EngineResult<usize> {
        Ok(self.storage.clear(API_CACHE).await?)
    }
}
