use async_trait::async_trait;
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{CacheStore, StoreError};

/// Payload held by the memory store
#[derive(Debug, Clone)]
struct StoredValue {
    data: String,
    expires_at: Instant,
    size: usize,
}

impl StoredValue {
    /// `None` if the expiry does not fit an `Instant`
    fn new(key: &str, data: String, ttl: Duration) -> Option<Self> {
        let size = key.len() + data.len() + std::mem::size_of::<Self>();
        Some(Self {
            data,
            expires_at: Instant::now().checked_add(ttl)?,
            size,
        })
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Configuration for the memory store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MemoryStoreConfig {
    /// Maximum memory in MB
    pub max_memory_mb: usize,
    /// Interval of the optional expired-entry sweeper in milliseconds
    pub ttl_cleanup_interval_ms: u64,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 512,
            ttl_cleanup_interval_ms: 1000,
        }
    }
}

/// Statistics for the memory store
#[derive(Debug, Default, Clone, Serialize)]
pub struct MemoryStats {
    /// Number of live keys
    pub total_keys: usize,
    /// Estimated memory usage in bytes
    pub total_memory_bytes: usize,
    pub gets: u64,
    pub sets: u64,
    pub dels: u64,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped because their TTL elapsed
    pub expired: u64,
}

impl MemoryStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Reference in-process store with per-entry TTL
///
/// Expired entries are dropped lazily on access; [`MemoryStore::start_ttl_cleanup`]
/// additionally sweeps them on an interval.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<Trie<String, StoredValue>>>,
    stats: Arc<RwLock<MemoryStats>>,
    config: MemoryStoreConfig,
}

impl MemoryStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        info!(
            "Initializing memory store with max_memory={}MB",
            config.max_memory_mb
        );

        Self {
            data: Arc::new(RwLock::new(Trie::new())),
            stats: Arc::new(RwLock::new(MemoryStats::default())),
            config,
        }
    }

    /// Start background TTL cleanup task
    pub fn start_ttl_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let interval_ms = self.config.ttl_cleanup_interval_ms.max(1);
        info!("Starting TTL cleanup task (interval={}ms)", interval_ms);

        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));

            loop {
                interval.tick().await;
                store.purge_expired();
            }
        })
    }

    /// Store a payload that expires after `ttl`
    pub async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        debug!("SET key={}, size={}, ttl={:?}", key, value.len(), ttl);

        if ttl.is_zero() {
            return Err(StoreError::TtlInvalid("TTL must be greater than zero".to_string()));
        }

        let stored = StoredValue::new(key, value, ttl)
            .ok_or_else(|| StoreError::TtlInvalid(format!("TTL {:?} is out of range", ttl)))?;
        let max_bytes = self.config.max_memory_mb * 1024 * 1024;

        let mut data = self.data.write();
        let mut stats = self.stats.write();

        let mut replaced = data.get(key).map_or(0, |old| old.size);
        if stats.total_memory_bytes - replaced + stored.size > max_bytes {
            // Expired entries still count until they are dropped
            if purge_locked(&mut data, &mut stats) > 0 {
                replaced = data.get(key).map_or(0, |old| old.size);
            }
            if stats.total_memory_bytes - replaced + stored.size > max_bytes {
                warn!(
                    "Memory limit exceeded: {}/{}",
                    stats.total_memory_bytes, max_bytes
                );
                return Err(StoreError::MemoryLimitExceeded);
            }
        }

        stats.total_memory_bytes = stats.total_memory_bytes - replaced + stored.size;
        if data.insert(key.to_string(), stored).is_none() {
            stats.total_keys += 1;
        }
        stats.sets += 1;

        Ok(())
    }

    /// Get a payload, dropping it if it has expired
    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        debug!("GET key={}", key);

        let mut data = self.data.write();
        let mut stats = self.stats.write();
        stats.gets += 1;

        let expired = match data.get(key) {
            Some(value) if !value.is_expired() => {
                stats.hits += 1;
                return Ok(Some(value.data.clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            debug!("Key expired: {}", key);
            if let Some(old) = data.remove(key) {
                stats.total_keys = stats.total_keys.saturating_sub(1);
                stats.total_memory_bytes = stats.total_memory_bytes.saturating_sub(old.size);
                stats.expired += 1;
            }
        }
        stats.misses += 1;
        Ok(None)
    }

    /// Delete a key
    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        debug!("DELETE key={}", key);

        let mut data = self.data.write();
        let Some(removed) = data.remove(key) else {
            return Ok(false);
        };

        let mut stats = self.stats.write();
        stats.dels += 1;
        stats.total_keys = stats.total_keys.saturating_sub(1);
        stats.total_memory_bytes = stats.total_memory_bytes.saturating_sub(removed.size);
        Ok(true)
    }

    /// Check if a live key exists
    pub async fn exists(&self, key: &str) -> bool {
        self.data
            .read()
            .get(key)
            .is_some_and(|value| !value.is_expired())
    }

    /// Remaining lifetime of a live key
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        self.data
            .read()
            .get(key)
            .filter(|value| !value.is_expired())
            .map(StoredValue::remaining)
    }

    /// List live keys, optionally restricted to a prefix
    pub async fn keys(&self, prefix: Option<&str>, limit: usize) -> Vec<String> {
        let data = self.data.read();
        match prefix {
            Some(prefix) => data
                .get_raw_descendant(prefix)
                .map(|subtrie| {
                    subtrie
                        .iter()
                        .filter(|(_, v)| !v.is_expired())
                        .map(|(k, _)| k.clone())
                        .take(limit)
                        .collect()
                })
                .unwrap_or_default(),
            None => data
                .iter()
                .filter(|(_, v)| !v.is_expired())
                .map(|(k, _)| k.clone())
                .take(limit)
                .collect(),
        }
    }

    /// Get statistics
    pub async fn stats(&self) -> MemoryStats {
        self.stats.read().clone()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut data = self.data.write();
        let mut stats = self.stats.write();
        purge_locked(&mut data, &mut stats)
    }
}

fn purge_locked(data: &mut Trie<String, StoredValue>, stats: &mut MemoryStats) -> usize {
    let expired_keys: Vec<String> = data
        .iter()
        .filter(|(_, v)| v.is_expired())
        .map(|(k, _)| k.clone())
        .collect();

    let count = expired_keys.len();
    if count > 0 {
        debug!("Cleaning up {} expired keys", count);
        for key in expired_keys {
            if let Some(old) = data.remove(&key) {
                stats.total_memory_bytes = stats.total_memory_bytes.saturating_sub(old.size);
            }
        }
        stats.total_keys = stats.total_keys.saturating_sub(count);
        stats.expired += count as u64;
    }
    count
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        MemoryStore::get(self, key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        MemoryStore::set(self, key, value, ttl).await
    }
}
