//! Key-value backends holding encoded query results

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use memory::{MemoryStats, MemoryStore, MemoryStoreConfig};
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Longest TTL a store accepts: millisecond expiries must fit a signed 64-bit integer
pub const MAX_TTL: Duration = Duration::from_millis(i64::MAX as u64);

/// Errors reported by a cache backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("memory limit exceeded")]
    MemoryLimitExceeded,

    #[error("invalid TTL: {0}")]
    TtlInvalid(String),

    #[cfg(feature = "redis")]
    #[error("redis: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Get/set of opaque string payloads with expiry
///
/// `Ok(None)` from [`CacheStore::get`] is a plain miss; any error aborts the
/// read or write that issued it. Implementations must be safe for concurrent use.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;
}
