use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::{debug, info};

use super::{CacheStore, MAX_TTL, StoreError};

/// Redis-backed store
///
/// Entries are written with `PSETEX`, so TTLs keep millisecond precision.
/// A nil reply from `GET` is a miss.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to `url` (for example `redis://127.0.0.1:6379/0`)
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis cache store at {}", url);
        Ok(Self { conn })
    }

    /// Wrap an existing multiplexed connection
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// Remaining lifetime of a key, `None` if it does not exist or never expires
    pub async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        let millis: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        debug!("Redis GET key={}", key);
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        debug!("Redis PSETEX key={}, size={}, ttl={:?}", key, value.len(), ttl);
        if ttl > MAX_TTL {
            return Err(StoreError::TtlInvalid(format!("TTL {:?} is out of range", ttl)));
        }
        let millis = ttl.as_millis() as u64;
        if millis == 0 {
            return Err(StoreError::TtlInvalid(
                "TTL must be at least one millisecond".to_string(),
            ));
        }

        let mut conn = self.conn.clone();
        let _: () = conn.pset_ex(key, value, millis).await?;
        Ok(())
    }
}
