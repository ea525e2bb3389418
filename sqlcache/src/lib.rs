//! Read-path cache-aside layer for relational queries.
//!
//! [`QueryCacher`] sits in front of a [`QueryExecutor`]. Reads of registered
//! record types are served from a [`CacheStore`] when a payload is present,
//! otherwise executed once per key across concurrent callers and written back
//! with a fixed TTL. Nothing is invalidated on writes.

pub mod cacher;
pub mod coalesce;
pub mod codec;
pub mod config;
pub mod error;
pub mod executor;
pub mod key;
pub mod model;
pub mod query;
pub mod store;

// Re-export commonly used types
pub use cacher::{QueryCacher, QueryCacherBuilder, QueryOutcome, Source};
pub use codec::{Codec, CodecError, CodecKind, JsonCodec, MsgPackCodec};
pub use config::{CacherConfig, LoggingConfig, StoreBackend, StoreConfig, WriteErrorPolicy};
pub use error::{CacheError, Error, NAME, QueryError, Result};
pub use executor::{QueryExecutor, Row};
pub use key::{CacheKeyFn, KeyBuilder, KeyConfig};
pub use model::{Field, Model, ModelSet, Record};
pub use query::{Dialect, Param, Placeholder, Query, ResultSet, Shape, StandardDialect, Statement};
pub use store::{CacheStore, MAX_TTL, MemoryStats, MemoryStore, MemoryStoreConfig, StoreError};
#[cfg(feature = "redis")]
pub use store::RedisStore;

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
