use thiserror::Error;

use crate::codec::CodecError;
use crate::store::StoreError;

/// Stable identity of the cache layer. Every [`CacheError`] message starts with it.
pub const NAME: &str = "sqlcache";

/// Errors originating in the cache layer itself
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlcache: no cacheable record types registered, call `model` before `build`")]
    NoModels,

    #[error("sqlcache: invalid config: {0}")]
    InvalidConfig(String),

    #[error("sqlcache: store error: {0}")]
    Store(#[from] StoreError),

    #[error("sqlcache: codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("sqlcache: in-flight execution for key `{key}` was abandoned")]
    Abandoned { key: String },
}

/// Failure reported by the data-access layer while executing or scanning a query.
///
/// Cloneable so a single failed execution can be handed to every coalesced waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("database error: {0}")]
    Database(String),

    #[error("scan error on column `{column}`: {message}")]
    Scan { column: String, message: String },
}

impl QueryError {
    /// Wrap any displayable driver error
    pub fn database(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

/// Error channel of an intercepted query
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl Error {
    /// Whether the failure came from the cache layer rather than the data layer
    pub fn is_cache_error(&self) -> bool {
        matches!(self, Self::Cache(_))
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Self::Cache(CacheError::Store(err))
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        Self::Cache(CacheError::Codec(err))
    }
}

/// Result type alias for intercepted queries
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_errors_carry_layer_prefix() {
        let errors = [
            CacheError::NoModels,
            CacheError::InvalidConfig("ttl".to_string()),
            CacheError::Store(StoreError::Unavailable("down".to_string())),
            CacheError::Abandoned {
                key: "k".to_string(),
            },
        ];

        for err in errors {
            assert!(err.to_string().starts_with(NAME), "{err}");
        }
    }

    #[test]
    fn test_error_classification() {
        let err: Error = StoreError::Unavailable("down".to_string()).into();
        assert!(err.is_cache_error());

        let err: Error = QueryError::database("connection reset").into();
        assert!(!err.is_cache_error());
        assert_eq!(err.to_string(), "database error: connection reset");
    }
}
