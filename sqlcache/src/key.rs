//! Cache-key derivation

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::query::{Dialect, Placeholder, Query, StandardDialect};

/// Maps a query to its cache key. Must be deterministic and must not fail.
pub type CacheKeyFn = Arc<dyn Fn(&Query) -> String + Send + Sync>;

/// Key post-processing settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KeyConfig {
    /// Prepended verbatim to every key
    pub prefix: String,
    /// Replace the rendered key with its SHA-256 hex digest
    pub hash: bool,
    /// Placeholder style of the default key function
    pub placeholder: Placeholder,
}

/// Default key function: the statement rendered with its parameters inlined
pub fn explain_key_fn(dialect: impl Dialect + 'static) -> CacheKeyFn {
    Arc::new(move |query: &Query| dialect.explain(query.statement(), query.params()))
}

/// Lowercase hex SHA-256 of a rendered key
pub fn hash_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derives final cache keys: key function, then optional hashing, then prefix
#[derive(Clone)]
pub struct KeyBuilder {
    func: CacheKeyFn,
    prefix: String,
    hash: bool,
}

impl KeyBuilder {
    pub fn new(func: CacheKeyFn, config: &KeyConfig) -> Self {
        Self {
            func,
            prefix: config.prefix.clone(),
            hash: config.hash,
        }
    }

    /// Builder using the default key function for the configured placeholder style
    pub fn from_config(config: &KeyConfig) -> Self {
        Self::new(
            explain_key_fn(StandardDialect::new(config.placeholder)),
            config,
        )
    }

    pub fn key_for(&self, query: &Query) -> String {
        let raw = (self.func)(query);
        let body = if self.hash { hash_key(&raw) } else { raw };
        if self.prefix.is_empty() {
            body
        } else {
            format!("{}{}", self.prefix, body)
        }
    }
}

impl fmt::Debug for KeyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBuilder")
            .field("prefix", &self.prefix)
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}
