use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::CodecKind;
use crate::error::CacheError;
use crate::key::KeyConfig;
use crate::store::{CacheStore, MAX_TTL, MemoryStore, MemoryStoreConfig, StoreError};

/// What to do when writing a freshly fetched result back to the store fails
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WriteErrorPolicy {
    /// Fail the query even though its rows were read.
    ///
    /// Only the caller that executed the query writes back, so callers that
    /// joined the same in-flight execution still get their rows.
    #[default]
    Fail,
    /// Log a warning and return the rows
    Log,
}

/// Cache layer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacherConfig {
    /// Expiry of every stored result, in milliseconds
    pub ttl_ms: u64,
    /// Record type names whose results are cached
    pub models: Vec<String>,
    pub key: KeyConfig,
    pub codec: CodecKind,
    pub write_error_policy: WriteErrorPolicy,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    pub memory: MemoryStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for CacherConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 60_000,
            models: Vec::new(),
            key: KeyConfig::default(),
            codec: CodecKind::Json,
            write_error_policy: WriteErrorPolicy::Fail,
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            memory: MemoryStoreConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl CacherConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: CacherConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Expiry as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.ttl_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "ttl_ms must be greater than zero".to_string(),
            ));
        }
        if self.ttl() > MAX_TTL {
            return Err(CacheError::InvalidConfig(format!(
                "ttl_ms must not exceed {}",
                MAX_TTL.as_millis()
            )));
        }
        if self.models.iter().any(|name| name.trim().is_empty()) {
            return Err(CacheError::InvalidConfig(
                "model names must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl StoreConfig {
    /// Open the configured backend
    pub async fn open(&self) -> Result<Arc<dyn CacheStore>, StoreError> {
        match self.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryStore::new(self.memory.clone()))),
            #[cfg(feature = "redis")]
            StoreBackend::Redis => Ok(Arc::new(
                crate::store::RedisStore::connect(&self.redis_url).await?,
            )),
            #[cfg(not(feature = "redis"))]
            StoreBackend::Redis => Err(StoreError::Unavailable(
                "built without the `redis` feature".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CacherConfig::default();
        assert_eq!(config.ttl(), Duration::from_secs(60));
        assert_eq!(config.codec, CodecKind::Json);
        assert_eq!(config.write_error_policy, WriteErrorPolicy::Fail);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_with_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "ttl_ms: 1500\n\
             models: [User, Pet]\n\
             key:\n  prefix: \"app:\"\n  hash: true\n  placeholder: dollar\n\
             codec: msgpack\n\
             write_error_policy: log\n\
             store:\n  memory:\n    max_memory_mb: 64\n"
        )
        .unwrap();

        let config = CacherConfig::from_file(file.path()).unwrap();
        assert_eq!(config.ttl(), Duration::from_millis(1500));
        assert_eq!(config.models, vec!["User", "Pet"]);
        assert_eq!(config.key.prefix, "app:");
        assert!(config.key.hash);
        assert_eq!(config.key.placeholder, crate::query::Placeholder::Dollar);
        assert_eq!(config.codec, CodecKind::MsgPack);
        assert_eq!(config.write_error_policy, WriteErrorPolicy::Log);
        assert_eq!(config.store.memory.max_memory_mb, 64);
        assert_eq!(config.store.memory.ttl_cleanup_interval_ms, 1000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ttl_ms: 0").unwrap();

        let err = CacherConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("ttl_ms"));
    }

    #[test]
    fn test_oversized_ttl_rejected() {
        let config = CacherConfig {
            ttl_ms: u64::MAX,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = CacherConfig {
            models: vec!["User".to_string()],
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: CacherConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let store = StoreConfig::default().open().await.unwrap();
        store
            .set("k", "v".to_string(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }
}
