//! Read-path interception

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::codec::{self, Codec, JsonCodec};
use crate::coalesce::Group;
use crate::config::{CacherConfig, WriteErrorPolicy};
use crate::error::{CacheError, NAME, Result};
use crate::executor::{QueryExecutor, Row, scan};
use crate::key::{CacheKeyFn, KeyBuilder, KeyConfig, explain_key_fn};
use crate::model::{Model, ModelSet, Record};
use crate::query::{Query, ResultSet, Shape, StandardDialect, Statement};
use crate::store::{CacheStore, MAX_TTL};

/// Where the rows of an intercepted query came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Decoded from a stored payload; the executor was not called
    Cache,
    /// This caller executed the query
    Database,
    /// Another in-flight caller executed the query and shared its rows
    Coalesced,
    /// Dry-run statement; neither the store nor the executor was touched
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOutcome {
    pub rows_affected: u64,
    pub source: Source,
}

type Shared = std::result::Result<Arc<Vec<Row>>, crate::error::QueryError>;

/// Cache-aside layer in front of a [`QueryExecutor`]
///
/// Settings are fixed at construction; one instance is meant to be shared by
/// every task issuing reads.
pub struct QueryCacher {
    store: Arc<dyn CacheStore>,
    models: ModelSet,
    keys: KeyBuilder,
    codec: Arc<dyn Codec>,
    ttl: Duration,
    write_error_policy: WriteErrorPolicy,
    group: Group<Shared>,
}

/// Builder for [`QueryCacher`]
pub struct QueryCacherBuilder {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    models: Vec<String>,
    key_fn: Option<CacheKeyFn>,
    key_config: KeyConfig,
    codec: Arc<dyn Codec>,
    write_error_policy: WriteErrorPolicy,
}

impl QueryCacherBuilder {
    /// Register `T` as cacheable
    pub fn model<T: Model + ?Sized>(mut self) -> Self {
        self.models.push(T::model_name().to_string());
        self
    }

    /// Register the record type of an example value (a record, a reference,
    /// a slice or a vector of records)
    pub fn model_of<T: Model + ?Sized>(self, _example: &T) -> Self {
        self.model::<T>()
    }

    /// Register a record type by name
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.models.push(name.into());
        self
    }

    /// Replace the default key function (the statement rendered with its
    /// parameters inlined)
    pub fn cache_key_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Query) -> String + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(f));
        self
    }

    pub fn key_config(mut self, config: KeyConfig) -> Self {
        self.key_config = config;
        self
    }

    pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn write_error_policy(mut self, policy: WriteErrorPolicy) -> Self {
        self.write_error_policy = policy;
        self
    }

    pub fn build(self) -> std::result::Result<QueryCacher, CacheError> {
        if self.models.is_empty() {
            return Err(CacheError::NoModels);
        }
        if self.ttl.is_zero() {
            return Err(CacheError::InvalidConfig(
                "ttl must be greater than zero".to_string(),
            ));
        }
        if self.ttl > MAX_TTL {
            return Err(CacheError::InvalidConfig(format!(
                "ttl must not exceed {:?}",
                MAX_TTL
            )));
        }

        let func = self.key_fn.unwrap_or_else(|| {
            explain_key_fn(StandardDialect::new(self.key_config.placeholder))
        });
        let models = ModelSet::from_names(self.models);

        info!(
            "Initialized {} cacher: models={:?}, ttl={:?}, codec={}, write_error_policy={:?}",
            NAME,
            models.names(),
            self.ttl,
            self.codec.name(),
            self.write_error_policy
        );

        Ok(QueryCacher {
            store: self.store,
            models,
            keys: KeyBuilder::new(func, &self.key_config),
            codec: self.codec,
            ttl: self.ttl,
            write_error_policy: self.write_error_policy,
            group: Group::new(),
        })
    }
}

impl QueryCacher {
    pub fn builder(store: Arc<dyn CacheStore>, ttl: Duration) -> QueryCacherBuilder {
        QueryCacherBuilder {
            store,
            ttl,
            models: Vec::new(),
            key_fn: None,
            key_config: KeyConfig::default(),
            codec: Arc::new(JsonCodec),
            write_error_policy: WriteErrorPolicy::default(),
        }
    }

    /// Build from loaded configuration, with the default key function
    pub fn from_config(
        store: Arc<dyn CacheStore>,
        config: &CacherConfig,
    ) -> std::result::Result<Self, CacheError> {
        config.validate()?;
        let mut builder = Self::builder(store, config.ttl())
            .key_config(config.key.clone())
            .write_error_policy(config.write_error_policy);
        builder.codec = config.codec.build();
        config
            .models
            .iter()
            .fold(builder, |builder, name| builder.model_name(name.clone()))
            .build()
    }

    pub fn name(&self) -> &'static str {
        NAME
    }

    pub fn models(&self) -> &ModelSet {
        &self.models
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether results for `T` go through the cache
    pub fn is_eligible<T: Model + ?Sized>(&self) -> bool {
        self.models.is_eligible::<T>()
    }

    /// The key a query's result is stored under
    pub fn key_for(&self, query: &Query) -> String {
        self.keys.key_for(query)
    }

    /// Run a read statement through the cache.
    ///
    /// On a hit the destination is filled from the stored payload and the
    /// executor is not called. On a miss the query executes once per key
    /// across concurrent callers, every caller's destination is scanned from
    /// the shared rows, and the executing caller stores the encoded result.
    /// Store and codec failures are returned as [`CacheError`]; they never
    /// fall back to executing the query.
    pub async fn query<R, E>(&self, executor: &E, stmt: &mut Statement<R>) -> Result<QueryOutcome>
    where
        R: Record,
        E: QueryExecutor + ?Sized,
    {
        if stmt.is_dry_run() {
            debug!("Dry run for {}, skipping cache", R::model_name());
            return Ok(QueryOutcome {
                rows_affected: 0,
                source: Source::DryRun,
            });
        }

        if !self.is_eligible::<R>() {
            return self.execute(executor, stmt).await;
        }

        let shape = stmt.dest().shape();
        if !shape.is_cacheable() {
            info!(
                "{}: {} destination for {} is not cacheable, executing directly",
                NAME,
                shape.as_str(),
                R::model_name()
            );
            return self.execute(executor, stmt).await;
        }

        let key = self.keys.key_for(stmt.query());

        if let Some(payload) = self.store.get(&key).await? {
            let rows_affected = codec::decode(self.codec.as_ref(), &payload, stmt.dest_mut())?;
            debug!("Cache hit key={}, records={}", key, rows_affected);
            return Ok(QueryOutcome {
                rows_affected,
                source: Source::Cache,
            });
        }
        debug!("Cache miss key={}", key);

        let query = stmt.query();
        let shared = self
            .group
            .work(&key, move || async move { executor.query(query).await.map(Arc::new) })
            .await
            .map_err(|_| CacheError::Abandoned { key: key.clone() })?;

        let rows = shared.value?;
        let rows_affected = scan(&rows, stmt.dest_mut())?;

        if !shared.leader {
            return Ok(QueryOutcome {
                rows_affected,
                source: Source::Coalesced,
            });
        }

        // A single-record read that found nothing is not a result to replay
        if stmt.dest().shape() == Shape::Single && rows_affected == 0 {
            debug!("No record for key={}, not stored", key);
        } else {
            self.write_back(&key, stmt.dest()).await?;
        }
        Ok(QueryOutcome {
            rows_affected,
            source: Source::Database,
        })
    }

    async fn execute<R, E>(&self, executor: &E, stmt: &mut Statement<R>) -> Result<QueryOutcome>
    where
        R: Record,
        E: QueryExecutor + ?Sized,
    {
        let rows = executor.query(stmt.query()).await?;
        let rows_affected = scan(&rows, stmt.dest_mut())?;
        Ok(QueryOutcome {
            rows_affected,
            source: Source::Database,
        })
    }

    async fn write_back<R: Record>(&self, key: &str, result: &ResultSet<R>) -> Result<()> {
        match (self.store_result(key, result).await, self.write_error_policy) {
            (Ok(()), _) => Ok(()),
            (Err(err), WriteErrorPolicy::Log) => {
                warn!("Failed to store result for key={}: {}", key, err);
                Ok(())
            }
            (Err(err), WriteErrorPolicy::Fail) => Err(err.into()),
        }
    }

    async fn store_result<R: Record>(
        &self,
        key: &str,
        result: &ResultSet<R>,
    ) -> std::result::Result<(), CacheError> {
        let Some(payload) = codec::encode(self.codec.as_ref(), result)? else {
            info!("{}: {} result not stored", NAME, result.shape().as_str());
            return Ok(());
        };

        let size = payload.len();
        self.store.set(key, payload, self.ttl).await?;
        debug!("Stored key={}, size={}, ttl={:?}", key, size, self.ttl);
        Ok(())
    }
}

impl std::fmt::Debug for QueryCacher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCacher")
            .field("models", &self.models)
            .field("keys", &self.keys)
            .field("codec", &self.codec.name())
            .field("ttl", &self.ttl)
            .field("write_error_policy", &self.write_error_policy)
            .finish_non_exhaustive()
    }
}
