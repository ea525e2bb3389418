//! Shared record types, executors and stores for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use sqlcache::{CacheStore, MemoryStore, Query, QueryError, QueryExecutor, Row, StoreError, record};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub active: bool,
}

record!(User { id, name as "user_name", email, active });

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Invoice {
    pub id: i64,
    pub total: f64,
}

record!(Invoice { id, total });

pub fn user_rows() -> Vec<Row> {
    vec![
        Row::new()
            .with("id", 1)
            .with("user_name", "ann")
            .with("email", "ann@example.com")
            .with("active", true),
        Row::new().with("id", 2).with("user_name", "bob"),
        Row::new()
            .with("id", 0)
            .with("user_name", "")
            .with("email", serde_json::Value::Null),
    ]
}

/// Executor returning fixed rows and counting calls
pub struct CountingExecutor {
    rows: Vec<Row>,
    delay: Duration,
    calls: AtomicUsize,
}

impl CountingExecutor {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Hold every execution open for `delay` so concurrent callers overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for CountingExecutor {
    async fn query(&self, _query: &Query) -> Result<Vec<Row>, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.rows.clone())
    }
}

/// Store wrapper counting operations, optionally failing reads
pub struct CountingStore {
    inner: MemoryStore,
    fail_get: bool,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_failing_get(false))
    }

    pub fn failing_get() -> Arc<Self> {
        Arc::new(Self::with_failing_get(true))
    }

    fn with_failing_get(fail_get: bool) -> Self {
        Self {
            inner: MemoryStore::default(),
            fail_get,
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await
    }
}
