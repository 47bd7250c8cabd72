use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::memory::MemoryStore;
use super::remote::RedisStore;
use super::sqlite::SqliteStore;
use super::{CacheStore, Clock, LogRecord};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Connected,
    Degraded,
}

/// Wraps a persistent backend. The first failed operation moves it to
/// `Degraded` for the rest of the process and every later call is served
/// from memory. Callers never see a store error.
pub struct FailoverStore {
    primary: Option<Arc<dyn CacheStore>>,
    fallback: MemoryStore,
    degraded: AtomicBool,
}

/// Runs `$call` against the primary while connected, and against the
/// in-memory fallback once degraded or when the primary call fails.
macro_rules! route {
    ($self:ident, $op:literal, |$store:ident| $call:expr) => {{
        if let Some($store) = $self.live() {
            match $call.await {
                Ok(value) => return Ok(value),
                Err(e) => $self.degrade($op, &e),
            }
        }
        let $store = &$self.fallback;
        $call.await
    }};
}

impl FailoverStore {
    pub fn connected(primary: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            primary: Some(primary),
            fallback: MemoryStore::new(clock),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn degraded(clock: Arc<dyn Clock>) -> Self {
        Self {
            primary: None,
            fallback: MemoryStore::new(clock),
            degraded: AtomicBool::new(true),
        }
    }

    pub async fn connect_redis(url: &str, clock: Arc<dyn Clock>) -> Self {
        match RedisStore::connect(url).await {
            Ok(store) => Self::connected(Arc::new(store), clock),
            Err(e) => {
                tracing::error!("Remote cache unreachable, using in-memory cache: {}", e);
                Self::degraded(clock)
            }
        }
    }

    pub async fn connect_sqlite(path: &str, clock: Arc<dyn Clock>) -> Self {
        match SqliteStore::open(path, clock.clone()).await {
            Ok(store) => Self::connected(Arc::new(store), clock),
            Err(e) => {
                tracing::error!("SQLite cache at {} unusable, using in-memory cache: {}", path, e);
                Self::degraded(clock)
            }
        }
    }

    pub fn state(&self) -> StoreState {
        if self.degraded.load(Ordering::SeqCst) {
            StoreState::Degraded
        } else {
            StoreState::Connected
        }
    }

    fn live(&self) -> Option<&Arc<dyn CacheStore>> {
        match self.state() {
            StoreState::Connected => self.primary.as_ref(),
            StoreState::Degraded => None,
        }
    }

    fn degrade(&self, op: &str, err: &StoreError) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            tracing::error!(
                "Cache store failed during {}, switching to in-memory cache: {}",
                op,
                err
            );
        }
    }
}

#[async_trait]
impl CacheStore for FailoverStore {
    fn backend_name(&self) -> &'static str {
        match self.live() {
            Some(primary) => primary.backend_name(),
            None => self.fallback.backend_name(),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        route!(self, "get", |store| store.get(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        route!(self, "set", |store| store.set(key, value, ttl))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        route!(self, "delete", |store| store.delete(key))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        route!(self, "clear", |store| store.clear())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        route!(self, "count", |store| store.count())
    }

    async fn get_aux(&self, key: &str) -> Result<Option<String>, StoreError> {
        route!(self, "get_aux", |store| store.get_aux(key))
    }

    async fn set_aux(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        route!(self, "set_aux", |store| store.set_aux(key, value, ttl))
    }

    async fn get_stats(&self) -> Result<Option<String>, StoreError> {
        route!(self, "get_stats", |store| store.get_stats())
    }

    async fn set_stats(&self, value: &str) -> Result<(), StoreError> {
        route!(self, "set_stats", |store| store.set_stats(value))
    }

    async fn clear_stats(&self) -> Result<(), StoreError> {
        route!(self, "clear_stats", |store| store.clear_stats())
    }

    async fn add_log(&self, level: &str, message: &str) -> Result<(), StoreError> {
        route!(self, "add_log", |store| store.add_log(level, message))
    }

    async fn get_logs(&self, limit: usize, offset: usize) -> Result<Vec<LogRecord>, StoreError> {
        route!(self, "get_logs", |store| store.get_logs(limit, offset))
    }

    async fn log_count(&self) -> Result<usize, StoreError> {
        route!(self, "log_count", |store| store.log_count())
    }

    async fn clear_logs(&self) -> Result<(), StoreError> {
        route!(self, "clear_logs", |store| store.clear_logs())
    }
}
