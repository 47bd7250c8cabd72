///! Key/value cache store: advisory records, identity lookups, the stats blob and the log list

pub mod failover;
pub mod memory;
pub mod remote;
pub mod sqlite;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;
use crate::error::StoreError;
pub use failover::{FailoverStore, StoreState};

/// Seconds since the unix epoch. Injected so expiry can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Hand-driven clock for tests.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_secs() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Absolute expiry for an entry written at `now`. 0 means never.
pub(crate) fn expiry_at(now: i64, ttl: Option<Duration>) -> i64 {
    match ttl {
        Some(ttl) if !ttl.is_zero() => now + ttl.as_secs().max(1) as i64,
        _ => 0,
    }
}

pub(crate) fn is_live(expires: i64, now: i64) -> bool {
    expires == 0 || expires > now
}

/// One persisted log line, newest first when listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

impl LogRecord {
    pub fn now(level: &str, message: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: level.to_string(),
            message: message.to_string(),
        }
    }
}

/// Values are opaque JSON strings. Keys are case-insensitive and stored lower-cased.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// `ttl` of `None` or zero never expires
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    /// Drops advisory records and identity lookups
    async fn clear(&self) -> Result<(), StoreError>;
    async fn count(&self) -> Result<usize, StoreError>;

    async fn get_aux(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set_aux(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn get_stats(&self) -> Result<Option<String>, StoreError>;
    async fn set_stats(&self, value: &str) -> Result<(), StoreError>;
    async fn clear_stats(&self) -> Result<(), StoreError>;

    async fn add_log(&self, level: &str, message: &str) -> Result<(), StoreError>;
    async fn get_logs(&self, limit: usize, offset: usize) -> Result<Vec<LogRecord>, StoreError>;
    async fn log_count(&self) -> Result<usize, StoreError>;
    async fn clear_logs(&self) -> Result<(), StoreError>;
}

pub(crate) fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Picks Redis when a remote URL is configured, SQLite otherwise. Both sit
/// behind a [`FailoverStore`] so an unreachable backend degrades to memory.
pub async fn open_store(config: &BackendConfig, clock: Arc<dyn Clock>) -> Arc<dyn CacheStore> {
    match config.remote_cache_url.as_deref() {
        Some(url) => Arc::new(FailoverStore::connect_redis(url, clock).await),
        None => Arc::new(FailoverStore::connect_sqlite(&config.sqlite_path, clock).await),
    }
}
