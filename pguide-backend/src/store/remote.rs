use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::time::timeout;

use super::{normalize_key, CacheStore, LogRecord};
use crate::error::StoreError;

const ENTRY_PREFIX: &str = "cache:";
const LOOKUP_PREFIX: &str = "lookup:";
const STATS_KEY: &str = "stats";
const LOGS_KEY: &str = "logs";
const OP_TIMEOUT: Duration = Duration::from_secs(5);
const SCAN_BATCH: usize = 500;

/// Redis-backed store. Expiry is delegated to Redis key TTLs.
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Opens a multiplexed connection and verifies it with PING.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let mut conn = timeout(OP_TIMEOUT, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| StoreError::Timeout("connect"))??;
        let _: String = timeout(OP_TIMEOUT, redis::cmd("PING").query_async(&mut conn))
            .await
            .map_err(|_| StoreError::Timeout("ping"))??;
        tracing::info!("Connected to remote cache");
        Ok(Self { conn })
    }

    async fn run<T, Fut>(&self, op: &'static str, fut: impl FnOnce(MultiplexedConnection) -> Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(OP_TIMEOUT, fut(self.conn.clone())).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Timeout(op)),
        }
    }

    async fn scan_keys(&self, pattern: String) -> Result<Vec<String>, StoreError> {
        self.run("scan", |mut conn| async move {
            let mut cursor: u64 = 0;
            let mut keys = Vec::new();
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn)
                    .await?;
                keys.extend(batch);
                if next == 0 {
                    return Ok(keys);
                }
                cursor = next;
            }
        })
        .await
    }

    async fn read(&self, key: String) -> Result<Option<String>, StoreError> {
        self.run("get", |mut conn| async move { conn.get(key).await }).await
    }

    async fn write(&self, key: String, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let value = value.to_string();
        self.run("set", |mut conn| async move {
            match ttl {
                Some(ttl) if !ttl.is_zero() => {
                    redis::cmd("SET")
                        .arg(key)
                        .arg(value)
                        .arg("EX")
                        .arg(ttl.as_secs().max(1))
                        .query_async(&mut conn)
                        .await
                }
                _ => conn.set(key, value).await,
            }
        })
        .await
    }
}

fn entry_key(key: &str) -> String {
    format!("{}{}", ENTRY_PREFIX, normalize_key(key))
}

fn lookup_key(key: &str) -> String {
    format!("{}{}", LOOKUP_PREFIX, normalize_key(key))
}

#[async_trait]
impl CacheStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read(entry_key(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.write(entry_key(key), value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = entry_key(key);
        self.run("del", |mut conn| async move { conn.del(key).await }).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut keys = self.scan_keys(format!("{}*", ENTRY_PREFIX)).await?;
        keys.extend(self.scan_keys(format!("{}*", LOOKUP_PREFIX)).await?);
        if keys.is_empty() {
            return Ok(());
        }
        tracing::info!("Clearing {} remote cache keys", keys.len());
        self.run("del", |mut conn| async move { conn.del(keys).await }).await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.scan_keys(format!("{}*", ENTRY_PREFIX)).await?.len())
    }

    async fn get_aux(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read(lookup_key(key)).await
    }

    async fn set_aux(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.write(lookup_key(key), value, ttl).await
    }

    async fn get_stats(&self) -> Result<Option<String>, StoreError> {
        self.read(STATS_KEY.to_string()).await
    }

    async fn set_stats(&self, value: &str) -> Result<(), StoreError> {
        self.write(STATS_KEY.to_string(), value, None).await
    }

    async fn clear_stats(&self) -> Result<(), StoreError> {
        self.run("del", |mut conn| async move { conn.del(STATS_KEY).await }).await
    }

    async fn add_log(&self, level: &str, message: &str) -> Result<(), StoreError> {
        let line = serde_json::to_string(&LogRecord::now(level, message))?;
        self.run("lpush", |mut conn| async move { conn.lpush(LOGS_KEY, line).await }).await
    }

    async fn get_logs(&self, limit: usize, offset: usize) -> Result<Vec<LogRecord>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = (offset + limit - 1) as isize;
        let lines: Vec<String> = self
            .run("lrange", |mut conn| async move {
                conn.lrange(LOGS_KEY, offset as isize, stop).await
            })
            .await?;

        Ok(lines
            .iter()
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping malformed log entry: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn log_count(&self) -> Result<usize, StoreError> {
        self.run("llen", |mut conn| async move { conn.llen(LOGS_KEY).await }).await
    }

    async fn clear_logs(&self) -> Result<(), StoreError> {
        self.run("del", |mut conn| async move { conn.del(LOGS_KEY).await }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefixes() {
        assert_eq!(entry_key("IMDB:tt0111161"), "cache:imdb:tt0111161");
        assert_eq!(lookup_key("omdb_id_Inception_2010"), "lookup:omdb_id_inception_2010");
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        assert!(RedisStore::connect("redis://127.0.0.1:1/").await.is_err());
    }

    #[tokio::test]
    #[ignore = "requires a running redis at REDIS_TEST_URL"]
    async fn test_live_round_trip() {
        let url = std::env::var("REDIS_TEST_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let store = RedisStore::connect(&url).await.unwrap();
        store
            .set("test:pguide", "value", Some(Duration::from_secs(30)))
            .await
            .unwrap();
        assert_eq!(store.get("TEST:pguide").await.unwrap().as_deref(), Some("value"));
        store.delete("test:pguide").await.unwrap();
        assert!(store.get("test:pguide").await.unwrap().is_none());
    }
}
