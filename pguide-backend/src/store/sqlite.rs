use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{expiry_at, is_live, normalize_key, CacheStore, Clock, LogRecord};
use crate::error::StoreError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS entries (key TEXT PRIMARY KEY, val TEXT NOT NULL, exp INTEGER NOT NULL);
    CREATE TABLE IF NOT EXISTS lookup_cache (key TEXT PRIMARY KEY, value TEXT NOT NULL, expires INTEGER NOT NULL);
    CREATE TABLE IF NOT EXISTS stats (key TEXT PRIMARY KEY, value TEXT NOT NULL);
    CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        level TEXT NOT NULL,
        message TEXT NOT NULL
    );
";

const STATS_KEY: &str = "stats";

/// Embedded store. Each operation opens its own connection on the blocking pool.
pub struct SqliteStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    pub async fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            clock,
        };
        store.with_conn(|conn| conn.execute_batch(SCHEMA)).await?;
        tracing::info!("SQLite cache ready at {}", store.path.display());
        Ok(store)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            conn.busy_timeout(Duration::from_secs(60))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?;
        Ok(result?)
    }

    async fn read_expiring(&self, table: &'static str, key: &str) -> Result<Option<String>, StoreError> {
        let key = normalize_key(key);
        let now = self.clock.now();
        self.with_conn(move |conn| {
            let (value_col, exp_col) = columns(table);
            let row: Option<(String, i64)> = conn
                .query_row(
                    &format!("SELECT {}, {} FROM {} WHERE key = ?1", value_col, exp_col, table),
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match row {
                Some((value, expires)) if is_live(expires, now) => Ok(Some(value)),
                Some(_) => {
                    conn.execute(&format!("DELETE FROM {} WHERE key = ?1", table), params![key])?;
                    Ok(None)
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn write_expiring(
        &self,
        table: &'static str,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let key = normalize_key(key);
        let value = value.to_string();
        let expires = expiry_at(self.clock.now(), ttl);
        self.with_conn(move |conn| {
            let (value_col, exp_col) = columns(table);
            conn.execute(
                &format!(
                    "REPLACE INTO {} (key, {}, {}) VALUES (?1, ?2, ?3)",
                    table, value_col, exp_col
                ),
                params![key, value, expires],
            )?;
            Ok(())
        })
        .await
    }
}

fn columns(table: &str) -> (&'static str, &'static str) {
    match table {
        "entries" => ("val", "exp"),
        _ => ("value", "expires"),
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read_expiring("entries", key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.write_expiring("entries", key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = normalize_key(key);
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| conn.execute_batch("DELETE FROM entries; DELETE FROM lookup_cache;"))
            .await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let count: i64 = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE exp = 0 OR exp > ?1",
                    params![now],
                    |row| row.get(0),
                )
            })
            .await?;
        Ok(count as usize)
    }

    async fn get_aux(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read_expiring("lookup_cache", key).await
    }

    async fn set_aux(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.write_expiring("lookup_cache", key, value, ttl).await
    }

    async fn get_stats(&self) -> Result<Option<String>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM stats WHERE key = ?1",
                params![STATS_KEY],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn set_stats(&self, value: &str) -> Result<(), StoreError> {
        let value = value.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "REPLACE INTO stats (key, value) VALUES (?1, ?2)",
                params![STATS_KEY, value],
            )?;
            Ok(())
        })
        .await
    }

    async fn clear_stats(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| conn.execute_batch("DELETE FROM stats;")).await
    }

    async fn add_log(&self, level: &str, message: &str) -> Result<(), StoreError> {
        let record = LogRecord::now(level, message);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO logs (timestamp, level, message) VALUES (?1, ?2, ?3)",
                params![record.timestamp, record.level, record.message],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_logs(&self, limit: usize, offset: usize) -> Result<Vec<LogRecord>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, level, message FROM logs ORDER BY id DESC LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![limit as i64, offset as i64], |row| {
                Ok(LogRecord {
                    timestamp: row.get(0)?,
                    level: row.get(1)?,
                    message: row.get(2)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn log_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0)))
            .await?;
        Ok(count as usize)
    }

    async fn clear_logs(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| conn.execute_batch("DELETE FROM logs;")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ManualClock;

    async fn open_temp() -> (SqliteStore, Arc<ManualClock>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store = SqliteStore::open(dir.path().join("cache.sqlite"), clock.clone())
            .await
            .unwrap();
        (store, clock, dir)
    }

    #[tokio::test]
    async fn test_round_trip_and_overwrite() {
        let (store, _clock, _dir) = open_temp().await;
        store.set("imdb:tt0111161", "first", None).await.unwrap();
        store.set("IMDB:tt0111161", "second", None).await.unwrap();

        assert_eq!(store.get("imdb:tt0111161").await.unwrap().as_deref(), Some("second"));
        assert_eq!(store.count().await.unwrap(), 1);

        store.delete("imdb:tt0111161").await.unwrap();
        assert!(store.get("imdb:tt0111161").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted() {
        let (store, clock, _dir) = open_temp().await;
        store
            .set("kidsinmind:tt1", "v", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(61));

        assert!(store.get("kidsinmind:tt1").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_aux_is_separate_from_entries() {
        let (store, _clock, _dir) = open_temp().await;
        store
            .set_aux("omdb_id_inception_2010", "{\"imdbID\":\"tt1375666\"}", None)
            .await
            .unwrap();

        assert!(store.get("omdb_id_inception_2010").await.unwrap().is_none());
        assert!(store.get_aux("omdb_id_inception_2010").await.unwrap().is_some());
        assert_eq!(store.count().await.unwrap(), 0);

        store.clear().await.unwrap();
        assert!(store.get_aux("omdb_id_inception_2010").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_and_logs_persist_across_reopen() {
        let (store, clock, dir) = open_temp().await;
        store.set_stats("{\"total_hits\":3}").await.unwrap();
        store.add_log("INFO", "one").await.unwrap();
        store.add_log("WARN", "two").await.unwrap();

        let reopened = SqliteStore::open(dir.path().join("cache.sqlite"), clock)
            .await
            .unwrap();
        assert_eq!(reopened.get_stats().await.unwrap().as_deref(), Some("{\"total_hits\":3}"));
        assert_eq!(reopened.log_count().await.unwrap(), 2);

        let logs = reopened.get_logs(1, 0).await.unwrap();
        assert_eq!(logs[0].message, "two");

        reopened.clear_stats().await.unwrap();
        reopened.clear_logs().await.unwrap();
        assert!(reopened.get_stats().await.unwrap().is_none());
        assert_eq!(reopened.log_count().await.unwrap(), 0);
    }
}
