use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{expiry_at, is_live, normalize_key, CacheStore, Clock, LogRecord};
use crate::error::StoreError;

type Entries = RwLock<HashMap<String, (String, i64)>>;

/// Oldest log lines are dropped past this many
pub const MAX_LOGS: usize = 1000;

/// Process-local store. Also the degraded-mode fallback of [`super::FailoverStore`].
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    entries: Entries,
    aux: Entries,
    stats: RwLock<Option<String>>,
    logs: RwLock<VecDeque<LogRecord>>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: RwLock::new(HashMap::new()),
            aux: RwLock::new(HashMap::new()),
            stats: RwLock::new(None),
            logs: RwLock::new(VecDeque::new()),
        }
    }

    async fn read(&self, map: &Entries, key: &str) -> Option<String> {
        let key = normalize_key(key);
        let now = self.clock.now();
        {
            let map = map.read().await;
            match map.get(&key) {
                Some((value, expires)) if is_live(*expires, now) => return Some(value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: evict unless someone rewrote it meanwhile
        let mut map = map.write().await;
        if let Some((_, expires)) = map.get(&key) {
            if !is_live(*expires, now) {
                map.remove(&key);
            }
        }
        None
    }

    async fn write(&self, map: &Entries, key: &str, value: &str, ttl: Option<Duration>) {
        let now = self.clock.now();
        let mut map = map.write().await;
        // Sweep so keys that are never read again do not pile up
        map.retain(|_, (_, exp)| is_live(*exp, now));
        map.insert(normalize_key(key), (value.to_string(), expiry_at(now, ttl)));
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read(&self.entries, key).await)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.write(&self.entries, key, value, ttl).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(&normalize_key(key));
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.write().await.clear();
        self.aux.write().await.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries.values().filter(|(_, exp)| is_live(*exp, now)).count())
    }

    async fn get_aux(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read(&self.aux, key).await)
    }

    async fn set_aux(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.write(&self.aux, key, value, ttl).await;
        Ok(())
    }

    async fn get_stats(&self) -> Result<Option<String>, StoreError> {
        Ok(self.stats.read().await.clone())
    }

    async fn set_stats(&self, value: &str) -> Result<(), StoreError> {
        *self.stats.write().await = Some(value.to_string());
        Ok(())
    }

    async fn clear_stats(&self) -> Result<(), StoreError> {
        *self.stats.write().await = None;
        Ok(())
    }

    async fn add_log(&self, level: &str, message: &str) -> Result<(), StoreError> {
        let mut logs = self.logs.write().await;
        logs.push_back(LogRecord::now(level, message));
        while logs.len() > MAX_LOGS {
            logs.pop_front();
        }
        Ok(())
    }

    async fn get_logs(&self, limit: usize, offset: usize) -> Result<Vec<LogRecord>, StoreError> {
        let logs = self.logs.read().await;
        Ok(logs.iter().rev().skip(offset).take(limit).cloned().collect())
    }

    async fn log_count(&self) -> Result<usize, StoreError> {
        Ok(self.logs.read().await.len())
    }

    async fn clear_logs(&self) -> Result<(), StoreError> {
        self.logs.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ManualClock;

    fn store_with_clock() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        (MemoryStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_get_set_is_case_insensitive() {
        let (store, _) = store_with_clock();
        store.set("IMDB:tt0111161", "{\"a\":1}", None).await.unwrap();
        assert_eq!(store.get("imdb:TT0111161").await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let (store, clock) = store_with_clock();
        store
            .set("dove:tt1", "v", Some(Duration::from_secs(30 * 86_400)))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(29 * 86_400));
        assert!(store.get("dove:tt1").await.unwrap().is_some());

        clock.advance(Duration::from_secs(2 * 86_400));
        assert!(store.get("dove:tt1").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let (store, clock) = store_with_clock();
        store.set("k", "v", Some(Duration::ZERO)).await.unwrap();
        clock.advance(Duration::from_secs(10 * 365 * 86_400));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_clear_keeps_stats_and_logs() {
        let (store, _) = store_with_clock();
        store.set("a", "1", None).await.unwrap();
        store.set_aux("omdb_id_x_none", "{}", None).await.unwrap();
        store.set_stats("{}").await.unwrap();
        store.add_log("INFO", "hello").await.unwrap();

        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.get_aux("omdb_id_x_none").await.unwrap().is_none());
        assert!(store.get_stats().await.unwrap().is_some());
        assert_eq!(store.log_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_logs_newest_first_with_paging() {
        let (store, _) = store_with_clock();
        for i in 0..5 {
            store.add_log("INFO", &format!("line {}", i)).await.unwrap();
        }
        let page = store.get_logs(2, 1).await.unwrap();
        let messages: Vec<_> = page.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["line 3", "line 2"]);
    }

    #[tokio::test]
    async fn test_expired_entries_swept_on_write() {
        let (store, clock) = store_with_clock();
        for i in 0..100 {
            store.set(&format!("imdb:tt{}", i), "v", Some(Duration::from_secs(1))).await.unwrap();
        }
        store.set_aux("omdb_id_old_none", "{}", Some(Duration::from_secs(1))).await.unwrap();
        store.set("forever", "v", None).await.unwrap();

        clock.advance(Duration::from_secs(10));
        store.set("imdb:tt_new", "v", Some(Duration::from_secs(60))).await.unwrap();
        store.set_aux("omdb_id_new_none", "{}", None).await.unwrap();

        assert_eq!(store.entries.read().await.len(), 2);
        assert_eq!(store.aux.read().await.len(), 1);
        assert_eq!(store.get("forever").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_logs_are_capped() {
        let (store, _) = store_with_clock();
        for i in 0..MAX_LOGS + 500 {
            store.add_log("INFO", &format!("line {}", i)).await.unwrap();
        }
        assert_eq!(store.log_count().await.unwrap(), MAX_LOGS);

        let newest = store.get_logs(1, 0).await.unwrap();
        assert_eq!(newest[0].message, format!("line {}", MAX_LOGS + 499));
        let oldest = store.get_logs(1, MAX_LOGS - 1).await.unwrap();
        assert_eq!(oldest[0].message, "line 500");
    }
}
