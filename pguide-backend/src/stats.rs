///! Best-effort usage statistics kept as a single JSON blob in the store

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pguide_common::Severity;
use serde::{Deserialize, Serialize};

use crate::store::{CacheStore, Clock};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsBlob {
    #[serde(default)]
    pub total_hits: u64,
    #[serde(default)]
    pub cached_hits: u64,
    #[serde(default)]
    pub fresh_hits: u64,
    #[serde(default)]
    pub hits_by_year: BTreeMap<String, u64>,
    #[serde(default)]
    pub hits_by_month: BTreeMap<String, u64>,
    #[serde(default)]
    pub hits_by_day: BTreeMap<String, u64>,
    /// Only the Sex & Nudity severity is tracked
    #[serde(default)]
    pub sex_nudity_categories: BTreeMap<String, u64>,
    #[serde(default)]
    pub countries: BTreeMap<String, u64>,
}

impl StatsBlob {
    pub fn record(&mut self, at: DateTime<Utc>, was_cache_hit: bool, sex_nudity: Option<Severity>, country: &str) {
        self.total_hits += 1;
        if was_cache_hit {
            self.cached_hits += 1;
        } else {
            self.fresh_hits += 1;
        }

        *self.hits_by_year.entry(at.format("%Y").to_string()).or_default() += 1;
        *self.hits_by_month.entry(at.format("%Y-%m").to_string()).or_default() += 1;
        *self.hits_by_day.entry(at.format("%Y-%m-%d").to_string()).or_default() += 1;

        if let Some(severity) = sex_nudity {
            *self.sex_nudity_categories.entry(severity.to_string()).or_default() += 1;
        }
        *self.countries.entry(country.to_string()).or_default() += 1;
    }

    /// Blob as presented to readers, with `total_hits = cached_hits + fresh_hits`.
    pub fn reconciled(mut self) -> Self {
        self.total_hits = self.cached_hits + self.fresh_hits;
        self
    }
}

/// Read-modify-write over the store's stats blob. Concurrent updates may
/// overwrite each other; failures are logged and swallowed.
pub struct StatsAggregator {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn record(&self, was_cache_hit: bool, sex_nudity: Option<Severity>, country: &str) {
        let at = DateTime::from_timestamp(self.clock.now(), 0).unwrap_or_default();
        let mut blob = self.load().await;
        blob.record(at, was_cache_hit, sex_nudity, country);

        match serde_json::to_string(&blob) {
            Ok(json) => {
                if let Err(e) = self.store.set_stats(&json).await {
                    tracing::warn!("Failed to save stats: {}", e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize stats: {}", e),
        }
    }

    pub async fn snapshot(&self) -> StatsBlob {
        let blob = self.load().await;
        if blob.total_hits != blob.cached_hits + blob.fresh_hits {
            tracing::warn!(
                "Stats total {} != cached {} + fresh {}, reconciling",
                blob.total_hits,
                blob.cached_hits,
                blob.fresh_hits
            );
        }
        blob.reconciled()
    }

    pub async fn reset(&self) -> Result<(), crate::error::StoreError> {
        self.store.clear_stats().await
    }

    async fn load(&self) -> StatsBlob {
        match self.store.get_stats().await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("Stats blob unreadable, starting over: {}", e);
                StatsBlob::default()
            }),
            Ok(None) => StatsBlob::default(),
            Err(e) => {
                tracing::warn!("Failed to load stats: {}", e);
                StatsBlob::default()
            }
        }
    }
}

/// Country bucket for a request. `client` is the first forwarded address or
/// the peer address; `header_country` is an edge-supplied country code.
pub fn country_for(client: Option<&str>, header_country: Option<&str>) -> String {
    if let Some(client) = client.map(str::trim).filter(|c| !c.is_empty()) {
        match client.parse::<IpAddr>() {
            Ok(ip) if is_private(&ip) => return "Private IP".to_string(),
            Ok(_) => {}
            Err(_) => return "Invalid IP".to_string(),
        }
    }

    match header_country.map(str::trim) {
        Some(code) if !code.is_empty() && !code.eq_ignore_ascii_case("XX") => code.to_uppercase(),
        _ => "Unknown".to_string(),
    }
}

fn is_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}
