///! Lookup flow for one (provider, title) request: validate, resolve identity,
///! serve from cache or fetch and normalize, record stats, persist successes

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pguide_common::{AdvisoryCategory, Provider, ProviderParseError, ReviewRecord, ReviewStatus};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::BackendConfig;
use crate::error::LookupError;
use crate::normalizer::normalize_record;
use crate::providers::{AdapterRegistry, TitleQuery};
use crate::resolver::IdentityResolver;
use crate::stats::StatsAggregator;
use crate::store::CacheStore;

#[derive(Debug, Clone, Default)]
pub struct LookupRequest {
    pub provider: Option<String>,
    pub imdb_id: Option<String>,
    pub video_name: Option<String>,
    pub release_year: Option<String>,
    /// Stats bucket, see [`crate::stats::country_for`]
    pub country: String,
}

#[derive(Debug, Clone, Copy)]
pub struct LookupPolicy {
    pub review_ttl: Duration,
    pub strict_identity: bool,
}

impl LookupPolicy {
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            review_ttl: config.review_ttl(),
            strict_identity: config.strict_identity,
        }
    }
}

impl Default for LookupPolicy {
    fn default() -> Self {
        Self {
            review_ttl: Duration::from_secs(60 * 60 * 24 * 30),
            strict_identity: false,
        }
    }
}

/// Serializes fetches per cache key so concurrent misses hit the provider once.
#[derive(Default)]
pub struct Coalescer {
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            // Entries nobody holds or waits on are dropped
            inflight.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                inflight
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

/// `provider:identifier`, lower-cased, using the provider's canonical slug so
/// every alias shares one entry.
pub fn cache_key(provider: Provider, identifier: &str) -> String {
    format!("{}:{}", provider.slug(), identifier.trim()).to_lowercase()
}

/// Turns URL leftovers back into a plain title.
fn clean_title(raw: Option<&str>) -> Option<String> {
    let title = raw?
        .replace("%20", " ")
        .replace("%3A", "")
        .replace("%3a", "")
        .replace('+', " ")
        .replace(':', "");
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

pub struct LookupOrchestrator {
    store: Arc<dyn CacheStore>,
    resolver: IdentityResolver,
    adapters: AdapterRegistry,
    stats: Arc<StatsAggregator>,
    coalescer: Coalescer,
    policy: LookupPolicy,
}

impl LookupOrchestrator {
    pub fn new(
        store: Arc<dyn CacheStore>,
        resolver: IdentityResolver,
        adapters: AdapterRegistry,
        stats: Arc<StatsAggregator>,
        policy: LookupPolicy,
    ) -> Self {
        Self {
            store,
            resolver,
            adapters,
            stats,
            coalescer: Coalescer::new(),
            policy,
        }
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    pub async fn lookup(&self, request: LookupRequest) -> Result<ReviewRecord, LookupError> {
        let provider: Provider = request
            .provider
            .as_deref()
            .ok_or(ProviderParseError::Empty)?
            .parse()?;

        let mut title = clean_title(request.video_name.as_deref());
        let mut id = non_empty(request.imdb_id.as_deref());
        let mut year = non_empty(request.release_year.as_deref());

        if id.is_none() && title.is_none() {
            return Err(LookupError::MissingIdentity);
        }

        if id.is_none() {
            match self.resolver.resolve(title.as_deref(), None, year.as_deref()).await {
                Some(resolved) => {
                    tracing::info!("Resolved '{}' to {}", title.as_deref().unwrap_or_default(), resolved.id);
                    id = Some(resolved.id);
                    year = year.or(resolved.year);
                }
                None if self.policy.strict_identity => {
                    return Err(LookupError::IdentityResolution(title.unwrap_or_default()));
                }
                None => tracing::warn!(
                    "Could not resolve an id for '{}', keying by title",
                    title.as_deref().unwrap_or_default()
                ),
            }
        }

        // One of the two is always set at this point
        let identifier = id.clone().or_else(|| title.clone()).unwrap_or_default();
        let key = cache_key(provider, &identifier);

        if let Some(record) = self.read_cached(&key).await {
            return Ok(self.finish_hit(record, &request.country).await);
        }

        let _guard = self.coalescer.acquire(&key).await;
        if let Some(record) = self.read_cached(&key).await {
            return Ok(self.finish_hit(record, &request.country).await);
        }

        let adapter = self
            .adapters
            .get(provider)
            .ok_or_else(|| LookupError::Internal(format!("no adapter registered for {}", provider)))?;

        if title.is_none() && adapter.needs_title() {
            let lookup_id = id.as_deref().unwrap_or_default();
            title = Some(
                self.resolver
                    .title_for_id(lookup_id)
                    .await
                    .ok_or_else(|| LookupError::TitleUnavailable(lookup_id.to_string()))?,
            );
        }

        let query = TitleQuery {
            id: id.clone(),
            title: title.clone(),
            year,
        };

        tracing::info!("Fetching {} from {}", key, provider);
        let mut record = match adapter.fetch(&query).await {
            Ok(Some(raw)) => normalize_record(raw),
            Ok(None) => {
                tracing::info!("{} has no page for {}", provider, identifier);
                return Err(LookupError::NotFound);
            }
            Err(e) => {
                tracing::error!("{} lookup for {} failed: {}", provider, identifier, e);
                ReviewRecord::failed(provider, id, title.unwrap_or(identifier))
            }
        };

        self.stats
            .record(false, record.severity_of(AdvisoryCategory::SexNudity), &request.country)
            .await;

        if record.status == ReviewStatus::Success && record.has_items() {
            self.persist(&key, &record).await;
        } else {
            tracing::info!("Not caching {}: no advisory content", key);
        }

        record.is_cached = Some(false);
        Ok(record)
    }

    async fn read_cached(&self, key: &str) -> Option<ReviewRecord> {
        let cached = match self.store.get(key).await {
            Ok(cached) => cached?,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str(&cached) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Dropping unreadable cache entry {}: {}", key, e);
                if let Err(e) = self.store.delete(key).await {
                    tracing::warn!("Failed to delete {}: {}", key, e);
                }
                None
            }
        }
    }

    async fn finish_hit(&self, mut record: ReviewRecord, country: &str) -> ReviewRecord {
        tracing::debug!("Cache hit for {} {:?}", record.provider, record.id);
        self.stats
            .record(true, record.severity_of(AdvisoryCategory::SexNudity), country)
            .await;
        record.is_cached = Some(true);
        record
    }

    async fn persist(&self, key: &str, record: &ReviewRecord) {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize {}: {}", key, e);
                return;
            }
        };
        match self.store.set(key, &json, Some(self.policy.review_ttl)).await {
            Ok(()) => tracing::info!("Cached {}", key),
            Err(e) => tracing::warn!("Failed to cache {}: {}", key, e),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::providers::{ProviderAdapter, RawAdvisoryItem, RawProviderRecord};
    use crate::resolver::tests::FakeCatalog;
    use crate::store::memory::MemoryStore;
    use crate::store::{Clock, ManualClock};
    use async_trait::async_trait;
    use pguide_common::Severity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) enum Behavior {
        Items(Vec<(&'static str, &'static str)>),
        Empty,
        Missing,
        Fail,
        Panic,
    }

    /// Adapter returning a canned answer and counting calls.
    pub(crate) struct FakeAdapter {
        pub provider: Provider,
        pub behavior: Behavior,
        pub calls: AtomicUsize,
        pub delay: Duration,
    }

    impl FakeAdapter {
        pub(crate) fn new(provider: Provider, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                provider,
                behavior,
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn provider(&self) -> Provider {
            self.provider
        }

        fn needs_title(&self) -> bool {
            self.provider != Provider::Imdb
        }

        async fn fetch(&self, query: &TitleQuery) -> Result<Option<RawProviderRecord>, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut record = RawProviderRecord::new(
                self.provider,
                query,
                query.title.clone().unwrap_or_else(|| "Fetched Title".to_string()),
            );
            match &self.behavior {
                Behavior::Items(items) => {
                    record.items = items
                        .iter()
                        .map(|(label, score)| RawAdvisoryItem::new(*label, *score, "detail"))
                        .collect();
                    Ok(Some(record))
                }
                Behavior::Empty => Ok(Some(record)),
                Behavior::Missing => Ok(None),
                Behavior::Fail => Err(AdapterError::Status {
                    status: 503,
                    url: "https://provider.test".into(),
                }),
                Behavior::Panic => panic!("adapter blew up"),
            }
        }
    }

    pub(crate) struct Harness {
        pub orchestrator: Arc<LookupOrchestrator>,
        pub store: Arc<MemoryStore>,
        pub clock: Arc<ManualClock>,
        pub catalog: Arc<FakeCatalog>,
    }

    pub(crate) fn harness(adapters: Vec<Arc<FakeAdapter>>, policy: LookupPolicy) -> Harness {
        let clock = Arc::new(ManualClock::new(1_792_238_400));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let catalog = Arc::new(FakeCatalog::with(&[
            ("The Shawshank Redemption", "tt0111161", "1994"),
            ("Inception", "tt1375666", "2010"),
        ]));

        let mut registry = AdapterRegistry::new();
        for adapter in adapters {
            registry.register(adapter);
        }

        let clock_dyn: Arc<dyn Clock> = clock.clone();
        let orchestrator = LookupOrchestrator::new(
            store.clone(),
            IdentityResolver::new(catalog.clone(), store.clone(), Duration::from_secs(86_400)),
            registry,
            Arc::new(StatsAggregator::new(store.clone(), clock_dyn)),
            policy,
        );

        Harness {
            orchestrator: Arc::new(orchestrator),
            store,
            clock,
            catalog,
        }
    }

    fn request(provider: &str, id: Option<&str>, title: Option<&str>) -> LookupRequest {
        LookupRequest {
            provider: Some(provider.to_string()),
            imdb_id: id.map(str::to_string),
            video_name: title.map(str::to_string),
            release_year: None,
            country: "US".to_string(),
        }
    }

    fn sample_record() -> String {
        serde_json::json!({
            "id": "tt0111161",
            "status": "Success",
            "title": "The Shawshank Redemption",
            "provider": "imdb",
            "recommended-age": null,
            "review-items": [{"name": "Sex & Nudity", "cat": "Mild", "description": "", "votes": null}],
            "review-link": null
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_cache_hit_skips_adapter() {
        let adapter = FakeAdapter::new(Provider::Imdb, Behavior::Fail);
        let h = harness(vec![adapter.clone()], LookupPolicy::default());
        h.store.set("imdb:tt0111161", &sample_record(), None).await.unwrap();

        let record = h
            .orchestrator
            .lookup(request("imdb", Some("tt0111161"), None))
            .await
            .unwrap();

        assert_eq!(record.is_cached, Some(true));
        assert_eq!(record.severity_of(AdvisoryCategory::SexNudity), Some(Severity::Mild));
        assert_eq!(adapter.calls(), 0);

        let stats = h.orchestrator.stats().snapshot().await;
        assert_eq!(stats.cached_hits, 1);
        assert_eq!(stats.sex_nudity_categories.get("Mild"), Some(&1));
    }

    #[tokio::test]
    async fn test_success_is_cached_with_ttl() {
        let adapter = FakeAdapter::new(Provider::ParentPreviews, Behavior::Items(vec![("Violence", "C+")]));
        let h = harness(vec![adapter.clone()], LookupPolicy::default());

        let first = h
            .orchestrator
            .lookup(request("parentpreviews", None, Some("Inception")))
            .await
            .unwrap();
        assert_eq!(first.is_cached, Some(false));
        assert_eq!(first.id.as_deref(), Some("tt1375666"));
        assert_eq!(first.severity_of(AdvisoryCategory::Violence), Some(Severity::Severe));

        let second = h
            .orchestrator
            .lookup(request("parentpreview", None, Some("Inception")))
            .await
            .unwrap();
        assert_eq!(second.is_cached, Some(true));
        assert_eq!(adapter.calls(), 1);

        // Entry is gone once the 30-day TTL passes
        h.clock.advance(Duration::from_secs(30 * 86_400 + 1));
        let third = h
            .orchestrator
            .lookup(request("parentpreviews", None, Some("Inception")))
            .await
            .unwrap();
        assert_eq!(third.is_cached, Some(false));
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let adapter = FakeAdapter::new(Provider::DoveFoundation, Behavior::Fail);
        let h = harness(vec![adapter.clone()], LookupPolicy::default());

        for _ in 0..2 {
            let record = h
                .orchestrator
                .lookup(request("dove", None, Some("NoSuchMovie123")))
                .await
                .unwrap();
            assert_eq!(record.status, ReviewStatus::Failed);
            assert!(record.review_items.is_none());
            assert_eq!(record.title, "NoSuchMovie123");
        }

        assert_eq!(adapter.calls(), 2);
        assert_eq!(h.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_cached() {
        let adapter = FakeAdapter::new(Provider::Imdb, Behavior::Empty);
        let h = harness(vec![adapter.clone()], LookupPolicy::default());

        let record = h
            .orchestrator
            .lookup(request("imdb", Some("tt0111161"), None))
            .await
            .unwrap();
        assert_eq!(record.status, ReviewStatus::Failed);
        assert_eq!(h.store.count().await.unwrap(), 0);

        let stats = h.orchestrator.stats().snapshot().await;
        assert_eq!(stats.fresh_hits, 1);
    }

    #[tokio::test]
    async fn test_missing_page_is_not_found() {
        let adapter = FakeAdapter::new(Provider::KidsInMind, Behavior::Missing);
        let h = harness(vec![adapter], LookupPolicy::default());

        let result = h
            .orchestrator
            .lookup(request("kidsinmind", Some("tt0111161"), Some("The Shawshank Redemption")))
            .await;
        assert!(matches!(result, Err(LookupError::NotFound)));
    }

    #[tokio::test]
    async fn test_request_validation() {
        let h = harness(vec![], LookupPolicy::default());

        let missing = LookupRequest {
            provider: None,
            ..request("imdb", Some("tt1"), None)
        };
        assert!(matches!(
            h.orchestrator.lookup(missing).await,
            Err(LookupError::Provider(ProviderParseError::Empty))
        ));
        assert!(matches!(
            h.orchestrator.lookup(request("netflix", Some("tt1"), None)).await,
            Err(LookupError::Provider(ProviderParseError::Unknown(_)))
        ));
        assert!(matches!(
            h.orchestrator.lookup(request("imdb", Some(" "), Some("::"))).await,
            Err(LookupError::MissingIdentity)
        ));
    }

    #[tokio::test]
    async fn test_title_needed_but_unavailable() {
        let adapter = FakeAdapter::new(Provider::CommonSenseMedia, Behavior::Items(vec![("Language", "2")]));
        let h = harness(vec![adapter.clone()], LookupPolicy::default());

        let result = h
            .orchestrator
            .lookup(request("commonsense", Some("tt9999999"), None))
            .await;
        assert!(matches!(result, Err(LookupError::TitleUnavailable(id)) if id == "tt9999999"));
        assert_eq!(adapter.calls(), 0);

        let record = h
            .orchestrator
            .lookup(request("csm", Some("tt0111161"), None))
            .await
            .unwrap();
        assert_eq!(record.title, "The Shawshank Redemption");
    }

    #[tokio::test]
    async fn test_unresolved_title_falls_back_unless_strict() {
        let adapter = FakeAdapter::new(Provider::CringeMdb, Behavior::Items(vec![("Nudity", "yes")]));
        let h = harness(vec![adapter.clone()], LookupPolicy::default());

        let record = h
            .orchestrator
            .lookup(request("cringemdb", None, Some("Obscure: Film")))
            .await
            .unwrap();
        assert_eq!(record.id, None);
        assert!(h.store.get("cringemdb:obscure film").await.unwrap().is_some());

        let strict = harness(
            vec![adapter],
            LookupPolicy {
                strict_identity: true,
                ..LookupPolicy::default()
            },
        );
        assert!(matches!(
            strict.orchestrator.lookup(request("cringemdb", None, Some("Obscure Film"))).await,
            Err(LookupError::IdentityResolution(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let adapter = Arc::new(FakeAdapter {
            provider: Provider::MovieGuide,
            behavior: Behavior::Items(vec![("Violence", "Light")]),
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let h = harness(vec![adapter.clone()], LookupPolicy::default());

        let lookups = (0..4).map(|_| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .lookup(request("movieguide", Some("tt0111161"), Some("The Shawshank Redemption")))
                    .await
                    .unwrap()
            })
        });
        let records = futures::future::join_all(lookups).await;

        assert_eq!(adapter.calls(), 1);
        let cached = records
            .into_iter()
            .filter(|r| r.as_ref().unwrap().is_cached == Some(true))
            .count();
        assert_eq!(cached, 3);
        assert_eq!(h.catalog.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cache_key_and_title_cleaning() {
        assert_eq!(cache_key(Provider::Imdb, "TT0111161"), "imdb:tt0111161");
        assert_eq!(cache_key(Provider::CommonSenseMedia, "tt1"), "commonsense:tt1");
        assert_eq!(
            clean_title(Some("Star+Wars%3A%20A New:Hope")).as_deref(),
            Some("Star Wars A NewHope")
        );
        assert_eq!(clean_title(Some(" : ")), None);
    }
}
