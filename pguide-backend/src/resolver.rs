///! Resolves free-text titles to IMDb identifiers (and back) through an
///! OMDb-style catalog, caching every answer in the store's lookup space

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CatalogError;
use crate::store::CacheStore;

const OMDB_BASE_URL: &str = "https://www.omdbapi.com/";

/// Title metadata source.
#[async_trait]
pub trait TitleCatalog: Send + Sync {
    /// Looks a title up by name and optional year. `None` when the catalog has no match.
    async fn search(&self, title: &str, year: Option<&str>) -> Result<Option<Value>, CatalogError>;

    /// Looks a title up by IMDb id.
    async fn by_id(&self, id: &str) -> Result<Option<Value>, CatalogError>;
}

pub struct OmdbCatalog {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OmdbCatalog {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: OMDB_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, api_key: &str, params: &[(&str, &str)]) -> String {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}&apikey={}", self.base_url, query, urlencoding::encode(api_key))
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<Option<Value>, CatalogError> {
        let api_key = self.api_key.as_deref().ok_or(CatalogError::MissingApiKey)?;
        let response = self.client.get(self.url(api_key, params)).send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::Status(response.status().as_u16()));
        }

        let payload: Value = response.json().await?;
        Ok(matched_payload(payload, params))
    }
}

/// OMDb answers 200 with `"Response": "False"` when nothing matches.
fn matched_payload(payload: Value, params: &[(&str, &str)]) -> Option<Value> {
    if payload.get("Response").and_then(Value::as_str) == Some("True") {
        return Some(payload);
    }
    let reason = payload.get("Error").and_then(Value::as_str).unwrap_or("unknown error");
    tracing::debug!("OMDb has no match for {:?}: {}", params, reason);
    None
}

#[async_trait]
impl TitleCatalog for OmdbCatalog {
    async fn search(&self, title: &str, year: Option<&str>) -> Result<Option<Value>, CatalogError> {
        match year {
            Some(year) => self.query(&[("t", title), ("y", year)]).await,
            None => self.query(&[("t", title)]).await,
        }
    }

    async fn by_id(&self, id: &str) -> Result<Option<Value>, CatalogError> {
        self.query(&[("i", id)]).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub id: String,
    pub year: Option<String>,
    pub title: Option<String>,
}

/// Caches catalog answers under `omdb_id_{title}_{year}` and `omdb_title_{id}`.
pub struct IdentityResolver {
    catalog: Arc<dyn TitleCatalog>,
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl IdentityResolver {
    pub fn new(catalog: Arc<dyn TitleCatalog>, store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { catalog, store, ttl }
    }

    /// Returns the supplied id untouched, or looks the title up. `None` when
    /// neither works; failures are logged, never raised.
    pub async fn resolve(
        &self,
        title: Option<&str>,
        id: Option<&str>,
        year: Option<&str>,
    ) -> Option<ResolvedIdentity> {
        if let Some(id) = id.map(str::trim).filter(|id| !id.is_empty()) {
            return Some(ResolvedIdentity {
                id: id.to_string(),
                year: year.map(str::to_string),
                title: title.map(str::to_string),
            });
        }

        let title = title.map(str::trim).filter(|t| !t.is_empty())?;
        let key = format!("omdb_id_{}_{}", title, year.unwrap_or("none"));
        let payload = self
            .cached_or_fetch(&key, || self.catalog.search(title, year))
            .await?;

        let Some(id) = payload.get("imdbID").and_then(Value::as_str) else {
            tracing::warn!("Catalog entry for '{}' has no imdbID", title);
            return None;
        };
        Some(ResolvedIdentity {
            id: id.to_string(),
            year: year
                .map(str::to_string)
                .or_else(|| payload.get("Year").and_then(Value::as_str).map(str::to_string)),
            title: payload.get("Title").and_then(Value::as_str).map(str::to_string),
        })
    }

    /// Display title for an IMDb id.
    pub async fn title_for_id(&self, id: &str) -> Option<String> {
        let key = format!("omdb_title_{}", id.trim());
        let payload = self.cached_or_fetch(&key, || self.catalog.by_id(id.trim())).await?;
        payload.get("Title").and_then(Value::as_str).map(str::to_string)
    }

    async fn cached_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Option<Value>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Option<Value>, CatalogError>>,
    {
        match self.store.get_aux(key).await {
            Ok(Some(cached)) => match serde_json::from_str(&cached) {
                Ok(value) => return Some(value),
                Err(e) => tracing::warn!("Discarding unreadable lookup entry {}: {}", key, e),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("Lookup cache read failed for {}: {}", key, e),
        }

        let payload = match fetch().await {
            Ok(Some(payload)) => payload,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("Title catalog request failed for {}: {}", key, e);
                return None;
            }
        };

        if let Err(e) = self.store.set_aux(key, &payload.to_string(), Some(self.ttl)).await {
            tracing::warn!("Failed to cache lookup {}: {}", key, e);
        }
        Some(payload)
    }
}
