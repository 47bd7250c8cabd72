///! Provider adapters: fetch one title's advisory page from a third-party site
///! and hand back its raw labels and scores for normalization

pub mod commonsense;
pub mod cringemdb;
pub mod dove;
pub mod fetch;
pub mod imdb;
pub mod kidsinmind;
pub mod movieguide;
pub mod parentpreviews;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use pguide_common::Provider;
use regex::Regex;

use crate::error::AdapterError;
pub use fetch::PageFetcher;

/// Lookup input handed to an adapter. `id` is an IMDb `tt` identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleQuery {
    pub id: Option<String>,
    pub title: Option<String>,
    pub year: Option<String>,
}

impl TitleQuery {
    pub fn require_title(&self) -> Result<&str, AdapterError> {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(AdapterError::MissingInput("video_name"))
    }

    pub fn require_id(&self) -> Result<&str, AdapterError> {
        self.id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(AdapterError::MissingInput("imdb_id"))
    }
}

/// One advisory category as the provider labels and scores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAdvisoryItem {
    pub label: String,
    pub score: String,
    pub description: String,
    pub votes: Option<String>,
}

impl RawAdvisoryItem {
    pub fn new(label: impl Into<String>, score: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            score: score.into(),
            description: description.into(),
            votes: None,
        }
    }
}

/// Provider output before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProviderRecord {
    pub provider: Provider,
    pub id: Option<String>,
    pub title: String,
    pub recommended_age: Option<String>,
    pub items: Vec<RawAdvisoryItem>,
    pub review_link: Option<String>,
    pub is_episode: Option<bool>,
    pub series_id: Option<String>,
}

impl RawProviderRecord {
    pub fn new(provider: Provider, query: &TitleQuery, title: impl Into<String>) -> Self {
        Self {
            provider,
            id: query.id.clone(),
            title: title.into(),
            recommended_age: None,
            items: Vec::new(),
            review_link: None,
            is_episode: None,
            series_id: None,
        }
    }
}

/// A source of advisory content for one provider.
///
/// `Ok(None)` means the provider has no page for this title. `Err` means the
/// fetch or parse failed and the caller should report a failed lookup.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Whether a human-readable title is needed to find the page.
    fn needs_title(&self) -> bool {
        true
    }

    async fn fetch(&self, query: &TitleQuery) -> Result<Option<RawProviderRecord>, AdapterError>;
}

/// Adapters keyed by provider.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry wired to the live provider sites.
    pub fn with_defaults(fetcher: Arc<PageFetcher>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(imdb::ImdbAdapter::new(fetcher.clone())));
        registry.register(Arc::new(kidsinmind::KidsInMindAdapter::new(fetcher.clone())));
        registry.register(Arc::new(dove::DoveAdapter::new(fetcher.clone())));
        registry.register(Arc::new(parentpreviews::ParentPreviewsAdapter::new(fetcher.clone())));
        registry.register(Arc::new(commonsense::CommonSenseAdapter::new(fetcher.clone())));
        registry.register(Arc::new(movieguide::MovieGuideAdapter::new(fetcher.clone())));
        registry.register(Arc::new(cringemdb::CringeMdbAdapter::new(fetcher)));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Strips markup, decodes the common entities and collapses whitespace.
pub(crate) fn clean_text(text: &str) -> String {
    let stripped = TAG_RE.replace_all(text, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    SPACE_RE.replace_all(decoded.trim(), " ").into_owned()
}

/// Lower-case, drop colons and join words with `sep`, as provider URL slugs expect.
pub(crate) fn slugify(title: &str, sep: &str) -> String {
    title
        .to_lowercase()
        .replace(':', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(sep)
}

/// Capitalizes the first letter of each word.
pub(crate) fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub(crate) fn selector(css: &str) -> Result<scraper::Selector, AdapterError> {
    scraper::Selector::parse(css).map_err(|e| AdapterError::Markup(format!("invalid selector '{}': {}", css, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(
            clean_text("<p>A  man &amp; his\n <b>dog</b></p>"),
            "A man & his dog"
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Star Wars: A New Hope", "-"), "star-wars-a-new-hope");
        assert_eq!(slugify("  The Matrix ", "+"), "the+matrix");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("the SHAWSHANK redemption"), "The Shawshank Redemption");
    }

    #[test]
    fn test_require_inputs() {
        let query = TitleQuery {
            id: Some("tt0111161".into()),
            title: Some("  ".into()),
            year: None,
        };
        assert_eq!(query.require_id().unwrap(), "tt0111161");
        assert!(matches!(query.require_title(), Err(AdapterError::MissingInput("video_name"))));
    }

    #[test]
    fn test_default_registry_covers_every_provider() {
        let fetcher = Arc::new(PageFetcher::new(std::time::Duration::from_secs(5), 1).unwrap());
        let registry = AdapterRegistry::with_defaults(fetcher);
        assert_eq!(registry.len(), Provider::ALL.len());
        for provider in Provider::ALL {
            assert_eq!(registry.get(provider).unwrap().provider(), provider);
        }
        assert!(!registry.get(Provider::Imdb).unwrap().needs_title());
    }
}
