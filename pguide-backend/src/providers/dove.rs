///! Dove.org: search, then the first review's content matrix

use std::sync::Arc;

use async_trait::async_trait;
use pguide_common::Provider;
use scraper::Html;

use super::{clean_text, selector, title_case, PageFetcher, ProviderAdapter, RawAdvisoryItem, RawProviderRecord, TitleQuery};
use crate::error::AdapterError;

pub struct DoveAdapter {
    fetcher: Arc<PageFetcher>,
}

impl DoveAdapter {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl ProviderAdapter for DoveAdapter {
    fn provider(&self) -> Provider {
        Provider::DoveFoundation
    }

    async fn fetch(&self, query: &TitleQuery) -> Result<Option<RawProviderRecord>, AdapterError> {
        let title = query.require_title()?;
        let search_url = format!(
            "https://dove.org/search/reviews/{}",
            title.split_whitespace().map(|w| urlencoding::encode(w).into_owned()).collect::<Vec<_>>().join("+")
        );

        let review_url = parse_search(&self.fetcher.get_text(&search_url).await?)?
            .ok_or_else(|| AdapterError::NoResults(title.to_string()))?;
        let html = self.fetcher.get_text(&review_url).await?;

        let page = parse_review(&html)?;
        if !same_media(title, &page.title) {
            tracing::warn!("Dove returned a different title for '{}': {}", title, page.title);
            return Err(AdapterError::NoResults(title.to_string()));
        }

        let mut record = RawProviderRecord::new(Provider::DoveFoundation, query, title_case(&page.title));
        record.items = page.items;
        record.review_link = Some(review_url);
        Ok(Some(record))
    }
}

/// First review link in the search cards.
pub fn parse_search(html: &str) -> Result<Option<String>, AdapterError> {
    let document = Html::parse_document(html);
    let Some(cards) = document.select(&selector("div.movie-cards.search-cards")?).next() else {
        return Ok(None);
    };
    if cards.text().collect::<String>().contains("Nothing matches your search term") {
        return Ok(None);
    }
    Ok(cards
        .select(&selector("a[href]")?)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string))
}

pub struct ReviewPage {
    pub title: String,
    pub items: Vec<RawAdvisoryItem>,
}

/// Matrix entries pair `span.item-text` labels with `span.categories-item--N` scores.
pub fn parse_review(html: &str) -> Result<ReviewPage, AdapterError> {
    let document = Html::parse_document(html);
    let title = document
        .select(&selector("title")?)
        .next()
        .map(|t| t.text().collect::<String>().replace("- Dove.org", "").trim().to_string())
        .unwrap_or_default();

    let matrix = document
        .select(&selector("div.matrix-categories")?)
        .next()
        .ok_or_else(|| AdapterError::Markup("Dove review has no content matrix".into()))?;

    let label_sel = selector("span.item-text")?;
    let level_sel = selector("span.categories-item")?;
    let detail_title = selector("div.details-wrap h5.details-title")?;
    let detail_body = selector("div.details-body p")?;

    let mut items = Vec::new();
    for (label, level) in matrix.select(&label_sel).zip(matrix.select(&level_sel)) {
        let label = clean_text(&label.text().collect::<String>());
        let score = level
            .value()
            .classes()
            .find_map(|class| class.strip_prefix("categories-item--"))
            .map(str::to_string);
        let Some(score) = score else {
            tracing::warn!("Dove category '{}' has no level", label);
            continue;
        };

        let description = document
            .select(&detail_title)
            .find(|h5| clean_text(&h5.text().collect::<String>()) == label)
            .and_then(|h5| h5.parent())
            .and_then(scraper::ElementRef::wrap)
            .and_then(|parent| parent.select(&detail_body).next())
            .map(|p| clean_text(&p.text().collect::<String>()))
            .unwrap_or_default();

        items.push(RawAdvisoryItem::new(label, score, description));
    }

    Ok(ReviewPage { title, items })
}

fn alphanumeric(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn same_media(wanted: &str, found: &str) -> bool {
    alphanumeric(found).contains(&alphanumeric(wanted))
}
