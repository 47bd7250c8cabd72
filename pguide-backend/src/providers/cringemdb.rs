///! CringeMDB: JSON title search, then yes/no content flags on the movie page

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use pguide_common::Provider;
use regex::Regex;
use scraper::Html;
use serde::Deserialize;

use super::{clean_text, selector, slugify, PageFetcher, ProviderAdapter, RawAdvisoryItem, RawProviderRecord, TitleQuery};
use crate::error::AdapterError;

const BASE_URL: &str = "https://cringemdb.com";

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\d*\)").expect("static regex"));

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub movie: String,
    pub slug: String,
}

impl SearchHit {
    /// Movie name without its `(year)` suffix.
    pub fn name(&self) -> String {
        YEAR_RE.replace_all(&self.movie, "").trim().to_string()
    }
}

pub struct CringeMdbAdapter {
    fetcher: Arc<PageFetcher>,
}

impl CringeMdbAdapter {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl ProviderAdapter for CringeMdbAdapter {
    fn provider(&self) -> Provider {
        Provider::CringeMdb
    }

    async fn fetch(&self, query: &TitleQuery) -> Result<Option<RawProviderRecord>, AdapterError> {
        let title = query.require_title()?;
        let search_url = format!("{}/search?term={}", BASE_URL, slugify(title, "+"));
        let hits: Vec<SearchHit> = serde_json::from_str(&self.fetcher.get_text(&search_url).await?)?;

        let hit = best_hit(title, &hits).ok_or_else(|| AdapterError::NoResults(title.to_string()))?;
        let url = format!("{}/movie/{}", BASE_URL, hit.slug);
        let html = self.fetcher.get_text(&url).await?;

        let mut record = RawProviderRecord::new(Provider::CringeMdb, query, hit.name());
        record.items = parse_movie(&html)?;
        record.review_link = Some(url);
        Ok(Some(record))
    }
}

/// The search hit whose name slugs the same as the wanted title.
pub fn best_hit<'a>(title: &str, hits: &'a [SearchHit]) -> Option<&'a SearchHit> {
    let wanted = slugify(title, "+");
    hits.iter().find(|hit| slugify(&hit.name(), "+") == wanted)
}

pub fn parse_movie(html: &str) -> Result<Vec<RawAdvisoryItem>, AdapterError> {
    let document = Html::parse_document(html);
    let warnings = document
        .select(&selector("div.content-warnings")?)
        .next()
        .ok_or_else(|| AdapterError::Markup("CringeMDB page has no content warnings".into()))?;

    let votes = document
        .select(&selector("span[itemprop=\"bestRating\"]")?)
        .next()
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|v| !v.is_empty());

    let h3 = selector("h3")?;
    let h4 = selector("h4")?;
    let mut items = Vec::new();
    for flag in warnings.select(&selector("div.content-flag")?) {
        let (Some(label), Some(answer)) = (flag.select(&h3).next(), flag.select(&h4).next()) else {
            continue;
        };
        let label = clean_text(&label.text().collect::<String>());
        let answer = clean_text(&answer.text().collect::<String>()).to_lowercase();

        let mut item = RawAdvisoryItem::new(label, answer, "");
        item.votes = votes.clone();
        items.push(item);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_hit() {
        let hits: Vec<SearchHit> = serde_json::from_str(
            r#"[{"movie":"Dune (1984)","slug":"dune-1984"},{"movie":"Dune: Part Two (2024)","slug":"dune-part-two"}]"#,
        )
        .unwrap();
        assert_eq!(best_hit("Dune Part Two", &hits).unwrap().slug, "dune-part-two");
        assert_eq!(best_hit("dune", &hits).unwrap().name(), "Dune");
        assert!(best_hit("Arrival", &hits).is_none());
    }

    #[test]
    fn test_parse_movie() {
        let html = r#"<html><body>
<div class="movie-info"><span itemprop="bestRating"> 37 </span></div>
<div class="content-warnings">
  <div class="content-flag"><h3>Nudity</h3><h4>Yes</h4></div>
  <div class="content-flag"><h3>Sex Scene</h3><h4>NO</h4></div>
  <div class="content-flag"><h3>Incomplete</h3></div>
</div></body></html>"#;
        let items = parse_movie(html).unwrap();
        let summary: Vec<(&str, &str)> = items.iter().map(|i| (i.label.as_str(), i.score.as_str())).collect();
        assert_eq!(summary, vec![("Nudity", "yes"), ("Sex Scene", "no")]);
        assert_eq!(items[0].votes.as_deref(), Some("37"));
    }

    #[test]
    fn test_missing_warnings_is_an_error() {
        assert!(matches!(parse_movie("<html></html>"), Err(AdapterError::Markup(_))));
    }
}
