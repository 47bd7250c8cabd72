///! Kids-In-Mind: keyword search, then candidate review pages matched by IMDb id or title similarity

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use pguide_common::Provider;
use regex::Regex;
use scraper::{ElementRef, Html};

use super::{clean_text, selector, PageFetcher, ProviderAdapter, RawAdvisoryItem, RawProviderRecord, TitleQuery};
use crate::error::AdapterError;

const BASE_URL: &str = "https://kids-in-mind.com";
const MATCH_THRESHOLD: f64 = 0.8;
/// Only the leading text blocks of a review carry the rated sections
const MAX_BLOCKS: usize = 7;
const SECTIONS: [&str; 6] = [
    "SEX/NUDITY",
    "VIOLENCE/GORE",
    "LANGUAGE",
    "SUBSTANCE USE",
    "DISCUSSION TOPICS",
    "MESSAGE",
];

static IMDB_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="[^"]*imdb[^"]*title/(tt\d+)"#).expect("static regex"));

pub struct KidsInMindAdapter {
    fetcher: Arc<PageFetcher>,
}

impl KidsInMindAdapter {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl ProviderAdapter for KidsInMindAdapter {
    fn provider(&self) -> Provider {
        Provider::KidsInMind
    }

    async fn fetch(&self, query: &TitleQuery) -> Result<Option<RawProviderRecord>, AdapterError> {
        let title = query.require_title()?;
        let search_url = format!(
            "{}/search-desktop.htm?fwp_keyword={}",
            BASE_URL,
            urlencoding::encode(title)
        );
        let results = parse_search(&self.fetcher.get_text(&search_url).await?)?;
        if results.is_empty() {
            return Err(AdapterError::NoResults(title.to_string()));
        }

        for link in results {
            let url = if link.starts_with("http") {
                link
            } else {
                format!("{}{}", BASE_URL, link)
            };
            tracing::info!("KidsInMind trying {}", url);

            let html = match self.fetcher.get_text(&url).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!("Skipping KidsInMind candidate {}: {}", url, e);
                    continue;
                }
            };

            let page = parse_review(&html)?;
            if !page.matches(query) {
                continue;
            }

            let mut record = RawProviderRecord::new(Provider::KidsInMind, query, page.title);
            if record.id.is_none() {
                record.id = page.imdb_ids.into_iter().next();
            }
            record.items = page.items;
            record.review_link = Some(url);
            return Ok(Some(record));
        }

        tracing::warn!("No KidsInMind candidate matched '{}'", title);
        Ok(None)
    }
}

/// Candidate review links from the search page.
pub fn parse_search(html: &str) -> Result<Vec<String>, AdapterError> {
    let document = Html::parse_document(html);
    let Some(template) = document.select(&selector("div.facetwp-template")?).next() else {
        return Ok(Vec::new());
    };
    if template.text().collect::<String>().contains("Nothing matches your search term") {
        return Ok(Vec::new());
    }

    let link = selector("a[href]")?;
    Ok(template
        .select(&link)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewPage {
    pub title: String,
    pub year: Option<String>,
    pub imdb_ids: Vec<String>,
    pub items: Vec<RawAdvisoryItem>,
}

impl ReviewPage {
    /// IMDb id match wins; otherwise title similarity boosted by a close year.
    pub fn matches(&self, query: &TitleQuery) -> bool {
        if let Some(id) = query.id.as_deref() {
            if self.imdb_ids.iter().any(|found| found == id) {
                return true;
            }
        }
        let Some(title) = query.title.as_deref() else {
            return false;
        };

        let mut similarity = strsim::normalized_levenshtein(&title.to_lowercase(), &self.title.to_lowercase());
        let years = query
            .year
            .as_deref()
            .and_then(|y| y.trim().parse::<i32>().ok())
            .zip(self.year.as_deref().and_then(|y| y.parse::<i32>().ok()));
        if let Some((wanted, found)) = years {
            if wanted == found {
                similarity += 0.2;
            } else if (wanted - found).abs() <= 1 {
                similarity += 0.1;
            }
        }

        tracing::debug!("KidsInMind similarity {:.2} for '{}' vs '{}'", similarity, title, self.title);
        similarity > MATCH_THRESHOLD
    }
}

/// Parses a review page titled like `Movie Title [2010] [PG-13] - 3.5.4`.
pub fn parse_review(html: &str) -> Result<ReviewPage, AdapterError> {
    let document = Html::parse_document(html);
    let full_title = document
        .select(&selector("title")?)
        .next()
        .map(|t| t.text().collect::<String>())
        .unwrap_or_default();

    let mut parts = full_title.split('[');
    let title = parts.next().unwrap_or_default().trim().to_string();
    let year: String = parts
        .next()
        .unwrap_or_default()
        .chars()
        .take_while(|c| *c != ']')
        .filter(char::is_ascii_digit)
        .collect();

    let imdb_ids = IMDB_LINK_RE
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect();

    let block_sel = selector("div.et_pb_text_inner")?;
    let p_sel = selector("p")?;
    let h2_sel = selector("h2")?;
    let span_sel = selector("span")?;

    let mut items = Vec::new();
    let blocks = document
        .select(&block_sel)
        .filter(|block| block.select(&p_sel).next().is_some())
        .take(MAX_BLOCKS);
    for block in blocks {
        let mut headings: Vec<ElementRef> = block.select(&h2_sel).collect();
        if headings.is_empty() {
            headings = block.select(&span_sel).collect();
        }

        for heading in headings {
            let text = clean_text(&heading.text().collect::<String>()).replace(&title, "");
            let label = text.chars().filter(|c| !c.is_ascii_digit()).collect::<String>();
            let label = label.trim();
            if !SECTIONS.contains(&label) {
                continue;
            }

            let score = trailing_digits(text.trim()).unwrap_or("0");
            let description = heading
                .parent()
                .and_then(ElementRef::wrap)
                .map(|parent| match parent.select(&p_sel).next() {
                    Some(p) => clean_text(&p.text().collect::<String>()),
                    None => clean_text(&parent.text().collect::<String>()),
                })
                .unwrap_or_default();

            items.push(RawAdvisoryItem::new(label, score, description));
        }
    }

    Ok(ReviewPage {
        title,
        year: (!year.is_empty()).then_some(year),
        imdb_ids,
        items,
    })
}

fn trailing_digits(text: &str) -> Option<&str> {
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    Some(&text[start..])
}
