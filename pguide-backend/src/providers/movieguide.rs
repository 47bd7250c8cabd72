///! MovieGuide: content summary table with one marked circle per row

use std::sync::Arc;

use async_trait::async_trait;
use pguide_common::Provider;
use scraper::{ElementRef, Html};

use super::{clean_text, selector, slugify, title_case, PageFetcher, ProviderAdapter, RawAdvisoryItem, RawProviderRecord, TitleQuery};
use crate::error::AdapterError;

/// Summary table columns, left to right.
const COLUMNS: [&str; 4] = ["None", "Light", "Moderate", "Heavy"];
const MARKED: [&str; 2] = ["movieguide_circle_red", "movieguide_circle_green"];

pub struct MovieGuideAdapter {
    fetcher: Arc<PageFetcher>,
}

impl MovieGuideAdapter {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

pub fn review_url(title: &str) -> String {
    format!("https://www.movieguide.org/reviews/{}.html", slugify(title, "-"))
}

#[async_trait]
impl ProviderAdapter for MovieGuideAdapter {
    fn provider(&self) -> Provider {
        Provider::MovieGuide
    }

    async fn fetch(&self, query: &TitleQuery) -> Result<Option<RawProviderRecord>, AdapterError> {
        let title = query.require_title()?;
        let url = review_url(title);
        let html = self.fetcher.get_text(&url).await?;

        let page = parse_review(&html)?;
        let display = if page.title.is_empty() { title } else { page.title.as_str() };
        let mut record = RawProviderRecord::new(Provider::MovieGuide, query, title_case(display));
        record.items = page.items;
        record.review_link = Some(url);
        Ok(Some(record))
    }
}

pub struct ReviewPage {
    pub title: String,
    pub items: Vec<RawAdvisoryItem>,
}

pub fn parse_review(html: &str) -> Result<ReviewPage, AdapterError> {
    let document = Html::parse_document(html);
    let title = document
        .select(&selector("title")?)
        .next()
        .map(|t| {
            let text = t.text().collect::<String>();
            let text = text.split('|').next().unwrap_or_default();
            text.split('-').next().unwrap_or_default().trim().to_string()
        })
        .unwrap_or_default();

    let table = document
        .select(&selector("table.movieguide_content_summary")?)
        .next()
        .ok_or_else(|| AdapterError::Markup("MovieGuide review has no content summary".into()))?;

    let subheadings: Vec<ElementRef> = document
        .select(&selector("div.movieguide_review_content div.movieguide_subheading")?)
        .collect();

    let row_sel = selector("tr")?;
    let div_sel = selector("div")?;

    let mut items = Vec::new();
    for row in table.select(&row_sel) {
        let text = row.text().collect::<String>();
        let squashed: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        if squashed.is_empty() || squashed == COLUMNS.concat() {
            continue;
        }
        let label = clean_text(&text).trim_end_matches(':').trim_end().to_string();

        let marked = row.select(&div_sel).take(COLUMNS.len()).position(|cell| {
            cell.value().classes().any(|class| MARKED.contains(&class))
        });
        let Some(column) = marked else {
            tracing::debug!("MovieGuide row '{}' has no marked level", label);
            continue;
        };

        let description = subheadings
            .iter()
            .find(|heading| heading.text().collect::<String>().replace(':', "").trim() == label)
            .map(|heading| following_text(*heading))
            .unwrap_or_default();

        items.push(RawAdvisoryItem::new(label, COLUMNS[column], description));
    }

    Ok(ReviewPage { title, items })
}

/// Text right after a subheading, whether a bare text node or an element.
fn following_text(heading: ElementRef<'_>) -> String {
    for sibling in heading.next_siblings() {
        if let Some(text) = sibling.value().as_text() {
            if text.trim().is_empty() {
                continue;
            }
            return clean_text(text);
        }
        if let Some(element) = ElementRef::wrap(sibling) {
            return clean_text(&element.text().collect::<String>());
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REVIEW: &str = r#"<html><head><title>THE MATRIX - Movieguide | Movie Reviews for Families</title></head><body>
<table class="movieguide_content_summary">
  <tr><td></td><td>None</td><td>Light</td><td>Moderate</td><td>Heavy</td></tr>
  <tr><td>Language</td>
    <td><div class="movieguide_circle"></div></td><td><div class="movieguide_circle"></div></td>
    <td><div class="movieguide_circle movieguide_circle_red"></div></td><td><div class="movieguide_circle"></div></td></tr>
  <tr><td>Violence</td>
    <td><div class="movieguide_circle"></div></td><td><div class="movieguide_circle"></div></td>
    <td><div class="movieguide_circle"></div></td><td><div class="movieguide_circle movieguide_circle_red"></div></td></tr>
  <tr><td>Dominant Worldview and Other Worldview Content/Elements:</td>
    <td><div class="movieguide_circle movieguide_circle_green"></div></td><td><div class="movieguide_circle"></div></td>
    <td><div class="movieguide_circle"></div></td><td><div class="movieguide_circle"></div></td></tr>
  <tr><td>Nudity</td>
    <td><div class="movieguide_circle"></div></td><td><div class="movieguide_circle"></div></td>
    <td><div class="movieguide_circle"></div></td><td><div class="movieguide_circle"></div></td></tr>
</table>
<div class="movieguide_review_content">
  <div class="movieguide_subheading">Language:</div> Eight obscenities.
  <div class="movieguide_subheading">Violence:</div><p>Extended gun battles.</p>
</div>
</body></html>"#;

    #[test]
    fn test_parse_review() {
        let page = parse_review(REVIEW).unwrap();
        assert_eq!(page.title, "THE MATRIX");

        let summary: Vec<(&str, &str, &str)> = page
            .items
            .iter()
            .map(|i| (i.label.as_str(), i.score.as_str(), i.description.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Language", "Moderate", "Eight obscenities."),
                ("Violence", "Heavy", "Extended gun battles."),
                ("Dominant Worldview and Other Worldview Content/Elements", "None", ""),
            ]
        );
    }

    #[test]
    fn test_missing_table_is_an_error() {
        assert!(matches!(
            parse_review("<title>Not found</title>"),
            Err(AdapterError::Markup(_))
        ));
    }

    #[test]
    fn test_review_url() {
        assert_eq!(
            review_url("Toy Story 2"),
            "https://www.movieguide.org/reviews/toy-story-2.html"
        );
    }
}
