///! ParentPreviews: letter-graded criteria rows plus `<b>Label:</b> text` descriptions

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use pguide_common::Provider;
use regex::Regex;
use scraper::Html;

use super::{clean_text, selector, slugify, PageFetcher, ProviderAdapter, RawAdvisoryItem, RawProviderRecord, TitleQuery};
use crate::error::AdapterError;

static DESCRIPTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<b>([^<]*?): ?</b>(.*?)\n").expect("static regex"));

pub struct ParentPreviewsAdapter {
    fetcher: Arc<PageFetcher>,
}

impl ParentPreviewsAdapter {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

pub fn review_url(title: &str) -> String {
    format!("https://parentpreviews.com/movie-reviews/{}", slugify(title, "-"))
}

#[async_trait]
impl ProviderAdapter for ParentPreviewsAdapter {
    fn provider(&self) -> Provider {
        Provider::ParentPreviews
    }

    async fn fetch(&self, query: &TitleQuery) -> Result<Option<RawProviderRecord>, AdapterError> {
        let title = query.require_title()?;
        let url = review_url(title);
        let html = self.fetcher.get_text(&url).await?;

        let mut record = RawProviderRecord::new(Provider::ParentPreviews, query, title);
        record.items = parse_review(&html)?;
        record.review_link = Some(url);
        Ok(Some(record))
    }
}

pub fn parse_review(html: &str) -> Result<Vec<RawAdvisoryItem>, AdapterError> {
    let descriptions: HashMap<String, String> = DESCRIPTION_RE
        .captures_iter(html)
        .map(|c| (c[1].trim().to_string(), clean_text(&c[2])))
        .collect();

    let document = Html::parse_document(html);
    let row_sel = selector("a[href=\"#content-details\"] div.criteria_row.theme_field")?;
    let label_sel = selector("span")?;
    let mark_sel = selector("span.criteria_mark")?;

    let mut items = Vec::new();
    for row in document.select(&row_sel) {
        let Some(label) = row.select(&label_sel).next() else {
            continue;
        };
        let label = clean_text(&label.text().collect::<String>());
        let Some(mark) = row.select(&mark_sel).next() else {
            tracing::warn!("ParentPreviews row '{}' has no grade", label);
            continue;
        };
        let grade = clean_text(&mark.text().collect::<String>());
        let description = descriptions.get(&label).cloned().unwrap_or_default();
        items.push(RawAdvisoryItem::new(label, grade, description));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REVIEW: &str = r##"<html><body>
<a href="#content-details">
  <div class="criteria_row theme_field"><span>Violence</span><span class="criteria_mark theme_accent_bg">C+</span></div>
  <div class="criteria_row theme_field"><span>Sexual Content</span><span class="criteria_mark theme_accent_bg">B-</span></div>
  <div class="criteria_row theme_field"><span>Language</span><span class="criteria_mark theme_accent_bg">A</span></div>
</a>
<div class="post_text_area">
<p><b>Violence: </b>Characters are shot and <i>stabbed</i>.</p>
<p><b>Sexual Content:</b>Some kissing.</p>
</div>
</body></html>"##;

    #[test]
    fn test_parse_review() {
        let items = parse_review(REVIEW).unwrap();
        let summary: Vec<(&str, &str, &str)> = items
            .iter()
            .map(|i| (i.label.as_str(), i.score.as_str(), i.description.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Violence", "C+", "Characters are shot and stabbed ."),
                ("Sexual Content", "B-", "Some kissing."),
                ("Language", "A", ""),
            ]
        );
    }

    #[test]
    fn test_review_url() {
        assert_eq!(
            review_url("Spider-Man: No Way Home"),
            "https://parentpreviews.com/movie-reviews/spider-man-no-way-home"
        );
    }
}
