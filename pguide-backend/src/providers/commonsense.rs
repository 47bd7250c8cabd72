///! Common Sense Media: dot-rated content grid, recommended age and ld+json metadata

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use pguide_common::Provider;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde_json::Value;

use super::{clean_text, selector, slugify, title_case, PageFetcher, ProviderAdapter, RawAdvisoryItem, RawProviderRecord, TitleQuery};
use crate::error::AdapterError;

static IMDB_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"imdb\.com/title/(tt\d+)").expect("static regex"));

pub struct CommonSenseAdapter {
    fetcher: Arc<PageFetcher>,
}

impl CommonSenseAdapter {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

pub fn review_url(title: &str) -> String {
    format!("https://www.commonsensemedia.org/movie-reviews/{}", slugify(title, "-"))
}

#[async_trait]
impl ProviderAdapter for CommonSenseAdapter {
    fn provider(&self) -> Provider {
        Provider::CommonSenseMedia
    }

    async fn fetch(&self, query: &TitleQuery) -> Result<Option<RawProviderRecord>, AdapterError> {
        let title = query.require_title()?;
        let url = review_url(title);
        let html = self.fetcher.get_text(&url).await?;

        let page = parse_review(&html)?;
        let mut record = RawProviderRecord::new(
            Provider::CommonSenseMedia,
            query,
            title_case(page.title.as_deref().unwrap_or(title)),
        );
        if record.id.is_none() {
            record.id = page.imdb_id;
        }
        record.recommended_age = page.age;
        record.items = page.items;
        record.review_link = Some(url);
        Ok(Some(record))
    }
}

#[derive(Debug)]
pub struct ReviewPage {
    pub title: Option<String>,
    pub imdb_id: Option<String>,
    pub age: Option<String>,
    pub items: Vec<RawAdvisoryItem>,
}

pub fn parse_review(html: &str) -> Result<ReviewPage, AdapterError> {
    let document = Html::parse_document(html);

    let (title, imdb_id) = match document
        .select(&selector("script[type=\"application/ld+json\"]")?)
        .next()
    {
        Some(script) => {
            let json: Value = serde_json::from_str(&script.text().collect::<String>())?;
            let reviewed = &json["@graph"][0]["itemReviewed"];
            let imdb_id = reviewed["sameAs"]
                .as_str()
                .and_then(|url| IMDB_ID_RE.captures(url))
                .map(|c| c[1].to_string());
            (reviewed["name"].as_str().map(str::to_string), imdb_id)
        }
        None => (None, None),
    };

    let age = document
        .select(&selector("div.review-rating span.rating__age")?)
        .next()
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|age| !age.is_empty());

    let label_sel = selector("#review-view-content-grid .row span.rating__label")?;
    let dots_sel = selector("span.rating__score i.icon-circle-solid.active")?;
    let text_sel = selector("[data-text]")?;

    let mut items = Vec::new();
    for label_el in document.select(&label_sel) {
        let label = clean_text(&label_el.text().collect::<String>());
        let Some(row) = label_el.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let dots = row.select(&dots_sel).count();

        // `data-text` sits on the grid item itself or on one of its children
        let description = row
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|block| {
                block
                    .value()
                    .attr("data-text")
                    .or_else(|| block.select(&text_sel).find_map(|el| el.value().attr("data-text")))
            })
            .map(clean_text)
            .unwrap_or_default();

        items.push(RawAdvisoryItem::new(label, dots.to_string(), description));
    }

    Ok(ReviewPage {
        title,
        imdb_id,
        age,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REVIEW: &str = r#"<html><head>
<script type="application/ld+json">{"@graph":[{"itemReviewed":{"name":"the incredibles","sameAs":"https://www.imdb.com/title/tt0317705/"}}]}</script>
</head><body>
<div class="review-rating"><span class="rating__age">age 7+</span></div>
<div id="review-view-content-grid"><div class="row">
  <div class="content-grid-item" data-text="&lt;p&gt;Lots of &lt;b&gt;action&lt;/b&gt; peril.&lt;/p&gt;">
    <div class="rating"><span class="rating__label">Violence &amp; Scariness</span>
      <span class="rating__score"><i class="icon-circle-solid active"></i><i class="icon-circle-solid active"></i><i class="icon-circle-solid active"></i><i class="icon-circle-solid"></i></span></div>
  </div>
  <div class="content-grid-item">
    <div class="rating"><span class="rating__label">Language</span>
      <span class="rating__score"><i class="icon-circle-solid"></i></span></div>
  </div>
</div></div>
</body></html>"#;

    #[test]
    fn test_parse_review() {
        let page = parse_review(REVIEW).unwrap();
        assert_eq!(page.title.as_deref(), Some("the incredibles"));
        assert_eq!(page.imdb_id.as_deref(), Some("tt0317705"));
        assert_eq!(page.age.as_deref(), Some("age 7+"));

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].label, "Violence & Scariness");
        assert_eq!(page.items[0].score, "3");
        assert_eq!(page.items[0].description, "Lots of action peril.");
        assert_eq!(page.items[1].label, "Language");
        assert_eq!(page.items[1].score, "0");
        assert_eq!(page.items[1].description, "");
    }

    #[test]
    fn test_description_on_grid_item_or_child() {
        let html = r#"<div id="review-view-content-grid"><div class="row">
  <div class="content-grid-item" data-text="Frequent swearing.">
    <div class="rating"><span class="rating__label">Language</span>
      <span class="rating__score"><i class="icon-circle-solid active"></i></span></div>
  </div>
  <div class="content-grid-item">
    <div class="rating"><span class="rating__label">Drinking</span>
      <span class="rating__score"></span></div>
    <div class="review-text" data-text="A toast at a wedding."></div>
  </div>
</div></div>"#;
        let page = parse_review(html).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].description, "Frequent swearing.");
        assert_eq!(page.items[1].description, "A toast at a wedding.");
        assert_eq!(page.items[1].score, "0");
    }

    #[test]
    fn test_review_url() {
        assert_eq!(
            review_url("The Incredibles"),
            "https://www.commonsensemedia.org/movie-reviews/the-incredibles"
        );
    }
}
