///! IMDb parents guide: embedded `__NEXT_DATA__` JSON, with the legacy section markup as fallback

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pguide_common::Provider;
use scraper::{ElementRef, Html};
use serde_json::Value;

use super::{clean_text, selector, PageFetcher, ProviderAdapter, RawAdvisoryItem, RawProviderRecord, TitleQuery};
use crate::error::AdapterError;

const LEGACY_SECTIONS: [(&str, &str); 5] = [
    ("advisory-nudity", "nudity"),
    ("advisory-violence", "violence"),
    ("advisory-profanity", "profanity"),
    ("advisory-alcohol", "alcohol"),
    ("advisory-frightening", "frightening"),
];

pub struct ImdbAdapter {
    fetcher: Arc<PageFetcher>,
}

impl ImdbAdapter {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

pub fn guide_url(id: &str) -> String {
    format!("https://www.imdb.com/title/{}/parentalguide", id)
}

#[async_trait]
impl ProviderAdapter for ImdbAdapter {
    fn provider(&self) -> Provider {
        Provider::Imdb
    }

    fn needs_title(&self) -> bool {
        false
    }

    async fn fetch(&self, query: &TitleQuery) -> Result<Option<RawProviderRecord>, AdapterError> {
        let id = query.require_id()?;
        let url = guide_url(id);
        let html = self.fetcher.get_text(&url).await?;

        let mut record = parse_guide(&html, query)?;
        record.review_link = Some(url);
        tracing::info!("IMDb guide for {} has {} categories", id, record.items.len());
        Ok(Some(record))
    }
}

/// Parses a parents guide page.
pub fn parse_guide(html: &str, query: &TitleQuery) -> Result<RawProviderRecord, AdapterError> {
    let document = Html::parse_document(html);
    let fallback_title = query.title.clone().unwrap_or_default();

    if let Some(content) = next_data(&document)? {
        return Ok(parse_content_data(&content, query, fallback_title));
    }
    parse_legacy(&document, query, fallback_title)
}

fn next_data(document: &Html) -> Result<Option<Value>, AdapterError> {
    let script = selector("script#__NEXT_DATA__")?;
    let Some(element) = document.select(&script).next() else {
        return Ok(None);
    };

    let json: Value = serde_json::from_str(&element.text().collect::<String>())?;
    Ok(json.pointer("/props/pageProps/contentData").cloned())
}

fn parse_content_data(content: &Value, query: &TitleQuery, fallback_title: String) -> RawProviderRecord {
    let metadata = &content["entityMetadata"];
    let title = metadata["titleText"]["text"]
        .as_str()
        .map(str::to_string)
        .unwrap_or(fallback_title);
    let mut record = RawProviderRecord::new(Provider::Imdb, query, title);

    let is_episode = metadata["titleType"]["isEpisode"].as_bool().unwrap_or(false);
    record.is_episode = Some(is_episode);
    if is_episode {
        record.series_id = metadata["series"]["id"]
            .as_str()
            .or_else(|| metadata["series"]["series"]["id"].as_str())
            .map(str::to_string)
            .or_else(|| query.id.clone());
    }

    let mut spoilers: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(map) = content["spoilers"].as_object() {
        for (category, items) in map {
            let texts = items
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|item| item["text"].as_str())
                .map(|text| format!("[Spoiler] {}", clean_text(text)))
                .collect();
            spoilers.insert(category.to_lowercase(), texts);
        }
    }

    for category in content["categories"].as_array().into_iter().flatten() {
        let Some(label) = category["title"].as_str() else {
            continue;
        };
        let severity = category["severitySummary"]["text"].as_str().unwrap_or("Unknown");

        let mut descriptions = category["id"]
            .as_str()
            .and_then(|id| spoilers.remove(&id.to_lowercase()))
            .unwrap_or_default();
        descriptions.extend(
            category["items"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|item| item["text"].as_str())
                .map(clean_text)
                .filter(|text| !text.is_empty()),
        );

        let mut item = RawAdvisoryItem::new(label, severity, descriptions.join("\n\n"));
        item.votes = Some(match category["totalSeverityVotes"].as_u64() {
            Some(votes) => format!("{} votes", votes),
            None => "N/A votes".to_string(),
        });
        record.items.push(item);
    }
    record
}

fn parse_legacy(document: &Html, query: &TitleQuery, fallback_title: String) -> Result<RawProviderRecord, AdapterError> {
    let main = selector("div#main")?;
    if document.select(&main).next().is_none() {
        return Err(AdapterError::Markup("IMDb page has neither __NEXT_DATA__ nor div#main".into()));
    }

    let title = document
        .select(&selector("h3[itemprop=\"name\"]")?)
        .next()
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .unwrap_or(fallback_title);
    let mut record = RawProviderRecord::new(Provider::Imdb, query, title);

    let episode = selector("div.episode-info")?;
    let is_episode = document.select(&episode).next().is_some();
    record.is_episode = Some(is_episode);
    if is_episode {
        let parent_link = selector("div.titleParent a")?;
        record.series_id = document
            .select(&parent_link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| href.split('/').nth(2))
            .map(str::to_string)
            .or_else(|| query.id.clone());
    }

    let name_sel = selector("h4.ipl-list-title")?;
    let pill_sel = selector("div.advisory-severity-vote__container span.ipl-status-pill")?;
    let item_sel = selector("li.ipl-zebra-list__item")?;
    let vote_sel = selector(".advisory-severity-vote")?;

    for (section_id, spoiler_id) in LEGACY_SECTIONS {
        let Some(section) = document.select(&selector(&format!("section#{}", section_id))?).next() else {
            continue;
        };
        let label = section
            .select(&name_sel)
            .next()
            .map(|el| clean_text(&el.text().collect::<String>()))
            .unwrap_or_default();
        let severity = section
            .select(&pill_sel)
            .next()
            .map(|el| clean_text(&el.text().collect::<String>()))
            .unwrap_or_else(|| "Unknown".to_string());

        let spoiler_sel = selector(&format!(
            "section#advisory-spoilers section#advisory-spoiler-{} li.ipl-zebra-list__item",
            spoiler_id
        ))?;
        let mut descriptions: Vec<String> = document
            .select(&spoiler_sel)
            .map(|li| format!("[Spoiler] {}", scene_text(li)))
            .collect();
        descriptions.extend(
            section
                .select(&item_sel)
                .filter(|li| li.select(&vote_sel).next().is_none())
                .map(scene_text)
                .filter(|text| !text.is_empty()),
        );

        record.items.push(RawAdvisoryItem::new(label, severity, descriptions.join("\n\n")));
    }
    Ok(record)
}

fn scene_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
        .trim_end_matches("Edit")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> TitleQuery {
        TitleQuery {
            id: Some("tt0111161".into()),
            title: None,
            year: None,
        }
    }

    const NEXT_DATA_PAGE: &str = r#"<html><body><main role="main"></main>
<script id="__NEXT_DATA__" type="application/json">
{"props":{"pageProps":{"contentData":{
  "entityMetadata":{"titleText":{"text":"The Shawshank Redemption"},"titleType":{"isEpisode":false}},
  "spoilers":{"violence":[{"text":"A prisoner is <b>killed</b>."}]},
  "categories":[
    {"id":"NUDITY","title":"Sex & Nudity","severitySummary":{"text":"Mild"},
     "items":[{"text":"Brief rear nudity."},{"text":""}],"totalSeverityVotes":412},
    {"id":"VIOLENCE","title":"Violence & Gore","severitySummary":{"text":"Moderate"},
     "items":[{"text":"Beatings."}]}
  ]
}}}}
</script></body></html>"#;

    #[test]
    fn test_parse_next_data() {
        let record = parse_guide(NEXT_DATA_PAGE, &query()).unwrap();
        assert_eq!(record.title, "The Shawshank Redemption");
        assert_eq!(record.is_episode, Some(false));
        assert_eq!(record.series_id, None);
        assert_eq!(record.items.len(), 2);

        let nudity = &record.items[0];
        assert_eq!(nudity.label, "Sex & Nudity");
        assert_eq!(nudity.score, "Mild");
        assert_eq!(nudity.description, "Brief rear nudity.");
        assert_eq!(nudity.votes.as_deref(), Some("412 votes"));

        let violence = &record.items[1];
        assert_eq!(violence.description, "[Spoiler] A prisoner is killed .\n\nBeatings.");
        assert_eq!(violence.votes.as_deref(), Some("N/A votes"));
    }

    #[test]
    fn test_parse_episode_metadata() {
        let page = r#"<script id="__NEXT_DATA__" type="application/json">
{"props":{"pageProps":{"contentData":{
  "entityMetadata":{"titleText":{"text":"Pilot"},"titleType":{"isEpisode":true},"series":{"id":"tt0903747"}},
  "categories":[]}}}}</script>"#;
        let record = parse_guide(page, &query()).unwrap();
        assert_eq!(record.is_episode, Some(true));
        assert_eq!(record.series_id.as_deref(), Some("tt0903747"));
        assert!(record.items.is_empty());
    }

    #[test]
    fn test_parse_legacy_sections() {
        let page = r#"<html><body><div id="main">
<h3 itemprop="name">Old Movie</h3>
<section id="advisory-profanity">
  <h4 class="ipl-list-title">Profanity</h4>
  <div class="advisory-severity-vote__container"><span class="ipl-status-pill">Severe</span></div>
  <ul>
    <li class="ipl-zebra-list__item">Constant swearing. Edit</li>
    <li class="ipl-zebra-list__item"><div class="advisory-severity-vote">vote</div></li>
  </ul>
</section>
<section id="advisory-spoilers"><section id="advisory-spoiler-profanity">
  <li class="ipl-zebra-list__item">Final scene slur.</li>
</section></section>
</div></body></html>"#;

        let record = parse_guide(page, &query()).unwrap();
        assert_eq!(record.title, "Old Movie");
        assert_eq!(record.items.len(), 1);
        assert_eq!(record.items[0].label, "Profanity");
        assert_eq!(record.items[0].score, "Severe");
        assert_eq!(
            record.items[0].description,
            "[Spoiler] Final scene slur.\n\nConstant swearing."
        );
    }

    #[test]
    fn test_unrecognized_page_is_an_error() {
        assert!(matches!(
            parse_guide("<html><body>blocked</body></html>", &query()),
            Err(AdapterError::Markup(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires network connection
    async fn test_fetch_live() {
        let fetcher = Arc::new(PageFetcher::new(std::time::Duration::from_secs(20), 3).unwrap());
        let record = ImdbAdapter::new(fetcher).fetch(&query()).await.unwrap().unwrap();
        assert!(!record.items.is_empty());
    }
}
