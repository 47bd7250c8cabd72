use serde::{Deserialize, Serialize};

/// Advisory source, one variant per supported review site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "imdb")]
    Imdb,
    #[serde(rename = "KidsInMind")]
    KidsInMind,
    #[serde(rename = "DoveFoundation")]
    DoveFoundation,
    #[serde(rename = "ParentPreviews")]
    ParentPreviews,
    #[serde(rename = "CommonSenseMedia")]
    CommonSenseMedia,
    #[serde(rename = "MovieGuide")]
    MovieGuide,
    #[serde(rename = "cringMDB")]
    CringeMdb,
}

impl Provider {
    pub const ALL: [Provider; 7] = [
        Provider::Imdb,
        Provider::KidsInMind,
        Provider::DoveFoundation,
        Provider::ParentPreviews,
        Provider::CommonSenseMedia,
        Provider::MovieGuide,
        Provider::CringeMdb,
    ];

    /// Display name, as carried in the `provider` field of a record
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Imdb => "imdb",
            Provider::KidsInMind => "KidsInMind",
            Provider::DoveFoundation => "DoveFoundation",
            Provider::ParentPreviews => "ParentPreviews",
            Provider::CommonSenseMedia => "CommonSenseMedia",
            Provider::MovieGuide => "MovieGuide",
            Provider::CringeMdb => "cringMDB",
        }
    }

    /// Stable lower-case slug used as the cache key prefix
    pub fn slug(&self) -> &'static str {
        match self {
            Provider::Imdb => "imdb",
            Provider::KidsInMind => "kidsinmind",
            Provider::DoveFoundation => "dove",
            Provider::ParentPreviews => "parentpreviews",
            Provider::CommonSenseMedia => "commonsense",
            Provider::MovieGuide => "movieguide",
            Provider::CringeMdb => "cringemdb",
        }
    }

    /// Every spelling accepted on the `provider` query parameter
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Provider::Imdb => &["imdb"],
            Provider::KidsInMind => &["kidsinmind", "kids-in-mind"],
            Provider::DoveFoundation => &["dove", "dovefoundation"],
            Provider::ParentPreviews => &["parentpreview", "parentpreviews"],
            Provider::CommonSenseMedia => &["commonsense", "commonsensemedia", "csm"],
            Provider::MovieGuide => &["movieguide", "movieguideorg"],
            Provider::CringeMdb => &["cring", "cringmdb", "cringemdb"],
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a `provider` parameter could not be turned into a [`Provider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderParseError {
    Empty,
    Unknown(String),
}

impl std::fmt::Display for ProviderParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderParseError::Empty => write!(f, "Provider parameter is required"),
            ProviderParseError::Unknown(s) => write!(f, "Unknown provider: {}", s),
        }
    }
}

impl std::error::Error for ProviderParseError {}

impl std::str::FromStr for Provider {
    type Err = ProviderParseError;

    /// Exact, case-insensitive match against [`Provider::aliases`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        if wanted.is_empty() {
            return Err(ProviderParseError::Empty);
        }

        Provider::ALL
            .iter()
            .copied()
            .find(|p| p.aliases().contains(&wanted.as_str()))
            .ok_or(ProviderParseError::Unknown(wanted))
    }
}

/// Canonical severity scale every provider scale is mapped onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    None,
    Clean,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "None",
            Severity::Clean => "Clean",
            Severity::Mild => "Mild",
            Severity::Moderate => "Moderate",
            Severity::Severe => "Severe",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical advisory categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdvisoryCategory {
    #[serde(rename = "Sex & Nudity")]
    SexNudity,
    #[serde(rename = "Violence")]
    Violence,
    #[serde(rename = "Profanity")]
    Profanity,
    #[serde(rename = "Smoking, Alcohol & Drugs")]
    SubstanceUse,
    #[serde(rename = "Frightening & Intense Scenes")]
    Frightening,
    #[serde(rename = "Positive Messages")]
    PositiveMessages,
    #[serde(rename = "Positive Role Models")]
    PositiveRoleModels,
    #[serde(rename = "Discussion Topics")]
    DiscussionTopics,
    #[serde(rename = "Message")]
    Message,
    #[serde(rename = "Miscellaneous Immorality")]
    MiscellaneousImmorality,
    #[serde(rename = "Dominant Worldview")]
    DominantWorldview,
}

impl AdvisoryCategory {
    pub const ALL: [AdvisoryCategory; 11] = [
        AdvisoryCategory::SexNudity,
        AdvisoryCategory::Violence,
        AdvisoryCategory::Profanity,
        AdvisoryCategory::SubstanceUse,
        AdvisoryCategory::Frightening,
        AdvisoryCategory::PositiveMessages,
        AdvisoryCategory::PositiveRoleModels,
        AdvisoryCategory::DiscussionTopics,
        AdvisoryCategory::Message,
        AdvisoryCategory::MiscellaneousImmorality,
        AdvisoryCategory::DominantWorldview,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AdvisoryCategory::SexNudity => "Sex & Nudity",
            AdvisoryCategory::Violence => "Violence",
            AdvisoryCategory::Profanity => "Profanity",
            AdvisoryCategory::SubstanceUse => "Smoking, Alcohol & Drugs",
            AdvisoryCategory::Frightening => "Frightening & Intense Scenes",
            AdvisoryCategory::PositiveMessages => "Positive Messages",
            AdvisoryCategory::PositiveRoleModels => "Positive Role Models",
            AdvisoryCategory::DiscussionTopics => "Discussion Topics",
            AdvisoryCategory::Message => "Message",
            AdvisoryCategory::MiscellaneousImmorality => "Miscellaneous Immorality",
            AdvisoryCategory::DominantWorldview => "Dominant Worldview",
        }
    }
}

impl std::fmt::Display for AdvisoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One category rating for a title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryItem {
    pub name: AdvisoryCategory,
    /// Serialized as `cat`, the key existing clients read
    #[serde(rename = "cat", alias = "severity")]
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    /// Community vote annotation, informational only
    #[serde(default)]
    pub votes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    Success,
    Failed,
}

/// The unit stored in cache and returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: Option<String>,
    pub status: ReviewStatus,
    pub title: String,
    pub provider: Provider,
    #[serde(rename = "recommended-age", default)]
    pub recommended_age: Option<String>,
    #[serde(rename = "review-items", default)]
    pub review_items: Option<Vec<AdvisoryItem>>,
    #[serde(rename = "review-link", default)]
    pub review_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_episode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<String>,
    /// Set on responses only, never persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_cached: Option<bool>,
}

impl ReviewRecord {
    /// A record for a lookup that produced no usable advisory content
    pub fn failed(provider: Provider, id: Option<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            status: ReviewStatus::Failed,
            title: title.into(),
            provider,
            recommended_age: None,
            review_items: None,
            review_link: None,
            is_episode: None,
            series_id: None,
            is_cached: None,
        }
    }

    /// True when the record carries at least one advisory item
    pub fn has_items(&self) -> bool {
        self.review_items.as_ref().is_some_and(|items| !items.is_empty())
    }

    pub fn severity_of(&self, category: AdvisoryCategory) -> Option<Severity> {
        self.review_items
            .as_ref()?
            .iter()
            .find(|item| item.name == category)
            .map(|item| item.severity)
    }
}
