///! Error types shared across the backend layers

use pguide_common::{Provider, ProviderParseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store operation timed out: {0}")]
    Timeout(&'static str),

    #[error("Store task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Unexpected page structure: {0}")]
    Markup(String),

    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No search results for '{0}'")]
    NoResults(String),

    #[error("Missing lookup input: {0}")]
    MissingInput(&'static str),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("OMDb API key is not configured")]
    MissingApiKey,

    #[error("Catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Catalog returned HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("{provider} category '{label}' has no canonical mapping")]
    UnknownLabel { provider: Provider, label: String },

    #[error("{provider} category '{label}' is not part of the canonical schema")]
    Excluded { provider: Provider, label: String },

    #[error("{provider} score '{score}' for '{label}' is outside its scale")]
    UnknownScore {
        provider: Provider,
        label: String,
        score: String,
    },
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("{0}")]
    Provider(#[from] ProviderParseError),

    #[error("Either imdb_id or video_name is required")]
    MissingIdentity,

    #[error("Could not resolve an IMDb id for '{0}'")]
    IdentityResolution(String),

    #[error("Could not retrieve video name for {0}")]
    TitleUnavailable(String),

    #[error("No data found")]
    NotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}
