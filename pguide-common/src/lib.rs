///! Shared review model for the parental guidance service
///!
///! Everything that crosses a component boundary (cache payloads, HTTP
///! responses, adapter output after normalization) is expressed with
///! these types.

pub mod types;

pub use types::{
    AdvisoryCategory, AdvisoryItem, Provider, ProviderParseError, ReviewRecord, ReviewStatus,
    Severity,
};
