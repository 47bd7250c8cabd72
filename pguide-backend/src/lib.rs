pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod normalizer;
pub mod orchestrator;
pub mod providers;
pub mod resolver;
pub mod stats;
pub mod store;
