use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use pguide_backend::config;
use pguide_backend::http::{build_router, AppState};
use pguide_backend::logging::{init_logging, spawn_log_persistence};
use pguide_backend::orchestrator::{LookupOrchestrator, LookupPolicy};
use pguide_backend::providers::{AdapterRegistry, PageFetcher};
use pguide_backend::resolver::{IdentityResolver, OmdbCatalog};
use pguide_backend::stats::StatsAggregator;
use pguide_backend::store::{open_store, Clock, SystemClock};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = config::read_config(&config_path)?;

    // Initialize logging
    let (_logging_guard, log_receiver) = init_logging(
        &config.log_dir,
        "pguide-backend",
        &config.log_level,
        config.persist_logs,
    )?;

    tracing::info!("Parental guide backend starting...");
    for warning in &config.load_warnings {
        tracing::warn!("{}", warning);
    }
    tracing::info!("Server will listen on {}", config.server_address());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = open_store(config, clock.clone()).await;
    tracing::info!("Cache store: {}", store.backend_name());

    if let Some(receiver) = log_receiver {
        spawn_log_persistence(receiver, store.clone());
    }

    if config.omdb_api_key.is_none() {
        tracing::warn!("OMDB_API_KEY is not set, title lookups cannot be resolved to ids");
    }

    let fetcher = Arc::new(
        PageFetcher::new(config.http_timeout(), config.fetch_max_attempts).context("Failed to build HTTP client")?,
    );
    let catalog = Arc::new(
        OmdbCatalog::new(config.omdb_api_key.clone(), config.http_timeout())
            .context("Failed to build catalog client")?,
    );
    let resolver = IdentityResolver::new(catalog, store.clone(), config.lookup_ttl());
    let adapters = AdapterRegistry::with_defaults(fetcher);
    tracing::info!("Registered {} provider adapters", adapters.len());

    let orchestrator = LookupOrchestrator::new(
        store.clone(),
        resolver,
        adapters,
        Arc::new(StatsAggregator::new(store.clone(), clock)),
        LookupPolicy::from_config(config),
    );

    let app = build_router(AppState {
        orchestrator: Arc::new(orchestrator),
        store,
        admin_token: config.admin_token.clone(),
    });

    let addr: SocketAddr = config
        .server_address()
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.server_address()))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("HTTP server starting on {}", addr);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
