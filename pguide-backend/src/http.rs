///! HTTP surface: the `/get_data` lookup endpoint plus health, stats, logs and admin routes

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pguide_common::ReviewRecord;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::{LookupError, StoreError};
use crate::orchestrator::{LookupOrchestrator, LookupRequest};
use crate::stats::country_for;
use crate::store::CacheStore;

pub const LOGS_PER_PAGE: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<LookupOrchestrator>,
    pub store: Arc<dyn CacheStore>,
    /// Admin routes answer 403 while this is unset
    pub admin_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid or missing admin token")]
    Unauthorized,

    #[error("Admin endpoints are disabled")]
    Forbidden,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Lookup(err) => match err {
                LookupError::Provider(_)
                | LookupError::MissingIdentity
                | LookupError::IdentityResolution(_)
                | LookupError::TitleUnavailable(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                LookupError::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
                LookupError::Internal(msg) => {
                    tracing::error!("Lookup failed internally: {}", msg);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
                }
            },
            ApiError::Store(err) => {
                tracing::error!("Store operation failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GetDataParams {
    pub provider: Option<String>,
    pub imdb_id: Option<String>,
    pub video_name: Option<String>,
    pub release_year: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogsParams {
    #[serde(default = "default_page")]
    pub page: usize,
}

fn default_page() -> usize {
    1
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/get_data", get(get_data))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/logs", get(logs))
        .route("/admin/clear_cache", post(clear_cache))
        .route("/admin/clear_stats", post(clear_stats))
        .route("/admin/clear_logs", post(clear_logs))
        .route("/admin/counts", get(counts))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// A panicking handler answers with the same JSON error shape as other 500s.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Request handler panicked: {}", detail);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "Internal server error" }))).into_response()
}

async fn get_data(
    State(state): State<AppState>,
    Query(params): Query<GetDataParams>,
    request: Request,
) -> Result<Json<ReviewRecord>, ApiError> {
    let request_id = Uuid::now_v7();
    let country = client_country(&request);
    tracing::info!(
        "[{}] get_data provider={:?} imdb_id={:?} video_name={:?} year={:?}",
        request_id,
        params.provider,
        params.imdb_id,
        params.video_name,
        params.release_year
    );

    let record = state
        .orchestrator
        .lookup(LookupRequest {
            provider: params.provider,
            imdb_id: params.imdb_id,
            video_name: params.video_name,
            release_year: params.release_year,
            country,
        })
        .await
        .inspect_err(|e| tracing::warn!("[{}] get_data rejected: {}", request_id, e))?;

    tracing::info!(
        "[{}] {} {:?} for '{}' (cached: {})",
        request_id,
        record.provider,
        record.status,
        record.title,
        record.is_cached.unwrap_or(false)
    );
    Ok(Json(record))
}

/// Stats bucket from the first forwarded address (or the peer) and the edge country header.
fn client_country(request: &Request) -> String {
    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let header_country = headers.get("cf-ipcountry").and_then(|v| v.to_str().ok());

    country_for(forwarded.or(peer).as_deref(), header_country)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let snapshot = state.orchestrator.stats().snapshot().await;
    let cached_records = state.store.count().await?;
    Ok(Json(json!({
        "stats": snapshot,
        "cached_records": cached_records,
        "backend": state.store.backend_name(),
    })))
}

async fn logs(State(state): State<AppState>, Query(params): Query<LogsParams>) -> Result<Json<Value>, ApiError> {
    let page = params.page.max(1);
    let offset = (page - 1) * LOGS_PER_PAGE;
    let (records, total) = futures::try_join!(
        state.store.get_logs(LOGS_PER_PAGE, offset),
        state.store.log_count()
    )?;

    Ok(Json(json!({
        "page": page,
        "per_page": LOGS_PER_PAGE,
        "total": total,
        "pages": total.div_ceil(LOGS_PER_PAGE),
        "logs": records,
    })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ApiError::Forbidden);
    };
    let supplied = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    if supplied == Some(expected) {
        Ok(())
    } else {
        tracing::warn!("Rejected admin request with a bad token");
        Err(ApiError::Unauthorized)
    }
}

async fn clear_cache(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers)?;
    state.store.clear().await?;
    tracing::info!("Cache cleared by admin");
    Ok(Json(json!({ "cleared": "cache" })))
}

async fn clear_stats(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers)?;
    state.orchestrator.stats().reset().await?;
    tracing::info!("Statistics cleared by admin");
    Ok(Json(json!({ "cleared": "stats" })))
}

async fn clear_logs(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers)?;
    state.store.clear_logs().await?;
    tracing::info!("Logs cleared by admin");
    Ok(Json(json!({ "cleared": "logs" })))
}

async fn counts(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    authorize(&state, &headers)?;
    let (logs, cache_entries, stats) = futures::try_join!(
        state.store.log_count(),
        state.store.count(),
        state.store.get_stats()
    )?;

    Ok(Json(json!({
        "logs": logs,
        "cache_entries": cache_entries,
        "stats": usize::from(stats.is_some()),
    })))
}
