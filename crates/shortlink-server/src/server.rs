//! HTTP surface over the resolver
//!
//! Provides /create_url, /find/{alias}, /delete/{alias}, /qr/{alias},
//! /metrics and /health.

use crate::error::AppError;
use crate::types::{
    CreateUrlRequest, CreateUrlResponse, HealthResponse, MessageResponse, ResolutionCacheStats,
};
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use shortlink_core::{CacheMetrics, CreateOutcome, CreateRequest, MetricsSnapshot, Resolver};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

/// Shared state for the HTTP server
pub struct ServerState {
    pub resolver: Resolver,
    pub metrics: Arc<CacheMetrics>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(resolver: Resolver, metrics: Arc<CacheMetrics>) -> Self {
        Self {
            resolver,
            metrics,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/create_url", post(create_url))
        .route("/find/{alias}", get(find))
        .route("/delete/{alias}", post(delete))
        .route("/qr/{alias}", get(qr_code))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then finish in-flight requests
pub async fn start_server(
    state: SharedState,
    host: &str,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Starting HTTP server on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

fn validate_alias(alias: &str) -> Result<(), AppError> {
    if alias.is_empty() || !alias.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest(
            "alias must only contain alphanumeric characters".to_string(),
        ));
    }
    Ok(())
}

/// Parse the target; the normalized form is what gets stored and redirected to
fn validate_target(target: &str) -> Result<url::Url, AppError> {
    match url::Url::parse(target) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        _ => Err(AppError::BadRequest(format!(
            "url {:?} is not a valid http(s) URL",
            target
        ))),
    }
}

async fn create_url(
    State(state): State<SharedState>,
    Json(request): Json<CreateUrlRequest>,
) -> Result<Json<CreateUrlResponse>, AppError> {
    let target = validate_target(&request.url)?.to_string();
    if let Some(alias) = &request.alias {
        validate_alias(alias)?;
    }

    let expires_at = request
        .expiration_epoch
        .map(|secs| {
            DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| AppError::BadRequest("expiration_epoch out of range".to_string()))
        })
        .transpose()?;

    let (alias, outcome) = state
        .resolver
        .create(CreateRequest {
            target: target.clone(),
            alias: request.alias,
            expires_at,
        })
        .await?;

    match outcome {
        CreateOutcome::Created(created_at) => Ok(Json(CreateUrlResponse {
            url: target,
            alias,
            created_at,
            expiration_date: expires_at,
        })),
        CreateOutcome::Conflict => Err(AppError::Conflict(format!(
            "alias \"{}\" already exists",
            alias
        ))),
    }
}

async fn find(
    State(state): State<SharedState>,
    Path(alias): Path<String>,
) -> Result<Redirect, AppError> {
    debug!(alias = %alias, "/find called");
    state
        .resolver
        .resolve(&alias)
        .await
        .map(|target| Redirect::temporary(&target))
        .ok_or(AppError::NotFound)
}

async fn delete(
    State(state): State<SharedState>,
    Path(alias): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    debug!(alias = %alias, "/delete called");
    if state.resolver.delete(&alias).await? {
        Ok(Json(MessageResponse {
            message: "URL deleted successfully".to_string(),
        }))
    } else {
        Err(AppError::NotFound)
    }
}

async fn qr_code(
    State(state): State<SharedState>,
    Path(alias): Path<String>,
) -> Result<Response, AppError> {
    let path = state
        .resolver
        .artifact(&alias)
        .await?
        .ok_or(AppError::NotFound)?;

    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::Internal(format!("cannot read {:?}: {}", path, e)))?;
    let content_type = state.resolver.artifacts().content_type().to_string();

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        data,
    )
        .into_response())
}

async fn metrics(State(state): State<SharedState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;
    let cache = state.resolver.cache();

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        resolution_cache: ResolutionCacheStats {
            entries: cache.len(),
            capacity: cache.capacity(),
        },
        artifacts: state.resolver.artifacts().stats().await,
        writeback: state.resolver.writeback().stats(),
        metrics: state.metrics.snapshot(),
    })
}
