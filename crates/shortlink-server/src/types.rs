//! Request and response bodies for the HTTP API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shortlink_core::{ArtifactStats, MetricsSnapshot, WriteBackStats};

/// Body of `POST /create_url`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUrlRequest {
    pub url: String,
    pub alias: Option<String>,
    /// Expiry as seconds since the Unix epoch
    pub expiration_epoch: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUrlResponse {
    pub url: String,
    pub alias: String,
    pub created_at: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionCacheStats {
    pub entries: usize,
    pub capacity: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub resolution_cache: ResolutionCacheStats,
    pub artifacts: ArtifactStats,
    pub writeback: WriteBackStats,
    pub metrics: MetricsSnapshot,
}
