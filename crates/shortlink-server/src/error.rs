//! Error types for the shortlink server

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use shortlink_core::{ArtifactCacheError, ResolutionCacheError, ResolverError};
use std::fmt;

/// Startup and lifecycle failures; all of these end the process
#[derive(Debug)]
pub enum ServerError {
    Config(String),
    Database(sqlx::Error),
    Artifact(ArtifactCacheError),
    Cache(ResolutionCacheError),
    Io(Box<std::io::Error>),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ServerError::Database(err) => write!(f, "Database error: {}", err),
            ServerError::Artifact(err) => write!(f, "Artifact cache error: {}", err),
            ServerError::Cache(err) => write!(f, "Resolution cache error: {}", err),
            ServerError::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Database(err) => Some(err),
            ServerError::Artifact(err) => Some(err),
            ServerError::Cache(err) => Some(err),
            ServerError::Io(err) => Some(err.as_ref()),
            ServerError::Config(_) => None,
        }
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        ServerError::Database(err)
    }
}

impl From<ArtifactCacheError> for ServerError {
    fn from(err: ArtifactCacheError) -> Self {
        ServerError::Artifact(err)
    }
}

impl From<ResolutionCacheError> for ServerError {
    fn from(err: ResolutionCacheError) -> Self {
        ServerError::Cache(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Io(Box::new(err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ServerError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ServerError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Request failures, rendered as a JSON body with the matching status
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound,
    Conflict(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".into()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".into(),
                )
            }
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

impl From<ResolverError> for AppError {
    fn from(err: ResolverError) -> Self {
        match err {
            ResolverError::AliasRequired => AppError::BadRequest(err.to_string()),
            ResolverError::Store(_) | ResolverError::Artifact(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}
