use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Errors raised by the core services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Listing, get or put against the object store failed.
    #[error("object store {operation} failed: {message}")]
    Connectivity {
        operation: &'static str,
        message: String,
    },
    #[error("snapshot `{key}` is malformed: {reason}")]
    MalformedSnapshot { key: String, reason: String },
    #[error("invalid progress value: {0}")]
    InvalidProgress(String),
    /// A push was requested before the session pulled its snapshot.
    #[error("session is not connected to a bucket")]
    NotConnected,
    #[error("series `{0}` not found in catalog")]
    SeriesNotFound(String),
    #[error("season `{season}` not found in series `{series}`")]
    SeasonNotFound { series: String, season: String },
    #[error("episode `{episode}` not found in `{series}` / `{season}`")]
    EpisodeNotFound {
        series: String,
        season: String,
        episode: String,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// A lightweight wrapper for errors returned by HTTP handlers.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::SeriesNotFound(_)
            | ServiceError::SeasonNotFound { .. }
            | ServiceError::EpisodeNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::InvalidProgress(_) => StatusCode::BAD_REQUEST,
            ServiceError::Connectivity { .. } => StatusCode::BAD_GATEWAY,
            ServiceError::NotConnected => StatusCode::CONFLICT,
            ServiceError::MalformedSnapshot { .. }
            | ServiceError::Sqlx(_)
            | ServiceError::Parquet(_)
            | ServiceError::Arrow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}
