//! HTTP handlers for the session itself: summary, bucket switch and manual sync.

use crate::{
    errors::AppError,
    models::catalog::BucketKind,
    services::{
        session_service::{Session, SessionSummary},
        sync_service::PushReceipt,
    },
};
use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

/// Body of `PUT /session/bucket`.
#[derive(Debug, Deserialize)]
pub struct SwitchBucketReq {
    pub bucket: String,
    #[serde(default = "default_kind")]
    pub kind: BucketKind,
}

fn default_kind() -> BucketKind {
    BucketKind::Series
}

/// GET `/session`
pub async fn get_session(
    State(session): State<Session>,
) -> Result<Json<SessionSummary>, AppError> {
    Ok(Json(session.summary().await?))
}

/// PUT `/session/bucket`: list, catalog and pull another bucket.
pub async fn switch_bucket(
    State(session): State<Session>,
    Json(req): Json<SwitchBucketReq>,
) -> Result<Json<SessionSummary>, AppError> {
    let bucket = req.bucket.trim();
    if bucket.is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "bucket name must not be empty",
        ));
    }

    Ok(Json(session.switch_bucket(bucket, req.kind).await?))
}

/// POST `/session/sync`: push the full progress set now.
pub async fn sync_now(State(session): State<Session>) -> Result<Json<PushReceipt>, AppError> {
    Ok(Json(session.sync_now().await?))
}
