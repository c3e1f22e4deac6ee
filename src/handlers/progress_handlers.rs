//! HTTP handlers for per-episode progress and playback links.
//!
//! Episode names may contain `/` (keys nested below the season), so every
//! route captures the episode with a wildcard segment.

use crate::{
    errors::AppError,
    models::progress::{EpisodeKey, ProgressRecord},
    services::session_service::{PlaybackUrl, Session},
};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;

/// Player report sent on pause, seek or end of playback.
#[derive(Debug, Deserialize)]
pub struct ProgressReport {
    pub position: f64,
    pub duration: f64,
    #[serde(default)]
    pub ended: bool,
}

fn episode_key((series, season, episode): (String, String, String)) -> EpisodeKey {
    EpisodeKey::new(series, season, episode)
}

/// GET `/progress/{series}/{season}/{*episode}`
pub async fn get_progress(
    State(session): State<Session>,
    Path(path): Path<(String, String, String)>,
) -> Result<Json<ProgressRecord>, AppError> {
    let key = episode_key(path);
    match session.progress(&key).await? {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::not_found(format!(
            "no progress for `{}` / `{}` / `{}`",
            key.series_name, key.season, key.episode_name
        ))),
    }
}

/// PUT `/progress/{series}/{season}/{*episode}`: store and push.
pub async fn put_progress(
    State(session): State<Session>,
    Path(path): Path<(String, String, String)>,
    Json(report): Json<ProgressReport>,
) -> Result<Json<ProgressRecord>, AppError> {
    let key = episode_key(path);
    let record = session
        .record_progress(&key, report.position, report.duration, report.ended)
        .await?;
    Ok(Json(record))
}

/// GET `/playback/{series}/{season}/{*episode}`: presigned URL for the player.
pub async fn playback_url(
    State(session): State<Session>,
    Path(path): Path<(String, String, String)>,
) -> Result<Json<PlaybackUrl>, AppError> {
    Ok(Json(session.playback_url(&episode_key(path)).await?))
}
