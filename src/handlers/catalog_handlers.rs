//! Read-only catalog views: series list, season overview and episode list.

use crate::{
    errors::AppError,
    services::session_service::{EpisodeView, SeasonOverview, Session},
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SeriesList {
    pub series: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SeasonList {
    pub series: String,
    pub seasons: Vec<SeasonOverview>,
}

#[derive(Debug, Serialize)]
pub struct EpisodeList {
    pub series: String,
    pub season: String,
    pub episodes: Vec<EpisodeView>,
}

/// GET `/catalog?search=`
pub async fn list_series(
    State(session): State<Session>,
    Query(q): Query<CatalogQuery>,
) -> Json<SeriesList> {
    Json(SeriesList {
        series: session.series_names(q.search.as_deref()).await,
    })
}

/// GET `/catalog/{series}`
pub async fn list_seasons(
    State(session): State<Session>,
    Path(series): Path<String>,
) -> Result<Json<SeasonList>, AppError> {
    let seasons = session.season_overview(&series).await?;
    Ok(Json(SeasonList { series, seasons }))
}

/// GET `/catalog/{series}/{season}`
pub async fn list_episodes(
    State(session): State<Session>,
    Path((series, season)): Path<(String, String)>,
) -> Result<Json<EpisodeList>, AppError> {
    let episodes = session.episodes(&series, &season).await?;
    Ok(Json(EpisodeList {
        series,
        season,
        episodes,
    }))
}
