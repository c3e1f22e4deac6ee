//! Defines routes for the local StreamHub API.
//!
//! ## Structure
//! - **Session endpoints**
//!   - `GET    /session`: active bucket, sync state and counts
//!   - `PUT    /session/bucket`: switch to another bucket
//!   - `POST   /session/sync`: push the progress snapshot now
//!
//! - **Catalog endpoints**
//!   - `GET    /catalog?search=`: series names
//!   - `GET    /catalog/{series}`: seasons with watched counts
//!   - `GET    /catalog/{series}/{season}`: episodes with progress
//!
//! - **Episode endpoints**
//!   - `GET    /progress/{series}/{season}/{*episode}`: stored progress
//!   - `PUT    /progress/{series}/{season}/{*episode}`: record a player report
//!   - `GET    /playback/{series}/{season}/{*episode}`: presigned media URL
//!
//! The wildcard `*episode` allows names nested below the season, like
//! `Extras/Making of.mkv`.

use crate::{
    handlers::{
        catalog_handlers::{list_episodes, list_seasons, list_series},
        health_handlers::{healthz, readyz},
        progress_handlers::{get_progress, playback_url, put_progress},
        session_handlers::{get_session, switch_bucket, sync_now},
    },
    services::session_service::Session,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build the router. Every handler shares the `Session` state.
pub fn routes() -> Router<Session> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Session
        .route("/session", get(get_session))
        .route("/session/bucket", put(switch_bucket))
        .route("/session/sync", post(sync_now))
        // Catalog
        .route("/catalog", get(list_series))
        .route("/catalog/{series}", get(list_seasons))
        .route("/catalog/{series}/{season}", get(list_episodes))
        // Episodes
        .route(
            "/progress/{series}/{season}/{*episode}",
            get(get_progress).put(put_progress),
        )
        .route("/playback/{series}/{season}/{*episode}", get(playback_url))
}
