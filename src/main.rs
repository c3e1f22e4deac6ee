use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use streamhub::{
    config, routes,
    services::{
        progress_service::ProgressStore, s3_store::S3ObjectStore, session_service::Session,
    },
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting streamhub with config: {:?}", cfg);

    // --- Open progress store ---
    let progress = ProgressStore::open(&cfg.database_url)
        .await
        .with_context(|| format!("opening progress database `{}`", cfg.database_url))?;

    // --- Connect session (probe, list, catalog, pull) ---
    let store = Arc::new(S3ObjectStore::from_profile(&cfg.profile));
    let session = Session::connect(store, cfg.bucket_kind, progress)
        .await
        .with_context(|| format!("connecting to bucket `{}`", cfg.profile.bucket))?;

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(session);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
