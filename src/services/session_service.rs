//! src/services/session_service.rs
//!
//! Session: the caller-owned context that ties the listing client, catalog
//! builder, progress store and sync engine to one active bucket.
//!
//! The active bucket sits behind an `RwLock`. Reads and progress writes share
//! it; a bucket switch takes it exclusively, so it waits for an in-flight
//! push before the local store is replaced.

use crate::{
    errors::{ServiceError, ServiceResult},
    models::{
        catalog::{BucketKind, Catalog, CatalogEntry},
        progress::{EpisodeKey, ProgressRecord},
    },
    services::{
        catalog_service::{build_catalog, natural_cmp},
        listing_service::ObjectListingClient,
        object_store::ObjectStore,
        progress_service::ProgressStore,
        sync_service::{PullOutcome, PushReceipt, SnapshotSync, SyncState},
    },
};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// An episode counts as watched once more than this share has been played.
pub const COMPLETION_THRESHOLD: f64 = 0.9;

pub const PLAYBACK_URL_TTL: Duration = Duration::from_secs(3 * 60 * 60);

struct BucketContext {
    store: Arc<dyn ObjectStore>,
    kind: BucketKind,
    catalog: Arc<Catalog>,
    last_pull: PullOutcome,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub bucket: String,
    pub kind: BucketKind,
    pub sync_state: SyncState,
    pub series: usize,
    pub entries: usize,
    pub records: u64,
    pub last_pull: PullOutcome,
}

/// One row of the season list: how many episodes exist and how many of them
/// were watched.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SeasonOverview {
    pub name: String,
    pub episodes: usize,
    pub watched: u64,
}

/// A catalog entry joined with its stored progress, if any.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct EpisodeView {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    pub progress: Option<ProgressRecord>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PlaybackUrl {
    pub url: String,
    pub expires_in_secs: u64,
}

#[derive(Clone)]
pub struct Session {
    id: Uuid,
    progress: ProgressStore,
    sync: SnapshotSync,
    context: Arc<RwLock<BucketContext>>,
}

impl Session {
    /// Probe the endpoint, then load the catalog and snapshot of `store`'s
    /// bucket.
    pub async fn connect(
        store: Arc<dyn ObjectStore>,
        kind: BucketKind,
        progress: ProgressStore,
    ) -> ServiceResult<Self> {
        let id = Uuid::new_v4();
        store.probe().await?;

        let sync = SnapshotSync::new(progress.clone());
        let context = load(&sync, store, kind).await?;
        info!(
            session = %id,
            bucket = context.store.bucket(),
            kind = %kind,
            series = context.catalog.series_count(),
            "session connected"
        );

        Ok(Self {
            id,
            progress,
            sync,
            context: Arc::new(RwLock::new(context)),
        })
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    pub fn progress_store(&self) -> &ProgressStore {
        &self.progress
    }

    /// Point the session at another bucket with the same credentials.
    ///
    /// The new catalog and snapshot are loaded before anything is replaced;
    /// a failed listing leaves the current bucket active.
    pub async fn switch_bucket(
        &self,
        bucket: &str,
        kind: BucketKind,
    ) -> ServiceResult<SessionSummary> {
        let mut context = self.context.write().await;
        let store = context.store.for_bucket(bucket);
        let next = load(&self.sync, store, kind).await?;
        info!(
            session = %self.id,
            from = context.store.bucket(),
            to = bucket,
            kind = %kind,
            series = next.catalog.series_count(),
            "bucket switched"
        );
        *context = next;

        self.summarize(&context).await
    }

    pub async fn summary(&self) -> ServiceResult<SessionSummary> {
        let context = self.context.read().await;
        self.summarize(&context).await
    }

    async fn summarize(&self, context: &BucketContext) -> ServiceResult<SessionSummary> {
        Ok(SessionSummary {
            session_id: self.id,
            bucket: context.store.bucket().to_string(),
            kind: context.kind,
            sync_state: self.sync.state(),
            series: context.catalog.series_count(),
            entries: context.catalog.entry_count(),
            records: self.progress.len().await?,
            last_pull: context.last_pull.clone(),
        })
    }

    pub async fn catalog(&self) -> Arc<Catalog> {
        self.context.read().await.catalog.clone()
    }

    /// Series names in natural order, optionally filtered by a
    /// case-insensitive substring.
    pub async fn series_names(&self, search: Option<&str>) -> Vec<String> {
        let catalog = self.catalog().await;
        let mut names = catalog.search(search.unwrap_or_default());
        names.sort_by(|a, b| natural_cmp(a, b));
        names.into_iter().map(str::to_string).collect()
    }

    pub async fn season_overview(&self, series: &str) -> ServiceResult<Vec<SeasonOverview>> {
        let catalog = self.catalog().await;
        let seasons = catalog
            .sorted_seasons(series)
            .ok_or_else(|| ServiceError::SeriesNotFound(series.to_string()))?;

        let watched: HashMap<String, u64> = self
            .progress
            .season_progress(series)
            .await?
            .into_iter()
            .map(|season| (season.season, season.watched))
            .collect();

        Ok(seasons
            .into_iter()
            .map(|season| {
                let episodes = catalog.entries(series, season).map_or(0, |e| e.len());
                SeasonOverview {
                    name: season.to_string(),
                    episodes,
                    watched: watched.get(season).copied().unwrap_or(0).min(episodes as u64),
                }
            })
            .collect())
    }

    pub async fn episodes(&self, series: &str, season: &str) -> ServiceResult<Vec<EpisodeView>> {
        let catalog = self.catalog().await;
        let entries = sorted_entries(&catalog, series, season)?;

        let mut progress: HashMap<String, ProgressRecord> = self
            .progress
            .get_for_series(series)
            .await?
            .into_iter()
            .filter(|record| record.season == season)
            .map(|record| (record.episode_name.clone(), record))
            .collect();

        Ok(entries
            .into_iter()
            .map(|entry| EpisodeView {
                progress: progress.remove(&entry.name),
                entry: entry.clone(),
            })
            .collect())
    }

    pub async fn progress(&self, key: &EpisodeKey) -> ServiceResult<Option<ProgressRecord>> {
        self.progress.get(key).await
    }

    /// Store a player report and push the snapshot.
    ///
    /// If the push fails the local record is kept and the push error is
    /// returned.
    pub async fn record_progress(
        &self,
        key: &EpisodeKey,
        position: f64,
        duration: f64,
        ended: bool,
    ) -> ServiceResult<ProgressRecord> {
        let context = self.context.read().await;
        lookup_entry(&context.catalog, key)?;

        let position = finite_or_zero(position);
        let duration = finite_or_zero(duration);
        let completed = is_completed(position, duration, ended);

        let record = self
            .progress
            .upsert(key, position, duration, completed)
            .await?;
        self.sync.push(context.store.as_ref()).await?;
        Ok(record)
    }

    pub async fn sync_now(&self) -> ServiceResult<PushReceipt> {
        let context = self.context.read().await;
        self.sync.push(context.store.as_ref()).await
    }

    /// Presigned GET for the object behind `key`.
    pub async fn playback_url(&self, key: &EpisodeKey) -> ServiceResult<PlaybackUrl> {
        let context = self.context.read().await;
        let entry = lookup_entry(&context.catalog, key)?;
        let url = context.store.presign_get(&entry.key, PLAYBACK_URL_TTL).await?;
        Ok(PlaybackUrl {
            url,
            expires_in_secs: PLAYBACK_URL_TTL.as_secs(),
        })
    }
}

async fn load(
    sync: &SnapshotSync,
    store: Arc<dyn ObjectStore>,
    kind: BucketKind,
) -> ServiceResult<BucketContext> {
    let objects = ObjectListingClient::new(store.as_ref()).list().await?;
    let catalog = build_catalog(&objects, kind.mode());
    let last_pull = sync.pull(store.as_ref()).await?;
    Ok(BucketContext {
        store,
        kind,
        catalog: Arc::new(catalog),
        last_pull,
    })
}

fn sorted_entries<'a>(
    catalog: &'a Catalog,
    series: &str,
    season: &str,
) -> ServiceResult<Vec<&'a CatalogEntry>> {
    if catalog.seasons(series).is_none() {
        return Err(ServiceError::SeriesNotFound(series.to_string()));
    }
    catalog
        .sorted_entries(series, season)
        .ok_or_else(|| ServiceError::SeasonNotFound {
            series: series.to_string(),
            season: season.to_string(),
        })
}

fn lookup_entry<'a>(catalog: &'a Catalog, key: &EpisodeKey) -> ServiceResult<&'a CatalogEntry> {
    sorted_entries(catalog, &key.series_name, &key.season)?;
    catalog
        .entry(&key.series_name, &key.season, &key.episode_name)
        .ok_or_else(|| ServiceError::EpisodeNotFound {
            series: key.series_name.clone(),
            season: key.season.clone(),
            episode: key.episode_name.clone(),
        })
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

fn is_completed(position: f64, duration: f64, ended: bool) -> bool {
    ended || (duration > 0.0 && position > COMPLETION_THRESHOLD * duration)
}
