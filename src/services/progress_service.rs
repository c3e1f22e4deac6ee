//! src/services/progress_service.rs
//!
//! ProgressStore: the local, queryable set of watch progress records.
//! Records live in an embedded SQLite database (in-memory by default) and
//! every query is parameterized. The store persists exactly what it is told;
//! completion inference belongs to the caller.

use crate::{
    errors::{ServiceError, ServiceResult},
    models::progress::{EpisodeKey, ProgressRecord, SeasonProgress},
};
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{
    FromRow, Sqlite, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, time::Duration};
use tracing::debug;

const MIGRATION: &str = include_str!("../../migrations/0001_progress.sql");

pub const IN_MEMORY_URL: &str = "sqlite::memory:";

const SELECT_COLUMNS: &str = "SELECT series_name, season, episode_name, position, duration, \
     last_updated, completed FROM progress";

#[derive(FromRow)]
struct ProgressRow {
    series_name: String,
    season: String,
    episode_name: String,
    position: f64,
    duration: f64,
    last_updated: i64,
    completed: bool,
}

impl From<ProgressRow> for ProgressRecord {
    fn from(row: ProgressRow) -> Self {
        ProgressRecord {
            series_name: row.series_name,
            season: row.season,
            episode_name: row.episode_name,
            position: row.position,
            duration: row.duration,
            last_updated: DateTime::from_timestamp_micros(row.last_updated)
                .unwrap_or(DateTime::UNIX_EPOCH),
            completed: row.completed,
        }
    }
}

/// Embedded progress dataset keyed by (series, season, episode).
///
/// Cloning is cheap; clones share the same database.
#[derive(Clone, Debug)]
pub struct ProgressStore {
    db: SqlitePool,
}

impl ProgressStore {
    /// Open (and create if missing) the database at `database_url`.
    ///
    /// The pool holds a single connection that is never recycled, so an
    /// in-memory database lives as long as the store.
    pub async fn open(database_url: &str) -> ServiceResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let db = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        let store = Self { db };
        store.run_migrations().await?;
        debug!(database_url, "progress store ready");
        Ok(store)
    }

    pub async fn in_memory() -> ServiceResult<Self> {
        Self::open(IN_MEMORY_URL).await
    }

    /// Apply the embedded schema statement by statement.
    async fn run_migrations(&self) -> ServiceResult<()> {
        let statements = MIGRATION
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty());

        for stmt in statements {
            sqlx::query(stmt).execute(&self.db).await?;
        }
        Ok(())
    }

    /// Readiness check used by `/readyz`.
    pub async fn ping(&self) -> ServiceResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.db)
            .await?;
        Ok(())
    }

    /// Replace the record for `key` with a freshly timestamped one.
    ///
    /// Delete-then-insert inside one transaction, so repeated calls for the
    /// same key always leave exactly one row.
    pub async fn upsert(
        &self,
        key: &EpisodeKey,
        position: f64,
        duration: f64,
        completed: bool,
    ) -> ServiceResult<ProgressRecord> {
        let record = ProgressRecord {
            series_name: key.series_name.clone(),
            season: key.season.clone(),
            episode_name: key.episode_name.clone(),
            position,
            duration,
            last_updated: Utc::now().trunc_subsecs(6),
            completed,
        };
        ensure_finite(&record)?;

        let mut tx = self.db.begin().await?;
        write_record(&mut tx, &record).await?;
        tx.commit().await?;

        debug!(
            series = %record.series_name,
            season = %record.season,
            episode = %record.episode_name,
            position,
            completed,
            "progress upserted"
        );
        Ok(record)
    }

    pub async fn get(&self, key: &EpisodeKey) -> ServiceResult<Option<ProgressRecord>> {
        let row = sqlx::query_as::<_, ProgressRow>(&format!(
            "{SELECT_COLUMNS} WHERE series_name = ? AND season = ? AND episode_name = ?"
        ))
        .bind(&key.series_name)
        .bind(&key.season)
        .bind(&key.episode_name)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(ProgressRecord::from))
    }

    /// All records of one series, across seasons.
    pub async fn get_for_series(&self, series_name: &str) -> ServiceResult<Vec<ProgressRecord>> {
        let rows = sqlx::query_as::<_, ProgressRow>(&format!(
            "{SELECT_COLUMNS} WHERE series_name = ? ORDER BY season ASC, episode_name ASC"
        ))
        .bind(series_name)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(ProgressRecord::from).collect())
    }

    /// Tracked and watched counts per season of one series.
    pub async fn season_progress(&self, series_name: &str) -> ServiceResult<Vec<SeasonProgress>> {
        let rows = sqlx::query_as::<_, (String, i64, i64)>(
            "SELECT season, COUNT(*), COALESCE(SUM(completed), 0)
             FROM progress WHERE series_name = ?
             GROUP BY season ORDER BY season ASC",
        )
        .bind(series_name)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(season, tracked, watched)| SeasonProgress {
                season,
                tracked: tracked.max(0) as u64,
                watched: watched.max(0) as u64,
            })
            .collect())
    }

    /// Discard every record and install `records` in one transaction.
    ///
    /// Nothing changes if any record is rejected. When a key appears more
    /// than once, the last occurrence wins.
    pub async fn replace_all(&self, records: &[ProgressRecord]) -> ServiceResult<()> {
        for record in records {
            ensure_finite(record)?;
        }

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM progress").execute(&mut *tx).await?;
        for record in records {
            write_record(&mut tx, record).await?;
        }
        tx.commit().await?;

        debug!(records = records.len(), "progress store replaced");
        Ok(())
    }

    /// Every record ordered by (series, season, episode).
    pub async fn export_all(&self) -> ServiceResult<Vec<ProgressRecord>> {
        let rows = sqlx::query_as::<_, ProgressRow>(&format!(
            "{SELECT_COLUMNS} ORDER BY series_name ASC, season ASC, episode_name ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(ProgressRecord::from).collect())
    }

    pub async fn clear(&self) -> ServiceResult<()> {
        sqlx::query("DELETE FROM progress").execute(&self.db).await?;
        Ok(())
    }

    pub async fn len(&self) -> ServiceResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM progress")
            .fetch_one(&self.db)
            .await?;
        Ok(count.max(0) as u64)
    }

    pub async fn is_empty(&self) -> ServiceResult<bool> {
        Ok(self.len().await? == 0)
    }
}

fn ensure_finite(record: &ProgressRecord) -> ServiceResult<()> {
    if !record.position.is_finite() || !record.duration.is_finite() {
        return Err(ServiceError::InvalidProgress(format!(
            "position {} / duration {} for `{}` must be finite",
            record.position, record.duration, record.episode_name
        )));
    }
    Ok(())
}

async fn write_record(
    tx: &mut Transaction<'_, Sqlite>,
    record: &ProgressRecord,
) -> ServiceResult<()> {
    sqlx::query("DELETE FROM progress WHERE series_name = ? AND season = ? AND episode_name = ?")
        .bind(&record.series_name)
        .bind(&record.season)
        .bind(&record.episode_name)
        .execute(&mut **tx)
        .await?;

    sqlx::query(
        "INSERT INTO progress (
            series_name, season, episode_name, position, duration, last_updated, completed
        ) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.series_name)
    .bind(&record.season)
    .bind(&record.episode_name)
    .bind(record.position)
    .bind(record.duration)
    .bind(record.last_updated.timestamp_micros())
    .bind(record.completed)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(series: &str, season: &str, episode: &str) -> EpisodeKey {
        EpisodeKey::new(series, season, episode)
    }

    fn record(series: &str, season: &str, episode: &str, position: f64) -> ProgressRecord {
        ProgressRecord {
            series_name: series.into(),
            season: season.into(),
            episode_name: episode.into(),
            position,
            duration: 1200.0,
            last_updated: DateTime::from_timestamp_micros(1_700_000_000_123_456).unwrap(),
            completed: position > 1080.0,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_a_single_row_per_key() {
        let store = ProgressStore::in_memory().await.unwrap();
        let k = key("ShowA", "S1", "E1.mp4");

        store.upsert(&k, 100.0, 600.0, false).await.unwrap();
        store.upsert(&k, 250.0, 600.0, false).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        let found = store.get(&k).await.unwrap().unwrap();
        assert_eq!(found.position, 250.0);
        assert_eq!(found.duration, 600.0);
        assert!(!found.completed);
    }

    #[tokio::test]
    async fn store_does_not_infer_completion() {
        let store = ProgressStore::in_memory().await.unwrap();
        let k = key("ShowA", "S1", "E1.mp4");
        store.upsert(&k, 540.0, 600.0, false).await.unwrap();
        assert!(!store.get(&k).await.unwrap().unwrap().completed);

        store.upsert(&k, 599.0, 600.0, false).await.unwrap();
        assert!(!store.get(&k).await.unwrap().unwrap().completed);
    }

    #[tokio::test]
    async fn get_misses_return_none() {
        let store = ProgressStore::in_memory().await.unwrap();
        assert!(store.get(&key("a", "b", "c")).await.unwrap().is_none());
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn upsert_rejects_non_finite_values() {
        let store = ProgressStore::in_memory().await.unwrap();
        let err = store
            .upsert(&key("a", "b", "c"), f64::NAN, 10.0, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidProgress(_)));
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn series_queries_span_seasons_only_of_that_series() {
        let store = ProgressStore::in_memory().await.unwrap();
        store
            .replace_all(&[
                record("ShowA", "S2", "E1.mp4", 1100.0),
                record("ShowA", "S1", "E2.mp4", 10.0),
                record("ShowA", "S1", "E1.mp4", 1190.0),
                record("ShowB", "S1", "E1.mp4", 1190.0),
            ])
            .await
            .unwrap();

        let show_a = store.get_for_series("ShowA").await.unwrap();
        let keys: Vec<_> = show_a
            .iter()
            .map(|r| (r.season.as_str(), r.episode_name.as_str()))
            .collect();
        assert_eq!(keys, [("S1", "E1.mp4"), ("S1", "E2.mp4"), ("S2", "E1.mp4")]);

        let seasons = store.season_progress("ShowA").await.unwrap();
        assert_eq!(
            seasons,
            [
                SeasonProgress {
                    season: "S1".into(),
                    tracked: 2,
                    watched: 1
                },
                SeasonProgress {
                    season: "S2".into(),
                    tracked: 1,
                    watched: 1
                },
            ]
        );
        assert!(store.season_progress("Nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn replace_all_then_export_returns_sorted_records() {
        let store = ProgressStore::in_memory().await.unwrap();
        store
            .upsert(&key("Old", "S1", "E1.mp4"), 1.0, 2.0, false)
            .await
            .unwrap();

        let mut records = vec![
            record("b", "S1", "E1", 5.0),
            record("a", "S2", "E1", 6.0),
            record("a", "S1", "E2", 7.0),
            record("a", "S1", "E10", 8.0),
        ];
        store.replace_all(&records).await.unwrap();

        records.sort_by(|x, y| x.sort_key().cmp(&y.sort_key()));
        assert_eq!(store.export_all().await.unwrap(), records);
    }

    #[tokio::test]
    async fn replace_all_is_all_or_nothing() {
        let store = ProgressStore::in_memory().await.unwrap();
        let existing = store
            .upsert(&key("Keep", "S1", "E1"), 3.0, 4.0, false)
            .await
            .unwrap();

        let err = store
            .replace_all(&[
                record("New", "S1", "E1", 1.0),
                record("New", "S1", "E2", f64::INFINITY),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidProgress(_)));
        assert_eq!(store.export_all().await.unwrap(), vec![existing]);
    }

    #[tokio::test]
    async fn replace_all_last_duplicate_wins() {
        let store = ProgressStore::in_memory().await.unwrap();
        store
            .replace_all(&[record("a", "S1", "E1", 1.0), record("a", "S1", "E1", 2.0)])
            .await
            .unwrap();
        let all = store.export_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].position, 2.0);
    }

    #[tokio::test]
    async fn last_updated_round_trips_at_microsecond_precision() {
        let store = ProgressStore::in_memory().await.unwrap();
        let written = store
            .upsert(&key("a", "b", "c"), 1.0, 2.0, true)
            .await
            .unwrap();
        let read = store.get(&written.key()).await.unwrap().unwrap();
        assert_eq!(read, written);
    }
}
