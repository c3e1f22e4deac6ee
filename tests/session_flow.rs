//! End-to-end session behaviour against the in-memory object store.

use bytes::Bytes;
use std::sync::Arc;
use streamhub::{
    errors::ServiceError,
    models::{catalog::BucketKind, progress::EpisodeKey},
    services::{
        memory_store::MemoryObjectStore,
        progress_service::ProgressStore,
        session_service::Session,
        sync_service::{PullOutcome, SNAPSHOT_KEY, SyncState},
    },
};

async fn seeded(bucket: &str, keys: &[&str]) -> MemoryObjectStore {
    let store = MemoryObjectStore::new(bucket).with_page_size(2);
    for key in keys {
        store.insert(key, Bytes::from_static(b"media")).await;
    }
    store
}

async fn connect(store: &MemoryObjectStore, kind: BucketKind) -> Session {
    let progress = ProgressStore::in_memory().await.unwrap();
    Session::connect(Arc::new(store.clone()), kind, progress)
        .await
        .unwrap()
}

#[tokio::test]
async fn first_run_starts_empty_and_ready() {
    let store = seeded(
        "series",
        &["ShowA/S1/E1.mp4", "ShowA/S1/E2.mp4", "ShowA/S2/E1.mp4", "ShowB/E1.mp4"],
    )
    .await;
    let session = connect(&store, BucketKind::Series).await;

    let summary = session.summary().await.unwrap();
    assert_eq!(summary.sync_state, SyncState::Ready);
    assert_eq!(summary.last_pull, PullOutcome::NoSnapshot);
    assert_eq!(summary.series, 2);
    assert_eq!(summary.entries, 4);
    assert_eq!(summary.records, 0);

    let seasons: Vec<String> = session
        .season_overview("ShowB")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(seasons, ["Episodes"]);
}

#[tokio::test]
async fn progress_survives_into_a_new_session() {
    let store = seeded("series", &["ShowA/S1/E1.mp4", "ShowA/S1/E2.mp4"]).await;
    let first = connect(&store, BucketKind::Series).await;
    let key = EpisodeKey::new("ShowA", "S1", "E2.mp4");
    first.record_progress(&key, 120.0, 1500.0, false).await.unwrap();
    first
        .record_progress(&EpisodeKey::new("ShowA", "S1", "E1.mp4"), 0.0, 1500.0, true)
        .await
        .unwrap();

    // Another device opening the same bucket.
    let second = connect(&store, BucketKind::Series).await;
    let summary = second.summary().await.unwrap();
    assert_eq!(summary.last_pull, PullOutcome::Restored { records: 2 });

    let restored = second.progress(&key).await.unwrap().unwrap();
    assert_eq!(restored, first.progress(&key).await.unwrap().unwrap());

    let overview = second.season_overview("ShowA").await.unwrap();
    assert_eq!(overview[0].episodes, 2);
    assert_eq!(overview[0].watched, 1);
}

#[tokio::test]
async fn snapshot_key_never_enters_the_catalog() {
    let store = seeded("series", &["ShowA/S1/E1.mp4"]).await;
    let session = connect(&store, BucketKind::Series).await;
    session
        .record_progress(&EpisodeKey::new("ShowA", "S1", "E1.mp4"), 5.0, 10.0, false)
        .await
        .unwrap();
    assert!(store.object(SNAPSHOT_KEY).await.is_some());

    let reopened = connect(&store, BucketKind::Series).await;
    assert_eq!(reopened.series_names(None).await, ["ShowA"]);
}

#[tokio::test]
async fn switching_buckets_replaces_catalog_and_progress() {
    let series = seeded("series", &["ShowA/S1/E1.mp4"]).await;
    let session = connect(&series, BucketKind::Series).await;
    session
        .record_progress(&EpisodeKey::new("ShowA", "S1", "E1.mp4"), 5.0, 10.0, false)
        .await
        .unwrap();

    let movies = series.bucket_handle("movies");
    for key in ["Movie One.mp4", "Movie Two.mkv"] {
        movies.insert(key, Bytes::from_static(b"media")).await;
    }
    let summary = session.switch_bucket("movies", BucketKind::Movie).await.unwrap();
    assert_eq!(summary.bucket, "movies");
    assert_eq!(summary.records, 0);
    assert_eq!(session.series_names(None).await, ["Movie One", "Movie Two"]);

    let movie = EpisodeKey::new("Movie Two", "Movie", "Movie Two.mkv");
    session.record_progress(&movie, 5000.0, 5400.0, false).await.unwrap();
    assert!(movies.object(SNAPSHOT_KEY).await.is_some());

    // Back to the series bucket: its own snapshot comes back.
    let summary = session.switch_bucket("series", BucketKind::Series).await.unwrap();
    assert_eq!(summary.last_pull, PullOutcome::Restored { records: 1 });
    assert!(session.progress(&movie).await.unwrap().is_none());
}

#[tokio::test]
async fn corrupt_snapshot_degrades_to_empty_progress() {
    let store = seeded("series", &["ShowA/S1/E1.mp4"]).await;
    store
        .insert(SNAPSHOT_KEY, Bytes::from_static(b"PAR1 but not really"))
        .await;

    let session = connect(&store, BucketKind::Series).await;
    let summary = session.summary().await.unwrap();
    assert!(matches!(summary.last_pull, PullOutcome::Discarded { .. }));
    assert_eq!(summary.records, 0);
    assert_eq!(summary.sync_state, SyncState::Ready);

    // The next push overwrites the corrupt object.
    session.sync_now().await.unwrap();
    let reopened = connect(&store, BucketKind::Series).await;
    assert_eq!(
        reopened.summary().await.unwrap().last_pull,
        PullOutcome::Restored { records: 0 }
    );
}

#[tokio::test]
async fn unreachable_endpoint_fails_connect() {
    let store = seeded("series", &["ShowA/S1/E1.mp4"]).await;
    store.fail_listing_after(Some(0)).await;

    let progress = ProgressStore::in_memory().await.unwrap();
    let err = Session::connect(Arc::new(store), BucketKind::Series, progress)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ServiceError::Connectivity { .. }));
}

#[tokio::test]
async fn bucket_switch_waits_for_in_flight_push() {
    let store = seeded("series", &["ShowA/S1/E1.mp4"]).await;
    let session = connect(&store, BucketKind::Series).await;
    let key = EpisodeKey::new("ShowA", "S1", "E1.mp4");

    let writer = {
        let session = session.clone();
        let key = key.clone();
        tokio::spawn(async move { session.record_progress(&key, 42.0, 100.0, false).await })
    };
    let switcher = {
        let session = session.clone();
        tokio::spawn(async move { session.switch_bucket("empty", BucketKind::Series).await })
    };

    let written = writer.await.unwrap();
    switcher.await.unwrap().unwrap();

    // Whichever ran first, a successful write was pushed to the series bucket
    // before the switch cleared the local store.
    if written.is_ok() {
        let reopened = connect(&store, BucketKind::Series).await;
        assert_eq!(
            reopened.progress(&key).await.unwrap().map(|r| r.position),
            Some(42.0)
        );
    }
    assert_eq!(session.summary().await.unwrap().bucket, "empty");
}
