//! src/services/sync_service.rs
//!
//! SnapshotSync: moves the whole progress store to and from one Parquet
//! object in the bucket.
//!
//! - Pull replaces the local set with the remote snapshot. A missing,
//!   unreachable or unreadable snapshot leaves the local set empty instead of
//!   failing the session.
//! - Push exports everything and overwrites the snapshot. There is no merge:
//!   when two sessions share a bucket the last push wins. Push errors are
//!   always returned to the caller.

use crate::{
    errors::{ServiceError, ServiceResult},
    services::{
        object_store::ObjectStore,
        progress_service::ProgressStore,
        snapshot_codec::{decode_snapshot, encode_snapshot},
    },
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

/// Fixed key of the snapshot, under the reserved system prefix.
pub const SNAPSHOT_KEY: &str = "streamhub/progress_tracker.parquet";

pub const SNAPSHOT_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Disconnected,
    Pulling,
    Ready,
    Pushing,
}

/// Result of a pull. Every variant other than `Restored` leaves the local
/// store empty.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PullOutcome {
    Restored { records: usize },
    /// First run against this bucket.
    NoSnapshot,
    /// The snapshot could not be fetched.
    Unavailable { reason: String },
    /// The snapshot was fetched but could not be decoded.
    Discarded { reason: String },
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushReceipt {
    pub records: usize,
    pub bytes: usize,
}

/// Snapshot synchronization engine for one progress store.
///
/// Pulls and pushes are single-flight: a pull started while a push is in
/// progress waits for the push to finish.
#[derive(Clone, Debug)]
pub struct SnapshotSync {
    progress: ProgressStore,
    state: Arc<watch::Sender<SyncState>>,
    flight: Arc<Mutex<()>>,
}

impl SnapshotSync {
    pub fn new(progress: ProgressStore) -> Self {
        Self {
            progress,
            state: Arc::new(watch::Sender::new(SyncState::Disconnected)),
            flight: Arc::new(Mutex::new(())),
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Replace the local store with the snapshot stored in `store`'s bucket.
    ///
    /// Only local database failures are returned as errors.
    pub async fn pull(&self, store: &dyn ObjectStore) -> ServiceResult<PullOutcome> {
        let _flight = self.flight.lock().await;
        self.state.send_replace(SyncState::Pulling);

        let outcome = self.pull_inner(store).await;
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                // The local store is in an unknown state; do not allow pushes.
                self.state.send_replace(SyncState::Disconnected);
                return Err(err);
            }
        };

        self.state.send_replace(SyncState::Ready);
        match &outcome {
            PullOutcome::Restored { records } => {
                info!(bucket = store.bucket(), records, "progress restored from snapshot")
            }
            PullOutcome::NoSnapshot => {
                info!(bucket = store.bucket(), "no snapshot yet, starting empty")
            }
            PullOutcome::Unavailable { reason } => {
                warn!(bucket = store.bucket(), %reason, "snapshot unavailable, starting empty")
            }
            PullOutcome::Discarded { reason } => {
                warn!(bucket = store.bucket(), %reason, "snapshot malformed, starting empty")
            }
        }
        Ok(outcome)
    }

    async fn pull_inner(&self, store: &dyn ObjectStore) -> ServiceResult<PullOutcome> {
        let data = match store.get_object(SNAPSHOT_KEY).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                self.progress.clear().await?;
                return Ok(PullOutcome::NoSnapshot);
            }
            Err(err) => {
                self.progress.clear().await?;
                return Ok(PullOutcome::Unavailable {
                    reason: err.to_string(),
                });
            }
        };

        let records = match decode_snapshot(SNAPSHOT_KEY, data) {
            Ok(records) => records,
            Err(err) => {
                self.progress.clear().await?;
                return Ok(PullOutcome::Discarded {
                    reason: err.to_string(),
                });
            }
        };

        match self.progress.replace_all(&records).await {
            Ok(()) => Ok(PullOutcome::Restored {
                records: records.len(),
            }),
            Err(err @ ServiceError::InvalidProgress(_)) => {
                self.progress.clear().await?;
                Ok(PullOutcome::Discarded {
                    reason: err.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Overwrite the snapshot in `store`'s bucket with the full local set.
    pub async fn push(&self, store: &dyn ObjectStore) -> ServiceResult<PushReceipt> {
        let _flight = self.flight.lock().await;
        if self.state() == SyncState::Disconnected {
            return Err(ServiceError::NotConnected);
        }
        self.state.send_replace(SyncState::Pushing);

        let result = self.push_inner(store).await;
        self.state.send_replace(SyncState::Ready);

        match &result {
            Ok(receipt) => info!(
                bucket = store.bucket(),
                records = receipt.records,
                bytes = receipt.bytes,
                "snapshot pushed"
            ),
            Err(err) => warn!(bucket = store.bucket(), error = %err, "snapshot push failed"),
        }
        result
    }

    async fn push_inner(&self, store: &dyn ObjectStore) -> ServiceResult<PushReceipt> {
        let records = self.progress.export_all().await?;
        let body = encode_snapshot(&records)?;
        let receipt = PushReceipt {
            records: records.len(),
            bytes: body.len(),
        };
        store
            .put_object(SNAPSHOT_KEY, body, SNAPSHOT_CONTENT_TYPE)
            .await?;
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::progress::EpisodeKey, services::memory_store::MemoryObjectStore};
    use bytes::Bytes;

    async fn engine() -> (SnapshotSync, ProgressStore) {
        let progress = ProgressStore::in_memory().await.unwrap();
        (SnapshotSync::new(progress.clone()), progress)
    }

    #[tokio::test]
    async fn pull_without_snapshot_starts_empty() {
        let (sync, progress) = engine().await;
        let store = MemoryObjectStore::new("series");

        let outcome = sync.pull(&store).await.unwrap();
        assert_eq!(outcome, PullOutcome::NoSnapshot);
        assert!(progress.is_empty().await.unwrap());
        assert_eq!(sync.state(), SyncState::Ready);
    }

    #[tokio::test]
    async fn push_before_pull_is_refused() {
        let (sync, _) = engine().await;
        let store = MemoryObjectStore::new("series");

        let err = sync.push(&store).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotConnected));
        assert_eq!(store.put_count().await, 0);
    }

    #[tokio::test]
    async fn push_then_pull_in_new_session_restores_records() {
        let (sync, progress) = engine().await;
        let store = MemoryObjectStore::new("series");
        sync.pull(&store).await.unwrap();

        let key = EpisodeKey::new("ShowA", "S1", "E1.mp4");
        progress.upsert(&key, 300.0, 600.0, false).await.unwrap();
        let receipt = sync.push(&store).await.unwrap();
        assert_eq!(receipt.records, 1);

        let stored = store.object(SNAPSHOT_KEY).await.unwrap();
        assert_eq!(stored.content_type, SNAPSHOT_CONTENT_TYPE);
        assert_eq!(stored.body.len(), receipt.bytes);

        let (other, other_progress) = engine().await;
        let outcome = other.pull(&store).await.unwrap();
        assert_eq!(outcome, PullOutcome::Restored { records: 1 });
        assert_eq!(
            other_progress.export_all().await.unwrap(),
            progress.export_all().await.unwrap()
        );
    }

    #[tokio::test]
    async fn malformed_snapshot_is_discarded() {
        let (sync, progress) = engine().await;
        let store = MemoryObjectStore::new("series");
        store.insert(SNAPSHOT_KEY, Bytes::from_static(b"garbage")).await;
        progress
            .upsert(&EpisodeKey::new("Old", "S1", "E1"), 1.0, 2.0, false)
            .await
            .unwrap();

        let outcome = sync.pull(&store).await.unwrap();
        assert!(matches!(outcome, PullOutcome::Discarded { .. }));
        assert!(progress.is_empty().await.unwrap());
        assert_eq!(sync.state(), SyncState::Ready);
    }

    #[tokio::test]
    async fn unreachable_snapshot_degrades_to_empty() {
        let (sync, _) = engine().await;
        let store = MemoryObjectStore::new("series");
        store.fail_gets(true).await;

        let outcome = sync.pull(&store).await.unwrap();
        assert!(matches!(outcome, PullOutcome::Unavailable { .. }));
    }

    #[tokio::test]
    async fn push_failure_is_reported_and_state_recovers() {
        let (sync, _) = engine().await;
        let store = MemoryObjectStore::new("series");
        sync.pull(&store).await.unwrap();
        store.fail_puts(true).await;

        let err = sync.push(&store).await.unwrap_err();
        assert!(matches!(err, ServiceError::Connectivity { .. }));
        assert_eq!(sync.state(), SyncState::Ready);

        store.fail_puts(false).await;
        sync.push(&store).await.unwrap();
    }

    #[tokio::test]
    async fn unchanged_data_pushes_identical_bytes() {
        let (sync, progress) = engine().await;
        let store = MemoryObjectStore::new("series");
        sync.pull(&store).await.unwrap();
        progress
            .upsert(&EpisodeKey::new("ShowA", "S1", "E1.mp4"), 5.0, 10.0, true)
            .await
            .unwrap();

        sync.push(&store).await.unwrap();
        let first = store.object(SNAPSHOT_KEY).await.unwrap().body;
        sync.pull(&store).await.unwrap();
        sync.push(&store).await.unwrap();
        let second = store.object(SNAPSHOT_KEY).await.unwrap().body;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn state_changes_are_observable() {
        let (sync, _) = engine().await;
        let mut rx = sync.subscribe();
        assert_eq!(*rx.borrow_and_update(), SyncState::Disconnected);

        sync.pull(&MemoryObjectStore::new("series")).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SyncState::Ready);
    }
}
