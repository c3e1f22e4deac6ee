//! In-memory `ObjectStore` with S3 ListObjectsV2 pagination semantics.
//!
//! Buckets share one backing map, so `for_bucket` sees objects written through
//! any other handle. Failures can be switched on per operation to exercise
//! the error paths of the listing client and the sync engine.

use crate::{
    errors::{ServiceError, ServiceResult},
    models::object::ObjectDescriptor,
    services::object_store::{ListPage, ObjectStore},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Failures {
    /// Fail the listing call once this many pages have been served.
    list_after_pages: Option<usize>,
    gets: bool,
    puts: bool,
}

#[derive(Debug, Default)]
struct Shared {
    buckets: HashMap<String, BTreeMap<String, StoredObject>>,
    failures: Failures,
    pages_served: usize,
    puts: usize,
}

#[derive(Debug, Clone)]
pub struct MemoryObjectStore {
    bucket: String,
    page_size: usize,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            page_size: DEFAULT_PAGE_SIZE,
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Limit the number of keys returned per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Seed an object directly, bypassing failure injection.
    pub async fn insert(&self, key: &str, body: impl Into<Bytes>) {
        let mut shared = self.shared.lock().await;
        shared
            .buckets
            .entry(self.bucket.clone())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    body: body.into(),
                    content_type: "application/octet-stream".into(),
                    last_modified: Utc::now(),
                },
            );
    }

    /// Handle on another bucket backed by the same objects and failure switches.
    pub fn bucket_handle(&self, bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            page_size: self.page_size,
            shared: self.shared.clone(),
        }
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        let shared = self.shared.lock().await;
        shared
            .buckets
            .get(&self.bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
    }

    pub async fn fail_listing_after(&self, pages: Option<usize>) {
        let mut shared = self.shared.lock().await;
        shared.failures.list_after_pages = pages;
        shared.pages_served = 0;
    }

    pub async fn fail_gets(&self, fail: bool) {
        self.shared.lock().await.failures.gets = fail;
    }

    pub async fn fail_puts(&self, fail: bool) {
        self.shared.lock().await.failures.puts = fail;
    }

    /// Number of successful puts across all buckets.
    pub async fn put_count(&self) -> usize {
        self.shared.lock().await.puts
    }
}

fn injected(operation: &'static str) -> ServiceError {
    ServiceError::Connectivity {
        operation,
        message: "injected failure".into(),
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn for_bucket(&self, bucket: &str) -> Arc<dyn ObjectStore> {
        Arc::new(self.bucket_handle(bucket))
    }

    async fn probe(&self) -> ServiceResult<()> {
        let shared = self.shared.lock().await;
        if shared.failures.list_after_pages == Some(0) {
            return Err(injected("probe"));
        }
        Ok(())
    }

    async fn list_page(&self, continuation_token: Option<&str>) -> ServiceResult<ListPage> {
        let mut shared = self.shared.lock().await;
        if let Some(limit) = shared.failures.list_after_pages {
            if shared.pages_served >= limit {
                return Err(injected("list_objects_v2"));
            }
        }
        shared.pages_served += 1;

        let Some(objects) = shared.buckets.get(&self.bucket) else {
            return Ok(ListPage::default());
        };

        let lower = match continuation_token {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Unbounded,
        };

        // Fetch one extra row to learn whether the listing is truncated.
        let mut rows: Vec<ObjectDescriptor> = objects
            .range((lower, Bound::Unbounded))
            .take(self.page_size + 1)
            .map(|(key, stored)| {
                ObjectDescriptor::new(key, stored.body.len() as u64, stored.last_modified)
            })
            .collect();

        let mut next_continuation_token = None;
        if rows.len() > self.page_size {
            rows.truncate(self.page_size);
            next_continuation_token = rows.last().map(|last| last.key.clone());
        }

        Ok(ListPage {
            objects: rows,
            next_continuation_token,
        })
    }

    async fn get_object(&self, key: &str) -> ServiceResult<Option<Bytes>> {
        let shared = self.shared.lock().await;
        if shared.failures.gets {
            return Err(injected("get_object"));
        }
        Ok(shared
            .buckets
            .get(&self.bucket)
            .and_then(|objects| objects.get(key))
            .map(|stored| stored.body.clone()))
    }

    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> ServiceResult<()> {
        let mut shared = self.shared.lock().await;
        if shared.failures.puts {
            return Err(injected("put_object"));
        }
        shared
            .buckets
            .entry(self.bucket.clone())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    body,
                    content_type: content_type.to_string(),
                    last_modified: Utc::now(),
                },
            );
        shared.puts += 1;
        Ok(())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> ServiceResult<String> {
        Ok(format!(
            "memory://{}/{}?expires={}",
            self.bucket,
            key,
            expires_in.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_follow_key_order() {
        let store = MemoryObjectStore::new("media").with_page_size(2);
        for key in ["c", "a", "e", "b", "d"] {
            store.insert(key, Bytes::from_static(b"x")).await;
        }

        let first = store.list_page(None).await.unwrap();
        let keys: Vec<_> = first.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(first.next_continuation_token.as_deref(), Some("b"));

        let last = store.list_page(Some("d")).await.unwrap();
        assert_eq!(last.objects.len(), 1);
        assert_eq!(last.objects[0].key, "e");
        assert!(last.next_continuation_token.is_none());
    }

    #[tokio::test]
    async fn buckets_are_isolated_but_shared_between_handles() {
        let store = MemoryObjectStore::new("series");
        let movies = store.for_bucket("movie");
        movies
            .put_object("Film.mp4", Bytes::from_static(b"f"), "video/mp4")
            .await
            .unwrap();

        assert!(store.get_object("Film.mp4").await.unwrap().is_none());
        let again = store.for_bucket("movie");
        assert!(again.get_object("Film.mp4").await.unwrap().is_some());
        assert_eq!(store.put_count().await, 1);
    }
}
