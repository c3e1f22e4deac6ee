//! Exhaustive bucket listing over a paginated object store.

use crate::{
    errors::{ServiceError, ServiceResult},
    models::object::ObjectDescriptor,
    services::object_store::ObjectStore,
};
use std::collections::HashSet;
use tracing::debug;

/// Follows continuation tokens until the store reports the last page.
///
/// Any failing page aborts the whole listing; a partial result is never
/// returned. A continuation token seen twice means the store is cycling and
/// is reported as a connectivity error.
pub struct ObjectListingClient<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> ObjectListingClient<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> ServiceResult<Vec<ObjectDescriptor>> {
        let mut continuation_token: Option<String> = None;
        let mut all_objects: Vec<ObjectDescriptor> = Vec::new();
        let mut seen_tokens: HashSet<String> = HashSet::new();
        let mut pages = 0usize;

        loop {
            let page = self.store.list_page(continuation_token.as_deref()).await?;
            pages += 1;
            debug!(
                bucket = self.store.bucket(),
                page = pages,
                objects = page.objects.len(),
                "listed page"
            );
            all_objects.extend(page.objects);

            match page.next_continuation_token {
                Some(next) if !seen_tokens.insert(next.clone()) => {
                    return Err(ServiceError::Connectivity {
                        operation: "list_objects_v2",
                        message: format!("store repeated continuation token `{next}`"),
                    });
                }
                Some(next) => continuation_token = Some(next),
                None => break,
            }
        }

        debug!(
            bucket = self.store.bucket(),
            pages,
            objects = all_objects.len(),
            "listing complete"
        );
        Ok(all_objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        memory_store::MemoryObjectStore,
        object_store::{ListPage, ObjectStore},
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    #[tokio::test]
    async fn collects_every_page() {
        let store = MemoryObjectStore::new("series").with_page_size(2);
        for i in 0..7 {
            store
                .insert(&format!("Show/S1/E{i}.mp4"), Bytes::from_static(b"v"))
                .await;
        }

        let objects = ObjectListingClient::new(&store).list().await.unwrap();
        assert_eq!(objects.len(), 7);
    }

    #[tokio::test]
    async fn empty_bucket_lists_nothing() {
        let store = MemoryObjectStore::new("empty");
        let objects = ObjectListingClient::new(&store).list().await.unwrap();
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn failing_page_aborts_listing() {
        let store = MemoryObjectStore::new("series").with_page_size(2);
        for i in 0..5 {
            store
                .insert(&format!("Show/E{i}.mp4"), Bytes::from_static(b"v"))
                .await;
        }
        store.fail_listing_after(Some(1)).await;

        let err = ObjectListingClient::new(&store).list().await.unwrap_err();
        assert!(matches!(err, ServiceError::Connectivity { .. }));
    }

    /// Store whose pages hand out `tokens` in a loop, never ending the listing.
    #[derive(Clone)]
    struct CyclingStore {
        tokens: &'static [&'static str],
        served: Arc<AtomicUsize>,
    }

    impl CyclingStore {
        fn new(tokens: &'static [&'static str]) -> Self {
            Self {
                tokens,
                served: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for CyclingStore {
        fn bucket(&self) -> &str {
            "cycling"
        }

        fn for_bucket(&self, _bucket: &str) -> Arc<dyn ObjectStore> {
            Arc::new(self.clone())
        }

        async fn probe(&self) -> ServiceResult<()> {
            Ok(())
        }

        async fn list_page(&self, _token: Option<&str>) -> ServiceResult<ListPage> {
            let page = self.served.fetch_add(1, Ordering::SeqCst);
            Ok(ListPage {
                objects: Vec::new(),
                next_continuation_token: Some(self.tokens[page % self.tokens.len()].into()),
            })
        }

        async fn get_object(&self, _key: &str) -> ServiceResult<Option<Bytes>> {
            Ok(None)
        }

        async fn put_object(&self, _key: &str, _body: Bytes, _ct: &str) -> ServiceResult<()> {
            Ok(())
        }

        async fn presign_get(&self, key: &str, _expires_in: Duration) -> ServiceResult<String> {
            Ok(key.to_string())
        }
    }

    #[tokio::test]
    async fn repeated_token_is_an_error() {
        let store = CyclingStore::new(&["same"]);
        let err = ObjectListingClient::new(&store).list().await.unwrap_err();
        assert!(matches!(err, ServiceError::Connectivity { .. }));
    }

    #[tokio::test]
    async fn alternating_tokens_are_an_error() {
        let store = CyclingStore::new(&["A", "B"]);
        let listing = ObjectListingClient::new(&store).list();
        let err = tokio::time::timeout(Duration::from_secs(2), listing)
            .await
            .expect("listing must terminate")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Connectivity { .. }));
        // A, B, then A again.
        assert_eq!(store.served.load(Ordering::SeqCst), 3);
    }
}
