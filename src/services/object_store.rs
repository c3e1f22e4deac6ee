//! The object-storage boundary used by the listing client and the sync engine.

use crate::{errors::ServiceResult, models::object::ObjectDescriptor};
use async_trait::async_trait;
use bytes::Bytes;
use std::{sync::Arc, time::Duration};

/// One page of a bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectDescriptor>,
    /// Token for the next page; `None` once the listing is exhausted.
    pub next_continuation_token: Option<String>,
}

/// Key-value object store bound to a single bucket.
///
/// Implementations map every transport or authorization failure to
/// `ServiceError::Connectivity`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bound bucket.
    fn bucket(&self) -> &str;

    /// The same connection bound to another bucket.
    fn for_bucket(&self, bucket: &str) -> Arc<dyn ObjectStore>;

    /// Cheap connectivity check; fails when the bucket cannot be listed.
    async fn probe(&self) -> ServiceResult<()>;

    /// Fetch one listing page, resuming after `continuation_token`.
    async fn list_page(&self, continuation_token: Option<&str>) -> ServiceResult<ListPage>;

    /// Read a whole object. `Ok(None)` when the key does not exist.
    async fn get_object(&self, key: &str) -> ServiceResult<Option<Bytes>>;

    /// Create or fully replace an object.
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> ServiceResult<()>;

    /// Pre-signed GET URL for playback clients.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> ServiceResult<String>;
}
