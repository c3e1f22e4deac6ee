//! `ObjectStore` backed by an S3-compatible endpoint via `aws-sdk-s3`.

use crate::{
    errors::{ServiceError, ServiceResult},
    models::{object::ObjectDescriptor, profile::ConnectionProfile},
    services::object_store::{ListPage, ObjectStore},
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client as S3Client,
    config::{Credentials, Region},
    error::DisplayErrorContext,
    presigning::PresigningConfig,
    primitives::ByteStream,
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tracing::debug;

const CREDENTIALS_PROVIDER: &str = "streamhub";

#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build a client from a decrypted connection profile.
    ///
    /// Path-style addressing is always enabled; most S3-compatible providers
    /// do not serve virtual-hosted buckets.
    pub fn from_profile(profile: &ConnectionProfile) -> Self {
        let credentials = Credentials::new(
            profile.access_key_id.clone(),
            profile.secret_access_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let mut config_builder = aws_sdk_s3::config::Builder::new()
            .behavior_version_latest()
            .region(Region::new(profile.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true);

        if let Some(endpoint) = profile
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            config_builder = config_builder.endpoint_url(endpoint.to_string());
        }

        Self {
            client: S3Client::from_conf(config_builder.build()),
            bucket: profile.bucket.clone(),
        }
    }
}

fn connectivity<E>(operation: &'static str, err: E) -> ServiceError
where
    E: std::error::Error,
{
    ServiceError::Connectivity {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

fn s3_datetime_to_utc(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    dt.to_millis()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Decide whether a ListObjectsV2 response has another page.
///
/// A returned token always continues the listing, whatever `IsTruncated`
/// says. A truncated page without a token cannot be resumed and fails the
/// listing instead of ending it early.
fn next_page_token(
    is_truncated: Option<bool>,
    next_continuation_token: Option<&str>,
) -> ServiceResult<Option<String>> {
    match (is_truncated, next_continuation_token) {
        (_, Some(token)) if !token.is_empty() => Ok(Some(token.to_string())),
        (Some(true), _) => Err(ServiceError::Connectivity {
            operation: "list_objects_v2",
            message: "truncated listing returned no continuation token".into(),
        }),
        _ => Ok(None),
    }
}

/// Base64 MD5 digest for the `Content-MD5` upload header.
fn content_md5(body: &[u8]) -> String {
    general_purpose::STANDARD.encode(md5::compute(body).0)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn for_bucket(&self, bucket: &str) -> Arc<dyn ObjectStore> {
        Arc::new(Self {
            client: self.client.clone(),
            bucket: bucket.to_string(),
        })
    }

    async fn probe(&self) -> ServiceResult<()> {
        self.client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(|err| connectivity("probe", err))?;
        Ok(())
    }

    async fn list_page(&self, continuation_token: Option<&str>) -> ServiceResult<ListPage> {
        let mut request = self.client.list_objects_v2().bucket(&self.bucket);
        if let Some(token) = continuation_token {
            request = request.continuation_token(token);
        }

        let output = request
            .send()
            .await
            .map_err(|err| connectivity("list_objects_v2", err))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|item| {
                let key = item.key()?;
                Some(ObjectDescriptor::new(
                    key,
                    item.size().unwrap_or(0).max(0) as u64,
                    item.last_modified()
                        .and_then(s3_datetime_to_utc)
                        .unwrap_or(DateTime::UNIX_EPOCH),
                ))
            })
            .collect();

        let next_continuation_token =
            next_page_token(output.is_truncated(), output.next_continuation_token())?;

        Ok(ListPage {
            objects,
            next_continuation_token,
        })
    }

    async fn get_object(&self, key: &str) -> ServiceResult<Option<Bytes>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|service_err| service_err.is_no_such_key())
                    .unwrap_or(false)
                    || err
                        .raw_response()
                        .map(|response| response.status().as_u16() == 404)
                        .unwrap_or(false);
                if missing {
                    debug!(bucket = %self.bucket, key, "object not found");
                    return Ok(None);
                }
                return Err(connectivity("get_object", err));
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|err| connectivity("get_object", err))?;
        Ok(Some(data.into_bytes()))
    }

    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> ServiceResult<()> {
        let digest = content_md5(&body);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_md5(digest)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| connectivity("put_object", err))?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> ServiceResult<String> {
        let config =
            PresigningConfig::expires_in(expires_in).map_err(|err| connectivity("presign", err))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|err| connectivity("presign", err))?;
        Ok(request.uri().to_string())
    }
}
