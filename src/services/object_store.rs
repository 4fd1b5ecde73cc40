//! Object store access.
//!
//! The catalog only ever talks to [`ObjectStore`]; [`S3ObjectStore`] is the
//! production implementation against any S3-compatible endpoint (MinIO in
//! the default setup). Buckets are passed per call so one client can serve
//! several of them.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client as S3Client,
    config::{
        Builder as S3ConfigBuilder, Credentials, Region, retry::RetryConfig,
        timeout::TimeoutConfig,
    },
    error::DisplayErrorContext,
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Attempts per request, including the first one.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("{operation} on `{bucket}/{key}` failed: {message}")]
    Request {
        operation: &'static str,
        bucket: String,
        key: String,
        message: String,
    },
    #[error("invalid presign window: {0}")]
    InvalidPresignWindow(String),
}

impl ObjectStoreError {
    pub fn request(
        operation: &'static str,
        bucket: &str,
        key: &str,
        err: impl std::error::Error,
    ) -> Self {
        Self::Request {
            operation,
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: DisplayErrorContext(err).to_string(),
        }
    }
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// One entry of a bucket listing.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Binary object storage addressed by bucket and key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> ObjectStoreResult<()>;

    async fn get(&self, bucket: &str, key: &str) -> ObjectStoreResult<Bytes>;

    async fn delete(&self, bucket: &str, key: &str) -> ObjectStoreResult<()>;

    /// Every object whose key starts with `prefix`, in key order.
    async fn list(&self, bucket: &str, prefix: &str) -> ObjectStoreResult<Vec<ObjectSummary>>;

    /// Time-limited URL granting read access to one object.
    async fn signed_get_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> ObjectStoreResult<String>;

    async fn bucket_exists(&self, bucket: &str) -> ObjectStoreResult<bool>;
}

/// Connection settings for an S3-compatible endpoint.
#[derive(Clone, Debug)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub operation_timeout: Duration,
}

/// [`ObjectStore`] backed by `aws-sdk-s3`.
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: S3Client,
    region: String,
}

impl S3ObjectStore {
    /// Build a client with static credentials, path-style addressing (needed
    /// for MinIO), bounded retries and a per-operation timeout.
    pub async fn connect(settings: &S3Settings) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(Credentials::new(
                settings.access_key.clone(),
                settings.secret_key.clone(),
                None,
                None,
                "image-catalog",
            ))
            .retry_config(RetryConfig::standard().with_max_attempts(MAX_ATTEMPTS))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(settings.operation_timeout)
                    .build(),
            )
            .load()
            .await;

        let config = S3ConfigBuilder::from(&shared)
            .endpoint_url(&settings.endpoint)
            .force_path_style(true)
            .build();

        info!(
            endpoint = %settings.endpoint,
            region = %settings.region,
            "S3 client initialized"
        );

        Self {
            client: S3Client::from_conf(config),
            region: settings.region.clone(),
        }
    }

    /// Create `bucket` unless it already exists.
    #[instrument(skip(self))]
    pub async fn ensure_bucket(&self, bucket: &str) -> ObjectStoreResult<()> {
        if self.bucket_exists(bucket).await? {
            debug!("bucket already present");
            return Ok(());
        }

        info!("bucket missing, creating it");
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_bucket_already_owned_by_you())
                    .unwrap_or(false) =>
            {
                Ok(())
            }
            Err(err) => Err(ObjectStoreError::request("create_bucket", bucket, "", &err)),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> ObjectStoreResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| ObjectStoreError::request("put_object", bucket, key, &err))?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> ObjectStoreResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    ObjectStoreError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    ObjectStoreError::request("get_object", bucket, key, &err)
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|err| ObjectStoreError::request("get_object", bucket, key, &err))?;
        Ok(data.into_bytes())
    }

    async fn delete(&self, bucket: &str, key: &str) -> ObjectStoreResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| ObjectStoreError::request("delete_object", bucket, key, &err))?;
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> ObjectStoreResult<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|err| ObjectStoreError::request("list_objects_v2", bucket, prefix, &err))?;

            for obj in response.contents() {
                let Some(key) = obj.key() else { continue };
                objects.push(ObjectSummary {
                    key: key.to_string(),
                    size: obj.size().unwrap_or_default(),
                    last_modified: obj
                        .last_modified()
                        .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
                });
            }

            match (response.is_truncated(), response.next_continuation_token()) {
                (Some(true), Some(token)) => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn signed_get_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> ObjectStoreResult<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|err| ObjectStoreError::InvalidPresignWindow(err.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|err| ObjectStoreError::request("presign_get_object", bucket, key, &err))?;

        Ok(request.uri().to_string())
    }

    async fn bucket_exists(&self, bucket: &str) -> ObjectStoreResult<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false) =>
            {
                Ok(false)
            }
            Err(err) => Err(ObjectStoreError::request("head_bucket", bucket, "", &err)),
        }
    }
}
