// SAVE Storage - key-addressed blob storage
// Copyright (C) 2026 SAVE Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! AWS S3 blob backend
//!
//! Provides a [`BlobBackend`] for AWS S3 and S3-compatible services with:
//! - AWS SDK configuration using credential chains (environment, IAM, profiles)
//!   or static credentials
//! - Custom endpoints with path-style addressing (MinIO, LocalStack)
//! - Streaming multipart upload for objects larger than one part
//! - Exponential backoff retry for idempotent calls
//! - Pre-signed download links
//!
//! # Examples
//!
//! ```rust,no_run
//! use save_storage::s3::{S3Backend, S3Config};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = S3Config {
//!     bucket: "save-cloud".to_string(),
//!     endpoint: Some("http://localhost:9000".to_string()),
//!     ..Default::default()
//! };
//! let backend = S3Backend::with_config(config).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::backend::{BlobBackend, ObjectMeta};
use crate::content::ContentStream;
use crate::error::{StorageError, StorageResult};

/// Smallest part S3 accepts for all but the last part of a multipart upload
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Configuration for the S3 backend
#[derive(Clone, Debug)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,

    /// Region override; the SDK provider chain is used when unset
    pub region: Option<String>,

    /// Optional custom S3 endpoint (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,

    /// Static access key; the SDK credential chain is used when unset
    pub access_key_id: Option<String>,

    /// Static secret key, paired with `access_key_id`
    pub secret_access_key: Option<String>,

    /// Multipart upload part size in bytes (default: 16MB)
    pub part_size: u64,

    /// Maximum number of concurrent parts to upload (default: 4)
    pub max_concurrent_parts: usize,

    /// Maximum number of attempts for failed operations (default: 3)
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (default: 100ms)
    pub initial_retry_delay_ms: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        S3Config {
            bucket: String::new(),
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            part_size: 16 * 1024 * 1024,
            max_concurrent_parts: 4,
            max_retries: 3,
            initial_retry_delay_ms: 100,
        }
    }
}

/// AWS S3 blob backend
///
/// Cheap to clone; clones share the SDK client and statistics.
#[derive(Clone)]
pub struct S3Backend {
    client: Client,
    config: Arc<S3Config>,
    stats: Arc<S3Stats>,
}

#[derive(Debug, Default)]
struct S3Stats {
    total_bytes_uploaded: AtomicU64,
    total_objects_deleted: AtomicU64,
}

type RetryFuture<T> = Pin<Box<dyn Future<Output = StorageResult<T>> + Send>>;

impl S3Backend {
    /// Connect using `config` and verify the bucket is reachable
    pub async fn with_config(config: S3Config) -> StorageResult<Self> {
        if config.part_size < MIN_PART_SIZE {
            return Err(StorageError::backend(format!(
                "part size {} is below the S3 minimum of {} bytes",
                config.part_size, MIN_PART_SIZE
            )));
        }

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "save-storage-config",
            ));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint);
            builder = builder.endpoint_url(endpoint.clone()).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        client
            .head_bucket()
            .bucket(&config.bucket)
            .send()
            .await
            .map_err(|e| {
                StorageError::backend(format!(
                    "failed to verify S3 bucket access for {}: {}",
                    config.bucket,
                    describe(&e)
                ))
            })?;

        debug!(
            "Connected to S3 bucket: {} with region: {:?}",
            config.bucket,
            sdk_config.region()
        );

        Ok(S3Backend {
            client,
            config: Arc::new(config),
            stats: Arc::new(S3Stats::default()),
        })
    }

    /// Bucket this backend writes to
    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Bytes uploaded and objects deleted since construction
    pub fn stats(&self) -> (u64, u64) {
        (
            self.stats.total_bytes_uploaded.load(Ordering::Relaxed),
            self.stats.total_objects_deleted.load(Ordering::Relaxed),
        )
    }

    async fn put_simple(&self, key: &str, data: Bytes) -> StorageResult<u64> {
        let size = data.len() as u64;
        debug!("Putting object to S3: {} ({} bytes)", key, size);

        let client = self.client.clone();
        let bucket = self.config.bucket.clone();
        let key = key.to_string();
        with_retry(&self.config, "put_object", move || {
            let request = client
                .put_object()
                .bucket(&bucket)
                .key(&key)
                .body(ByteStream::from(data.clone()));
            Box::pin(async move {
                request
                    .send()
                    .await
                    .map_err(|e| StorageError::backend(format!("failed to put object: {}", describe(&e))))?;
                Ok(())
            }) as RetryFuture<()>
        })
        .await?;

        self.stats.total_bytes_uploaded.fetch_add(size, Ordering::Relaxed);
        Ok(size)
    }

    /// Stream `first` plus the rest of `content` as a multipart upload
    async fn put_multipart(
        &self,
        key: &str,
        first: Bytes,
        content: ContentStream,
    ) -> StorageResult<u64> {
        let multipart = self
            .client
            .create_multipart_upload()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::backend(format!(
                    "failed to initiate multipart upload: {}",
                    describe(&e)
                ))
            })?;
        let upload_id = multipart
            .upload_id()
            .ok_or_else(|| StorageError::backend("no upload ID returned from S3"))?
            .to_string();
        debug!("Initiated multipart upload for {}: {}", key, upload_id);

        match self.upload_parts(key, &upload_id, first, content).await {
            Ok((parts, written)) => {
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|e| {
                        StorageError::backend(format!(
                            "failed to complete multipart upload: {}",
                            describe(&e)
                        ))
                    })?;
                self.stats.total_bytes_uploaded.fetch_add(written, Ordering::Relaxed);
                debug!("Completed multipart upload for {} ({} bytes)", key, written);
                Ok(written)
            }
            Err(e) => {
                warn!("Aborting multipart upload {} for {}: {}", upload_id, key, e);
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.config.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!("Failed to abort multipart upload {}: {}", upload_id, describe(&abort_err));
                }
                Err(e)
            }
        }
    }

    /// Upload parts as the stream produces them, at most `max_concurrent_parts` in flight
    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Bytes,
        mut content: ContentStream,
    ) -> StorageResult<(Vec<CompletedPart>, u64)> {
        let part_size = self.config.part_size as usize;
        let mut in_flight: JoinSet<StorageResult<CompletedPart>> = JoinSet::new();
        let mut completed = Vec::new();
        let mut written = 0u64;
        let mut part_number = 1i32;
        let mut buffer = BytesMut::from(first.as_ref());
        let mut exhausted = false;

        while !exhausted || !buffer.is_empty() {
            while !exhausted && buffer.len() < part_size {
                match content.next().await {
                    Some(chunk) => buffer.extend_from_slice(&chunk?),
                    None => exhausted = true,
                }
            }
            if buffer.is_empty() {
                break;
            }

            let take = buffer.len().min(part_size);
            let part = buffer.split_to(take).freeze();
            written += part.len() as u64;

            if in_flight.len() >= self.config.max_concurrent_parts.max(1) {
                if let Some(joined) = in_flight.join_next().await {
                    completed.push(joined.map_err(StorageError::other)??);
                }
            }

            let client = self.client.clone();
            let config = Arc::clone(&self.config);
            let bucket = self.config.bucket.clone();
            let key = key.to_string();
            let upload_id = upload_id.to_string();
            let number = part_number;
            in_flight.spawn(async move {
                debug!("Uploading part {} ({} bytes) for key: {}", number, part.len(), key);
                let etag = with_retry(&config, "upload_part", move || {
                    let request = client
                        .upload_part()
                        .bucket(&bucket)
                        .key(&key)
                        .upload_id(&upload_id)
                        .part_number(number)
                        .body(ByteStream::from(part.clone()));
                    Box::pin(async move {
                        let response = request.send().await.map_err(|e| {
                            StorageError::backend(format!(
                                "failed to upload part {}: {}",
                                number,
                                describe(&e)
                            ))
                        })?;
                        response
                            .e_tag()
                            .map(str::to_string)
                            .ok_or_else(|| {
                                StorageError::backend(format!("no ETag returned for part {}", number))
                            })
                    }) as RetryFuture<String>
                })
                .await?;
                Ok(CompletedPart::builder().part_number(number).e_tag(etag).build())
            });
            part_number += 1;
        }

        while let Some(joined) = in_flight.join_next().await {
            completed.push(joined.map_err(StorageError::other)??);
        }
        completed.sort_by_key(|part| part.part_number());
        Ok((completed, written))
    }
}

/// Retry `operation` with exponential backoff; `NotFound` is never retried
async fn with_retry<F, T>(config: &S3Config, what: &str, mut operation: F) -> StorageResult<T>
where
    F: FnMut() -> RetryFuture<T>,
{
    let mut attempt = 0;
    let mut delay_ms = config.initial_retry_delay_ms;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_not_found() => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt >= config.max_retries.max(1) {
                    return Err(e);
                }

                warn!(
                    "{} failed (attempt {}/{}), retrying in {}ms: {}",
                    what, attempt, config.max_retries, delay_ms, e
                );

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(10_000);
            }
        }
    }
}

/// Error text including the service error code when there is one
fn describe<E, R>(err: &SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    match err.code() {
        Some(code) => format!("{} ({})", err, code),
        None => err.to_string(),
    }
}

/// Whether an SDK error means the object does not exist
fn is_missing<E, R>(err: &SdkError<E, R>, typed: impl Fn(&E) -> bool) -> bool
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    if err.as_service_error().is_some_and(typed) {
        return true;
    }
    matches!(err.code(), Some("NoSuchKey") | Some("NotFound"))
        || looks_like_not_found(&err.to_string())
}

/// Message-based fallback for emulators that return untyped errors
fn looks_like_not_found(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("404")
        || message.contains("not found")
        || message.contains("notfound")
        || message.contains("nosuchkey")
        || message.contains("no such key")
        || message.contains("does not exist")
}

fn to_utc(time: Option<&AwsDateTime>) -> DateTime<Utc> {
    time.and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

impl fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Backend")
            .field("bucket", &self.config.bucket)
            .field("endpoint", &self.config.endpoint)
            .field("part_size", &self.config.part_size)
            .field("max_concurrent_parts", &self.config.max_concurrent_parts)
            .finish()
    }
}

/// Listing cursor
struct Page {
    client: Client,
    bucket: String,
    prefix: String,
    token: Option<String>,
    done: bool,
}

#[async_trait]
impl BlobBackend for S3Backend {
    fn list_objects(&self, prefix: &str) -> BoxStream<'static, StorageResult<ObjectMeta>> {
        let page = Page {
            client: self.client.clone(),
            bucket: self.config.bucket.clone(),
            prefix: prefix.to_string(),
            token: None,
            done: false,
        };

        stream::try_unfold(page, |mut page| async move {
            if page.done {
                return Ok::<_, StorageError>(None);
            }
            let mut request = page.client.list_objects_v2().bucket(&page.bucket);
            if !page.prefix.is_empty() {
                request = request.prefix(&page.prefix);
            }
            if let Some(token) = page.token.take() {
                request = request.continuation_token(token);
            }
            let response = request.send().await.map_err(|e| {
                StorageError::backend(format!("failed to list objects: {}", describe(&e)))
            })?;

            let objects: Vec<ObjectMeta> = response
                .contents()
                .iter()
                .filter_map(|obj| {
                    obj.key().map(|key| ObjectMeta {
                        key: key.to_string(),
                        size: obj.size().unwrap_or(0).max(0) as u64,
                        last_modified: to_utc(obj.last_modified()),
                    })
                })
                .collect();
            debug!("Listed {} objects with prefix '{}'", objects.len(), page.prefix);

            if response.is_truncated() == Some(true) {
                page.token = response.next_continuation_token().map(str::to_string);
                page.done = page.token.is_none();
            } else {
                page.done = true;
            }
            Ok(Some((objects, page)))
        })
        .map_ok(|objects| stream::iter(objects.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    async fn get_object(&self, key: &str) -> StorageResult<ContentStream> {
        let client = self.client.clone();
        let bucket = self.config.bucket.clone();
        let object_key = key.to_string();

        let response: GetObjectOutput = with_retry(&self.config, "get_object", move || {
            let request = client.get_object().bucket(&bucket).key(&object_key);
            let object_key = object_key.clone();
            Box::pin(async move {
                request.send().await.map_err(|e| {
                    if is_missing(&e, |se| se.is_no_such_key()) {
                        StorageError::not_found(object_key)
                    } else {
                        StorageError::backend(format!("failed to get object: {}", describe(&e)))
                    }
                })
            }) as RetryFuture<_>
        })
        .await?;

        debug!("Streaming object from S3: {}", key);
        let body = stream::try_unfold(response.body, |mut body| async move {
            match body.try_next().await {
                Ok(Some(chunk)) => Ok(Some((chunk, body))),
                Ok(None) => Ok(None),
                Err(e) => Err(io::Error::other(e)),
            }
        });
        Ok(body.boxed())
    }

    async fn put_object(&self, key: &str, mut content: ContentStream) -> StorageResult<u64> {
        let part_size = self.config.part_size as usize;
        let mut buffer = BytesMut::new();
        while buffer.len() <= part_size {
            match content.next().await {
                Some(chunk) => buffer.extend_from_slice(&chunk?),
                None => return self.put_simple(key, buffer.freeze()).await,
            }
        }
        debug!("Object {} exceeds one part, switching to multipart upload", key);
        self.put_multipart(key, buffer.freeze(), content).await
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let client = self.client.clone();
        let bucket = self.config.bucket.clone();
        let object_key = key.to_string();

        with_retry(&self.config, "delete_object", move || {
            let request = client.delete_object().bucket(&bucket).key(&object_key);
            Box::pin(async move {
                request.send().await.map_err(|e| {
                    StorageError::backend(format!("failed to delete object: {}", describe(&e)))
                })?;
                Ok(())
            }) as RetryFuture<()>
        })
        .await?;

        self.stats.total_objects_deleted.fetch_add(1, Ordering::Relaxed);
        debug!("Deleted object from S3: {}", key);
        Ok(())
    }

    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectMeta>> {
        let client = self.client.clone();
        let bucket = self.config.bucket.clone();
        let object_key = key.to_string();

        with_retry(&self.config, "head_object", move || {
            let request = client.head_object().bucket(&bucket).key(&object_key);
            let object_key = object_key.clone();
            Box::pin(async move {
                match request.send().await {
                    Ok(output) => Ok(Some(ObjectMeta {
                        key: object_key,
                        size: output.content_length().unwrap_or(0).max(0) as u64,
                        last_modified: to_utc(output.last_modified()),
                    })),
                    Err(e) if is_missing(&e, |se| se.is_not_found()) => Ok(None),
                    Err(e) => Err(StorageError::backend(format!(
                        "failed to head object: {}",
                        describe(&e)
                    ))),
                }
            }) as RetryFuture<_>
        })
        .await
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::backend(format!("invalid presign expiry: {}", e)))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::backend(format!("failed to presign {}: {}", key, describe(&e))))?;
        Ok(request.uri().to_string())
    }
}
