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

//! Key-addressed storage on top of an object store
//!
//! Object key = `prefix/<encoded key path>`. Several stores can share a bucket
//! as long as their prefixes differ; listing decodes every object under the
//! prefix and skips anything that is not a key of this kind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{StreamExt, TryStreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::backend::{BlobBackend, ObjectMeta};
use crate::codec::{InvalidKey, KeyCodec, KeyPath};
use crate::content::ContentStream;
use crate::error::{StorageError, StorageResult};
use crate::storage::{KeyStream, Storage};

/// Storage of typed keys in a [`BlobBackend`] under a fixed prefix
pub struct S3Storage<C> {
    backend: Arc<dyn BlobBackend>,
    prefix: String,
    codec: C,
}

impl<C: KeyCodec> S3Storage<C> {
    /// Create a storage under `prefix` (slashes at either end are ignored)
    pub fn new(backend: Arc<dyn BlobBackend>, prefix: impl Into<String>, codec: C) -> Self {
        let prefix = prefix.into().trim_matches('/').to_string();
        S3Storage {
            backend,
            prefix,
            codec,
        }
    }

    /// Object-key prefix without trailing separator
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Codec used to address content
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Encoded key path, relative to the prefix
    pub fn build_s3_key_suffix(&self, key: &C::Key) -> Result<String, InvalidKey> {
        Ok(self.codec.encode(key)?.as_object_key())
    }

    /// Full object key for `key`
    pub fn build_s3_key(&self, key: &C::Key) -> Result<String, InvalidKey> {
        let suffix = self.build_s3_key_suffix(key)?;
        if self.prefix.is_empty() {
            Ok(suffix)
        } else {
            Ok(format!("{}/{}", self.prefix, suffix))
        }
    }

    /// Key for a full object key; inverse of [`build_s3_key`](Self::build_s3_key)
    pub fn build_key(&self, object_key: &str) -> Result<C::Key, InvalidKey> {
        let suffix = if self.prefix.is_empty() {
            object_key
        } else {
            object_key
                .strip_prefix(self.prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .ok_or_else(|| {
                    InvalidKey::new(object_key, format!("not under prefix `{}`", self.prefix))
                })?
        };
        self.codec.decode(&KeyPath::parse(suffix)?)
    }

    fn list_prefix(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    async fn head(&self, key: &C::Key) -> StorageResult<ObjectMeta> {
        let object_key = self.build_s3_key(key)?;
        self.backend
            .head_object(&object_key)
            .await?
            .ok_or_else(|| StorageError::not_found(object_key))
    }
}

impl<C> fmt::Debug for S3Storage<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Storage")
            .field("backend", &self.backend)
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[async_trait]
impl<C: KeyCodec> Storage for S3Storage<C> {
    type Key = C::Key;

    fn list(&self) -> KeyStream<'_, C::Key> {
        self.backend
            .list_objects(&self.list_prefix())
            .try_filter_map(move |object| {
                let key = match self.build_key(&object.key) {
                    Ok(key) => Some(key),
                    Err(e) => {
                        debug!("Skipping foreign object {}: {}", object.key, e);
                        None
                    }
                };
                async move { Ok(key) }
            })
            .boxed()
    }

    async fn download(&self, key: &C::Key) -> StorageResult<ContentStream> {
        let object_key = self.build_s3_key(key)?;
        self.backend.get_object(&object_key).await
    }

    async fn upload(&self, key: &C::Key, content: ContentStream) -> StorageResult<u64> {
        let object_key = self.build_s3_key(key)?;
        let written = self.backend.put_object(&object_key, content).await?;
        debug!("Stored {} bytes at {}", written, object_key);
        Ok(written)
    }

    async fn delete(&self, key: &C::Key) -> StorageResult<bool> {
        let object_key = self.build_s3_key(key)?;
        if self.backend.head_object(&object_key).await?.is_none() {
            return Ok(false);
        }
        self.backend.delete_object(&object_key).await?;
        Ok(true)
    }

    async fn does_exist(&self, key: &C::Key) -> StorageResult<bool> {
        let object_key = self.build_s3_key(key)?;
        Ok(self.backend.head_object(&object_key).await?.is_some())
    }

    async fn content_size(&self, key: &C::Key) -> StorageResult<u64> {
        Ok(self.head(key).await?.size)
    }

    async fn last_modified(&self, key: &C::Key) -> StorageResult<DateTime<Utc>> {
        Ok(self.head(key).await?.last_modified)
    }

    async fn generate_url_to_download(
        &self,
        key: &C::Key,
        expires_in: Duration,
    ) -> StorageResult<Option<String>> {
        let object_key = self.build_s3_key(key)?;
        Ok(Some(self.backend.presign_get(&object_key, expires_in).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::IdCodec;
    use crate::mock::MockBackend;
    use bytes::Bytes;

    fn storage(backend: &MockBackend, prefix: &str) -> S3Storage<IdCodec> {
        S3Storage::new(Arc::new(backend.clone()), prefix, IdCodec)
    }

    #[test]
    fn test_object_key_layout() {
        let backend = MockBackend::new();
        let storage = storage(&backend, "/files-by-id/");
        assert_eq!(storage.prefix(), "files-by-id");
        assert_eq!(storage.build_s3_key(&7).unwrap(), "files-by-id/7");
        assert_eq!(storage.build_key("files-by-id/7").unwrap(), 7);
        assert!(storage.build_key("files-by-idx/7").is_err());
        assert!(storage.build_key("other/7").is_err());
    }

    #[test]
    fn test_empty_prefix() {
        let backend = MockBackend::new();
        let storage = storage(&backend, "");
        assert_eq!(storage.build_s3_key(&3).unwrap(), "3");
        assert_eq!(storage.build_key("3").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_upload_download_round_trip() {
        let backend = MockBackend::new();
        let storage = storage(&backend, "files-by-id");

        assert_eq!(storage.upload_bytes(&1, Bytes::from_static(b"tool")).await.unwrap(), 4);
        assert_eq!(storage.download_bytes(&1).await.unwrap(), Bytes::from_static(b"tool"));
        assert_eq!(storage.content_size(&1).await.unwrap(), 4);
        assert!(storage.does_exist(&1).await.unwrap());
        assert_eq!(backend.keys().await, vec!["files-by-id/1"]);
    }

    #[tokio::test]
    async fn test_list_skips_other_kinds_under_shared_bucket() {
        let backend = MockBackend::with_data([
            ("files-by-id/1", "a"),
            ("files-by-id/2", "b"),
            ("files-by-id/readme.txt", "foreign"),
            ("files-by-id/3/nested", "foreign"),
            ("avatars/users/alice.png", "png"),
        ]);
        let storage = storage(&backend, "files-by-id");

        let mut keys = storage.list_all().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_delete_reports_removal() {
        let backend = MockBackend::new();
        let storage = storage(&backend, "files-by-id");
        storage.upload_bytes(&9, Bytes::from_static(b"x")).await.unwrap();

        assert!(storage.delete(&9).await.unwrap());
        assert!(!storage.delete(&9).await.unwrap());
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_metadata_is_not_found() {
        let backend = MockBackend::new();
        let storage = storage(&backend, "files-by-id");

        assert!(storage.content_size(&5).await.unwrap_err().is_not_found());
        assert!(storage.last_modified(&5).await.unwrap_err().is_not_found());
        assert!(storage.download(&5).await.err().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_generate_url_to_download() {
        let backend = MockBackend::new();
        let storage = storage(&backend, "internal-storage");
        storage.upload_bytes(&1, Bytes::from_static(b"bin")).await.unwrap();

        let url = storage
            .generate_url_to_download(&1, Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("memory://internal-storage/1?expires=600"));
    }
}
