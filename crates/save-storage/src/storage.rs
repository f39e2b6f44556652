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

//! The `Storage` contract shared by every key-addressed store

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, TryStreamExt};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::content::{self, ContentStream};
use crate::error::StorageResult;

/// Lazily produced keys; an `Err` item ends the listing
pub type KeyStream<'a, K> = BoxStream<'a, StorageResult<K>>;

/// Type-erased storage shared between owners
pub type SharedStorage<K> = Arc<dyn Storage<Key = K>>;

/// Key-addressed blob storage
///
/// Implementations translate a typed key into a location in some blob backend
/// (a directory tree, an S3 prefix, a metastore row plus blob) and move
/// content as [`ContentStream`]s.
///
/// # Contract
///
/// - `list` yields only keys of this kind and skips anything that does not
///   decode, so several kinds can share one root or prefix
/// - `download`, `content_size` and `last_modified` fail with
///   [`StorageError::NotFound`](crate::StorageError::NotFound) for absent keys
/// - `delete` is idempotent and reports whether something was removed
/// - concurrent uploads to the same key race, the last writer wins
#[async_trait]
pub trait Storage: Send + Sync + Debug {
    /// Key type addressed by this storage
    type Key: Clone + Debug + Send + Sync + 'static;

    /// Enumerate every key currently stored
    fn list(&self) -> KeyStream<'_, Self::Key>;

    /// Open the content stored under `key`
    async fn download(&self, key: &Self::Key) -> StorageResult<ContentStream>;

    /// Store `content` under `key`, returning the number of bytes written
    async fn upload(&self, key: &Self::Key, content: ContentStream) -> StorageResult<u64>;

    /// Remove `key`, returning whether anything was removed
    async fn delete(&self, key: &Self::Key) -> StorageResult<bool>;

    /// Whether `key` is present
    async fn does_exist(&self, key: &Self::Key) -> StorageResult<bool>;

    /// Size in bytes of the content under `key`
    async fn content_size(&self, key: &Self::Key) -> StorageResult<u64>;

    /// Modification time of the content under `key`
    async fn last_modified(&self, key: &Self::Key) -> StorageResult<DateTime<Utc>>;

    /// Collect `list` into a vector
    async fn list_all(&self) -> StorageResult<Vec<Self::Key>> {
        self.list().try_collect().await
    }

    /// Delete then upload, so at most one object exists per key
    async fn upsert(&self, key: &Self::Key, content: ContentStream) -> StorageResult<u64> {
        self.delete(key).await?;
        self.upload(key, content).await
    }

    /// Download and buffer the whole object
    async fn download_bytes(&self, key: &Self::Key) -> StorageResult<Bytes> {
        let stream = self.download(key).await?;
        Ok(content::collect(stream).await?)
    }

    /// Upload an in-memory buffer
    async fn upload_bytes(&self, key: &Self::Key, data: Bytes) -> StorageResult<u64> {
        self.upload(key, content::from_bytes(data)).await
    }

    /// Direct download link valid for `expires_in`, when the backend supports one
    async fn generate_url_to_download(
        &self,
        key: &Self::Key,
        expires_in: Duration,
    ) -> StorageResult<Option<String>> {
        let _ = (key, expires_in);
        Ok(None)
    }
}

#[async_trait]
impl<S> Storage for Arc<S>
where
    S: Storage + ?Sized,
{
    type Key = S::Key;

    fn list(&self) -> KeyStream<'_, Self::Key> {
        (**self).list()
    }

    async fn download(&self, key: &Self::Key) -> StorageResult<ContentStream> {
        (**self).download(key).await
    }

    async fn upload(&self, key: &Self::Key, content: ContentStream) -> StorageResult<u64> {
        (**self).upload(key, content).await
    }

    async fn delete(&self, key: &Self::Key) -> StorageResult<bool> {
        (**self).delete(key).await
    }

    async fn does_exist(&self, key: &Self::Key) -> StorageResult<bool> {
        (**self).does_exist(key).await
    }

    async fn content_size(&self, key: &Self::Key) -> StorageResult<u64> {
        (**self).content_size(key).await
    }

    async fn last_modified(&self, key: &Self::Key) -> StorageResult<DateTime<Utc>> {
        (**self).last_modified(key).await
    }

    async fn upsert(&self, key: &Self::Key, content: ContentStream) -> StorageResult<u64> {
        (**self).upsert(key, content).await
    }

    async fn generate_url_to_download(
        &self,
        key: &Self::Key,
        expires_in: Duration,
    ) -> StorageResult<Option<String>> {
        (**self).generate_url_to_download(key, expires_in).await
    }
}

/// Implement [`Storage`] for a wrapper type by forwarding to one of its fields
///
/// ```ignore
/// #[derive(Debug)]
/// pub struct AvatarStorage {
///     inner: SharedStorage<AvatarKey>,
/// }
///
/// save_storage::delegate_storage!(AvatarStorage, inner, AvatarKey);
/// ```
#[macro_export]
macro_rules! delegate_storage {
    ($ty:ty, $field:ident, $key:ty) => {
        #[$crate::__private::async_trait]
        impl $crate::Storage for $ty {
            type Key = $key;

            fn list(&self) -> $crate::KeyStream<'_, $key> {
                $crate::Storage::list(&self.$field)
            }

            async fn download(
                &self,
                key: &$key,
            ) -> $crate::StorageResult<$crate::ContentStream> {
                $crate::Storage::download(&self.$field, key).await
            }

            async fn upload(
                &self,
                key: &$key,
                content: $crate::ContentStream,
            ) -> $crate::StorageResult<u64> {
                $crate::Storage::upload(&self.$field, key, content).await
            }

            async fn delete(&self, key: &$key) -> $crate::StorageResult<bool> {
                $crate::Storage::delete(&self.$field, key).await
            }

            async fn does_exist(&self, key: &$key) -> $crate::StorageResult<bool> {
                $crate::Storage::does_exist(&self.$field, key).await
            }

            async fn content_size(&self, key: &$key) -> $crate::StorageResult<u64> {
                $crate::Storage::content_size(&self.$field, key).await
            }

            async fn last_modified(
                &self,
                key: &$key,
            ) -> $crate::StorageResult<$crate::__private::DateTime<$crate::__private::Utc>> {
                $crate::Storage::last_modified(&self.$field, key).await
            }

            async fn upsert(
                &self,
                key: &$key,
                content: $crate::ContentStream,
            ) -> $crate::StorageResult<u64> {
                $crate::Storage::upsert(&self.$field, key, content).await
            }

            async fn generate_url_to_download(
                &self,
                key: &$key,
                expires_in: ::std::time::Duration,
            ) -> $crate::StorageResult<Option<String>> {
                $crate::Storage::generate_url_to_download(&self.$field, key, expires_in).await
            }
        }
    };
}
