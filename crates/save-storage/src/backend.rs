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

//! Object-store seam beneath [`S3Storage`](crate::S3Storage)
//!
//! A [`BlobBackend`] speaks in flat object keys. The AWS implementation lives
//! in [`s3`](crate::s3); [`mock`](crate::mock) provides an in-memory one for
//! tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::fmt::Debug;
use std::time::Duration;

use crate::content::ContentStream;
use crate::error::StorageResult;

/// Listing/head metadata for one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Full object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time reported by the backend
    pub last_modified: DateTime<Utc>,
}

/// Flat key/object store (S3 or compatible)
#[async_trait]
pub trait BlobBackend: Send + Sync + Debug {
    /// Objects whose key starts with `prefix`, page by page
    fn list_objects(&self, prefix: &str) -> BoxStream<'static, StorageResult<ObjectMeta>>;

    /// Open an object; `NotFound` if absent
    async fn get_object(&self, key: &str) -> StorageResult<ContentStream>;

    /// Write an object, returning the number of bytes written
    async fn put_object(&self, key: &str, content: ContentStream) -> StorageResult<u64>;

    /// Remove an object; succeeds when absent
    async fn delete_object(&self, key: &str) -> StorageResult<()>;

    /// Object metadata, `None` if absent
    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectMeta>>;

    /// Pre-signed GET link
    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String>;
}
