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

//! Key-addressed async blob storage
//!
//! This crate maps strongly typed keys to binary content held in a blob
//! backend (a local directory tree or an S3 bucket), optionally indexed by a
//! relational metastore.
//!
//! # Building blocks
//!
//! - [`KeyCodec`]: bijective key <-> [`KeyPath`] mapping with typed decode errors
//! - [`Storage`]: the list/download/upload/delete/exists/size/mtime contract
//! - [`LocalStorage`]: directory tree, one file per key, atomic writes
//! - [`S3Storage`]: object store under a prefix, through a [`BlobBackend`]
//! - [`MetastoreStorage`]: DTO-addressed storage, rows in a [`Metastore`] and
//!   blobs by row id
//! - [`Readiness`]: awaitable initialization state for seeded stores
//!
//! # Examples
//!
//! ```no_run
//! use bytes::Bytes;
//! use save_storage::{mock::MockBackend, IdCodec, S3Storage, Storage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = S3Storage::new(Arc::new(MockBackend::new()), "blobs", IdCodec);
//!
//!     storage.upload_bytes(&1, Bytes::from_static(b"content")).await?;
//!     assert_eq!(storage.download_bytes(&1).await?, Bytes::from_static(b"content"));
//!     assert!(storage.delete(&1).await?);
//!     assert!(!storage.delete(&1).await?);
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod codec;
pub mod content;
pub mod error;
pub mod local;
pub mod metastore;
pub mod mock;
pub mod readiness;
pub mod s3;
pub mod s3_storage;
pub mod storage;

pub use backend::{BlobBackend, ObjectMeta};
pub use codec::{IdCodec, InvalidKey, KeyCodec, KeyPath};
pub use content::ContentStream;
pub use error::{StorageError, StorageResult};
pub use local::LocalStorage;
pub use metastore::{Metastore, MetastoreStorage};
pub use readiness::{InitState, Readiness};
pub use s3::{S3Backend, S3Config};
pub use s3_storage::S3Storage;
pub use storage::{KeyStream, SharedStorage, Storage};

#[doc(hidden)]
pub mod __private {
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
}
