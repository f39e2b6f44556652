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

//! Migration between two key-addressed storages
//!
//! A [`MigrationStorage`] fronts an old and a new [`Storage`](save_storage::Storage)
//! connected by a [`KeyMapping`]. Reads and writes go to the new storage only;
//! [`MigrationStorage::migrate`] copies what is left in the old storage across
//! and deletes the originals. Runs are idempotent: a key already present in the
//! new storage is only removed from the old one.
//!
//! # Examples
//!
//! ```no_run
//! use save_migration::{IdentityMapping, MigrationStorage};
//! use save_storage::{mock::MockBackend, IdCodec, LocalStorage, S3Storage};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let old = LocalStorage::new("./legacy/blobs", IdCodec).await?;
//! let new = S3Storage::new(Arc::new(MockBackend::new()), "blobs", IdCodec);
//! let storage = MigrationStorage::new("blobs", old, new, IdentityMapping::new());
//!
//! let report = storage.migrate().await?;
//! println!("migrated {} objects", report.migrated_objects.len());
//! assert!(storage.is_migration_finished().await?);
//! # Ok(())
//! # }
//! ```

pub mod mapping;
pub mod report;
pub mod storage;
pub mod task;
pub mod verify;

pub use mapping::{FnMapping, IdentityMapping, KeyMapping};
pub use report::{MigrationReport, MigrationStatus};
pub use storage::{Migratable, MigrationOptions, MigrationStorage};
pub use task::MigrationTask;
pub use verify::{ObjectDigest, VerificationResult};
