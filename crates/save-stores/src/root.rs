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

//! Where store content lives
//!
//! A [`BlobRoot`] hands out one sub-storage per store: a sub-directory of a
//! local root, or a sub-prefix of an object-store prefix. A [`LegacyRoot`]
//! points at the old file-based layout that stores migrate away from.

use save_migration::{KeyMapping, Migratable, MigrationOptions, MigrationStorage};
use save_storage::{
    BlobBackend, KeyCodec, LocalStorage, S3Storage, SharedStorage, StorageResult,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Backend holding the current store content
#[derive(Debug, Clone)]
pub enum BlobRoot {
    /// Directory tree on local disk
    Filesystem(PathBuf),
    /// Object store under a key prefix
    ObjectStore {
        /// Backend all stores share
        backend: Arc<dyn BlobBackend>,
        /// Prefix prepended to every store prefix, may be empty
        prefix: String,
    },
}

impl BlobRoot {
    /// Local directory root
    pub fn filesystem(path: impl Into<PathBuf>) -> Self {
        BlobRoot::Filesystem(path.into())
    }

    /// Object-store root under `prefix`
    pub fn object_store(backend: Arc<dyn BlobBackend>, prefix: impl Into<String>) -> Self {
        BlobRoot::ObjectStore {
            backend,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Storage for the store named `name`, addressed with `codec`
    pub fn storage<C: KeyCodec>(&self, name: &str, codec: C) -> StorageResult<SharedStorage<C::Key>> {
        match self {
            BlobRoot::Filesystem(path) => {
                Ok(Arc::new(LocalStorage::new_sync(path.join(name), codec)?))
            }
            BlobRoot::ObjectStore { backend, prefix } => {
                let prefix = if prefix.is_empty() {
                    name.to_string()
                } else {
                    format!("{}/{}", prefix, name)
                };
                Ok(Arc::new(S3Storage::new(Arc::clone(backend), prefix, codec)))
            }
        }
    }
}

/// Old file-based layout, one sub-directory per store
#[derive(Debug, Clone)]
pub struct LegacyRoot {
    path: PathBuf,
    options: MigrationOptions,
}

impl LegacyRoot {
    /// Legacy root at `path` with default migration options
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LegacyRoot {
            path: path.into(),
            options: MigrationOptions::default(),
        }
    }

    /// Override the options used by every migration from this root
    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    /// Root directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wrap `new` in a migration from the legacy sub-directory `name`
    ///
    /// Returns the storage callers should use plus the migration to run.
    pub fn migrate_into<C, M>(
        &self,
        name: &str,
        codec: C,
        mapping: M,
        new: SharedStorage<M::New>,
    ) -> StorageResult<(SharedStorage<M::New>, Arc<dyn Migratable>)>
    where
        C: KeyCodec<Key = M::Old>,
        M: KeyMapping,
    {
        let old = LocalStorage::new_sync(self.path.join(name), codec)?;
        debug!(store = name, legacy = %old.root().display(), "Migrating from legacy root");
        let migration = Arc::new(
            MigrationStorage::new(name, old, new, mapping).with_options(self.options),
        );
        Ok((
            Arc::clone(&migration) as SharedStorage<M::New>,
            migration as Arc<dyn Migratable>,
        ))
    }
}
