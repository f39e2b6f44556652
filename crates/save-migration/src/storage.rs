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

//! Migration storage: a decorator over an old and a new storage
//!
//! Once constructed, the new storage is the single source of truth: every
//! read and write goes there. [`MigrationStorage::migrate`] drains the old
//! storage by copying each key across and deleting the original. Keys whose
//! copy fails stay in the old storage and are picked up by the next run; they
//! are not visible to readers in the meantime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use save_storage::{ContentStream, KeyStream, Storage, StorageError, StorageResult};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::mapping::KeyMapping;
use crate::report::MigrationReport;
use crate::verify;

/// Tuning for a migration run
#[derive(Debug, Clone, Copy)]
pub struct MigrationOptions {
    /// Keys copied concurrently
    pub concurrency: usize,

    /// Compare SHA-256 checksums after each copy (sizes are always compared)
    pub verify_checksums: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        MigrationOptions {
            concurrency: 4,
            verify_checksums: true,
        }
    }
}

enum KeyOutcome {
    Copied(u64),
    AlreadyPresent,
    Discarded,
}

/// Storage that serves from `new` and migrates `old` into it
pub struct MigrationStorage<O, N, M> {
    name: String,
    old: O,
    new: N,
    mapping: M,
    options: MigrationOptions,
}

impl<O, N, M> MigrationStorage<O, N, M>
where
    M: KeyMapping,
    O: Storage<Key = M::Old>,
    N: Storage<Key = M::New>,
{
    /// Wrap `old` and `new`, connected by `mapping`
    pub fn new(name: impl Into<String>, old: O, new: N, mapping: M) -> Self {
        MigrationStorage {
            name: name.into(),
            old,
            new,
            mapping,
            options: MigrationOptions::default(),
        }
    }

    /// Override the default run options
    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    /// Name used in logs and reports
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage being drained
    pub fn old(&self) -> &O {
        &self.old
    }

    /// Storage being filled
    pub fn new_storage(&self) -> &N {
        &self.new
    }

    /// Copy every old key into the new storage, then delete it from the old one
    ///
    /// Per-key failures are logged and recorded; they never abort the batch.
    /// Fails only when the old storage cannot be listed.
    pub async fn migrate(&self) -> StorageResult<MigrationReport> {
        let old_keys = self.old.list_all().await?;
        let mut report = MigrationReport::new(&self.name, old_keys.len());
        if old_keys.is_empty() {
            debug!(migration = %self.name, "Nothing to migrate");
            report.finish();
            return Ok(report);
        }
        info!(migration = %self.name, keys = old_keys.len(), "Starting migration");

        let outcomes: Vec<_> = stream::iter(old_keys)
            .map(|old_key| async move {
                let outcome = self.migrate_key(&old_key).await;
                (old_key, outcome)
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        for (old_key, outcome) in outcomes {
            let key = format!("{:?}", old_key);
            match outcome {
                Ok(KeyOutcome::Copied(bytes)) => report.mark_migrated(key, bytes),
                Ok(KeyOutcome::AlreadyPresent) => report.mark_already_present(key),
                Ok(KeyOutcome::Discarded) => report.mark_discarded(key),
                Err(e) => {
                    warn!(migration = %self.name, key = %key, "Failed to migrate key: {}", e);
                    report.mark_failed(key, e.to_string());
                }
            }
        }
        report.finish();

        info!(
            migration = %self.name,
            migrated = report.migrated_objects.len(),
            already_present = report.already_present.len(),
            discarded = report.discarded.len(),
            failed = report.failed_objects.len(),
            "Migration finished"
        );
        Ok(report)
    }

    /// Whether the old storage holds no more keys
    pub async fn is_migration_finished(&self) -> StorageResult<bool> {
        match self.old.list().next().await {
            None => Ok(true),
            Some(Ok(_)) => Ok(false),
            Some(Err(e)) => Err(e),
        }
    }

    async fn migrate_key(&self, old_key: &M::Old) -> StorageResult<KeyOutcome> {
        let new_key = self.mapping.to_new_key(old_key);

        if self.new.does_exist(&new_key).await? {
            let same = verify::verify_copy(
                &self.old,
                old_key,
                &self.new,
                &new_key,
                self.options.verify_checksums,
            )
            .await?;
            self.old.delete(old_key).await?;
            if same.passed {
                debug!(migration = %self.name, "{:?} already migrated, removed old copy", old_key);
                return Ok(KeyOutcome::AlreadyPresent);
            }
            warn!(
                migration = %self.name,
                "Discarded {:?}: {:?} already holds different content ({})",
                old_key,
                new_key,
                same.error.unwrap_or_default()
            );
            return Ok(KeyOutcome::Discarded);
        }

        let content = self.old.download(old_key).await?;
        let written = self.new.upload(&new_key, content).await?;

        let verification = verify::verify_copy(
            &self.old,
            old_key,
            &self.new,
            &new_key,
            self.options.verify_checksums,
        )
        .await?;
        if !verification.passed {
            if let Err(e) = self.new.delete(&new_key).await {
                warn!(migration = %self.name, "Failed to discard bad copy of {:?}: {}", new_key, e);
            }
            return Err(StorageError::backend(format!(
                "verification failed: {}",
                verification.error.unwrap_or_default()
            )));
        }

        self.old.delete(old_key).await?;
        debug!(migration = %self.name, "Migrated {:?} -> {:?} ({} bytes)", old_key, new_key, written);
        Ok(KeyOutcome::Copied(written))
    }
}

impl<O: fmt::Debug, N: fmt::Debug, M> fmt::Debug for MigrationStorage<O, N, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStorage")
            .field("name", &self.name)
            .field("old", &self.old)
            .field("new", &self.new)
            .finish()
    }
}

#[async_trait]
impl<O, N, M> Storage for MigrationStorage<O, N, M>
where
    M: KeyMapping,
    O: Storage<Key = M::Old>,
    N: Storage<Key = M::New>,
{
    type Key = M::New;

    fn list(&self) -> KeyStream<'_, M::New> {
        self.new.list()
    }

    async fn download(&self, key: &M::New) -> StorageResult<ContentStream> {
        self.new.download(key).await
    }

    async fn upload(&self, key: &M::New, content: ContentStream) -> StorageResult<u64> {
        self.new.upload(key, content).await
    }

    /// Removes the key from both storages so a later run cannot bring it back
    async fn delete(&self, key: &M::New) -> StorageResult<bool> {
        let removed_new = self.new.delete(key).await?;
        let old_key = self.mapping.to_old_key(key);
        let removed_old = match self.old.delete(&old_key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(migration = %self.name, "Failed to delete old copy of {:?}: {}", old_key, e);
                false
            }
        };
        Ok(removed_new || removed_old)
    }

    async fn does_exist(&self, key: &M::New) -> StorageResult<bool> {
        self.new.does_exist(key).await
    }

    async fn content_size(&self, key: &M::New) -> StorageResult<u64> {
        self.new.content_size(key).await
    }

    async fn last_modified(&self, key: &M::New) -> StorageResult<DateTime<Utc>> {
        self.new.last_modified(key).await
    }

    async fn generate_url_to_download(
        &self,
        key: &M::New,
        expires_in: Duration,
    ) -> StorageResult<Option<String>> {
        self.new.generate_url_to_download(key, expires_in).await
    }
}

/// Object-safe handle on a migration, for startup tasks and health checks
#[async_trait]
pub trait Migratable: Send + Sync + fmt::Debug {
    /// Name used in logs and reports
    fn name(&self) -> &str;

    /// Run the migration once
    async fn migrate(&self) -> StorageResult<MigrationReport>;

    /// Whether the old storage is empty
    async fn is_migration_finished(&self) -> StorageResult<bool>;
}

#[async_trait]
impl<O, N, M> Migratable for MigrationStorage<O, N, M>
where
    M: KeyMapping,
    O: Storage<Key = M::Old>,
    N: Storage<Key = M::New>,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn migrate(&self) -> StorageResult<MigrationReport> {
        MigrationStorage::migrate(self).await
    }

    async fn is_migration_finished(&self) -> StorageResult<bool> {
        MigrationStorage::is_migration_finished(self).await
    }
}
