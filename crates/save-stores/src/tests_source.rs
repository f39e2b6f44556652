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

//! Test suites source snapshots indexed in the metastore
//!
//! Rows of `tests_source_snapshots` carry the natural key (organization,
//! source, commit id); content lives under the row id. Legacy key-path
//! snapshots migrate in with version as commit id and creation time as
//! commit time.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use save_migration::{FnMapping, Migratable};
use save_storage::{
    content, delegate_storage, IdCodec, Metastore, MetastoreStorage, SharedStorage, Storage,
    StorageError, StorageResult,
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::archive::{self, TestFilesContent, TestFilesRequest};
use crate::directory::SqliteDirectory;
use crate::root::{BlobRoot, LegacyRoot};
use crate::snapshot::{SnapshotCodec, TestSuitesSourceSnapshotKey, TEST_SUITES_SOURCE_SNAPSHOTS};

/// Blob prefix of the metastore-backed store
pub const TESTS_SOURCE_SNAPSHOTS: &str = "tests-source-snapshots";

const SELECT_SNAPSHOTS: &str = "SELECT t.id, s.organization, s.name AS source, t.commit_id, \
     t.commit_time_millis FROM tests_source_snapshots t \
     JOIN test_suites_sources s ON s.id = t.source_id";

/// Snapshot of a source at one commit
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestsSourceSnapshotDto {
    /// Owning organization
    pub organization_name: String,
    /// Source name
    pub source_name: String,
    /// Commit the snapshot was taken at
    pub commit_id: String,
    /// Commit time, milliseconds since the Unix epoch; not part of the identity
    pub commit_time_millis: i64,
}

impl TestsSourceSnapshotDto {
    /// Snapshot of `organization_name/source_name` at `commit_id`
    pub fn new(
        organization_name: impl Into<String>,
        source_name: impl Into<String>,
        commit_id: impl Into<String>,
        commit_time_millis: i64,
    ) -> Self {
        TestsSourceSnapshotDto {
            organization_name: organization_name.into(),
            source_name: source_name.into(),
            commit_id: commit_id.into(),
            commit_time_millis,
        }
    }
}

impl fmt::Display for TestsSourceSnapshotDto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.organization_name, self.source_name, self.commit_id
        )
    }
}

/// Legacy key to snapshot DTO and back
pub fn legacy_mapping() -> FnMapping<TestSuitesSourceSnapshotKey, TestsSourceSnapshotDto> {
    FnMapping::new(
        |dto: &TestsSourceSnapshotDto| {
            TestSuitesSourceSnapshotKey::new(
                dto.organization_name.clone(),
                dto.source_name.clone(),
                dto.commit_id.clone(),
                dto.commit_time_millis,
            )
        },
        |key: &TestSuitesSourceSnapshotKey| {
            TestsSourceSnapshotDto::new(
                key.organization_name.clone(),
                key.test_suites_source_name.clone(),
                key.version.clone(),
                key.creation_time_millis,
            )
        },
    )
}

/// Row of `tests_source_snapshots`, joined with its source
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SnapshotRow {
    /// Row id, also the blob key
    pub id: i64,
    /// Organization of the source
    pub organization: String,
    /// Source name
    pub source: String,
    /// Commit id
    pub commit_id: String,
    /// Commit time, milliseconds since the Unix epoch
    pub commit_time_millis: i64,
}

impl SnapshotRow {
    /// DTO of this row
    pub fn dto(&self) -> TestsSourceSnapshotDto {
        TestsSourceSnapshotDto::new(
            self.organization.clone(),
            self.source.clone(),
            self.commit_id.clone(),
            self.commit_time_millis,
        )
    }
}

/// `tests_source_snapshots` table
#[derive(Debug, Clone)]
pub struct SnapshotMetastore {
    directory: SqliteDirectory,
}

impl SnapshotMetastore {
    /// Metastore over the directory's pool
    pub fn new(directory: SqliteDirectory) -> Self {
        SnapshotMetastore { directory }
    }

    fn pool(&self) -> &SqlitePool {
        self.directory.pool()
    }

    /// Snapshots of a source, oldest commit first
    pub async fn list_versions(
        &self,
        organization_name: &str,
        source_name: &str,
    ) -> StorageResult<Vec<SnapshotRow>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
            "{} WHERE s.organization = ? AND s.name = ? ORDER BY t.commit_time_millis, t.id",
            SELECT_SNAPSHOTS
        ))
        .bind(organization_name)
        .bind(source_name)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Snapshot with the latest commit time
    pub async fn latest_version(
        &self,
        organization_name: &str,
        source_name: &str,
    ) -> StorageResult<Option<SnapshotRow>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "{} WHERE s.organization = ? AND s.name = ? \
             ORDER BY t.commit_time_millis DESC, t.id DESC LIMIT 1",
            SELECT_SNAPSHOTS
        ))
        .bind(organization_name)
        .bind(source_name)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl Metastore for SnapshotMetastore {
    type Dto = TestsSourceSnapshotDto;
    type Entity = SnapshotRow;

    fn entity_id(&self, entity: &SnapshotRow) -> i64 {
        entity.id
    }

    fn to_dto(&self, entity: &SnapshotRow) -> TestsSourceSnapshotDto {
        entity.dto()
    }

    fn find_all(&self) -> BoxStream<'_, StorageResult<SnapshotRow>> {
        sqlx::query_as::<_, SnapshotRow>(SELECT_SNAPSHOTS)
            .fetch(self.pool())
            .map_err(StorageError::from)
            .boxed()
    }

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<SnapshotRow>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!("{} WHERE t.id = ?", SELECT_SNAPSHOTS))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    async fn find_by_dto(&self, dto: &TestsSourceSnapshotDto) -> StorageResult<Option<SnapshotRow>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "{} WHERE s.organization = ? AND s.name = ? AND t.commit_id = ?",
            SELECT_SNAPSHOTS
        ))
        .bind(&dto.organization_name)
        .bind(&dto.source_name)
        .bind(&dto.commit_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    async fn create_new_entity_from_dto(
        &self,
        dto: &TestsSourceSnapshotDto,
    ) -> StorageResult<SnapshotRow> {
        let source_id = self
            .directory
            .require_test_suites_source_id(&dto.organization_name, &dto.source_name)
            .await?;
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO tests_source_snapshots (source_id, commit_id, commit_time_millis) \
             VALUES (?, ?, ?) RETURNING id",
        )
        .bind(source_id)
        .bind(&dto.commit_id)
        .bind(dto.commit_time_millis)
        .fetch_one(self.pool())
        .await?;
        debug!(snapshot = %dto, id, "Created snapshot row");
        Ok(SnapshotRow {
            id,
            organization: dto.organization_name.clone(),
            source: dto.source_name.clone(),
            commit_id: dto.commit_id.clone(),
            commit_time_millis: dto.commit_time_millis,
        })
    }

    async fn delete_entity(&self, entity: &SnapshotRow) -> StorageResult<()> {
        sqlx::query("DELETE FROM tests_source_snapshots WHERE id = ?")
            .bind(entity.id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

/// Snapshot store keyed by [`TestsSourceSnapshotDto`]
#[derive(Debug)]
pub struct TestsSourceSnapshotStorage {
    inner: SharedStorage<TestsSourceSnapshotDto>,
    metastore: Arc<SnapshotMetastore>,
    migration: Option<Arc<dyn Migratable>>,
}

delegate_storage!(TestsSourceSnapshotStorage, inner, TestsSourceSnapshotDto);

impl TestsSourceSnapshotStorage {
    /// Store under `root` indexed in `directory`, migrating legacy snapshots when given
    pub fn new(
        root: &BlobRoot,
        directory: SqliteDirectory,
        legacy: Option<&LegacyRoot>,
    ) -> StorageResult<Self> {
        let metastore = Arc::new(SnapshotMetastore::new(directory));
        let blobs = root.storage(TESTS_SOURCE_SNAPSHOTS, IdCodec)?;
        let current: SharedStorage<TestsSourceSnapshotDto> =
            Arc::new(MetastoreStorage::new(Arc::clone(&metastore), blobs));

        let (inner, migration) = match legacy {
            Some(legacy) => {
                let (inner, migration) = legacy.migrate_into(
                    TEST_SUITES_SOURCE_SNAPSHOTS,
                    SnapshotCodec,
                    legacy_mapping(),
                    current,
                )?;
                (inner, Some(migration))
            }
            None => (current, None),
        };
        Ok(TestsSourceSnapshotStorage {
            inner,
            metastore,
            migration,
        })
    }

    /// The snapshot metastore
    pub fn metastore(&self) -> &SnapshotMetastore {
        &self.metastore
    }

    /// Pending migration from the legacy layout, if any
    pub fn migration(&self) -> Option<Arc<dyn Migratable>> {
        self.migration.clone()
    }

    async fn ensure_migrated(&self) -> StorageResult<()> {
        match &self.migration {
            Some(migration) if !migration.is_migration_finished().await? => Err(
                StorageError::not_ready(format!("migration `{}` has not finished", migration.name())),
            ),
            _ => Ok(()),
        }
    }

    /// Snapshots of a source, oldest commit first
    ///
    /// `NotReady` while legacy snapshots are still being migrated.
    pub async fn list_versions(
        &self,
        organization_name: &str,
        source_name: &str,
    ) -> StorageResult<Vec<TestsSourceSnapshotDto>> {
        self.ensure_migrated().await?;
        let rows = self.metastore.list_versions(organization_name, source_name).await?;
        Ok(rows.iter().map(SnapshotRow::dto).collect())
    }

    /// Snapshot with the latest commit time
    ///
    /// `NotReady` while legacy snapshots are still being migrated.
    pub async fn latest_version(
        &self,
        organization_name: &str,
        source_name: &str,
    ) -> StorageResult<Option<TestsSourceSnapshotDto>> {
        self.ensure_migrated().await?;
        let row = self.metastore.latest_version(organization_name, source_name).await?;
        Ok(row.as_ref().map(SnapshotRow::dto))
    }

    /// Snapshot of a source at `commit_id`
    pub async fn find_by_commit(
        &self,
        organization_name: &str,
        source_name: &str,
        commit_id: &str,
    ) -> StorageResult<Option<TestsSourceSnapshotDto>> {
        let probe = TestsSourceSnapshotDto::new(organization_name, source_name, commit_id, 0);
        let row = self.metastore.find_by_dto(&probe).await?;
        Ok(row.as_ref().map(SnapshotRow::dto))
    }

    /// Archive `dir` and store it as `snapshot`
    pub async fn upload_directory(
        &self,
        snapshot: &TestsSourceSnapshotDto,
        dir: &Path,
    ) -> StorageResult<u64> {
        let zip = archive::pack_directory(dir).await?;
        debug!(snapshot = %snapshot, bytes = zip.len(), "Uploading snapshot");
        self.inner
            .upload(snapshot, content::from_bytes(Bytes::from(zip)))
            .await
    }

    /// Read test files out of `snapshot`
    pub async fn get_test_content(
        &self,
        snapshot: &TestsSourceSnapshotDto,
        request: &TestFilesRequest,
    ) -> StorageResult<TestFilesContent> {
        let archive = self.inner.download(snapshot).await?;
        archive::read_test_content(archive, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use save_migration::{KeyMapping, MigrationOptions};
    use save_test_utils::{assert_not_ready, memory_pool};
    use tempfile::TempDir;

    async fn directory() -> SqliteDirectory {
        let directory = SqliteDirectory::from_pool(memory_pool().await).await.unwrap();
        directory.create_test_suites_source("org", "src").await.unwrap();
        directory
    }

    #[test]
    fn test_legacy_mapping() {
        let mapping = legacy_mapping();
        let key = TestSuitesSourceSnapshotKey::new("org", "src", "abc123", 1_700_000_000_000);
        let dto = mapping.to_new_key(&key);
        assert_eq!(dto, TestsSourceSnapshotDto::new("org", "src", "abc123", 1_700_000_000_000));
        assert_eq!(mapping.to_old_key(&dto), key);
    }

    #[tokio::test]
    async fn test_commit_time_is_not_identity() {
        let dir = TempDir::new().unwrap();
        let storage =
            TestsSourceSnapshotStorage::new(&BlobRoot::filesystem(dir.path()), directory().await, None)
                .unwrap();
        let dto = TestsSourceSnapshotDto::new("org", "src", "abc", 100);

        storage.upload_bytes(&dto, Bytes::from_static(b"zip")).await.unwrap();
        let moved = TestsSourceSnapshotDto::new("org", "src", "abc", 999);
        assert!(storage.does_exist(&moved).await.unwrap());
        assert_eq!(storage.list_all().await.unwrap(), vec![dto]);
    }

    #[tokio::test]
    async fn test_latest_version() {
        let dir = TempDir::new().unwrap();
        let storage =
            TestsSourceSnapshotStorage::new(&BlobRoot::filesystem(dir.path()), directory().await, None)
                .unwrap();
        for (commit, time) in [("c1", 10), ("c3", 30), ("c2", 20)] {
            let dto = TestsSourceSnapshotDto::new("org", "src", commit, time);
            storage.upload_bytes(&dto, Bytes::from_static(b"zip")).await.unwrap();
        }

        let latest = storage.latest_version("org", "src").await.unwrap().unwrap();
        assert_eq!(latest.commit_id, "c3");
        let commits: Vec<_> = storage
            .list_versions("org", "src")
            .await
            .unwrap()
            .into_iter()
            .map(|dto| dto.commit_id)
            .collect();
        assert_eq!(commits, vec!["c1", "c2", "c3"]);
        assert_eq!(
            storage.find_by_commit("org", "src", "c2").await.unwrap().map(|dto| dto.commit_time_millis),
            Some(20)
        );
    }

    #[tokio::test]
    async fn test_unknown_source() {
        let dir = TempDir::new().unwrap();
        let storage =
            TestsSourceSnapshotStorage::new(&BlobRoot::filesystem(dir.path()), directory().await, None)
                .unwrap();
        let dto = TestsSourceSnapshotDto::new("org", "nope", "abc", 1);

        let err = storage.upload_bytes(&dto, Bytes::from_static(b"zip")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_queries_wait_for_migration() {
        let dir = TempDir::new().unwrap();
        let legacy_dir = TempDir::new().unwrap();
        let legacy = LegacyRoot::new(legacy_dir.path());
        let old = crate::snapshot::TestSuitesSourceSnapshotStorage::from_storage(Arc::new(
            save_storage::LocalStorage::new_sync(
                legacy_dir.path().join(TEST_SUITES_SOURCE_SNAPSHOTS),
                SnapshotCodec,
            )
            .unwrap(),
        ));
        let key = TestSuitesSourceSnapshotKey::new("org", "src", "v1", 5);
        old.upload_bytes(&key, Bytes::from_static(b"zip")).await.unwrap();

        let storage = TestsSourceSnapshotStorage::new(
            &BlobRoot::filesystem(dir.path()),
            directory().await,
            Some(&legacy),
        )
        .unwrap();

        assert_not_ready(storage.latest_version("org", "src").await);
        assert_not_ready(storage.list_versions("org", "src").await);

        let migration = storage.migration().unwrap();
        migration.migrate().await.unwrap();

        let latest = storage.latest_version("org", "src").await.unwrap().unwrap();
        assert_eq!(latest, TestsSourceSnapshotDto::new("org", "src", "v1", 5));
        assert!(old.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_commit_in_legacy_is_reported_as_discarded() {
        let dir = TempDir::new().unwrap();
        let legacy_dir = TempDir::new().unwrap();
        let legacy = LegacyRoot::new(legacy_dir.path()).with_options(MigrationOptions {
            concurrency: 1,
            ..MigrationOptions::default()
        });
        let old = crate::snapshot::TestSuitesSourceSnapshotStorage::from_storage(Arc::new(
            save_storage::LocalStorage::new_sync(
                legacy_dir.path().join(TEST_SUITES_SOURCE_SNAPSHOTS),
                SnapshotCodec,
            )
            .unwrap(),
        ));
        for (time, content) in [(5, &b"first"[..]), (9, &b"second"[..])] {
            let key = TestSuitesSourceSnapshotKey::new("org", "src", "v1", time);
            old.upload_bytes(&key, Bytes::copy_from_slice(content)).await.unwrap();
        }

        let storage = TestsSourceSnapshotStorage::new(
            &BlobRoot::filesystem(dir.path()),
            directory().await,
            Some(&legacy),
        )
        .unwrap();
        let report = storage.migration().unwrap().migrate().await.unwrap();

        assert_eq!(report.migrated_objects.len(), 1);
        assert_eq!(report.discarded.len(), 1);
        assert!(report.already_present.is_empty());
        assert!(old.list_all().await.unwrap().is_empty());
        assert_eq!(storage.list_versions("org", "src").await.unwrap().len(), 1);
    }
}
