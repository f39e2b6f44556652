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

//! Project files
//!
//! Files used to live in a key-path layout (`<org>/<project>/<millis>/<name>`)
//! and now live in a metastore-backed store: a row in `files` per file, blob
//! content under the row id. [`FileStorage`] fronts the migration between the
//! two.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use save_migration::{IdentityMapping, Migratable};
use save_storage::codec::parse_canonical_i64;
use save_storage::{
    delegate_storage, IdCodec, InvalidKey, KeyCodec, KeyPath, Metastore, MetastoreStorage,
    SharedStorage, StorageError, StorageResult,
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::directory::SqliteDirectory;
use crate::root::{BlobRoot, LegacyRoot};

/// Legacy store prefix
pub const FILES: &str = "files";
/// Blob prefix of the metastore-backed store
pub const FILES_BY_ID: &str = "files-by-id";

const SELECT_FILES: &str = "SELECT f.id, p.organization, p.name AS project, f.name, \
     f.uploaded_millis, f.size_bytes FROM files f JOIN projects p ON p.id = f.project_id";

/// Organization and project a file belongs to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectCoordinates {
    /// Organization name
    pub organization_name: String,
    /// Project name
    pub project_name: String,
}

impl ProjectCoordinates {
    /// Coordinates of `project_name` in `organization_name`
    pub fn new(organization_name: impl Into<String>, project_name: impl Into<String>) -> Self {
        ProjectCoordinates {
            organization_name: organization_name.into(),
            project_name: project_name.into(),
        }
    }
}

impl fmt::Display for ProjectCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization_name, self.project_name)
    }
}

/// One uploaded file
///
/// The upload time is part of the identity, at millisecond precision.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileKey {
    /// Owning project
    pub project_coordinates: ProjectCoordinates,
    /// File name
    pub name: String,
    /// Upload time, milliseconds since the Unix epoch
    pub uploaded_millis: i64,
}

impl FileKey {
    /// Key for `name` uploaded to `project_coordinates` at `uploaded_millis`
    pub fn new(
        project_coordinates: ProjectCoordinates,
        name: impl Into<String>,
        uploaded_millis: i64,
    ) -> Self {
        FileKey {
            project_coordinates,
            name: name.into(),
            uploaded_millis,
        }
    }

    /// Upload time
    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.uploaded_millis)
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.project_coordinates, self.uploaded_millis, self.name
        )
    }
}

/// `<org>/<project>/<millis>/<name>`
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCodec;

impl KeyCodec for FileCodec {
    type Key = FileKey;

    fn encode(&self, key: &FileKey) -> Result<KeyPath, InvalidKey> {
        KeyPath::new([
            key.project_coordinates.organization_name.clone(),
            key.project_coordinates.project_name.clone(),
            key.uploaded_millis.to_string(),
            key.name.clone(),
        ])
    }

    fn decode(&self, path: &KeyPath) -> Result<FileKey, InvalidKey> {
        let segments = path.expect_len(4)?;
        let uploaded_millis = parse_canonical_i64(path, &segments[2], "upload time")?;
        Ok(FileKey::new(
            ProjectCoordinates::new(segments[0].clone(), segments[1].clone()),
            segments[3].clone(),
            uploaded_millis,
        ))
    }
}

/// Row of `files`, joined with its project
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct FileRow {
    /// Row id, also the blob key
    pub id: i64,
    /// Organization of the owning project
    pub organization: String,
    /// Owning project
    pub project: String,
    /// File name
    pub name: String,
    /// Upload time, milliseconds since the Unix epoch
    pub uploaded_millis: i64,
    /// Size of the stored content, `-1` until content is written
    pub size_bytes: i64,
}

impl FileRow {
    /// Key of this file
    pub fn key(&self) -> FileKey {
        FileKey::new(
            ProjectCoordinates::new(self.organization.clone(), self.project.clone()),
            self.name.clone(),
            self.uploaded_millis,
        )
    }
}

/// `files` table, with execution links in `lnk_execution_file`
#[derive(Debug, Clone)]
pub struct FileMetastore {
    directory: SqliteDirectory,
}

impl FileMetastore {
    /// Metastore over the directory's pool
    pub fn new(directory: SqliteDirectory) -> Self {
        FileMetastore { directory }
    }

    fn pool(&self) -> &SqlitePool {
        self.directory.pool()
    }

    /// Every file of a project, oldest first
    pub async fn list_by_project(&self, project: &ProjectCoordinates) -> StorageResult<Vec<FileRow>> {
        let rows = sqlx::query_as::<_, FileRow>(&format!(
            "{} WHERE p.organization = ? AND p.name = ? ORDER BY f.uploaded_millis, f.id",
            SELECT_FILES
        ))
        .bind(&project.organization_name)
        .bind(&project.project_name)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Record that `execution_id` uses file `file_id`
    pub async fn link_to_execution(&self, execution_id: i64, file_id: i64) -> StorageResult<()> {
        sqlx::query("INSERT OR IGNORE INTO lnk_execution_file (execution_id, file_id) VALUES (?, ?)")
            .bind(execution_id)
            .bind(file_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Files linked to `execution_id`
    pub async fn files_of_execution(&self, execution_id: i64) -> StorageResult<Vec<FileRow>> {
        let rows = sqlx::query_as::<_, FileRow>(&format!(
            "{} JOIN lnk_execution_file l ON l.file_id = f.id WHERE l.execution_id = ? ORDER BY f.id",
            SELECT_FILES
        ))
        .bind(execution_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl Metastore for FileMetastore {
    type Dto = FileKey;
    type Entity = FileRow;

    fn entity_id(&self, entity: &FileRow) -> i64 {
        entity.id
    }

    fn to_dto(&self, entity: &FileRow) -> FileKey {
        entity.key()
    }

    fn find_all(&self) -> BoxStream<'_, StorageResult<FileRow>> {
        sqlx::query_as::<_, FileRow>(SELECT_FILES)
            .fetch(self.pool())
            .map_err(StorageError::from)
            .boxed()
    }

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<FileRow>> {
        let row = sqlx::query_as::<_, FileRow>(&format!("{} WHERE f.id = ?", SELECT_FILES))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    async fn find_by_dto(&self, dto: &FileKey) -> StorageResult<Option<FileRow>> {
        let row = sqlx::query_as::<_, FileRow>(&format!(
            "{} WHERE p.organization = ? AND p.name = ? AND f.name = ? AND f.uploaded_millis = ?",
            SELECT_FILES
        ))
        .bind(&dto.project_coordinates.organization_name)
        .bind(&dto.project_coordinates.project_name)
        .bind(&dto.name)
        .bind(dto.uploaded_millis)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    async fn create_new_entity_from_dto(&self, dto: &FileKey) -> StorageResult<FileRow> {
        let coordinates = &dto.project_coordinates;
        let project_id = self
            .directory
            .require_project_id(&coordinates.organization_name, &coordinates.project_name)
            .await?;
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO files (project_id, name, uploaded_millis) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(project_id)
        .bind(&dto.name)
        .bind(dto.uploaded_millis)
        .fetch_one(self.pool())
        .await?;
        debug!(file = %dto, id, "Created file row");
        Ok(FileRow {
            id,
            organization: coordinates.organization_name.clone(),
            project: coordinates.project_name.clone(),
            name: dto.name.clone(),
            uploaded_millis: dto.uploaded_millis,
            size_bytes: -1,
        })
    }

    async fn update_size(&self, entity: &FileRow, size: u64) -> StorageResult<()> {
        let size = i64::try_from(size).map_err(StorageError::other)?;
        sqlx::query("UPDATE files SET size_bytes = ? WHERE id = ?")
            .bind(size)
            .bind(entity.id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn before_delete(&self, entity: &FileRow) -> StorageResult<()> {
        let unlinked = sqlx::query("DELETE FROM lnk_execution_file WHERE file_id = ?")
            .bind(entity.id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if unlinked > 0 {
            debug!(id = entity.id, unlinked, "Unlinked file from executions");
        }
        Ok(())
    }

    async fn delete_entity(&self, entity: &FileRow) -> StorageResult<()> {
        sqlx::query("DELETE FROM files WHERE id = ?")
            .bind(entity.id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

/// File store keyed by [`FileKey`]
#[derive(Debug)]
pub struct FileStorage {
    inner: SharedStorage<FileKey>,
    metastore: Arc<FileMetastore>,
    migration: Option<Arc<dyn Migratable>>,
}

delegate_storage!(FileStorage, inner, FileKey);

impl FileStorage {
    /// Store under `root` indexed in `directory`, migrating from `legacy` when given
    pub fn new(
        root: &BlobRoot,
        directory: SqliteDirectory,
        legacy: Option<&LegacyRoot>,
    ) -> StorageResult<Self> {
        let metastore = Arc::new(FileMetastore::new(directory));
        let blobs = root.storage(FILES_BY_ID, IdCodec)?;
        let current: SharedStorage<FileKey> =
            Arc::new(MetastoreStorage::new(Arc::clone(&metastore), blobs));

        let (inner, migration) = match legacy {
            Some(legacy) => {
                let (inner, migration) =
                    legacy.migrate_into(FILES, FileCodec, IdentityMapping::new(), current)?;
                (inner, Some(migration))
            }
            None => (current, None),
        };
        Ok(FileStorage {
            inner,
            metastore,
            migration,
        })
    }

    /// The `files` metastore
    pub fn metastore(&self) -> &FileMetastore {
        &self.metastore
    }

    /// Pending migration from the legacy layout, if any
    pub fn migration(&self) -> Option<Arc<dyn Migratable>> {
        self.migration.clone()
    }

    /// File with row id `id`
    pub async fn find_file_by_id(&self, id: i64) -> StorageResult<Option<FileRow>> {
        self.metastore.find_by_id(id).await
    }

    /// Every file of a project
    pub async fn list_by_project(&self, project: &ProjectCoordinates) -> StorageResult<Vec<FileRow>> {
        self.metastore.list_by_project(project).await
    }

    /// Record that `execution_id` uses the file under `key`
    pub async fn link_to_execution(&self, execution_id: i64, key: &FileKey) -> StorageResult<()> {
        let row = self
            .metastore
            .find_by_dto(key)
            .await?
            .ok_or_else(|| StorageError::not_found(key.to_string()))?;
        self.metastore.link_to_execution(execution_id, row.id).await
    }

    /// Files linked to `execution_id`
    pub async fn files_of_execution(&self, execution_id: i64) -> StorageResult<Vec<FileRow>> {
        self.metastore.files_of_execution(execution_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;
    use save_storage::Storage;
    use save_test_utils::{assert_content, memory_pool};
    use tempfile::TempDir;

    fn huawei_key(name: &str, millis: i64) -> FileKey {
        FileKey::new(ProjectCoordinates::new("Huawei", "huaweiName"), name, millis)
    }

    async fn file_storage(dir: &TempDir) -> (SqliteDirectory, FileStorage) {
        let directory = SqliteDirectory::from_pool(memory_pool().await).await.unwrap();
        directory.create_project("Huawei", "huaweiName").await.unwrap();
        let root = BlobRoot::filesystem(dir.path());
        let storage = FileStorage::new(&root, directory.clone(), None).unwrap();
        (directory, storage)
    }

    #[test]
    fn test_codec_path() {
        let key = huawei_key("tool.bin", 1_700_000_000_000);
        let path = FileCodec.encode(&key).unwrap();
        assert_eq!(path.as_object_key(), "Huawei/huaweiName/1700000000000/tool.bin");
        assert_eq!(FileCodec.decode(&path).unwrap(), key);
    }

    #[test]
    fn test_codec_segment_boundaries() {
        assert!(!FileCodec.is_key(&KeyPath::parse("Huawei/huaweiName/tool.bin").unwrap()));
        assert!(!FileCodec.is_key(&KeyPath::parse("a/b/c/d/e").unwrap()));
        assert!(!FileCodec.is_key(&KeyPath::parse("a/b/yesterday/d").unwrap()));
        assert!(!FileCodec.is_key(&KeyPath::parse("a/b/0017/d").unwrap()));
        assert!(FileCodec.encode(&huawei_key("..", 1)).is_err());
    }

    #[tokio::test]
    async fn test_upload_records_size() {
        let dir = TempDir::new().unwrap();
        let (_directory, files) = file_storage(&dir).await;
        let key = huawei_key("tool.bin", 1_700_000_000_000);

        let written = files
            .upload_bytes(&key, Bytes::from_static(b"binary tool"))
            .await
            .unwrap();
        assert_eq!(written, 11);

        let row = files.metastore().find_by_dto(&key).await.unwrap().unwrap();
        assert_eq!(row.size_bytes, 11);
        assert_eq!(files.find_file_by_id(row.id).await.unwrap().unwrap().key(), key);
        assert_content(&files, &key, b"binary tool").await;
        assert_eq!(files.list_all().await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_upload_to_unknown_project() {
        let dir = TempDir::new().unwrap();
        let (_directory, files) = file_storage(&dir).await;
        let key = FileKey::new(ProjectCoordinates::new("Nobody", "nothing"), "a.txt", 1);

        let err = files.upload_bytes(&key, Bytes::from_static(b"x")).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(files.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_natural_key_is_millisecond_exact() {
        let dir = TempDir::new().unwrap();
        let (_directory, files) = file_storage(&dir).await;

        files.upload_bytes(&huawei_key("a.txt", 1000), Bytes::from_static(b"1")).await.unwrap();
        files.upload_bytes(&huawei_key("a.txt", 1001), Bytes::from_static(b"2")).await.unwrap();

        let project = ProjectCoordinates::new("Huawei", "huaweiName");
        let rows = files.list_by_project(&project).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].uploaded_millis, 1000);
        assert!(!files.does_exist(&huawei_key("a.txt", 1002)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_unlinks_executions() {
        let dir = TempDir::new().unwrap();
        let (_directory, files) = file_storage(&dir).await;
        let key = huawei_key("tool.bin", 5);
        files.upload_bytes(&key, Bytes::from_static(b"x")).await.unwrap();

        files.link_to_execution(42, &key).await.unwrap();
        files.link_to_execution(42, &key).await.unwrap();
        assert_eq!(files.files_of_execution(42).await.unwrap().len(), 1);

        assert!(files.delete(&key).await.unwrap());
        assert!(files.files_of_execution(42).await.unwrap().is_empty());
        assert!(!files.delete(&key).await.unwrap());
        assert!(files.link_to_execution(42, &key).await.unwrap_err().is_not_found());
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            org in "[A-Za-z0-9_-]{1,12}",
            project in "[A-Za-z0-9_-]{1,12}",
            name in "[A-Za-z0-9_-]{1,12}\\.[a-z]{1,4}",
            millis in any::<i64>(),
        ) {
            let key = FileKey::new(ProjectCoordinates::new(org, project), name, millis);
            let path = FileCodec.encode(&key).unwrap();
            prop_assert_eq!(FileCodec.decode(&path).unwrap(), key);
        }
    }
}
