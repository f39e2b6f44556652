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

//! Metastore-backed storage
//!
//! Each stored object has a metadata row in a relational [`Metastore`]. The
//! caller addresses objects by a DTO (a key-like value with the row's natural
//! key fields); the blob itself is stored in another [`Storage`] under the
//! row id. Listing reads rows, never blobs, so attribute queries run against
//! the metastore.
//!
//! Row and blob are written in one logical operation without a distributed
//! transaction: a row whose blob is missing reads as absent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::content::ContentStream;
use crate::error::{StorageError, StorageResult};
use crate::storage::{KeyStream, Storage};

/// Relational repository of metadata rows
#[async_trait]
pub trait Metastore: Send + Sync + Debug {
    /// Key-like value callers address objects with
    type Dto: Clone + Debug + Send + Sync + 'static;
    /// Persisted row
    type Entity: Clone + Debug + Send + Sync + 'static;

    /// Row id; the blob is stored under this id
    fn entity_id(&self, entity: &Self::Entity) -> i64;

    /// DTO describing a row
    fn to_dto(&self, entity: &Self::Entity) -> Self::Dto;

    /// Every row
    fn find_all(&self) -> BoxStream<'_, StorageResult<Self::Entity>>;

    /// Row by id
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<Self::Entity>>;

    /// Row by natural key; must agree with `create_new_entity_from_dto`
    async fn find_by_dto(&self, dto: &Self::Dto) -> StorageResult<Option<Self::Entity>>;

    /// Insert a row for `dto`, resolving foreign references
    ///
    /// Fails with `NotFound` when a reference does not resolve and with
    /// `Conflict` when the natural key is already taken.
    async fn create_new_entity_from_dto(&self, dto: &Self::Dto) -> StorageResult<Self::Entity>;

    /// Record the size of the uploaded blob
    async fn update_size(&self, entity: &Self::Entity, size: u64) -> StorageResult<()> {
        let _ = (entity, size);
        Ok(())
    }

    /// Cascade cleanup before the row is removed
    async fn before_delete(&self, entity: &Self::Entity) -> StorageResult<()> {
        let _ = entity;
        Ok(())
    }

    /// Remove the row
    async fn delete_entity(&self, entity: &Self::Entity) -> StorageResult<()>;
}

/// Storage keyed by metastore DTOs, blobs addressed by row id
pub struct MetastoreStorage<M, S> {
    metastore: Arc<M>,
    blobs: S,
}

impl<M, S> MetastoreStorage<M, S>
where
    M: Metastore,
    S: Storage<Key = i64>,
{
    /// Combine a metastore with the blob storage holding row content
    pub fn new(metastore: Arc<M>, blobs: S) -> Self {
        MetastoreStorage { metastore, blobs }
    }

    /// The underlying metastore
    pub fn metastore(&self) -> &Arc<M> {
        &self.metastore
    }

    /// The blob storage addressed by row id
    pub fn blobs(&self) -> &S {
        &self.blobs
    }

    /// DTO of the row with `id`, if any
    pub async fn find_dto_by_id(&self, id: i64) -> StorageResult<Option<M::Dto>> {
        Ok(self
            .metastore
            .find_by_id(id)
            .await?
            .map(|entity| self.metastore.to_dto(&entity)))
    }

    /// Row id for `dto`, if a row exists
    pub async fn find_id(&self, dto: &M::Dto) -> StorageResult<Option<i64>> {
        Ok(self
            .metastore
            .find_by_dto(dto)
            .await?
            .map(|entity| self.metastore.entity_id(&entity)))
    }

    async fn require_id(&self, dto: &M::Dto) -> StorageResult<i64> {
        self.find_id(dto)
            .await?
            .ok_or_else(|| StorageError::not_found(format!("{:?}", dto)))
    }
}

impl<M: Debug, S: Debug> Debug for MetastoreStorage<M, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetastoreStorage")
            .field("metastore", &self.metastore)
            .field("blobs", &self.blobs)
            .finish()
    }
}

#[async_trait]
impl<M, S> Storage for MetastoreStorage<M, S>
where
    M: Metastore,
    S: Storage<Key = i64>,
{
    type Key = M::Dto;

    fn list(&self) -> KeyStream<'_, M::Dto> {
        self.metastore
            .find_all()
            .map_ok(move |entity| self.metastore.to_dto(&entity))
            .boxed()
    }

    async fn download(&self, key: &M::Dto) -> StorageResult<ContentStream> {
        let id = self.require_id(key).await?;
        self.blobs.download(&id).await
    }

    async fn upload(&self, key: &M::Dto, content: ContentStream) -> StorageResult<u64> {
        let (entity, created) = match self.metastore.find_by_dto(key).await? {
            Some(entity) => (entity, false),
            None => (self.metastore.create_new_entity_from_dto(key).await?, true),
        };
        let id = self.metastore.entity_id(&entity);

        match self.blobs.upload(&id, content).await {
            Ok(written) => {
                self.metastore.update_size(&entity, written).await?;
                debug!("Stored {} bytes for {:?} as #{}", written, key, id);
                Ok(written)
            }
            Err(e) => {
                if created {
                    if let Err(rollback) = self.metastore.delete_entity(&entity).await {
                        warn!("Failed to roll back row #{} after upload error: {}", id, rollback);
                    }
                }
                Err(e)
            }
        }
    }

    async fn delete(&self, key: &M::Dto) -> StorageResult<bool> {
        let Some(entity) = self.metastore.find_by_dto(key).await? else {
            return Ok(false);
        };
        let id = self.metastore.entity_id(&entity);
        self.metastore.before_delete(&entity).await?;
        self.blobs.delete(&id).await?;
        self.metastore.delete_entity(&entity).await?;
        debug!("Deleted {:?} (#{})", key, id);
        Ok(true)
    }

    async fn does_exist(&self, key: &M::Dto) -> StorageResult<bool> {
        match self.find_id(key).await? {
            Some(id) => self.blobs.does_exist(&id).await,
            None => Ok(false),
        }
    }

    async fn content_size(&self, key: &M::Dto) -> StorageResult<u64> {
        let id = self.require_id(key).await?;
        self.blobs.content_size(&id).await
    }

    async fn last_modified(&self, key: &M::Dto) -> StorageResult<DateTime<Utc>> {
        let id = self.require_id(key).await?;
        self.blobs.last_modified(&id).await
    }

    async fn generate_url_to_download(
        &self,
        key: &M::Dto,
        expires_in: Duration,
    ) -> StorageResult<Option<String>> {
        let id = self.require_id(key).await?;
        self.blobs.generate_url_to_download(&id, expires_in).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::IdCodec;
    use crate::mock::MockBackend;
    use crate::s3_storage::S3Storage;
    use bytes::Bytes;
    use futures::stream;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tokio::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Row {
        id: i64,
        name: String,
        size: Option<u64>,
    }

    /// Rows keyed by name; names starting with `orphan` have no owner
    #[derive(Debug, Default)]
    struct MemoryMetastore {
        rows: Mutex<BTreeMap<i64, Row>>,
        next_id: AtomicI64,
        unlinked: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl Metastore for MemoryMetastore {
        type Dto = String;
        type Entity = Row;

        fn entity_id(&self, entity: &Row) -> i64 {
            entity.id
        }

        fn to_dto(&self, entity: &Row) -> String {
            entity.name.clone()
        }

        fn find_all(&self) -> BoxStream<'_, StorageResult<Row>> {
            stream::once(async move { self.rows.lock().await.values().cloned().collect::<Vec<_>>() })
                .flat_map(|rows| stream::iter(rows.into_iter().map(Ok)))
                .boxed()
        }

        async fn find_by_id(&self, id: i64) -> StorageResult<Option<Row>> {
            Ok(self.rows.lock().await.get(&id).cloned())
        }

        async fn find_by_dto(&self, dto: &String) -> StorageResult<Option<Row>> {
            Ok(self.rows.lock().await.values().find(|r| &r.name == dto).cloned())
        }

        async fn create_new_entity_from_dto(&self, dto: &String) -> StorageResult<Row> {
            if dto.starts_with("orphan") {
                return Err(StorageError::not_found(format!("owner of {}", dto)));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let row = Row {
                id,
                name: dto.clone(),
                size: None,
            };
            self.rows.lock().await.insert(id, row.clone());
            Ok(row)
        }

        async fn update_size(&self, entity: &Row, size: u64) -> StorageResult<()> {
            if let Some(row) = self.rows.lock().await.get_mut(&entity.id) {
                row.size = Some(size);
            }
            Ok(())
        }

        async fn before_delete(&self, entity: &Row) -> StorageResult<()> {
            self.unlinked.lock().await.push(entity.id);
            Ok(())
        }

        async fn delete_entity(&self, entity: &Row) -> StorageResult<()> {
            self.rows.lock().await.remove(&entity.id);
            Ok(())
        }
    }

    fn storage() -> (
        MockBackend,
        MetastoreStorage<MemoryMetastore, S3Storage<IdCodec>>,
    ) {
        let backend = MockBackend::new();
        let blobs = S3Storage::new(Arc::new(backend.clone()), "blobs", IdCodec);
        let storage = MetastoreStorage::new(Arc::new(MemoryMetastore::default()), blobs);
        (backend, storage)
    }

    #[tokio::test]
    async fn test_upload_creates_row_and_records_size() {
        let (backend, storage) = storage();
        let key = "tool.bin".to_string();

        let written = storage.upload_bytes(&key, Bytes::from_static(b"binary")).await.unwrap();
        assert_eq!(written, 6);

        let row = storage.metastore().find_by_dto(&key).await.unwrap().unwrap();
        assert_eq!(row.size, Some(6));
        assert_eq!(backend.keys().await, vec![format!("blobs/{}", row.id)]);
        assert_eq!(storage.download_bytes(&key).await.unwrap(), Bytes::from_static(b"binary"));
    }

    #[tokio::test]
    async fn test_reupload_reuses_row() {
        let (_backend, storage) = storage();
        let key = "tool.bin".to_string();
        storage.upload_bytes(&key, Bytes::from_static(b"v1")).await.unwrap();
        let first = storage.find_id(&key).await.unwrap();
        storage.upload_bytes(&key, Bytes::from_static(b"version2")).await.unwrap();

        assert_eq!(storage.find_id(&key).await.unwrap(), first);
        assert_eq!(storage.content_size(&key).await.unwrap(), 8);
        assert_eq!(storage.list_all().await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_unresolved_reference_is_not_found() {
        let (backend, storage) = storage();
        let err = storage
            .upload_bytes(&"orphan.bin".to_string(), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_blob_write_rolls_back_new_row() {
        let (backend, storage) = storage();
        backend.fail_puts_for("blobs/1").await;

        let key = "broken.bin".to_string();
        assert!(storage.upload_bytes(&key, Bytes::from_static(b"x")).await.is_err());
        assert!(storage.metastore().find_by_dto(&key).await.unwrap().is_none());
        assert!(storage.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_runs_hook_and_removes_both() {
        let (backend, storage) = storage();
        let key = "tool.bin".to_string();
        storage.upload_bytes(&key, Bytes::from_static(b"x")).await.unwrap();
        let id = storage.find_id(&key).await.unwrap().unwrap();

        assert!(storage.delete(&key).await.unwrap());
        assert!(!storage.delete(&key).await.unwrap());
        assert_eq!(*storage.metastore().unlinked.lock().await, vec![id]);
        assert!(backend.is_empty().await);
        assert!(!storage.does_exist(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_row_without_blob_does_not_exist() {
        let (_backend, storage) = storage();
        let key = "ghost.bin".to_string();
        storage.metastore().create_new_entity_from_dto(&key).await.unwrap();

        assert!(!storage.does_exist(&key).await.unwrap());
        assert!(storage.content_size(&key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_find_dto_by_id() {
        let (_backend, storage) = storage();
        let key = "tool.bin".to_string();
        storage.upload_bytes(&key, Bytes::from_static(b"x")).await.unwrap();
        let id = storage.find_id(&key).await.unwrap().unwrap();

        assert_eq!(storage.find_dto_by_id(id).await.unwrap(), Some(key));
        assert_eq!(storage.find_dto_by_id(id + 100).await.unwrap(), None);
    }
}
