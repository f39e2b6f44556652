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

//! In-memory blob backend for tests
//!
//! Behaves like a bucket: flat keys, prefix listing, per-object modification
//! time. Writes to selected keys can be made to fail, which is how tests
//! simulate a backend fault halfway through a batch.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::backend::{BlobBackend, ObjectMeta};
use crate::content::{self, ContentStream};
use crate::error::{StorageError, StorageResult};

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

/// In-memory [`BlobBackend`]
///
/// Clones share the same objects.
#[derive(Clone, Default)]
pub struct MockBackend {
    store: Arc<RwLock<BTreeMap<String, StoredObject>>>,
    failing_puts: Arc<RwLock<HashSet<String>>>,
}

impl MockBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-populated with objects
    pub fn with_data<I, K, V>(objects: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        let now = Utc::now();
        let store = objects
            .into_iter()
            .map(|(key, data)| {
                (
                    key.into(),
                    StoredObject {
                        data: data.into(),
                        last_modified: now,
                    },
                )
            })
            .collect();
        MockBackend {
            store: Arc::new(RwLock::new(store)),
            failing_puts: Arc::default(),
        }
    }

    /// Make every subsequent write of `key` fail
    pub async fn fail_puts_for(&self, key: impl Into<String>) {
        self.failing_puts.write().await.insert(key.into());
    }

    /// Number of stored objects
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    /// Whether no objects are stored
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    /// All object keys in lexicographic order
    pub async fn keys(&self) -> Vec<String> {
        self.store.read().await.keys().cloned().collect()
    }

    /// Raw object content
    pub async fn object(&self, key: &str) -> Option<Bytes> {
        self.store.read().await.get(key).map(|o| o.data.clone())
    }
}

impl fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBackend").finish()
    }
}

#[async_trait]
impl BlobBackend for MockBackend {
    fn list_objects(&self, prefix: &str) -> BoxStream<'static, StorageResult<ObjectMeta>> {
        let store = Arc::clone(&self.store);
        let prefix = prefix.to_string();
        stream::once(async move {
            store
                .read()
                .await
                .range(prefix.clone()..)
                .take_while(|(key, _)| key.starts_with(&prefix))
                .map(|(key, object)| ObjectMeta {
                    key: key.clone(),
                    size: object.data.len() as u64,
                    last_modified: object.last_modified,
                })
                .collect::<Vec<_>>()
        })
        .flat_map(|objects| stream::iter(objects.into_iter().map(Ok)))
        .boxed()
    }

    async fn get_object(&self, key: &str) -> StorageResult<ContentStream> {
        let store = self.store.read().await;
        store
            .get(key)
            .map(|object| content::from_bytes(object.data.clone()))
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn put_object(&self, key: &str, content: ContentStream) -> StorageResult<u64> {
        if key.is_empty() {
            return Err(StorageError::invalid_key(key, "object key cannot be empty"));
        }
        let data = content::collect(content).await?;
        if self.failing_puts.read().await.contains(key) {
            return Err(StorageError::backend(format!("injected write failure for {}", key)));
        }
        let size = data.len() as u64;
        self.store.write().await.insert(
            key.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(size)
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.store.write().await.remove(key);
        Ok(())
    }

    async fn head_object(&self, key: &str) -> StorageResult<Option<ObjectMeta>> {
        Ok(self.store.read().await.get(key).map(|object| ObjectMeta {
            key: key.to_string(),
            size: object.data.len() as u64,
            last_modified: object.last_modified,
        }))
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        if !self.store.read().await.contains_key(key) {
            return Err(StorageError::not_found(key));
        }
        Ok(format!("memory://{}?expires={}", key, expires_in.as_secs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_put_and_get() {
        let backend = MockBackend::new();
        let size = backend
            .put_object("avatars/users/alice.png", content::from_bytes("png"))
            .await
            .unwrap();
        assert_eq!(size, 3);

        let data = content::collect(backend.get_object("avatars/users/alice.png").await.unwrap())
            .await
            .unwrap();
        assert_eq!(data, Bytes::from_static(b"png"));
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let backend = MockBackend::with_data([
            ("avatars/users/a.png", "a"),
            ("avatars/organizations/b.png", "b"),
            ("files/x", "x"),
        ]);

        let listed: Vec<ObjectMeta> = backend.list_objects("avatars/").try_collect().await.unwrap();
        let keys: Vec<_> = listed.into_iter().map(|o| o.key).collect();
        assert_eq!(keys, vec!["avatars/organizations/b.png", "avatars/users/a.png"]);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let backend = MockBackend::new();
        backend.fail_puts_for("broken").await;

        assert!(backend.put_object("broken", content::from_bytes("x")).await.is_err());
        assert!(backend.head_object("broken").await.unwrap().is_none());
        assert!(backend.put_object("fine", content::from_bytes("x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_object() {
        let backend = MockBackend::new();
        assert!(backend.get_object("nope").await.err().unwrap().is_not_found());
        assert!(backend.head_object("nope").await.unwrap().is_none());
        assert!(backend.delete_object("nope").await.is_ok());
        assert!(backend.presign_get("nope", Duration::from_secs(60)).await.is_err());
    }
}
