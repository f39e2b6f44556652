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

//! Filesystem storage
//!
//! A key lives at `root/<encoded path>`. Uploads stream into a temporary file
//! next to the target and are atomically renamed into place, so readers never
//! observe a partially written object.
//!
//! # Examples
//!
//! ```rust,no_run
//! use save_storage::{IdCodec, LocalStorage, Storage};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let storage = LocalStorage::new("./data/blobs", IdCodec).await?;
//! storage.upload_bytes(&42, "hello".into()).await?;
//! assert_eq!(storage.content_size(&42).await?, 5);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::codec::{InvalidKey, KeyCodec, KeyPath};
use crate::content::{self, ContentStream};
use crate::error::{StorageError, StorageResult};
use crate::storage::{KeyStream, Storage};

/// File name prefix of in-flight uploads; no key segment may start with it
pub const TEMP_FILE_PREFIX: &str = crate::codec::RESERVED_PREFIX;

/// Storage backed by a local directory tree
#[derive(Clone)]
pub struct LocalStorage<C> {
    root: PathBuf,
    codec: C,
}

impl<C: KeyCodec> LocalStorage<C> {
    /// Open a storage rooted at `root`, creating the directory if needed
    ///
    /// Fails if `root` exists but is not a directory.
    pub async fn new<P: AsRef<Path>>(root: P, codec: C) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();

        if !fs::try_exists(&root).await? {
            fs::create_dir_all(&root).await?;
        } else if !fs::metadata(&root).await?.is_dir() {
            return Err(StorageError::backend(format!(
                "path exists but is not a directory: {}",
                root.display()
            )));
        }

        Ok(LocalStorage { root, codec })
    }

    /// Synchronous variant of [`LocalStorage::new`] for non-async setup code
    pub fn new_sync<P: AsRef<Path>>(root: P, codec: C) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        } else if !root.is_dir() {
            return Err(StorageError::backend(format!(
                "path exists but is not a directory: {}",
                root.display()
            )));
        }

        Ok(LocalStorage { root, codec })
    }

    /// Root directory of this storage
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Codec used to address content
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Location of the content for `key`
    pub fn build_path_to_content(&self, key: &C::Key) -> Result<PathBuf, InvalidKey> {
        let path = self.codec.encode(key)?;
        Ok(self.root.join(path.to_relative_path()))
    }

    /// Key stored at `path`; inverse of [`build_path_to_content`](Self::build_path_to_content)
    pub fn build_key(&self, path: &Path) -> Result<C::Key, InvalidKey> {
        let relative = path.strip_prefix(&self.root).map_err(|_| {
            InvalidKey::new(
                path.display().to_string(),
                format!("not under storage root {}", self.root.display()),
            )
        })?;
        self.codec.decode(&KeyPath::from_relative_path(relative)?)
    }

    fn decode_listed(&self, path: &Path) -> Option<C::Key> {
        let is_temp = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(TEMP_FILE_PREFIX));
        if is_temp {
            return None;
        }
        match self.build_key(path) {
            Ok(key) => Some(key),
            Err(e) => {
                debug!("Skipping foreign path {}: {}", path.display(), e);
                None
            }
        }
    }

    fn missing(&self, key: &C::Key) -> StorageError {
        StorageError::not_found(format!("{:?} in {}", key, self.root.display()))
    }

    async fn metadata(&self, key: &C::Key) -> StorageResult<std::fs::Metadata> {
        let path = self.build_path_to_content(key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(meta),
            Ok(_) => Err(self.missing(key)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(self.missing(key)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Pending directories plus the one being read
struct Walk {
    pending: Vec<PathBuf>,
    current: Option<fs::ReadDir>,
}

/// Lazily walk every regular file below `root`
///
/// Iterative (work queue, no recursion). Directories that vanish during the
/// walk are skipped.
fn walk_files(root: PathBuf) -> stream::BoxStream<'static, io::Result<PathBuf>> {
    let walk = Walk {
        pending: vec![root],
        current: None,
    };

    stream::try_unfold(walk, |mut walk| async move {
        loop {
            if walk.current.is_none() {
                let Some(dir) = walk.pending.pop() else {
                    return Ok(None);
                };
                match fs::read_dir(&dir).await {
                    Ok(entries) => walk.current = Some(entries),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(e),
                }
            }

            let Some(entries) = walk.current.as_mut() else {
                continue;
            };
            match entries.next_entry().await? {
                None => walk.current = None,
                Some(entry) => {
                    let file_type = entry.file_type().await?;
                    if file_type.is_dir() {
                        walk.pending.push(entry.path());
                    } else if file_type.is_file() {
                        return Ok(Some((entry.path(), walk)));
                    }
                }
            }
        }
    })
    .boxed()
}

impl<C> fmt::Debug for LocalStorage<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStorage")
            .field("root", &self.root)
            .finish()
    }
}

#[async_trait]
impl<C: KeyCodec> Storage for LocalStorage<C> {
    type Key = C::Key;

    fn list(&self) -> KeyStream<'_, C::Key> {
        walk_files(self.root.clone())
            .map_err(StorageError::from)
            .try_filter_map(move |path| {
                let key = self.decode_listed(&path);
                async move { Ok(key) }
            })
            .boxed()
    }

    async fn download(&self, key: &C::Key) -> StorageResult<ContentStream> {
        let path = self.build_path_to_content(key)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(content::from_file(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(self.missing(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn upload(&self, key: &C::Key, mut content: ContentStream) -> StorageResult<u64> {
        let path = self.build_path_to_content(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::invalid_key(format!("{:?}", key), "has no parent directory"))?;
        fs::create_dir_all(parent).await?;

        let temp_path = parent.join(format!("{}{}", TEMP_FILE_PREFIX, Uuid::new_v4()));
        let write = async {
            let mut file = fs::File::create(&temp_path).await?;
            let mut written = 0u64;
            while let Some(chunk) = content.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.sync_all().await?;
            Ok::<_, io::Error>(written)
        };

        let written = match write.await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e.into());
            }
        };

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!("Stored {} bytes at {}", written, path.display());
        Ok(written)
    }

    async fn delete(&self, key: &C::Key) -> StorageResult<bool> {
        let path = self.build_path_to_content(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn does_exist(&self, key: &C::Key) -> StorageResult<bool> {
        match self.metadata(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn content_size(&self, key: &C::Key) -> StorageResult<u64> {
        Ok(self.metadata(key).await?.len())
    }

    async fn last_modified(&self, key: &C::Key) -> StorageResult<DateTime<Utc>> {
        let modified = self.metadata(key).await?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// `<folder>/<name>` keys used to exercise the storage
    #[derive(Debug, Clone, Copy)]
    struct PairCodec;

    impl KeyCodec for PairCodec {
        type Key = (String, String);

        fn encode(&self, key: &Self::Key) -> Result<KeyPath, InvalidKey> {
            KeyPath::new([key.0.clone(), key.1.clone()])
        }

        fn decode(&self, path: &KeyPath) -> Result<Self::Key, InvalidKey> {
            let segments = path.expect_len(2)?;
            Ok((segments[0].clone(), segments[1].clone()))
        }
    }

    fn key(folder: &str, name: &str) -> (String, String) {
        (folder.to_string(), name.to_string())
    }

    async fn storage() -> (TempDir, LocalStorage<PairCodec>) {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().join("root"), PairCodec)
            .await
            .unwrap();
        (temp_dir, storage)
    }

    #[tokio::test]
    async fn test_new_creates_root_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("storage");

        assert!(!path.exists());
        let storage = LocalStorage::new(&path, PairCodec).await.unwrap();
        assert!(path.exists());
        assert_eq!(storage.root(), path);
    }

    #[tokio::test]
    async fn test_new_fails_with_file_path() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("file.txt");
        std::fs::write(&file_path, b"data").unwrap();

        assert!(LocalStorage::new(&file_path, PairCodec).await.is_err());
        assert!(LocalStorage::new_sync(&file_path, PairCodec).is_err());
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let (_dir, storage) = storage().await;
        let k = key("users", "alice.png");

        let written = storage.upload_bytes(&k, Bytes::from_static(b"avatar")).await.unwrap();
        assert_eq!(written, 6);
        assert_eq!(storage.download_bytes(&k).await.unwrap(), Bytes::from_static(b"avatar"));
        assert_eq!(storage.content_size(&k).await.unwrap(), 6);
        assert!(storage.root().join("users").join("alice.png").is_file());
    }

    #[tokio::test]
    async fn test_path_and_key_are_inverse() {
        let (_dir, storage) = storage().await;
        let k = key("organizations", "acme.svg");

        let path = storage.build_path_to_content(&k).unwrap();
        assert_eq!(storage.build_key(&path).unwrap(), k);
        assert!(storage.build_key(Path::new("/elsewhere/a/b")).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let (_dir, storage) = storage().await;
        let k = key("users", "ghost.png");

        assert!(storage.download(&k).await.err().unwrap().is_not_found());
        assert!(storage.content_size(&k).await.unwrap_err().is_not_found());
        assert!(storage.last_modified(&k).await.unwrap_err().is_not_found());
        assert!(!storage.does_exist(&k).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (_dir, storage) = storage().await;
        let k = key("users", "bob.png");
        storage.upload_bytes(&k, Bytes::from_static(b"x")).await.unwrap();

        assert!(storage.delete(&k).await.unwrap());
        assert!(!storage.delete(&k).await.unwrap());
        // parent directory is left in place
        assert!(storage.root().join("users").is_dir());
    }

    #[tokio::test]
    async fn test_list_skips_foreign_and_temp_files() {
        let (_dir, storage) = storage().await;
        storage.upload_bytes(&key("users", "a.png"), Bytes::from_static(b"a")).await.unwrap();
        storage.upload_bytes(&key("users", "b.png"), Bytes::from_static(b"b")).await.unwrap();

        std::fs::write(storage.root().join("stray.txt"), b"foreign").unwrap();
        std::fs::create_dir_all(storage.root().join("deep/nested")).unwrap();
        std::fs::write(storage.root().join("deep/nested/file"), b"foreign").unwrap();
        std::fs::write(storage.root().join("users/.tmp-partial"), b"partial").unwrap();

        let mut keys = storage.list_all().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec![key("users", "a.png"), key("users", "b.png")]);
    }

    #[tokio::test]
    async fn test_list_empty_root() {
        let (_dir, storage) = storage().await;
        assert!(storage.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_keeps_single_object() {
        let (_dir, storage) = storage().await;
        let k = key("users", "alice.png");

        storage.upsert(&k, content::from_bytes("first")).await.unwrap();
        storage.upsert(&k, content::from_bytes("second")).await.unwrap();

        assert_eq!(storage.list_all().await.unwrap(), vec![k.clone()]);
        assert_eq!(storage.download_bytes(&k).await.unwrap(), Bytes::from_static(b"second"));
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_no_temp_file() {
        let (_dir, storage) = storage().await;
        let k = key("users", "broken.png");
        let failing: ContentStream = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("client went away")),
        ])
        .boxed();

        assert!(storage.upload(&k, failing).await.is_err());
        assert!(!storage.does_exist(&k).await.unwrap());
        let leftovers: Vec<_> = std::fs::read_dir(storage.root().join("users"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_uploads_last_writer_wins() {
        let (_dir, storage) = storage().await;
        let storage = Arc::new(storage);
        let k = key("users", "race.png");

        let mut handles = vec![];
        for i in 0..8u8 {
            let storage = Arc::clone(&storage);
            let k = k.clone();
            handles.push(tokio::spawn(async move {
                storage.upload_bytes(&k, Bytes::from(vec![i; 16])).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let data = storage.download_bytes(&k).await.unwrap();
        assert_eq!(data.len(), 16);
        assert!(data.iter().all(|b| *b == data[0]));
        assert_eq!(storage.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_last_modified_is_recent() {
        let (_dir, storage) = storage().await;
        let k = key("users", "fresh.png");
        let before = Utc::now() - chrono::Duration::seconds(5);
        storage.upload_bytes(&k, Bytes::from_static(b"x")).await.unwrap();

        assert!(storage.last_modified(&k).await.unwrap() >= before);
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected() {
        let (_dir, storage) = storage().await;
        let err = storage
            .upload_bytes(&key("..", "escape"), Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(err.is_invalid_key());
    }

    #[tokio::test]
    async fn test_temp_prefixed_key_is_rejected() {
        let (_dir, storage) = storage().await;
        let hidden = key("users", ".tmp-avatar.png");
        let err = storage
            .upsert(&hidden, content::from_bytes(Bytes::from_static(b"x")))
            .await
            .unwrap_err();
        assert!(err.is_invalid_key());
        assert!(storage.list_all().await.unwrap().is_empty());
        assert!(storage.does_exist(&hidden).await.unwrap_err().is_invalid_key());
    }
}
