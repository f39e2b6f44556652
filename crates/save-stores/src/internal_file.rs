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

//! Internal binaries served to agents
//!
//! The store is seeded at startup with a fixed set of well-known files (the
//! agent binary and one CLI binary per supported version), taken from local
//! paths or downloaded. Reads fail with `NotReady` until seeding completes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use save_storage::{
    content, ContentStream, InitState, InvalidKey, KeyCodec, KeyPath, KeyStream, Readiness,
    SharedStorage, Storage, StorageError, StorageResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::root::BlobRoot;

/// Store prefix
pub const INTERNAL_STORAGE: &str = "internal-storage";

/// Version under which the current agent binary is stored
pub const LATEST_VERSION: &str = "latest";

/// File name of the agent binary
pub const SAVE_AGENT_FILE_NAME: &str = "save-agent.kexe";

/// File name of the CLI binary for `version`
pub fn save_cli_file_name(version: &str) -> String {
    format!("save-{}-linuxX64.kexe", version)
}

/// One internal file: name plus the version it belongs to
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InternalFileKey {
    /// File name
    pub name: String,
    /// Version label
    pub version: String,
}

impl InternalFileKey {
    /// Key for `name` at `version`
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        InternalFileKey {
            name: name.into(),
            version: version.into(),
        }
    }

    /// The current agent binary
    pub fn save_agent() -> Self {
        InternalFileKey::new(SAVE_AGENT_FILE_NAME, LATEST_VERSION)
    }

    /// The CLI binary for `version`
    pub fn save_cli(version: &str) -> Self {
        InternalFileKey::new(save_cli_file_name(version), version)
    }
}

impl fmt::Display for InternalFileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.version, self.name)
    }
}

/// `<version>/<name>`
#[derive(Debug, Clone, Copy, Default)]
pub struct InternalFileCodec;

impl KeyCodec for InternalFileCodec {
    type Key = InternalFileKey;

    fn encode(&self, key: &InternalFileKey) -> Result<KeyPath, InvalidKey> {
        KeyPath::new([key.version.as_str(), key.name.as_str()])
    }

    fn decode(&self, path: &KeyPath) -> Result<InternalFileKey, InvalidKey> {
        let segments = path.expect_len(2)?;
        Ok(InternalFileKey::new(segments[1].clone(), segments[0].clone()))
    }
}

/// Where seed content comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedSource {
    /// Local file
    File(PathBuf),
    /// Remote URL, fetched with a GET
    Url(String),
    /// Local file when it exists, the URL otherwise
    FileOrUrl(PathBuf, String),
}

/// When an existing object is replaced during seeding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Always replace
    Refresh,
    /// Keep an existing object
    IfAbsent,
}

/// One well-known file to seed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    /// Target key
    pub key: InternalFileKey,
    /// Content source
    pub source: SeedSource,
    /// Replacement policy
    pub policy: SeedPolicy,
}

/// Locations of the well-known internal files
#[derive(Debug, Clone, Default)]
pub struct InternalFileSources {
    /// Local path of the agent binary
    pub save_agent_path: Option<PathBuf>,
    /// CLI versions to provide
    pub save_cli_versions: Vec<String>,
    /// Download URL of a CLI binary, with `{version}` placeholders
    pub save_cli_url_template: String,
    /// Directory checked for CLI binaries before downloading
    pub save_cli_dir: Option<PathBuf>,
}

impl InternalFileSources {
    /// Seeds for these sources
    ///
    /// The agent binary is always refreshed; CLI binaries are immutable per
    /// version and only fetched when missing.
    pub fn seeds(&self) -> Vec<Seed> {
        let agent = self.save_agent_path.iter().map(|path| Seed {
            key: InternalFileKey::save_agent(),
            source: SeedSource::File(path.clone()),
            policy: SeedPolicy::Refresh,
        });
        let clis = self.save_cli_versions.iter().map(|version| {
            let key = InternalFileKey::save_cli(version);
            let url = self.save_cli_url_template.replace("{version}", version);
            let source = match &self.save_cli_dir {
                Some(dir) => SeedSource::FileOrUrl(dir.join(&key.name), url),
                None => SeedSource::Url(url),
            };
            Seed {
                key,
                source,
                policy: SeedPolicy::IfAbsent,
            }
        });
        agent.chain(clis).collect()
    }
}

/// Seeded store of internal binaries
pub struct InternalFileStorage {
    inner: SharedStorage<InternalFileKey>,
    seeds: Vec<Seed>,
    readiness: Arc<Readiness>,
    http: reqwest::Client,
}

impl fmt::Debug for InternalFileStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InternalFileStorage")
            .field("inner", &self.inner)
            .field("seeds", &self.seeds.len())
            .field("state", &self.readiness.state())
            .finish()
    }
}

impl InternalFileStorage {
    /// Store under `root`, seeded from `sources`
    pub fn new(root: &BlobRoot, sources: &InternalFileSources) -> StorageResult<Self> {
        Ok(Self::with_seeds(
            root.storage(INTERNAL_STORAGE, InternalFileCodec)?,
            sources.seeds(),
        ))
    }

    /// Store over an existing storage with an explicit seed list
    pub fn with_seeds(inner: SharedStorage<InternalFileKey>, seeds: Vec<Seed>) -> Self {
        InternalFileStorage {
            inner,
            seeds,
            readiness: Arc::new(Readiness::new()),
            http: reqwest::Client::new(),
        }
    }

    /// Files seeded by [`InternalFileStorage::init`]
    pub fn seeds(&self) -> &[Seed] {
        &self.seeds
    }

    /// Current initialization state
    pub fn state(&self) -> InitState {
        self.readiness.state()
    }

    /// Shared readiness, for health checks
    pub fn readiness(&self) -> Arc<Readiness> {
        Arc::clone(&self.readiness)
    }

    /// Seed every well-known file, then mark the store ready
    ///
    /// Fails with `Conflict` when seeding is running or already done. A failed
    /// seeding leaves the store `Failed` and may be retried.
    pub async fn init(&self) -> StorageResult<()> {
        self.readiness.begin()?;
        info!(seeds = self.seeds.len(), "Seeding internal files");

        for seed in &self.seeds {
            if let Err(e) = self.apply(seed).await {
                error!(key = %seed.key, "Failed to seed internal file: {}", e);
                self.readiness.mark_failed(format!("{}: {}", seed.key, e));
                return Err(e);
            }
        }

        self.readiness.mark_ready();
        info!("Internal files ready");
        Ok(())
    }

    /// Run [`InternalFileStorage::init`] on the current runtime
    pub fn spawn_init(self: &Arc<Self>) -> JoinHandle<StorageResult<()>> {
        let storage = Arc::clone(self);
        tokio::spawn(async move { storage.init().await })
    }

    async fn apply(&self, seed: &Seed) -> StorageResult<()> {
        if seed.policy == SeedPolicy::IfAbsent && self.inner.does_exist(&seed.key).await? {
            debug!(key = %seed.key, "Internal file already present");
            return Ok(());
        }
        let content = self.fetch(&seed.source).await?;
        let written = self.inner.upsert(&seed.key, content).await?;
        info!(key = %seed.key, bytes = written, "Seeded internal file");
        Ok(())
    }

    async fn fetch(&self, source: &SeedSource) -> StorageResult<ContentStream> {
        match source {
            SeedSource::File(path) => open_file(path).await,
            SeedSource::Url(url) => self.download_url(url).await,
            SeedSource::FileOrUrl(path, url) => {
                if tokio::fs::try_exists(path).await? {
                    open_file(path).await
                } else {
                    self.download_url(url).await
                }
            }
        }
    }

    async fn download_url(&self, url: &str) -> StorageResult<ContentStream> {
        debug!(url, "Downloading internal file");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| StorageError::backend(format!("GET {}: {}", url, e)))?;
        Ok(response.bytes_stream().map_err(io::Error::other).boxed())
    }
}

async fn open_file(path: &Path) -> StorageResult<ContentStream> {
    match tokio::fs::File::open(path).await {
        Ok(file) => Ok(content::from_file(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(StorageError::not_found(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Storage for InternalFileStorage {
    type Key = InternalFileKey;

    fn list(&self) -> KeyStream<'_, InternalFileKey> {
        match self.readiness.ensure_ready() {
            Ok(()) => self.inner.list(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    async fn download(&self, key: &InternalFileKey) -> StorageResult<ContentStream> {
        self.readiness.ensure_ready()?;
        self.inner.download(key).await
    }

    async fn upload(&self, key: &InternalFileKey, content: ContentStream) -> StorageResult<u64> {
        self.inner.upload(key, content).await
    }

    async fn delete(&self, key: &InternalFileKey) -> StorageResult<bool> {
        self.inner.delete(key).await
    }

    async fn does_exist(&self, key: &InternalFileKey) -> StorageResult<bool> {
        self.readiness.ensure_ready()?;
        self.inner.does_exist(key).await
    }

    async fn content_size(&self, key: &InternalFileKey) -> StorageResult<u64> {
        self.readiness.ensure_ready()?;
        self.inner.content_size(key).await
    }

    async fn last_modified(&self, key: &InternalFileKey) -> StorageResult<DateTime<Utc>> {
        self.readiness.ensure_ready()?;
        self.inner.last_modified(key).await
    }

    async fn generate_url_to_download(
        &self,
        key: &InternalFileKey,
        expires_in: Duration,
    ) -> StorageResult<Option<String>> {
        self.readiness.ensure_ready()?;
        self.inner.generate_url_to_download(key, expires_in).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use save_test_utils::{assert_not_ready, mock_storage, TestFixtures};
    use tempfile::TempDir;

    fn local_seeds(dir: &TempDir) -> InternalFileSources {
        TestFixtures::write_tree(
            dir.path(),
            &[
                ("agent/save-agent.kexe", &b"agent v2"[..]),
                ("cli/save-0.3.10-linuxX64.kexe", &b"cli 0.3.10"[..]),
            ],
        );
        InternalFileSources {
            save_agent_path: Some(dir.path().join("agent/save-agent.kexe")),
            save_cli_versions: vec!["0.3.10".to_string()],
            save_cli_url_template: "http://127.0.0.1:9/save-{version}.kexe".to_string(),
            save_cli_dir: Some(dir.path().join("cli")),
        }
    }

    #[test]
    fn test_seed_plan() {
        let sources = InternalFileSources {
            save_agent_path: None,
            save_cli_versions: vec!["0.3.9".to_string()],
            save_cli_url_template: "https://example.org/v{version}/save-{version}.kexe".to_string(),
            save_cli_dir: None,
        };
        assert_eq!(
            sources.seeds(),
            vec![Seed {
                key: InternalFileKey::new("save-0.3.9-linuxX64.kexe", "0.3.9"),
                source: SeedSource::Url("https://example.org/v0.3.9/save-0.3.9.kexe".to_string()),
                policy: SeedPolicy::IfAbsent,
            }]
        );
    }

    #[test]
    fn test_codec_path() {
        let path = InternalFileCodec.encode(&InternalFileKey::save_agent()).unwrap();
        assert_eq!(path.as_object_key(), "latest/save-agent.kexe");
        assert_eq!(
            InternalFileCodec.decode(&path).unwrap(),
            InternalFileKey::save_agent()
        );
    }

    #[tokio::test]
    async fn test_reads_fail_before_init() {
        let dir = TempDir::new().unwrap();
        let (_backend, inner) = mock_storage(INTERNAL_STORAGE, InternalFileCodec);
        let storage = InternalFileStorage::with_seeds(Arc::new(inner), local_seeds(&dir).seeds());
        let key = InternalFileKey::save_agent();

        assert_not_ready(storage.does_exist(&key).await);
        assert_not_ready(storage.content_size(&key).await);
        assert_not_ready(storage.generate_url_to_download(&key, Duration::from_secs(60)).await);
        assert!(storage.list_all().await.unwrap_err().is_not_ready());
        assert!(storage.download(&key).await.err().unwrap().is_not_ready());
    }

    #[tokio::test]
    async fn test_init_seeds_and_marks_ready() {
        let dir = TempDir::new().unwrap();
        let (backend, inner) = mock_storage(INTERNAL_STORAGE, InternalFileCodec);
        let storage =
            Arc::new(InternalFileStorage::with_seeds(Arc::new(inner), local_seeds(&dir).seeds()));

        storage.spawn_init().await.unwrap().unwrap();

        assert_eq!(storage.state(), InitState::Ready);
        assert_eq!(storage.list_all().await.unwrap().len(), 2);
        assert_eq!(
            backend.object("internal-storage/latest/save-agent.kexe").await,
            Some(Bytes::from_static(b"agent v2"))
        );
        assert!(storage.init().await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_refresh_policies() {
        let dir = TempDir::new().unwrap();
        let backend = save_storage::mock::MockBackend::with_data([
            ("internal-storage/latest/save-agent.kexe", Bytes::from_static(b"agent v1")),
            (
                "internal-storage/0.3.10/save-0.3.10-linuxX64.kexe",
                Bytes::from_static(b"cli as uploaded"),
            ),
        ]);
        let inner = save_storage::S3Storage::new(
            Arc::new(backend.clone()),
            INTERNAL_STORAGE,
            InternalFileCodec,
        );
        let storage = InternalFileStorage::with_seeds(Arc::new(inner), local_seeds(&dir).seeds());

        storage.init().await.unwrap();

        assert_eq!(
            backend.object("internal-storage/latest/save-agent.kexe").await,
            Some(Bytes::from_static(b"agent v2"))
        );
        assert_eq!(
            backend
                .object("internal-storage/0.3.10/save-0.3.10-linuxX64.kexe")
                .await,
            Some(Bytes::from_static(b"cli as uploaded"))
        );
    }

    #[tokio::test]
    async fn test_missing_source_fails_init() {
        let (_backend, inner) = mock_storage(INTERNAL_STORAGE, InternalFileCodec);
        let storage = InternalFileStorage::with_seeds(
            Arc::new(inner),
            vec![Seed {
                key: InternalFileKey::save_agent(),
                source: SeedSource::File(PathBuf::from("/nonexistent/save-agent.kexe")),
                policy: SeedPolicy::Refresh,
            }],
        );

        assert!(storage.init().await.unwrap_err().is_not_found());
        assert!(matches!(storage.state(), InitState::Failed(_)));
        assert!(storage.readiness().wait_ready().await.unwrap_err().is_not_ready());
    }
}
