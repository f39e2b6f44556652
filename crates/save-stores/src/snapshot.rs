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

//! Test suites source snapshots in the key-path layout
//!
//! One archive per (organization, source, version), addressed by creation
//! time. The database-backed store in [`crate::tests_source`] replaces this
//! layout and migrates its content.

use bytes::Bytes;
use futures::future;
use futures::stream::TryStreamExt;
use save_storage::codec::parse_canonical_i64;
use save_storage::{
    content, delegate_storage, InvalidKey, KeyCodec, KeyPath, SharedStorage, Storage,
    StorageResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::archive::{self, TestFilesContent, TestFilesRequest};
use crate::root::BlobRoot;

/// Store prefix
pub const TEST_SUITES_SOURCE_SNAPSHOTS: &str = "test-suites-source-snapshots";

const ARCHIVE_SUFFIX: &str = ".tar";

/// One snapshot version of a test suites source
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuitesSourceSnapshotKey {
    /// Owning organization
    pub organization_name: String,
    /// Source name
    pub test_suites_source_name: String,
    /// Version label
    pub version: String,
    /// Creation time, milliseconds since the Unix epoch
    pub creation_time_millis: i64,
}

impl TestSuitesSourceSnapshotKey {
    /// Key for `version` of `organization_name/test_suites_source_name`
    pub fn new(
        organization_name: impl Into<String>,
        test_suites_source_name: impl Into<String>,
        version: impl Into<String>,
        creation_time_millis: i64,
    ) -> Self {
        TestSuitesSourceSnapshotKey {
            organization_name: organization_name.into(),
            test_suites_source_name: test_suites_source_name.into(),
            version: version.into(),
            creation_time_millis,
        }
    }

    /// Whether this snapshot belongs to `organization_name/test_suites_source_name`
    pub fn is_of(&self, organization_name: &str, test_suites_source_name: &str) -> bool {
        self.organization_name == organization_name
            && self.test_suites_source_name == test_suites_source_name
    }
}

impl fmt::Display for TestSuitesSourceSnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.organization_name, self.test_suites_source_name, self.version
        )
    }
}

/// `<org>/<source>/<creationMillis>/<version>.tar`
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotCodec;

impl KeyCodec for SnapshotCodec {
    type Key = TestSuitesSourceSnapshotKey;

    fn encode(&self, key: &TestSuitesSourceSnapshotKey) -> Result<KeyPath, InvalidKey> {
        KeyPath::new([
            key.organization_name.clone(),
            key.test_suites_source_name.clone(),
            key.creation_time_millis.to_string(),
            format!("{}{}", key.version, ARCHIVE_SUFFIX),
        ])
    }

    fn decode(&self, path: &KeyPath) -> Result<TestSuitesSourceSnapshotKey, InvalidKey> {
        let segments = path.expect_len(4)?;
        let creation_time_millis = parse_canonical_i64(path, &segments[2], "creation time")?;
        let version = segments[3]
            .strip_suffix(ARCHIVE_SUFFIX)
            .filter(|version| !version.is_empty())
            .ok_or_else(|| path.invalid(format!("`{}` is not a snapshot archive", segments[3])))?;
        Ok(TestSuitesSourceSnapshotKey::new(
            segments[0].clone(),
            segments[1].clone(),
            version,
            creation_time_millis,
        ))
    }
}

/// Snapshot store in the key-path layout
#[derive(Debug)]
pub struct TestSuitesSourceSnapshotStorage {
    inner: SharedStorage<TestSuitesSourceSnapshotKey>,
}

delegate_storage!(TestSuitesSourceSnapshotStorage, inner, TestSuitesSourceSnapshotKey);

impl TestSuitesSourceSnapshotStorage {
    /// Store under `root`
    pub fn new(root: &BlobRoot) -> StorageResult<Self> {
        Ok(Self::from_storage(
            root.storage(TEST_SUITES_SOURCE_SNAPSHOTS, SnapshotCodec)?,
        ))
    }

    /// Store over an existing storage
    pub fn from_storage(inner: SharedStorage<TestSuitesSourceSnapshotKey>) -> Self {
        TestSuitesSourceSnapshotStorage { inner }
    }

    /// Every snapshot of a source, oldest first
    pub async fn list_versions(
        &self,
        organization_name: &str,
        test_suites_source_name: &str,
    ) -> StorageResult<Vec<TestSuitesSourceSnapshotKey>> {
        let mut keys: Vec<_> = self
            .inner
            .list()
            .try_filter(|key| future::ready(key.is_of(organization_name, test_suites_source_name)))
            .try_collect()
            .await?;
        keys.sort_by(|a, b| {
            a.creation_time_millis
                .cmp(&b.creation_time_millis)
                .then_with(|| a.version.cmp(&b.version))
        });
        Ok(keys)
    }

    /// Most recently created snapshot of a source
    pub async fn latest_version(
        &self,
        organization_name: &str,
        test_suites_source_name: &str,
    ) -> StorageResult<Option<TestSuitesSourceSnapshotKey>> {
        Ok(self
            .list_versions(organization_name, test_suites_source_name)
            .await?
            .pop())
    }

    /// Snapshot of a source with the given version label
    pub async fn find_key(
        &self,
        organization_name: &str,
        test_suites_source_name: &str,
        version: &str,
    ) -> StorageResult<Option<TestSuitesSourceSnapshotKey>> {
        Ok(self
            .list_versions(organization_name, test_suites_source_name)
            .await?
            .into_iter()
            .find(|key| key.version == version))
    }

    /// Archive `dir` and store it under `key`
    pub async fn upload_directory(
        &self,
        key: &TestSuitesSourceSnapshotKey,
        dir: &Path,
    ) -> StorageResult<u64> {
        let zip = archive::pack_directory(dir).await?;
        debug!(snapshot = %key, bytes = zip.len(), "Uploading snapshot");
        self.inner
            .upload(key, content::from_bytes(Bytes::from(zip)))
            .await
    }

    /// Read test files out of the snapshot under `key`
    pub async fn get_test_content(
        &self,
        key: &TestSuitesSourceSnapshotKey,
        request: &TestFilesRequest,
    ) -> StorageResult<TestFilesContent> {
        let archive = self.inner.download(key).await?;
        archive::read_test_content(archive, request).await
    }
}
