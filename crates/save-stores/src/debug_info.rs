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

//! Per-test debug info of executions

use bytes::Bytes;
use futures::stream::TryStreamExt;
use save_storage::codec::parse_canonical_i64;
use save_storage::{
    content, delegate_storage, InvalidKey, KeyCodec, KeyPath, SharedStorage, Storage,
    StorageError, StorageResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::root::BlobRoot;

/// Store prefix
pub const DEBUG_INFO: &str = "debug-info";

const DEBUG_INFO_SUFFIX: &str = "-debug.json";

/// Path segment of suites whose name sanitizes to nothing
pub const UNNAMED_SUITE: &str = "_";

/// Where a test result came from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultLocation {
    /// Test suite; only ASCII alphanumerics, `-` and `_` are kept in paths
    pub test_suite_name: String,
    /// Plugin that ran the test
    pub plugin_name: String,
    /// Directory of the test, `/`-separated
    pub test_location: String,
    /// Test name
    pub test_name: String,
}

impl TestResultLocation {
    /// Location of `test_name` in `test_location`
    pub fn new(
        test_suite_name: impl Into<String>,
        plugin_name: impl Into<String>,
        test_location: impl Into<String>,
        test_name: impl Into<String>,
    ) -> Self {
        TestResultLocation {
            test_suite_name: test_suite_name.into(),
            plugin_name: plugin_name.into(),
            test_location: test_location.into(),
            test_name: test_name.into(),
        }
    }
}

impl fmt::Display for TestResultLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}/{}",
            self.test_suite_name, self.plugin_name, self.test_location, self.test_name
        )
    }
}

/// Debug info of one test in one execution
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DebugInfoKey {
    /// Execution id
    pub execution_id: i64,
    /// Test result location
    pub location: TestResultLocation,
}

impl DebugInfoKey {
    /// Key for `location` in execution `execution_id`
    pub fn new(execution_id: i64, location: TestResultLocation) -> Self {
        DebugInfoKey {
            execution_id,
            location,
        }
    }
}

impl fmt::Display for DebugInfoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.location, self.execution_id)
    }
}

/// Drop everything but ASCII alphanumerics, `-` and `_`; [`UNNAMED_SUITE`] if nothing is left
pub fn sanitize_suite_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect();
    if sanitized.is_empty() {
        UNNAMED_SUITE.to_string()
    } else {
        sanitized
    }
}

/// Directories of a test location, without empty and `.` components
fn location_segments(location: &str) -> impl Iterator<Item = &str> {
    location
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
}

/// `<executionId>/<plugin>/<suite>/<location…>/<testName>-debug.json`
///
/// Suite names and locations are normalized on encode, so a key decodes to
/// its normalized form: sanitized suite, location joined with `/`, empty at
/// the suite root.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugInfoCodec;

impl KeyCodec for DebugInfoCodec {
    type Key = DebugInfoKey;

    fn encode(&self, key: &DebugInfoKey) -> Result<KeyPath, InvalidKey> {
        let location = &key.location;
        let mut segments = vec![
            key.execution_id.to_string(),
            location.plugin_name.clone(),
            sanitize_suite_name(&location.test_suite_name),
        ];
        segments.extend(location_segments(&location.test_location).map(str::to_string));
        segments.push(format!("{}{}", location.test_name, DEBUG_INFO_SUFFIX));
        KeyPath::new(segments)
    }

    fn decode(&self, path: &KeyPath) -> Result<DebugInfoKey, InvalidKey> {
        let segments = path.expect_min_len(4)?;
        let execution_id = parse_canonical_i64(path, &segments[0], "execution id")?;
        let file_name = path.file_name();
        let test_name = file_name
            .strip_suffix(DEBUG_INFO_SUFFIX)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| path.invalid(format!("`{}` is not a debug info file", file_name)))?;
        let test_location = segments[3..segments.len() - 1].join("/");
        Ok(DebugInfoKey::new(
            execution_id,
            TestResultLocation::new(
                segments[2].clone(),
                segments[1].clone(),
                test_location,
                test_name,
            ),
        ))
    }
}

/// Stored debug info payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultDebugInfo {
    /// Test the info belongs to
    pub test_result_location: TestResultLocation,
    /// Tool output and diagnostics, opaque to storage
    #[serde(default)]
    pub debug_result: serde_json::Value,
}

/// Debug info store
#[derive(Debug)]
pub struct DebugInfoStorage {
    inner: SharedStorage<DebugInfoKey>,
}

delegate_storage!(DebugInfoStorage, inner, DebugInfoKey);

impl DebugInfoStorage {
    /// Store under `root`
    pub fn new(root: &BlobRoot) -> StorageResult<Self> {
        Ok(Self::from_storage(root.storage(DEBUG_INFO, DebugInfoCodec)?))
    }

    /// Store over an existing storage
    pub fn from_storage(inner: SharedStorage<DebugInfoKey>) -> Self {
        DebugInfoStorage { inner }
    }

    /// Store `info` as JSON for execution `execution_id`
    pub async fn upload_debug_info(
        &self,
        execution_id: i64,
        info: &TestResultDebugInfo,
    ) -> StorageResult<u64> {
        let key = DebugInfoKey::new(execution_id, info.test_result_location.clone());
        let json = serde_json::to_vec(info).map_err(StorageError::other)?;
        debug!(execution_id, location = %info.test_result_location, "Uploading debug info");
        self.inner.upsert(&key, content::from_bytes(Bytes::from(json))).await
    }

    /// Debug info of `location` in execution `execution_id`
    pub async fn get_debug_info(
        &self,
        execution_id: i64,
        location: &TestResultLocation,
    ) -> StorageResult<TestResultDebugInfo> {
        let key = DebugInfoKey::new(execution_id, location.clone());
        let json = self.inner.download_bytes(&key).await?;
        serde_json::from_slice(&json).map_err(StorageError::other)
    }

    /// Remove every debug info of execution `execution_id`, returning how many
    pub async fn delete_for_execution(&self, execution_id: i64) -> StorageResult<usize> {
        let keys: Vec<DebugInfoKey> = self
            .inner
            .list()
            .try_filter(|key| futures::future::ready(key.execution_id == execution_id))
            .try_collect()
            .await?;
        let mut deleted = 0;
        for key in &keys {
            if self.inner.delete(key).await? {
                deleted += 1;
            }
        }
        debug!(execution_id, deleted, "Deleted debug info of execution");
        Ok(deleted)
    }
}
