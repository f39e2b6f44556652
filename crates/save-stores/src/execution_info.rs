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

//! Execution-level failure info

use bytes::Bytes;
use save_storage::codec::parse_canonical_i64;
use save_storage::{
    content, delegate_storage, InvalidKey, KeyCodec, KeyPath, SharedStorage, Storage,
    StorageError, StorageResult,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::root::BlobRoot;

/// Store prefix
pub const EXECUTION_INFOS: &str = "execution-infos";

/// Payload stored per execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    /// Execution id
    pub id: i64,
    /// Why the execution failed, if it did
    #[serde(default)]
    pub failed_reason: Option<String>,
}

impl ExecutionInfo {
    /// Info recording that execution `id` failed for `reason`
    pub fn failed(id: i64, reason: impl Into<String>) -> Self {
        ExecutionInfo {
            id,
            failed_reason: Some(reason.into()),
        }
    }
}

/// `<executionId>.json`
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionInfoCodec;

impl KeyCodec for ExecutionInfoCodec {
    type Key = i64;

    fn encode(&self, key: &i64) -> Result<KeyPath, InvalidKey> {
        KeyPath::new([format!("{}.json", key)])
    }

    fn decode(&self, path: &KeyPath) -> Result<i64, InvalidKey> {
        let segments = path.expect_len(1)?;
        let id = segments[0]
            .strip_suffix(".json")
            .ok_or_else(|| path.invalid("missing .json suffix"))?;
        parse_canonical_i64(path, id, "execution id")
    }
}

/// Execution info store keyed by execution id
#[derive(Debug)]
pub struct ExecutionInfoStorage {
    inner: SharedStorage<i64>,
}

delegate_storage!(ExecutionInfoStorage, inner, i64);

impl ExecutionInfoStorage {
    /// Store under `root`
    pub fn new(root: &BlobRoot) -> StorageResult<Self> {
        Ok(Self::from_storage(root.storage(EXECUTION_INFOS, ExecutionInfoCodec)?))
    }

    /// Store over an existing storage
    pub fn from_storage(inner: SharedStorage<i64>) -> Self {
        ExecutionInfoStorage { inner }
    }

    /// Store `info` if it carries a failure reason
    ///
    /// A reason already stored for the execution is kept and the new one is
    /// appended. Returns whether anything was written.
    pub async fn upsert_if_required(&self, info: &ExecutionInfo) -> StorageResult<bool> {
        let Some(reason) = info.failed_reason.as_deref() else {
            return Ok(false);
        };
        let merged = match self.get_execution_info(info.id).await? {
            Some(ExecutionInfo {
                failed_reason: Some(existing),
                ..
            }) => format!("{}, {}", existing, reason),
            _ => reason.to_string(),
        };
        let json = serde_json::to_vec(&ExecutionInfo::failed(info.id, merged))
            .map_err(StorageError::other)?;
        self.inner
            .upsert(&info.id, content::from_bytes(Bytes::from(json)))
            .await?;
        debug!(execution_id = info.id, "Stored execution info");
        Ok(true)
    }

    /// Info of execution `id`, if stored
    pub async fn get_execution_info(&self, id: i64) -> StorageResult<Option<ExecutionInfo>> {
        match self.inner.download_bytes(&id).await {
            Ok(json) => Ok(Some(
                serde_json::from_slice(&json).map_err(StorageError::other)?,
            )),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove the info of every execution in `ids`, returning how many existed
    pub async fn delete_many(&self, ids: &[i64]) -> StorageResult<usize> {
        let mut deleted = 0;
        for id in ids {
            if self.inner.delete(id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use save_test_utils::local_storage;
    use std::sync::Arc;

    fn storage() -> (tempfile::TempDir, ExecutionInfoStorage) {
        let (dir, inner) = local_storage(ExecutionInfoCodec);
        (dir, ExecutionInfoStorage::from_storage(Arc::new(inner)))
    }

    #[test]
    fn test_codec() {
        assert_eq!(ExecutionInfoCodec.encode(&17).unwrap().as_object_key(), "17.json");
        assert_eq!(ExecutionInfoCodec.decode(&KeyPath::parse("17.json").unwrap()).unwrap(), 17);
        assert!(!ExecutionInfoCodec.is_key(&KeyPath::parse("17").unwrap()));
        assert!(!ExecutionInfoCodec.is_key(&KeyPath::parse("017.json").unwrap()));
    }

    #[tokio::test]
    async fn test_no_reason_is_a_no_op() {
        let (_dir, storage) = storage();
        let info = ExecutionInfo {
            id: 3,
            failed_reason: None,
        };

        assert!(!storage.upsert_if_required(&info).await.unwrap());
        assert_eq!(storage.get_execution_info(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reasons_accumulate() {
        let (_dir, storage) = storage();

        assert!(storage
            .upsert_if_required(&ExecutionInfo::failed(3, "agent crashed"))
            .await
            .unwrap());
        storage
            .upsert_if_required(&ExecutionInfo::failed(3, "timeout"))
            .await
            .unwrap();

        assert_eq!(
            storage.get_execution_info(3).await.unwrap(),
            Some(ExecutionInfo::failed(3, "agent crashed, timeout"))
        );
        assert_eq!(storage.list_all().await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_delete_many() {
        let (_dir, storage) = storage();
        for id in [1, 2, 3] {
            storage
                .upsert_if_required(&ExecutionInfo::failed(id, "x"))
                .await
                .unwrap();
        }

        assert_eq!(storage.delete_many(&[1, 3, 5]).await.unwrap(), 2);
        assert_eq!(storage.list_all().await.unwrap(), vec![2]);
    }
}
