// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 SAVE Contributors

//! Storage assertions.

use bytes::Bytes;
use save_storage::{Storage, StorageError, StorageResult};
use std::fmt::Debug;

/// Assert that `key` downloads as exactly `expected`.
pub async fn assert_content<S>(storage: &S, key: &S::Key, expected: &[u8])
where
    S: Storage + ?Sized,
{
    let actual = storage
        .download_bytes(key)
        .await
        .unwrap_or_else(|e| panic!("download of {:?} failed: {}", key, e));
    assert_eq!(actual, Bytes::copy_from_slice(expected), "content of {:?}", key);
    let size = storage
        .content_size(key)
        .await
        .unwrap_or_else(|e| panic!("size of {:?} failed: {}", key, e));
    assert_eq!(size, expected.len() as u64, "size of {:?}", key);
}

/// Assert that the storage lists exactly `expected`, in any order.
pub async fn assert_keys<S>(storage: &S, expected: &[S::Key])
where
    S: Storage + ?Sized,
    S::Key: Ord + PartialEq + Debug,
{
    let mut actual = storage.list_all().await.expect("listing failed");
    actual.sort();
    let mut expected = expected.to_vec();
    expected.sort();
    assert_eq!(actual, expected);
}

/// Assert that an operation failed with `NotFound`.
pub fn assert_not_found<T: Debug>(result: StorageResult<T>) {
    match result {
        Err(StorageError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {:?}", other),
    }
}

/// Assert that an operation failed with `NotReady`.
pub fn assert_not_ready<T: Debug>(result: StorageResult<T>) {
    match result {
        Err(StorageError::NotReady(_)) => {}
        other => panic!("expected NotReady, got {:?}", other),
    }
}
