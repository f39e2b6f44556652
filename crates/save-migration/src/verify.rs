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

//! Copy verification
//!
//! Sizes are always compared; SHA-256 checksums are compared when requested.
//! Content is hashed while streaming, never buffered whole.

use futures::StreamExt;
use save_storage::{Storage, StorageResult};
use sha2::{Digest, Sha256};
use std::fmt::Debug;

/// Size and checksum of one stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDigest {
    /// Object size in bytes
    pub size: u64,

    /// SHA-256 checksum (hex encoded)
    pub checksum: String,
}

/// Result of comparing an object before and after a copy
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Object key
    pub key: String,

    /// Whether verification passed
    pub passed: bool,

    /// Error message if verification failed
    pub error: Option<String>,

    /// Source checksum
    pub source_checksum: Option<String>,

    /// Target checksum
    pub target_checksum: Option<String>,

    /// Source size
    pub source_size: u64,

    /// Target size
    pub target_size: u64,
}

impl VerificationResult {
    fn compare(
        key: String,
        source_size: u64,
        target_size: u64,
        source_checksum: Option<String>,
        target_checksum: Option<String>,
    ) -> Self {
        let error = if source_size != target_size {
            Some(format!(
                "size mismatch: source {} bytes, target {} bytes",
                source_size, target_size
            ))
        } else if source_checksum != target_checksum {
            Some("checksum mismatch".to_string())
        } else {
            None
        };
        Self {
            key,
            passed: error.is_none(),
            error,
            source_checksum,
            target_checksum,
            source_size,
            target_size,
        }
    }
}

/// Compute SHA-256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Stream an object through SHA-256
pub async fn digest<S>(storage: &S, key: &S::Key) -> StorageResult<ObjectDigest>
where
    S: Storage + ?Sized,
{
    let mut content = storage.download(key).await?;
    let mut hasher = Sha256::new();
    let mut size = 0u64;
    while let Some(chunk) = content.next().await {
        let chunk = chunk?;
        size += chunk.len() as u64;
        hasher.update(&chunk);
    }
    Ok(ObjectDigest {
        size,
        checksum: hex::encode(hasher.finalize()),
    })
}

/// Compare `old_key` in `old` with `new_key` in `new`
pub async fn verify_copy<O, N>(
    old: &O,
    old_key: &O::Key,
    new: &N,
    new_key: &N::Key,
    checksums: bool,
) -> StorageResult<VerificationResult>
where
    O: Storage + ?Sized,
    N: Storage + ?Sized,
    O::Key: Debug,
{
    let key = format!("{:?}", old_key);
    if checksums {
        let source = digest(old, old_key).await?;
        let target = digest(new, new_key).await?;
        Ok(VerificationResult::compare(
            key,
            source.size,
            target.size,
            Some(source.checksum),
            Some(target.checksum),
        ))
    } else {
        let source_size = old.content_size(old_key).await?;
        let target_size = new.content_size(new_key).await?;
        Ok(VerificationResult::compare(key, source_size, target_size, None, None))
    }
}
