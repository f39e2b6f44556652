// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 SAVE Contributors

//! Temporary storages for tests.

use save_storage::{mock::MockBackend, KeyCodec, LocalStorage, S3Storage};
use std::sync::Arc;
use tempfile::TempDir;

/// Filesystem storage rooted in a fresh temporary directory.
///
/// Keep the returned `TempDir` alive for as long as the storage is used.
pub fn local_storage<C: KeyCodec>(codec: C) -> (TempDir, LocalStorage<C>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let storage = LocalStorage::new_sync(dir.path().join("storage"), codec)
        .expect("Failed to create local storage");
    (dir, storage)
}

/// Object-store storage over a fresh in-memory backend.
///
/// The backend is returned so tests can inspect raw object keys or inject
/// write failures.
pub fn mock_storage<C: KeyCodec>(prefix: &str, codec: C) -> (MockBackend, S3Storage<C>) {
    let backend = MockBackend::new();
    let storage = S3Storage::new(Arc::new(backend.clone()), prefix, codec);
    (backend, storage)
}
