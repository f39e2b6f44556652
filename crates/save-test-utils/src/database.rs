// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 SAVE Contributors

//! In-memory SQLite for metastore tests.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// A private in-memory database.
///
/// One connection only: every `sqlite::memory:` connection is a separate
/// database.
pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite")
}
