// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 SAVE Contributors

//! # SAVE Test Utilities
//!
//! Shared test utilities for SAVE storage crates providing:
//! - Byte fixtures and on-disk trees
//! - Temporary storages over a directory or the in-memory backend
//! - In-memory SQLite pools for metastore tests
//! - CLI command helpers for the `save-storage` binary
//! - Assertions for storage contents

pub mod assertions;
pub mod cli;
pub mod database;
pub mod fixtures;
pub mod storage;

pub use assertions::*;
pub use cli::save_storage;
pub use database::memory_pool;
pub use fixtures::TestFixtures;
pub use storage::{local_storage, mock_storage};
