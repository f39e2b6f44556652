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

//! Domain stores for SAVE
//!
//! Each store instantiates the generic storage layer with a concrete key
//! type and path layout:
//!
//! | Store | Prefix | Layout |
//! |-------|--------|--------|
//! | [`AvatarStorage`] | `avatars` | `organizations\|users/<name>` |
//! | [`FileStorage`] | `files-by-id` | row id, indexed in `files` |
//! | [`InternalFileStorage`] | `internal-storage` | `<version>/<name>` |
//! | [`DebugInfoStorage`] | `debug-info` | `<execution>/<plugin>/<suite>/<location…>/<test>-debug.json` |
//! | [`ExecutionInfoStorage`] | `execution-infos` | `<execution>.json` |
//! | [`TestSuitesSourceSnapshotStorage`] | `test-suites-source-snapshots` | `<org>/<source>/<created>/<version>.tar` |
//! | [`TestsSourceSnapshotStorage`] | `tests-source-snapshots` | row id, indexed in `tests_source_snapshots` |
//!
//! Stores built with a [`LegacyRoot`] expose the migration that drains the
//! old file-based layout into the current one.

pub mod archive;
pub mod avatar;
pub mod debug_info;
pub mod directory;
pub mod execution_info;
pub mod file;
pub mod internal_file;
pub mod root;
pub mod snapshot;
pub mod tests_source;

pub use archive::{TestFilesContent, TestFilesRequest};
pub use avatar::{AvatarCodec, AvatarKey, AvatarStorage, AvatarType};
pub use debug_info::{
    DebugInfoCodec, DebugInfoKey, DebugInfoStorage, TestResultDebugInfo, TestResultLocation,
};
pub use directory::SqliteDirectory;
pub use execution_info::{ExecutionInfo, ExecutionInfoCodec, ExecutionInfoStorage};
pub use file::{FileCodec, FileKey, FileMetastore, FileRow, FileStorage, ProjectCoordinates};
pub use internal_file::{
    InternalFileCodec, InternalFileKey, InternalFileSources, InternalFileStorage, Seed,
    SeedPolicy, SeedSource,
};
pub use root::{BlobRoot, LegacyRoot};
pub use snapshot::{SnapshotCodec, TestSuitesSourceSnapshotKey, TestSuitesSourceSnapshotStorage};
pub use tests_source::{SnapshotMetastore, TestsSourceSnapshotDto, TestsSourceSnapshotStorage};
