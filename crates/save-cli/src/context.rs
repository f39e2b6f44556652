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
//! Wiring configuration into stores.

use anyhow::{Context, Result};
use save_config::{
    Config, InternalFilesConfig, MigrationConfig, S3Storage as S3Settings, StorageConfig,
};
use save_migration::{Migratable, MigrationOptions};
use save_storage::{BlobBackend, S3Backend, S3Config};
use save_stores::{
    AvatarStorage, BlobRoot, DebugInfoStorage, ExecutionInfoStorage, FileStorage,
    InternalFileSources, InternalFileStorage, LegacyRoot, SqliteDirectory,
    TestSuitesSourceSnapshotStorage, TestsSourceSnapshotStorage,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Every store, built from one [`Config`]
#[derive(Debug)]
pub struct StorageContext {
    /// Where store content lives
    pub root: BlobRoot,
    /// Legacy layout being migrated, if any
    pub legacy: Option<LegacyRoot>,
    /// Metastore shared by the database-backed stores
    pub directory: SqliteDirectory,
    /// User and organization avatars
    pub avatars: AvatarStorage,
    /// Project files
    pub files: FileStorage,
    /// Seeded agent and CLI binaries
    pub internal_files: Arc<InternalFileStorage>,
    /// Per-test debug info
    pub debug_info: DebugInfoStorage,
    /// Per-execution failure info
    pub execution_info: ExecutionInfoStorage,
    /// Snapshot archives addressed by path
    pub legacy_snapshots: TestSuitesSourceSnapshotStorage,
    /// Snapshot archives indexed by commit
    pub snapshots: TestsSourceSnapshotStorage,
}

impl StorageContext {
    /// Connect backends and build every store
    pub async fn from_config(config: &Config) -> Result<Self> {
        let root = blob_root(&config.storage).await?;
        let legacy = legacy_root(&config.migration);

        ensure_database_dir(&config.database.url)?;
        let directory =
            SqliteDirectory::connect(&config.database.url, config.database.max_connections)
                .await
                .with_context(|| format!("Failed to open metastore {}", config.database.url))?;

        let sources = internal_file_sources(&config.internal_files);

        let context = StorageContext {
            avatars: AvatarStorage::new(&root, legacy.as_ref())?,
            files: FileStorage::new(&root, directory.clone(), legacy.as_ref())?,
            internal_files: Arc::new(InternalFileStorage::new(&root, &sources)?),
            debug_info: DebugInfoStorage::new(&root)?,
            execution_info: ExecutionInfoStorage::new(&root)?,
            legacy_snapshots: TestSuitesSourceSnapshotStorage::new(&root)?,
            snapshots: TestsSourceSnapshotStorage::new(&root, directory.clone(), legacy.as_ref())?,
            root,
            legacy,
            directory,
        };
        info!(
            migrations = context.migrations().len(),
            "Storage context ready"
        );
        Ok(context)
    }

    /// Migrations from the legacy layout, empty when none is configured
    pub fn migrations(&self) -> Vec<Arc<dyn Migratable>> {
        [
            self.avatars.migration(),
            self.files.migration(),
            self.snapshots.migration(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Filesystem directory or S3 bucket holding the stores
pub async fn blob_root(config: &StorageConfig) -> Result<BlobRoot> {
    match config {
        StorageConfig::FileSystem(fs) => {
            debug!(base_path = %fs.base_path, "Using filesystem storage");
            Ok(BlobRoot::filesystem(&fs.base_path))
        }
        StorageConfig::S3(s3) => {
            let backend = S3Backend::with_config(s3_config(s3))
                .await
                .with_context(|| format!("Failed to connect to bucket {}", s3.bucket))?;
            debug!(bucket = %s3.bucket, prefix = %s3.prefix, "Using S3 storage");
            let backend: Arc<dyn BlobBackend> = Arc::new(backend);
            Ok(BlobRoot::object_store(backend, s3.prefix.as_str()))
        }
    }
}

fn s3_config(s3: &S3Settings) -> S3Config {
    S3Config {
        bucket: s3.bucket.clone(),
        region: Some(s3.region.clone()),
        endpoint: s3.endpoint.clone(),
        access_key_id: s3.access_key_id.clone(),
        secret_access_key: s3.secret_access_key.clone(),
        part_size: s3.part_size as u64,
        max_concurrent_parts: s3.max_concurrent_parts,
        max_retries: s3.max_retries,
        ..S3Config::default()
    }
}

/// Legacy root, when migrations are enabled and a path is set
pub fn legacy_root(config: &MigrationConfig) -> Option<LegacyRoot> {
    config.active_legacy_path().map(|path| {
        LegacyRoot::new(path).with_options(MigrationOptions {
            concurrency: config.concurrency,
            verify_checksums: config.verify_checksums,
        })
    })
}

/// Seed sources for the internal-file store
pub fn internal_file_sources(config: &InternalFilesConfig) -> InternalFileSources {
    InternalFileSources {
        save_agent_path: config.save_agent_path.clone(),
        save_cli_versions: config.save_cli_versions.clone(),
        save_cli_url_template: config.save_cli_url_template.clone(),
        save_cli_dir: config.save_cli_dir.clone(),
    }
}

// SQLite creates the file but not its directory.
fn ensure_database_dir(url: &str) -> Result<()> {
    let Some(rest) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = rest.split('?').next().unwrap_or(rest);
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}
