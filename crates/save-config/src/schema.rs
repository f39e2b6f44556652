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

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Where store content lives
    pub storage: StorageConfig,

    /// Metastore database
    pub database: DatabaseConfig,

    /// Migration from the legacy file-based layout
    pub migration: MigrationConfig,

    /// Sources of seeded internal files
    pub internal_files: InternalFilesConfig,

    /// Logging
    pub observability: ObservabilityConfig,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend")]
pub enum StorageConfig {
    /// Filesystem storage
    #[serde(rename = "filesystem")]
    FileSystem(FileSystemStorage),

    /// S3 or S3-compatible storage
    #[serde(rename = "s3")]
    S3(S3Storage),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::FileSystem(FileSystemStorage {
            base_path: default_base_path(),
        })
    }
}

/// Filesystem storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSystemStorage {
    /// Base directory path
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

/// S3 storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct S3Storage {
    /// Bucket name
    pub bucket: String,

    /// Region
    #[serde(default = "default_region")]
    pub region: String,

    /// Endpoint of an S3-compatible service (MinIO, LocalStack)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Object prefix shared by all stores
    #[serde(default)]
    pub prefix: String,

    /// Access key ID; the default credential chain is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    /// Secret access key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,

    /// Multipart upload part size in bytes
    #[serde(default = "default_part_size")]
    pub part_size: usize,

    /// Parts uploaded concurrently
    #[serde(default = "default_max_concurrent_parts")]
    pub max_concurrent_parts: usize,

    /// Attempts per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Lifetime of presigned download URLs, in seconds
    #[serde(default = "default_presign_expiry_secs")]
    pub presign_expiry_secs: u64,
}

impl S3Storage {
    /// S3 configuration for `bucket` with every other field defaulted
    pub fn with_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: default_region(),
            endpoint: None,
            prefix: String::new(),
            access_key_id: None,
            secret_access_key: None,
            part_size: default_part_size(),
            max_concurrent_parts: default_max_concurrent_parts(),
            max_retries: default_max_retries(),
            presign_expiry_secs: default_presign_expiry_secs(),
        }
    }
}

/// Metastore database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Pool size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

/// Migration configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationConfig {
    /// Run migrations at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root of the legacy layout; migrations run only when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_base_path: Option<PathBuf>,

    /// Keys copied concurrently per migration
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Compare checksums after each copy
    #[serde(default = "default_true")]
    pub verify_checksums: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            legacy_base_path: None,
            concurrency: default_concurrency(),
            verify_checksums: true,
        }
    }
}

impl MigrationConfig {
    /// Legacy root to migrate from, if migrations should run
    pub fn active_legacy_path(&self) -> Option<&PathBuf> {
        self.legacy_base_path.as_ref().filter(|_| self.enabled)
    }
}

/// Internal file sources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InternalFilesConfig {
    /// Local path of the agent binary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_agent_path: Option<PathBuf>,

    /// CLI versions to provide
    #[serde(default)]
    pub save_cli_versions: Vec<String>,

    /// Download URL of a CLI binary with `{version}` placeholders
    #[serde(default = "default_save_cli_url_template")]
    pub save_cli_url_template: String,

    /// Directory checked for CLI binaries before downloading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_cli_dir: Option<PathBuf>,
}

impl Default for InternalFilesConfig {
    fn default() -> Self {
        Self {
            save_agent_path: None,
            save_cli_versions: Vec::new(),
            save_cli_url_template: default_save_cli_url_template(),
            save_cli_dir: None,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservabilityConfig {
    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_base_path() -> String {
    "./data/storage".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_part_size() -> usize {
    16 * 1024 * 1024
}

fn default_max_concurrent_parts() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_presign_expiry_secs() -> u64 {
    3600
}

fn default_database_url() -> String {
    "sqlite://./data/save.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_concurrency() -> usize {
    4
}

fn default_save_cli_url_template() -> String {
    "https://github.com/saveourtool/save-cli/releases/download/v{version}/save-{version}-linuxX64.kexe"
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
