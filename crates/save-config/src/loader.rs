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

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{Config, FileSystemStorage, S3Storage, StorageConfig};
use crate::validation::Validator;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::NoExtension(path.to_path_buf())),
        }
    }

    /// Get format name as string
    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Json => "JSON",
        }
    }
}

/// Configuration loader
///
/// Environment overrides use the `SAVE_` prefix and are applied after the
/// file is parsed; validation runs last.
pub struct ConfigLoader {
    validate: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        ConfigLoader { validate: true }
    }

    /// Create a loader without validation
    pub fn without_validation() -> Self {
        ConfigLoader { validate: false }
    }

    /// Load configuration from a file
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<Config> {
        let config = self.read_file(path.as_ref()).await?;
        self.check(config)
    }

    /// Load configuration from a string
    pub fn load_from_string(&self, content: &str, format: ConfigFormat) -> ConfigResult<Config> {
        let config = parse(content, format)?;
        self.check(config)
    }

    /// Load a file (or defaults when `path` is `None`) with environment overrides
    pub async fn load_with_overrides(&self, path: Option<&Path>) -> ConfigResult<Config> {
        let mut config = match path {
            Some(path) => self.read_file(path).await?,
            None => {
                debug!("No configuration file given, using defaults");
                Config::default()
            }
        };
        apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        self.check(config)
    }

    async fn read_file(&self, path: &Path) -> ConfigResult<Config> {
        debug!("Loading configuration from: {}", path.display());

        if !fs::try_exists(path).await? {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).await?;

        info!(
            "Loaded {} configuration file: {}",
            format.name(),
            path.display()
        );

        parse(&content, format)
    }

    fn check(&self, config: Config) -> ConfigResult<Config> {
        if self.validate {
            config.validate()?;
            debug!("Configuration validated successfully");
        }
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse(content: &str, format: ConfigFormat) -> ConfigResult<Config> {
    let config = match format {
        ConfigFormat::Toml => toml::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        ConfigFormat::Json => serde_json::from_str(content)?,
    };
    Ok(config)
}

/// Apply `SAVE_*` overrides, reading variables through `lookup`
///
/// `SAVE_STORAGE_BASE_PATH` selects the filesystem backend and
/// `SAVE_S3_BUCKET` the S3 backend; the bucket wins when both are set.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    // Storage settings
    if let Some(value) = lookup("SAVE_STORAGE_BASE_PATH") {
        match &mut config.storage {
            StorageConfig::FileSystem(fs) => fs.base_path = value,
            other => *other = StorageConfig::FileSystem(FileSystemStorage { base_path: value }),
        }
    }
    if let Some(value) = lookup("SAVE_S3_BUCKET") {
        match &mut config.storage {
            StorageConfig::S3(s3) => s3.bucket = value,
            other => *other = StorageConfig::S3(S3Storage::with_bucket(value)),
        }
    }
    for (name, field) in [("SAVE_S3_ENDPOINT", S3Field::Endpoint), ("SAVE_S3_PREFIX", S3Field::Prefix)] {
        let Some(value) = lookup(name) else {
            continue;
        };
        match &mut config.storage {
            StorageConfig::S3(s3) => match field {
                S3Field::Endpoint => s3.endpoint = Some(value),
                S3Field::Prefix => s3.prefix = value,
            },
            StorageConfig::FileSystem(_) => {
                warn!("{} ignored: storage backend is not s3", name);
            }
        }
    }

    // Database settings
    if let Some(value) = lookup("SAVE_DATABASE_URL") {
        config.database.url = value;
    }

    // Migration settings
    if let Some(value) = lookup("SAVE_MIGRATION_ENABLED") {
        config.migration.enabled = parse_bool("SAVE_MIGRATION_ENABLED", &value)?;
    }
    if let Some(value) = lookup("SAVE_MIGRATION_LEGACY_BASE_PATH") {
        config.migration.legacy_base_path = Some(PathBuf::from(value));
    }

    // Observability settings
    if let Some(value) = lookup("SAVE_LOG_LEVEL") {
        config.observability.log_level = value;
    }
    if let Some(value) = lookup("SAVE_LOG_FORMAT") {
        config.observability.log_format = value;
    }

    Ok(())
}

#[derive(Clone, Copy)]
enum S3Field {
    Endpoint,
    Prefix,
}

fn parse_bool(variable: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::env_override(
            variable,
            value,
            "expected true/false, yes/no, on/off or 1/0",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path("config.toml").unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path("config.yaml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.yml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.json").unwrap(), ConfigFormat::Json);
        assert!(ConfigFormat::from_path("config.xml").is_err());
        assert!(ConfigFormat::from_path("config").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("X", "yes").unwrap());
        assert!(parse_bool("X", "ON").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
        [storage]
        backend = "s3"
        bucket = "save-blobs"
        endpoint = "http://localhost:9000"

        [migration]
        legacy_base_path = "/var/lib/save/legacy"
        concurrency = 8
        "#;
        let config = ConfigLoader::new()
            .load_from_string(toml, ConfigFormat::Toml)
            .unwrap();
        match &config.storage {
            StorageConfig::S3(s3) => {
                assert_eq!(s3.bucket, "save-blobs");
                assert_eq!(s3.region, "us-east-1");
                assert_eq!(s3.part_size, 16 * 1024 * 1024);
            }
            other => panic!("unexpected backend {:?}", other),
        }
        assert_eq!(config.migration.concurrency, 8);
        assert!(config.migration.active_legacy_path().is_some());
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"storage:
  backend: filesystem
  base_path: /srv/save
internal_files:
  save_cli_versions: ["0.3.10", "0.3.9"]
observability:
  log_format: json"#;
        let config = ConfigLoader::new()
            .load_from_string(yaml, ConfigFormat::Yaml)
            .unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::FileSystem(FileSystemStorage {
                base_path: "/srv/save".to_string()
            })
        );
        assert_eq!(config.internal_files.save_cli_versions.len(), 2);
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_parse_json_validates() {
        let json = r#"{"database": {"url": "mysql://db"}}"#;
        assert!(ConfigLoader::new()
            .load_from_string(json, ConfigFormat::Json)
            .is_err());
        assert!(ConfigLoader::without_validation()
            .load_from_string(json, ConfigFormat::Json)
            .is_ok());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        apply_overrides(
            &mut config,
            env(&[
                ("SAVE_S3_BUCKET", "override-bucket"),
                ("SAVE_S3_PREFIX", "save"),
                ("SAVE_MIGRATION_ENABLED", "off"),
                ("SAVE_MIGRATION_LEGACY_BASE_PATH", "/legacy"),
                ("SAVE_LOG_LEVEL", "debug"),
            ]),
        )
        .unwrap();

        match &config.storage {
            StorageConfig::S3(s3) => {
                assert_eq!(s3.bucket, "override-bucket");
                assert_eq!(s3.prefix, "save");
                assert_eq!(s3.max_concurrent_parts, 4);
            }
            other => panic!("unexpected backend {:?}", other),
        }
        assert!(!config.migration.enabled);
        assert_eq!(config.migration.active_legacy_path(), None);
        assert_eq!(config.observability.log_level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_bool_override() {
        let mut config = Config::default();
        let err = apply_overrides(&mut config, env(&[("SAVE_MIGRATION_ENABLED", "maybe")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EnvOverride { ref variable, .. }
                if variable == "SAVE_MIGRATION_ENABLED"
        ));
    }

    #[tokio::test]
    async fn test_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("save.toml");
        tokio::fs::write(&path, "[database]\nurl = \"sqlite::memory:\"\n")
            .await
            .unwrap();

        let config = ConfigLoader::new().load_file(&path).await.unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");

        let missing = ConfigLoader::new().load_file(dir.path().join("none.toml")).await;
        assert!(matches!(missing, Err(ConfigError::NotFound(_))));
    }
}
