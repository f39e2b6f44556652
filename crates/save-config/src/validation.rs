use crate::error::{ConfigError, ConfigResult};
use crate::schema::*;

/// Smallest multipart part S3 accepts
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Validator for configuration settings
pub trait Validator {
    /// Check the value, naming the offending field on failure
    fn validate(&self) -> ConfigResult<()>;
}

impl Validator for Config {
    fn validate(&self) -> ConfigResult<()> {
        self.storage.validate()?;
        self.database.validate()?;
        self.migration.validate()?;
        self.internal_files.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

impl Validator for StorageConfig {
    fn validate(&self) -> ConfigResult<()> {
        match self {
            StorageConfig::FileSystem(fs) => fs.validate(),
            StorageConfig::S3(s3) => s3.validate(),
        }
    }
}

impl Validator for FileSystemStorage {
    fn validate(&self) -> ConfigResult<()> {
        if self.base_path.is_empty() {
            return Err(ConfigError::missing("storage.base_path"));
        }
        Ok(())
    }
}

impl Validator for S3Storage {
    fn validate(&self) -> ConfigResult<()> {
        check_bucket_name(&self.bucket)?;
        if self.region.is_empty() {
            return Err(ConfigError::missing("storage.region"));
        }
        if self.part_size < MIN_PART_SIZE {
            return Err(ConfigError::invalid_value(
                "storage.part_size",
                format!("{} is below the S3 minimum of {} bytes", self.part_size, MIN_PART_SIZE),
            ));
        }
        positive("storage.max_concurrent_parts", self.max_concurrent_parts)
    }
}

// 3-63 characters of lowercase letters, digits, `-` and `.`
fn check_bucket_name(bucket: &str) -> ConfigResult<()> {
    if bucket.is_empty() {
        return Err(ConfigError::missing("storage.bucket"));
    }
    if !(3..=63).contains(&bucket.len()) {
        return Err(ConfigError::invalid_value(
            "storage.bucket",
            format!("`{}` must be 3-63 characters long", bucket),
        ));
    }
    if let Some(c) = bucket
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.')))
    {
        return Err(ConfigError::invalid_value(
            "storage.bucket",
            format!("`{}` contains `{}`; only lowercase letters, digits, `-` and `.` are allowed", bucket, c),
        ));
    }
    Ok(())
}

fn positive(field: &str, value: usize) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid_value(field, "must be at least 1"));
    }
    Ok(())
}

impl Validator for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !self.url.starts_with("sqlite:") {
            return Err(ConfigError::invalid_value(
                "database.url",
                format!("only sqlite: URLs are supported, got {}", self.url),
            ));
        }

        positive("database.max_connections", self.max_connections as usize)
    }
}

impl Validator for MigrationConfig {
    fn validate(&self) -> ConfigResult<()> {
        positive("migration.concurrency", self.concurrency)
    }
}

impl Validator for InternalFilesConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !self.save_cli_versions.is_empty() && !self.save_cli_url_template.contains("{version}") {
            return Err(ConfigError::invalid_value(
                "internal_files.save_cli_url_template",
                "must contain a {version} placeholder",
            ));
        }
        if let Some(version) = self.save_cli_versions.iter().find(|v| !is_plain_segment(v)) {
            return Err(ConfigError::invalid_value(
                "internal_files.save_cli_versions",
                format!("'{}' is not a valid version label", version),
            ));
        }
        Ok(())
    }
}

impl Validator for ObservabilityConfig {
    fn validate(&self) -> ConfigResult<()> {
        one_of("observability.log_level", &self.log_level, LOG_LEVELS)?;
        one_of("observability.log_format", &self.log_format, LOG_FORMATS)
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json"];

// Case-insensitive
fn one_of(field: &str, value: &str, allowed: &[&str]) -> ConfigResult<()> {
    if allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) {
        return Ok(());
    }
    Err(ConfigError::invalid_value(
        field,
        format!("`{}` is not one of {}", value, allowed.join(", ")),
    ))
}

/// Usable as a single storage path segment
fn is_plain_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3() -> S3Storage {
        S3Storage {
            bucket: "save-storage".to_string(),
            region: "eu-west-1".to_string(),
            endpoint: None,
            prefix: String::new(),
            access_key_id: None,
            secret_access_key: None,
            part_size: 8 * 1024 * 1024,
            max_concurrent_parts: 4,
            max_retries: 3,
            presign_expiry_secs: 60,
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bucket_rules() {
        assert!(s3().validate().is_ok());
        let too_long = "a".repeat(64);
        for bucket in ["ab", "Upper", "under_score", too_long.as_str()] {
            let mut storage = s3();
            storage.bucket = bucket.to_string();
            assert!(storage.validate().is_err(), "{}", bucket);
        }
    }

    #[test]
    fn test_part_size_floor() {
        let mut storage = s3();
        storage.part_size = 1024;
        assert!(matches!(
            storage.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "storage.part_size"
        ));
    }

    #[test]
    fn test_database_url_scheme() {
        let mut config = Config::default();
        config.database.url = "postgres://localhost/save".to_string();
        assert!(config.validate().is_err());
        config.database.url = "sqlite::memory:".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency() {
        let mut config = Config::default();
        config.migration.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_template_needs_placeholder() {
        let mut config = Config::default();
        config.internal_files.save_cli_versions = vec!["0.3.10".to_string()];
        assert!(config.validate().is_ok());
        config.internal_files.save_cli_url_template = "https://example.org/save.kexe".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_version_must_be_a_segment() {
        let mut config = Config::default();
        config.internal_files.save_cli_versions = vec!["../0.3".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();
        config.observability.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
        config.observability.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }
}
