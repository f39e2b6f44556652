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

//! Configuration errors

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a configuration could not be loaded
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the file failed
    #[error("I/O error while loading configuration: {0}")]
    Io(#[from] io::Error),

    /// The file is not valid in its format
    #[error("Invalid {format} configuration: {message}")]
    Parse {
        /// Format name
        format: &'static str,
        /// Parser message
        message: String,
    },

    /// Extension is none of toml, yaml, yml, json
    #[error("Unsupported configuration extension `.{0}` (expected toml, yaml, yml or json)")]
    UnsupportedFormat(String),

    /// Path has no extension to infer a format from
    #[error("Cannot infer configuration format of {}", .0.display())]
    NoExtension(PathBuf),

    /// Named file does not exist
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// An environment override could not be parsed
    #[error("{variable}={value} is not valid: {reason}")]
    EnvOverride {
        /// Variable name
        variable: String,
        /// Raw value
        value: String,
        /// What was expected
        reason: String,
    },

    /// A field holds an unusable value
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted field path
        field: String,
        /// What is wrong
        reason: String,
    },

    /// A required field is empty
    #[error("{0} is required")]
    Missing(String),
}

impl ConfigError {
    /// Unparseable environment override
    pub fn env_override(
        variable: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::EnvOverride {
            variable: variable.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Unusable value in `field`
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Empty required `field`
    pub fn missing(field: impl Into<String>) -> Self {
        ConfigError::Missing(field.into())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse {
            format: "TOML",
            message: e.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Parse {
            format: "YAML",
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse {
            format: "JSON",
            message: e.to_string(),
        }
    }
}

/// Result alias for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;
