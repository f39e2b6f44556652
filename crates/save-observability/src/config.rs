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
//! Logging configuration.

use std::io;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while setting up logging
#[derive(Debug, Error)]
pub enum LogError {
    /// Unknown format name
    #[error("Unknown log format: {0}. Expected one of: pretty, compact, json")]
    InvalidFormat(String),

    /// The level string is not a valid filter directive
    #[error("Failed to parse log filter '{filter}': {reason}")]
    InvalidFilter {
        /// Offending filter
        filter: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),

    /// IO failure
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Output format for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line human-readable output
    #[default]
    Pretty,

    /// Single-line output
    Compact,

    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(LogError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// Standard error
    #[default]
    Stderr,

    /// Standard output
    Stdout,
}

/// Configuration for logging
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output format
    pub format: LogFormat,

    /// Filter directive such as `info` or `save_stores=debug`.
    /// Falls back to `RUST_LOG`, then `info`.
    pub level: Option<String>,

    /// ANSI colors (ignored for JSON)
    pub use_color: bool,

    /// Timestamps on each event
    pub use_timestamps: bool,

    /// Destination
    pub output: LogOutput,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Pretty,
            level: None,
            use_color: true,
            use_timestamps: true,
            output: LogOutput::Stderr,
        }
    }
}

impl LogConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output format
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Enable or disable color output
    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    /// Enable or disable timestamps
    pub fn with_timestamps(mut self, use_timestamps: bool) -> Self {
        self.use_timestamps = use_timestamps;
        self
    }

    /// Set the output destination
    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Level from config, then `RUST_LOG`, then `info`
    pub fn effective_level(&self) -> String {
        self.level
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| "info".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("COMPACT".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("Json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LogError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new()
            .with_format(LogFormat::Json)
            .with_level("debug")
            .with_color(false)
            .with_output(LogOutput::Stdout);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.effective_level(), "debug");
        assert!(!config.use_color);
        assert!(config.use_timestamps);
        assert_eq!(config.output, LogOutput::Stdout);
    }
}
