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
//! Operator command line for SAVE storage
//!
//! The `save-storage` binary loads a [`save_config::Config`], builds every
//! store through [`StorageContext`] and runs one command against them.

pub mod commands;
pub mod context;
pub mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use save_config::{Config, ConfigLoader};
use save_observability::{LogConfig, LogFormat};
use std::path::PathBuf;

use crate::commands::{ListCmd, MigrateCmd, SeedCmd, StatusCmd};
pub use crate::context::StorageContext;

/// Command line of the `save-storage` binary
#[derive(Parser, Debug)]
#[command(name = "save-storage")]
#[command(version, about = "Inspect, seed and migrate SAVE blob stores")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML, YAML or JSON); defaults apply when absent
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log format (pretty, compact, json); overrides the configuration
    #[arg(long, global = true, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print every key of a store
    List(ListCmd),

    /// Migrate the legacy layout into the current stores
    Migrate(MigrateCmd),

    /// Seed the internal-file store
    Seed(SeedCmd),

    /// Show migration progress
    Status(StatusCmd),
}

impl Cli {
    /// Load the configuration named by `--config`, with `SAVE_*` overrides
    pub async fn load_config(&self) -> Result<Config> {
        let config = ConfigLoader::new()
            .load_with_overrides(self.config.as_deref())
            .await
            .context("Failed to load configuration")?;
        Ok(config)
    }

    /// Logging setup from flags, falling back to `config`
    pub fn log_config(&self, config: &Config) -> Result<LogConfig> {
        let level = if self.quiet {
            "error".to_string()
        } else {
            match self.verbose {
                0 => config.observability.log_level.clone(),
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            }
        };
        let format = match self.log_format {
            Some(format) => format,
            None => config.observability.log_format.parse()?,
        };
        Ok(LogConfig::new()
            .with_format(format)
            .with_level(level)
            .with_color(console::colors_enabled_stderr()))
    }

    /// Run the selected command
    pub async fn run(&self, context: &StorageContext) -> Result<()> {
        match &self.command {
            Commands::List(cmd) => cmd.execute(context).await,
            Commands::Migrate(cmd) => cmd.execute(context).await,
            Commands::Seed(cmd) => cmd.execute(context).await,
            Commands::Status(cmd) => cmd.execute(context).await,
        }
    }
}
