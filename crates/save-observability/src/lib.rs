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
//! Structured logging for the SAVE storage layer
//!
//! Wraps `tracing-subscriber` with the three output formats the command
//! line offers and an `EnvFilter` built from the configured level.
//!
//! # Example
//!
//! ```ignore
//! use save_observability::{init_tracing_with_config, LogConfig, LogFormat};
//!
//! init_tracing_with_config(LogConfig::new().with_format(LogFormat::Json))?;
//! tracing::info!(store = "files", "migration started");
//! ```

pub mod config;
pub mod initialization;

pub use config::{LogConfig, LogError, LogFormat, LogOutput};
pub use initialization::{init_tracing, init_tracing_with_config};
