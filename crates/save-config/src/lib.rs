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
//! Configuration for the SAVE storage layer
//!
//! One [`Config`] describes where store content lives (filesystem or S3),
//! the SQLite metastore, the optional migration from the legacy
//! filesystem layout, where seeded internal files come from, and logging.
//!
//! Files may be TOML, YAML or JSON. `SAVE_*` environment variables are
//! applied on top of the file before validation.
//!
//! # Example
//!
//! ```no_run
//! use save_config::ConfigLoader;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = ConfigLoader::new();
//!     let config = loader
//!         .load_with_overrides(Some(Path::new("save.toml")))
//!         .await?;
//!
//!     println!("Metastore: {}", config.database.url);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_overrides, ConfigFormat, ConfigLoader};
pub use schema::*;
pub use validation::Validator;
