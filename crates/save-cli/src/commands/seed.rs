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

use anyhow::{Context, Result};
use clap::Args;

use crate::context::StorageContext;
use crate::output;

/// Seed the internal-file store
#[derive(Args, Debug)]
pub struct SeedCmd {}

impl SeedCmd {
    /// Run the command
    pub async fn execute(&self, context: &StorageContext) -> Result<()> {
        let seeds = context.internal_files.seeds().len();
        context
            .internal_files
            .spawn_init()
            .await
            .context("Seeding task panicked")?
            .context("Seeding internal files failed")?;

        output::success(&format!("Seeded {} internal file(s)", seeds));
        output::detail("State", &context.internal_files.state().to_string());
        Ok(())
    }
}
