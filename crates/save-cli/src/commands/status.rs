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

use anyhow::Result;
use clap::Args;

use crate::context::StorageContext;
use crate::output;

/// Show whether each legacy migration has finished
#[derive(Args, Debug)]
pub struct StatusCmd {}

impl StatusCmd {
    /// Run the command
    pub async fn execute(&self, context: &StorageContext) -> Result<()> {
        let migrations = context.migrations();
        if migrations.is_empty() {
            output::info("No migrations configured");
            return Ok(());
        }

        output::header("Migrations");
        for migration in migrations {
            let state = if migration.is_migration_finished().await? {
                "finished"
            } else {
                "pending"
            };
            output::detail(migration.name(), state);
        }
        Ok(())
    }
}
