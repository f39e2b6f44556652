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

use anyhow::{bail, Context, Result};
use clap::Args;
use save_migration::{MigrationReport, MigrationStatus, MigrationTask};
use std::path::PathBuf;
use tracing::info;

use crate::context::StorageContext;
use crate::output;

/// Drain the legacy layout into the current stores
#[derive(Args, Debug)]
pub struct MigrateCmd {
    /// Directory receiving one JSON report per migration
    #[arg(long, value_name = "DIR")]
    pub report: Option<PathBuf>,
}

impl MigrateCmd {
    /// Run the command
    ///
    /// Fails when any key could not be migrated; those keys stay in the
    /// legacy layout for the next run.
    pub async fn execute(&self, context: &StorageContext) -> Result<()> {
        let migrations = context.migrations();
        if migrations.is_empty() {
            output::info("No legacy root configured, nothing to migrate");
            return Ok(());
        }

        let tasks: Vec<MigrationTask> = migrations.into_iter().map(MigrationTask::spawn).collect();
        let mut incomplete = 0;
        for task in tasks {
            let name = task.name().to_string();
            let report = task
                .wait()
                .await
                .with_context(|| format!("Migration {} failed", name))?;
            print_report(&report);

            if let Some(dir) = &self.report {
                let path = dir.join(format!("{}.json", report.name));
                report.save(&path).await?;
                info!(report = %path.display(), "Wrote migration report");
            }
            if report.status != MigrationStatus::Completed {
                incomplete += 1;
            }
        }

        if incomplete > 0 {
            bail!("{} migration(s) finished with failures", incomplete);
        }
        output::success("All migrations completed");
        Ok(())
    }
}

fn print_report(report: &MigrationReport) {
    output::header(&report.name);
    output::detail("Status", &format!("{:?}", report.status));
    output::detail("Found", &report.total_objects.to_string());
    output::detail("Migrated", &report.migrated_objects.len().to_string());
    output::detail("Already present", &report.already_present.len().to_string());
    output::detail("Discarded", &report.discarded.len().to_string());
    output::detail("Bytes copied", &report.bytes_copied.to_string());
    for key in &report.discarded {
        output::warning(&format!("{}: replaced by different content already migrated", key));
    }
    for (key, error) in &report.failed_objects {
        output::warning(&format!("{}: {}", key, error));
    }
}
