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

//! Background migration at startup
//!
//! [`MigrationTask::spawn`] runs a migration on the runtime without blocking
//! startup. Its [`Readiness`] settles when the run ends, so health checks can
//! observe or await the outcome.

use save_storage::{InitState, Readiness, StorageError, StorageResult};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::report::MigrationReport;
use crate::storage::Migratable;

/// A migration running in the background
#[derive(Debug)]
pub struct MigrationTask {
    name: String,
    readiness: Arc<Readiness>,
    handle: JoinHandle<StorageResult<MigrationReport>>,
}

impl MigrationTask {
    /// Start `migration` on the current runtime
    pub fn spawn(migration: Arc<dyn Migratable>) -> Self {
        let name = migration.name().to_string();
        let readiness = Arc::new(Readiness::initializing());

        let task_readiness = Arc::clone(&readiness);
        let handle = tokio::spawn(async move {
            match migration.migrate().await {
                Ok(report) => {
                    info!(
                        migration = %report.name,
                        status = ?report.status,
                        "Background migration completed"
                    );
                    task_readiness.mark_ready();
                    Ok(report)
                }
                Err(e) => {
                    error!(migration = %migration.name(), "Background migration failed: {}", e);
                    task_readiness.mark_failed(e.to_string());
                    Err(e)
                }
            }
        });

        MigrationTask {
            name,
            readiness,
            handle,
        }
    }

    /// Migration name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state of the run
    pub fn state(&self) -> InitState {
        self.readiness.state()
    }

    /// Shared readiness, for health checks that outlive the handle
    pub fn readiness(&self) -> Arc<Readiness> {
        Arc::clone(&self.readiness)
    }

    /// Wait for the run and return its report
    pub async fn wait(self) -> StorageResult<MigrationReport> {
        self.handle.await.map_err(StorageError::other)?
    }
}
