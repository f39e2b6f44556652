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
use clap::{Args, ValueEnum};
use futures::TryStreamExt;
use save_storage::Storage;
use std::fmt::Display;

use crate::context::StorageContext;

/// Stores that can be listed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreName {
    /// User and organization avatars
    Avatars,
    /// Project files
    Files,
    /// Seeded agent and CLI binaries (seeded before listing)
    InternalFiles,
    /// Per-test debug info
    DebugInfo,
    /// Per-execution failure info
    ExecutionInfo,
    /// Snapshots indexed by commit
    Snapshots,
    /// Snapshots addressed by path
    LegacySnapshots,
}

/// Print every key of a store, one per line
#[derive(Args, Debug)]
pub struct ListCmd {
    /// Store to list
    #[arg(value_enum)]
    pub store: StoreName,
}

impl ListCmd {
    /// Run the command
    pub async fn execute(&self, context: &StorageContext) -> Result<()> {
        match self.store {
            StoreName::Avatars => print_keys(&context.avatars).await,
            StoreName::Files => print_keys(&context.files).await,
            StoreName::InternalFiles => {
                context.internal_files.init().await?;
                print_keys(context.internal_files.as_ref()).await
            }
            StoreName::DebugInfo => print_keys(&context.debug_info).await,
            StoreName::ExecutionInfo => print_keys(&context.execution_info).await,
            StoreName::Snapshots => print_keys(&context.snapshots).await,
            StoreName::LegacySnapshots => print_keys(&context.legacy_snapshots).await,
        }
    }
}

async fn print_keys<S>(storage: &S) -> Result<()>
where
    S: Storage,
    S::Key: Display,
{
    let mut keys = storage.list();
    while let Some(key) = keys.try_next().await? {
        println!("{}", key);
    }
    Ok(())
}
