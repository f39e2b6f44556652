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

//! Outcome of one migration run
//!
//! Serialisable so operators can keep a record of each startup migration.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tokio::fs;

/// Where a migration run stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationStatus {
    /// Migration in progress
    InProgress,

    /// Every old key reached the new storage
    Completed,

    /// The run finished but some keys stayed behind in the old storage
    CompletedWithFailures,

    /// The run could not enumerate the old storage
    Failed,
}

/// Per-key results of a migration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Which migration produced this report
    pub name: String,

    /// Keys found in the old storage
    pub total_objects: usize,

    /// Keys copied into the new storage during this run
    pub migrated_objects: BTreeSet<String>,

    /// Keys already present in the new storage, only removed from the old one
    pub already_present: BTreeSet<String>,

    /// Keys whose new-storage copy differed from the old content; the new copy was kept
    #[serde(default)]
    pub discarded: BTreeSet<String>,

    /// Bytes copied during this run
    pub bytes_copied: u64,

    /// Keys that failed (key -> error message); they remain in the old storage
    pub failed_objects: Vec<(String, String)>,

    /// Run start
    pub started_at: DateTime<Utc>,

    /// Run end
    pub finished_at: Option<DateTime<Utc>>,

    /// Run status
    pub status: MigrationStatus,
}

impl MigrationReport {
    /// Start a report for `total_objects` keys
    pub fn new(name: impl Into<String>, total_objects: usize) -> Self {
        Self {
            name: name.into(),
            total_objects,
            migrated_objects: BTreeSet::new(),
            already_present: BTreeSet::new(),
            discarded: BTreeSet::new(),
            bytes_copied: 0,
            failed_objects: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            status: MigrationStatus::InProgress,
        }
    }

    /// Record a copied key
    pub fn mark_migrated(&mut self, key: String, bytes: u64) {
        self.migrated_objects.insert(key);
        self.bytes_copied += bytes;
    }

    /// Record a key the new storage already had
    pub fn mark_already_present(&mut self, key: String) {
        self.already_present.insert(key);
    }

    /// Record an old key dropped in favour of different content in the new storage
    pub fn mark_discarded(&mut self, key: String) {
        self.discarded.insert(key);
    }

    /// Record a failed key
    pub fn mark_failed(&mut self, key: String, error: String) {
        self.failed_objects.push((key, error));
    }

    /// Close the report and derive the final status
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.status = if self.failed_objects.is_empty() {
            MigrationStatus::Completed
        } else {
            MigrationStatus::CompletedWithFailures
        };
    }

    /// Fraction of keys handled successfully (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_objects == 0 {
            return 1.0;
        }
        self.processed() as f64 / self.total_objects as f64
    }

    /// Keys copied or already present
    pub fn processed(&self) -> usize {
        self.migrated_objects.len() + self.already_present.len() + self.discarded.len()
    }

    /// Keys not (yet) in the new storage
    pub fn remaining(&self) -> usize {
        self.total_objects.saturating_sub(self.processed())
    }

    /// Whether `key` was copied during this run
    pub fn is_migrated(&self, key: &str) -> bool {
        self.migrated_objects.contains(key)
    }

    /// Save the report as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize migration report")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create report directory")?;
        }

        fs::write(path, json)
            .await
            .context("Failed to write migration report")?;

        Ok(())
    }

    /// Load a report saved by [`save`](Self::save)
    pub async fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .await
            .context("Failed to read migration report")?;

        serde_json::from_str(&json).context("Failed to deserialize migration report")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_report_persistence() {
        let dir = tempdir().unwrap();
        let report_path = dir.path().join("reports").join("avatars.json");

        let mut report = MigrationReport::new("avatars", 3);
        report.mark_migrated("users/alice.png".to_string(), 10);
        report.mark_already_present("users/bob.png".to_string());
        report.mark_failed("users/carol.png".to_string(), "disk full".to_string());
        report.finish();

        report.save(&report_path).await.unwrap();
        let loaded = MigrationReport::load(&report_path).await.unwrap();

        assert_eq!(loaded.name, "avatars");
        assert_eq!(loaded.total_objects, 3);
        assert_eq!(loaded.bytes_copied, 10);
        assert!(loaded.is_migrated("users/alice.png"));
        assert!(!loaded.is_migrated("users/bob.png"));
        assert_eq!(loaded.failed_objects.len(), 1);
        assert_eq!(loaded.status, MigrationStatus::CompletedWithFailures);
    }

    #[test]
    fn test_progress_calculation() {
        let mut report = MigrationReport::new("files", 4);
        assert_eq!(report.progress(), 0.0);

        report.mark_migrated("a".to_string(), 1);
        report.mark_already_present("b".to_string());

        assert_eq!(report.progress(), 0.5);
        assert_eq!(report.remaining(), 2);
    }

    #[test]
    fn test_empty_migration_is_complete() {
        let mut report = MigrationReport::new("empty", 0);
        report.finish();
        assert_eq!(report.progress(), 1.0);
        assert_eq!(report.status, MigrationStatus::Completed);
        assert!(report.finished_at.is_some());
    }
}
