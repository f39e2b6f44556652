// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 SAVE Contributors

//! End-to-end tests for the `save-storage` binary
//!
//! Every test gets its own directory holding the configuration, the
//! filesystem storage root, the SQLite metastore and the legacy layout.

use assert_cmd::Command;
use predicates::prelude::*;
use save_test_utils::{save_storage, TestFixtures};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Workspace {
            dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn legacy(&self) -> PathBuf {
        self.path().join("legacy")
    }

    fn storage(&self) -> PathBuf {
        self.path().join("storage")
    }

    fn write_config(&self, extra: serde_json::Value) -> PathBuf {
        let mut config = serde_json::json!({
            "storage": { "backend": "filesystem", "base_path": self.storage() },
            "database": { "url": format!("sqlite://{}", self.path().join("save.db").display()) },
            "observability": { "log_level": "warn", "log_format": "compact" },
        });
        if let (Some(config), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                config.insert(key.clone(), value.clone());
            }
        }
        let path = self.path().join("save.json");
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        path
    }

    fn with_legacy(&self) -> PathBuf {
        self.write_config(serde_json::json!({
            "migration": { "legacy_base_path": self.legacy() }
        }))
    }

    fn cmd(&self, config: &Path) -> Command {
        let mut cmd = save_storage();
        cmd.arg("--config").arg(config);
        cmd
    }
}

#[test]
fn test_help_lists_commands() {
    save_storage()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("seed"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn test_status_without_legacy() {
    let ws = Workspace::new();
    let config = ws.write_config(serde_json::json!({}));

    ws.cmd(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No migrations configured"));
}

#[test]
fn test_migrate_avatars_then_list() {
    let ws = Workspace::new();
    let png = TestFixtures::minimal_png();
    TestFixtures::write_tree(
        &ws.legacy(),
        &[
            ("avatars/users/alice.png", png.as_slice()),
            ("avatars/organizations/acme.png", png.as_slice()),
        ],
    );
    let config = ws.with_legacy();
    let reports = ws.path().join("reports");

    ws.cmd(&config)
        .arg("migrate")
        .arg("--report")
        .arg(&reports)
        .assert()
        .success()
        .stdout(predicate::str::contains("Migrated: 2"))
        .stdout(predicate::str::contains("All migrations completed"));

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(reports.join("avatars.json")).unwrap()).unwrap();
    assert_eq!(report["status"], "Completed");
    assert_eq!(report["total_objects"], 2);
    assert!(reports.join("files.json").exists());

    assert!(!ws.legacy().join("avatars/users/alice.png").exists());
    assert_eq!(
        fs::read(ws.storage().join("avatars/users/alice.png")).unwrap(),
        png
    );

    ws.cmd(&config)
        .args(["list", "avatars"])
        .assert()
        .success()
        .stdout(predicate::str::contains("users/alice.png"))
        .stdout(predicate::str::contains("organizations/acme.png"));

    ws.cmd(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("avatars: finished"))
        .stdout(predicate::str::contains("pending").not());
}

#[test]
fn test_migrate_orphan_file_fails() {
    let ws = Workspace::new();
    let content = TestFixtures::text_file("orphan");
    TestFixtures::write_tree(
        &ws.legacy(),
        &[("files/acme/widgets/1700000000000/report.txt", content.as_slice())],
    );
    let config = ws.with_legacy();

    ws.cmd(&config)
        .arg("migrate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("CompletedWithFailures"))
        .stderr(predicate::str::contains("finished with failures"));

    // Kept for the next run once the project exists
    assert!(ws
        .legacy()
        .join("files/acme/widgets/1700000000000/report.txt")
        .exists());

    ws.cmd(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("files: pending"));
}

#[test]
fn test_seed_then_list_internal_files() {
    let ws = Workspace::new();
    let agent = TestFixtures::binary_file(4096);
    let agent_path = ws.path().join("resources/save-agent.kexe");
    TestFixtures::write_tree(ws.path(), &[("resources/save-agent.kexe", agent.as_slice())]);
    let config = ws.write_config(serde_json::json!({
        "internal_files": { "save_agent_path": agent_path }
    }));

    ws.cmd(&config)
        .arg("seed")
        .assert()
        .success()
        .stdout(predicate::str::contains("Seeded 1 internal file(s)"))
        .stdout(predicate::str::contains("State: ready"));

    assert_eq!(
        fs::read(ws.storage().join("internal-storage/latest/save-agent.kexe")).unwrap(),
        agent
    );

    ws.cmd(&config)
        .args(["list", "internal-files"])
        .assert()
        .success()
        .stdout(predicate::str::contains("latest/save-agent.kexe"));
}

#[test]
fn test_seed_missing_source_fails() {
    let ws = Workspace::new();
    let config = ws.write_config(serde_json::json!({
        "internal_files": { "save_agent_path": ws.path().join("missing.kexe") }
    }));

    ws.cmd(&config)
        .arg("seed")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Seeding internal files failed"));
}

#[test]
fn test_env_override_is_validated() {
    let ws = Workspace::new();
    let config = ws.write_config(serde_json::json!({}));

    ws.cmd(&config)
        .env("SAVE_S3_BUCKET", "Not_A_Bucket")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_missing_config_file() {
    let ws = Workspace::new();

    ws.cmd(&ws.path().join("absent.toml"))
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
