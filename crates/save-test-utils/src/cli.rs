// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 SAVE Contributors

//! CLI command helpers for testing the `save-storage` binary.

use assert_cmd::Command;

/// Command for the `save-storage` binary.
#[allow(deprecated)] // cargo_bin is deprecated but still works for our use case
pub fn save_storage() -> Command {
    Command::cargo_bin("save-storage").expect("save-storage binary not found")
}
