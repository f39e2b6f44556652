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
//! Consistent terminal output for every command.
//!
//! Keys and reports go to stdout; errors go to stderr. Logging is separate
//! and always written to stderr.

use console::style;

/// Print a success message.
pub fn success(msg: &str) {
    println!("{} {}", style("✅").green().bold(), msg);
}

/// Print an error message to stderr.
pub fn error(msg: &str) {
    eprintln!("{} {}", style("❌").red().bold(), msg);
}

/// Print an informational message.
pub fn info(msg: &str) {
    println!("{} {}", style("ℹ️").cyan(), msg);
}

/// Print a warning message.
pub fn warning(msg: &str) {
    println!("{} {}", style("⚠️").yellow(), msg);
}

/// Print an indented `key: value` line, value highlighted.
///
/// ```rust
/// save_cli::output::detail("Migrated", "12");
/// // Output:   Migrated: 12
/// ```
pub fn detail(key: &str, value: &str) {
    println!("  {}: {}", key, style(value).cyan());
}

/// Print a section header.
pub fn header(msg: &str) {
    println!("{}", style(msg).bold());
}
