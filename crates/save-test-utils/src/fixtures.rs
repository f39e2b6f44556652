// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 SAVE Contributors

//! Test fixture data.

use std::fs;
use std::path::Path;

/// Test fixture helpers.
pub struct TestFixtures;

impl TestFixtures {
    /// Text content as bytes.
    pub fn text_file(content: &str) -> Vec<u8> {
        content.as_bytes().to_vec()
    }

    /// Binary content of the given size with a predictable byte pattern.
    pub fn binary_file(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i % 256) as u8).collect()
    }

    /// Content of the given size for streaming tests.
    pub fn large_file(target_size: usize) -> Vec<u8> {
        let pattern = b"SAVE storage large object test pattern\n";
        let repeats = (target_size / pattern.len()) + 1;
        pattern.repeat(repeats).into_iter().take(target_size).collect()
    }

    /// Minimal 1x1 transparent PNG, used as an avatar.
    pub fn minimal_png() -> Vec<u8> {
        vec![
            0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
            0x00, 0x00, 0x00, 0x0D, // IHDR length
            0x49, 0x48, 0x44, 0x52, // IHDR
            0x00, 0x00, 0x00, 0x01, // width: 1
            0x00, 0x00, 0x00, 0x01, // height: 1
            0x08, 0x06, 0x00, 0x00, 0x00, // 8-bit RGBA
            0x1F, 0x15, 0xC4, 0x89, // CRC
            0x00, 0x00, 0x00, 0x0A, // IDAT length
            0x49, 0x44, 0x41, 0x54, // IDAT
            0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01,
            0x0D, 0x0A, 0x2D, 0xB4, // CRC
            0x00, 0x00, 0x00, 0x00, // IEND length
            0x49, 0x45, 0x4E, 0x44, // IEND
            0xAE, 0x42, 0x60, 0x82, // CRC
        ]
    }

    /// Write files under `root`, creating directories as needed.
    pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
        for (relative, content) in files {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("Failed to create fixture directory");
            }
            fs::write(&path, content).expect("Failed to write fixture file");
        }
    }
}
