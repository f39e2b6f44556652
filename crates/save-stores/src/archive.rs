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

//! Snapshot archives
//!
//! Test source snapshots are stored as zip containers of the source tree.
//! Reading test content goes through a temporary directory: the archive is
//! written to disk, extracted, and the requested files are read as lines.

use futures::stream::TryStreamExt;
use save_storage::{ContentStream, KeyPath, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::task::spawn_blocking;
use tracing::{debug, info_span};

const ARCHIVE_FILE_NAME: &str = "archive.zip";
const CONTENT_DIR: &str = "content";

/// Test files to read out of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFilesRequest {
    /// Directory of the test suites inside the snapshot, empty for the root
    pub test_root_path: String,
    /// Test file, relative to the test root
    pub test_file_path: String,
    /// Extra file of the test (expected output, config), relative to the test root
    #[serde(default)]
    pub additional_test_file_path: Option<String>,
}

/// Lines of the requested test files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFilesContent {
    /// Lines of the test file
    pub test_lines: Vec<String>,
    /// Lines of the extra file, when requested
    pub additional_test_lines: Option<Vec<String>>,
}

/// Zip every file under `dir`, paths relative to `dir` with `/` separators
pub async fn pack_directory(dir: &Path) -> StorageResult<Vec<u8>> {
    let dir = dir.to_path_buf();
    spawn_blocking(move || -> StorageResult<Vec<u8>> {
        let _span = info_span!("pack_directory", dir = %dir.display()).entered();
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        let mut zip = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
        for relative in list_files(&dir)? {
            let mut file = fs::File::open(dir.join(relative.to_relative_path()))?;
            zip.start_file(relative.as_object_key(), options)
                .map_err(StorageError::other)?;
            io::copy(&mut file, &mut zip)?;
        }
        Ok(zip.finish().map_err(StorageError::other)?.into_inner())
    })
    .await
    .map_err(StorageError::other)?
}

/// Regular files under `root`, sorted
fn list_files(root: &Path) -> StorageResult<Vec<KeyPath>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                files.push(KeyPath::from_relative_path(relative)?);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Read the requested test files out of an archive stream
///
/// The temporary directory is removed whether reading succeeds or not.
pub async fn read_test_content(
    archive: ContentStream,
    request: &TestFilesRequest,
) -> StorageResult<TestFilesContent> {
    let tmp = TempDir::new()?;
    let result = extract_and_read(tmp.path(), archive, request).await;
    spawn_blocking(move || tmp.close())
        .await
        .map_err(StorageError::other)??;
    result
}

async fn extract_and_read(
    tmp: &Path,
    mut archive: ContentStream,
    request: &TestFilesRequest,
) -> StorageResult<TestFilesContent> {
    let archive_path = tmp.join(ARCHIVE_FILE_NAME);
    let mut file = tokio::fs::File::create(&archive_path).await?;
    while let Some(chunk) = archive.try_next().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    let content_dir = tmp.join(CONTENT_DIR);
    {
        let archive_path = archive_path.clone();
        let content_dir = content_dir.clone();
        spawn_blocking(move || -> StorageResult<()> {
            let file = fs::File::open(&archive_path)?;
            let mut zip = zip::ZipArchive::new(file).map_err(StorageError::other)?;
            zip.extract(&content_dir).map_err(StorageError::other)?;
            Ok(())
        })
        .await
        .map_err(StorageError::other)??;
    }
    debug!(dir = %content_dir.display(), "Extracted snapshot");

    let test_root = content_dir.join(relative_path(&request.test_root_path)?);
    let test_lines = read_lines(&test_root.join(relative_path(&request.test_file_path)?)).await?;
    let additional_test_lines = match &request.additional_test_file_path {
        Some(path) => Some(read_lines(&test_root.join(relative_path(path)?)).await?),
        None => None,
    };
    Ok(TestFilesContent {
        test_lines,
        additional_test_lines,
    })
}

/// Validated relative path, rejecting anything that could leave the archive root
fn relative_path(path: &str) -> StorageResult<PathBuf> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(PathBuf::new());
    }
    Ok(KeyPath::parse(trimmed)?.to_relative_path())
}

async fn read_lines(path: &Path) -> StorageResult<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text.lines().map(str::to_string).collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(StorageError::not_found(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use save_storage::content;
    use save_test_utils::TestFixtures;

    async fn sample_archive() -> (TempDir, Vec<u8>) {
        let dir = TempDir::new().unwrap();
        TestFixtures::write_tree(
            dir.path(),
            &[
                ("examples/kotlin/MyTest.kt", &b"package a\nclass MyTest\n"[..]),
                ("examples/kotlin/MyTest.expected", &b"warn: 1\n"[..]),
                ("README.md", &b"# tests\n"[..]),
            ],
        );
        let zip = pack_directory(dir.path()).await.unwrap();
        (dir, zip)
    }

    #[tokio::test]
    async fn test_read_test_content() {
        let (_dir, zip) = sample_archive().await;
        let request = TestFilesRequest {
            test_root_path: "examples".to_string(),
            test_file_path: "kotlin/MyTest.kt".to_string(),
            additional_test_file_path: Some("kotlin/MyTest.expected".to_string()),
        };

        let content = read_test_content(content::from_bytes(zip), &request).await.unwrap();

        assert_eq!(content.test_lines, vec!["package a", "class MyTest"]);
        assert_eq!(content.additional_test_lines, Some(vec!["warn: 1".to_string()]));
    }

    #[tokio::test]
    async fn test_missing_test_file() {
        let (_dir, zip) = sample_archive().await;
        let request = TestFilesRequest {
            test_root_path: String::new(),
            test_file_path: "Missing.kt".to_string(),
            additional_test_file_path: None,
        };

        let err = read_test_content(content::from_bytes(zip), &request)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let (_dir, zip) = sample_archive().await;
        let request = TestFilesRequest {
            test_root_path: "examples".to_string(),
            test_file_path: "../../etc/passwd".to_string(),
            additional_test_file_path: None,
        };

        let err = read_test_content(content::from_bytes(zip), &request)
            .await
            .unwrap_err();
        assert!(err.is_invalid_key());
    }

    #[test]
    fn test_list_files_is_sorted_and_relative() {
        let dir = TempDir::new().unwrap();
        TestFixtures::write_tree(dir.path(), &[("b/x.txt", &b"x"[..]), ("a.txt", &b"a"[..])]);
        let files: Vec<String> = list_files(dir.path())
            .unwrap()
            .iter()
            .map(KeyPath::as_object_key)
            .collect();
        assert_eq!(files, vec!["a.txt", "b/x.txt"]);
    }
}
