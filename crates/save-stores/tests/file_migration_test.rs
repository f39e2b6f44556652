//! Files move from the legacy key-path layout into the metastore-backed store

use bytes::Bytes;
use save_storage::{mock::MockBackend, LocalStorage, Storage};
use save_stores::{
    BlobRoot, FileCodec, FileKey, FileStorage, LegacyRoot, ProjectCoordinates, SqliteDirectory,
};
use save_test_utils::{assert_content, memory_pool, TestFixtures};
use std::sync::Arc;
use tempfile::TempDir;

fn key(project: &str, name: &str, millis: i64) -> FileKey {
    FileKey::new(ProjectCoordinates::new("Huawei", project), name, millis)
}

/// Legacy files land in the object store under their row ids
#[tokio::test]
async fn test_files_migrate_into_object_store() {
    let legacy_dir = TempDir::new().unwrap();
    let legacy_files = LocalStorage::new_sync(legacy_dir.path().join("files"), FileCodec).unwrap();
    legacy_files
        .upload_bytes(&key("huaweiName", "tool.bin", 1_700_000_000_000), Bytes::from(TestFixtures::binary_file(2048)))
        .await
        .unwrap();
    legacy_files
        .upload_bytes(&key("huaweiName", "notes.txt", 1_700_000_000_001), Bytes::from_static(b"notes"))
        .await
        .unwrap();
    legacy_files
        .upload_bytes(&key("deleted", "orphan.bin", 1), Bytes::from_static(b"orphan"))
        .await
        .unwrap();

    let directory = SqliteDirectory::from_pool(memory_pool().await).await.unwrap();
    directory.create_project("Huawei", "huaweiName").await.unwrap();
    let backend = MockBackend::new();
    let root = BlobRoot::object_store(Arc::new(backend.clone()), "save");
    let files = FileStorage::new(&root, directory, Some(&LegacyRoot::new(legacy_dir.path()))).unwrap();

    let report = files.migration().unwrap().migrate().await.unwrap();

    assert_eq!(report.migrated_objects.len(), 2);
    assert_eq!(report.failed_objects.len(), 1);
    assert_eq!(backend.len().await, 2);
    assert!(backend.keys().await.iter().all(|k| k.starts_with("save/files-by-id/")));

    let tool = key("huaweiName", "tool.bin", 1_700_000_000_000);
    assert_content(&files, &tool, &TestFixtures::binary_file(2048)).await;
    let row = files.metastore().list_by_project(&ProjectCoordinates::new("Huawei", "huaweiName")).await.unwrap();
    assert_eq!(row.len(), 2);
    assert_eq!(row[0].size_bytes, 2048);

    // The project-less file stays behind for a later run
    assert_eq!(
        legacy_files.list_all().await.unwrap(),
        vec![key("deleted", "orphan.bin", 1)]
    );
    assert!(!files.migration().unwrap().is_migration_finished().await.unwrap());
}
