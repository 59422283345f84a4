//! Trait contract tests for ObjectStore.
//!
//! These tests verify the behavioral contract of the storage trait against
//! both the in-memory fake and the filesystem backend. Any conforming
//! implementation must pass these.

use blobstate::fakes::{MemoryObjectStore, StoreOp};
use blobstate::{BlobMetadata, FsObjectStore, ObjectStore, StorageError};

async fn check_roundtrip(store: &dyn ObjectStore) {
    let data: Vec<u8> = (0u8..=255).collect();
    store
        .upload("setup.exe", &data, &BlobMetadata::default())
        .await
        .unwrap();
    assert_eq!(store.download("setup.exe").await.unwrap(), data);
}

async fn check_overwrite_is_last_writer_wins(store: &dyn ObjectStore) {
    let meta = BlobMetadata::with_content_type("application/xml");
    store.upload("P.VersionInfo.xml", b"first", &meta).await.unwrap();
    store.upload("P.VersionInfo.xml", b"second", &meta).await.unwrap();
    assert_eq!(store.download("P.VersionInfo.xml").await.unwrap(), b"second");
}

async fn check_missing_is_not_found(store: &dyn ObjectStore) {
    assert!(!store.exists("ghost.xml").await.unwrap());
    let err = store.download("ghost.xml").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
    assert!(store.metadata("ghost.xml").await.unwrap().is_none());
}

async fn check_list_is_prefix_scoped_and_sorted(store: &dyn ObjectStore) {
    let meta = BlobMetadata::default();
    for key in [
        "Prod/2024-03-01_00-00-00.Prod.xml",
        "Prod/2024-01-01_00-00-00.Prod.xml",
        "Prod.VersionInfo.xml",
        "Other/2024-01-01_00-00-00.Other.xml",
    ] {
        store.upload(key, b"x", &meta).await.unwrap();
    }
    let keys = store.list("Prod/").await.unwrap();
    assert_eq!(
        keys,
        vec![
            "Prod/2024-01-01_00-00-00.Prod.xml".to_string(),
            "Prod/2024-03-01_00-00-00.Prod.xml".to_string(),
        ]
    );
}

async fn check_delete_noop_for_missing(store: &dyn ObjectStore) {
    store.delete("never-written.xml").await.unwrap();
}

async fn check_metadata_tags(store: &dyn ObjectStore) {
    let meta = BlobMetadata::with_content_type("application/octet-stream").tag("version", "3.1.4.1");
    store.upload("installer.zip", b"PK", &meta).await.unwrap();
    let got = store.metadata("installer.zip").await.unwrap().unwrap();
    assert_eq!(got.tags.get("version").map(String::as_str), Some("3.1.4.1"));
}

async fn run_contract(store: &dyn ObjectStore) {
    check_roundtrip(store).await;
    check_overwrite_is_last_writer_wins(store).await;
    check_missing_is_not_found(store).await;
    check_list_is_prefix_scoped_and_sorted(store).await;
    check_delete_noop_for_missing(store).await;
    check_metadata_tags(store).await;
}

#[tokio::test]
async fn memory_store_satisfies_contract() {
    run_contract(&MemoryObjectStore::new()).await;
}

#[tokio::test]
async fn fs_store_satisfies_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsObjectStore::new(dir.path()).unwrap();
    run_contract(&store).await;
}

#[tokio::test]
async fn upload_file_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Setup.exe");
    std::fs::write(&path, b"MZ installer").unwrap();

    let store = MemoryObjectStore::new();
    store
        .upload_file("Setup.exe", &path, &BlobMetadata::default())
        .await
        .unwrap();
    assert_eq!(store.download("Setup.exe").await.unwrap(), b"MZ installer");
}

#[tokio::test]
async fn injected_failure_is_scoped_to_op_and_prefix() {
    let store = MemoryObjectStore::new();
    store.fail_on(StoreOp::Upload, "Prod/");

    let err = store
        .upload("Prod/entry.xml", b"x", &BlobMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InjectedFailure { .. }));

    store
        .upload("Prod.VersionInfo.xml", b"x", &BlobMetadata::default())
        .await
        .unwrap();
    assert_eq!(store.upload_count(), 2);

    store.clear_failures();
    store
        .upload("Prod/entry.xml", b"x", &BlobMetadata::default())
        .await
        .unwrap();
}
