//! Version chains: gapless numbering, the single-current invariant,
//! deduplication, restore, and retention pruning.

mod common;

use drive_blob::hasher::ContentHasher;
use drive_core::config::retention::RetentionConfig;
use drive_core::error::ErrorKind;
use drive_core::events::StorageEvent;
use drive_core::traits::blob::BlobStore;
use drive_core::types::OwnerId;

#[tokio::test]
async fn test_version_numbers_are_gapless() {
    let engine = common::engine();
    let owner = OwnerId::new();

    let file = engine.upload_file(owner, "doc.txt", b"version one").await.unwrap();
    for i in 2..=5 {
        let content = format!("version {i}");
        let record = engine
            .upload_next_version(owner, &file, content.as_bytes())
            .await
            .unwrap();
        assert_eq!(record.version, i);
        assert_eq!(record.parent_version, Some(i - 1));
    }

    let versions = engine.versions.list_versions(file.file_id).await.unwrap();
    let numbers: Vec<i32> = versions.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);

    let current = engine.versions.current(file.file_id).await.unwrap();
    assert_eq!(current.version, 5);
    assert!(current.is_current);
}

#[tokio::test]
async fn test_concurrent_updates_serialize_without_gaps() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let file = engine.upload_file(owner, "c.txt", b"base content").await.unwrap();

    // Five concurrent updates with distinct contents: the per-file chain
    // lock serializes them, so all five land with consecutive numbers.
    let results = futures::future::join_all((0..5).map(|i| {
        let engine = &engine;
        let file = file.clone();
        async move {
            let content = format!("concurrent {i}");
            engine
                .upload_next_version(owner, &file, content.as_bytes())
                .await
        }
    }))
    .await;

    for result in &results {
        assert!(result.is_ok(), "update failed: {result:?}");
    }

    let versions = engine.versions.list_versions(file.file_id).await.unwrap();
    let numbers: Vec<i32> = versions.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);

    let current = engine.versions.current(file.file_id).await.unwrap();
    assert_eq!(current.version, 6);
}

#[tokio::test]
async fn test_identical_content_deduplicates_physical_storage() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let data = b"same bytes every time";

    let file = engine.upload_file(owner, "dedup.bin", data).await.unwrap();
    let objects_after_first = engine.blobs.object_count();

    let second = engine.upload_next_version(owner, &file, data).await.unwrap();
    assert_eq!(second.version, 2);

    // Two version records, one physical copy.
    let versions = engine.versions.list_versions(file.file_id).await.unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].content_hash, versions[1].content_hash);
    assert_eq!(versions[0].location(), versions[1].location());
    assert_eq!(engine.blobs.object_count(), objects_after_first);
}

#[tokio::test]
async fn test_dedup_is_scoped_per_owner() {
    let engine = common::engine();
    let data = b"shared across tenants";

    let a = engine.upload_file(OwnerId::new(), "a.bin", data).await.unwrap();
    let b = engine.upload_file(OwnerId::new(), "b.bin", data).await.unwrap();

    // Same hash, but different owners never share a location.
    assert_eq!(a.content_hash, b.content_hash);
    assert_ne!(a.location(), b.location());
    assert_eq!(engine.blobs.object_count(), 2);
}

#[tokio::test]
async fn test_restore_creates_new_version_with_historical_hash() {
    let engine = common::engine();
    let owner = OwnerId::new();

    let file = engine.upload_file(owner, "r.txt", b"first contents").await.unwrap();
    let h1 = file.content_hash.clone();
    engine.upload_next_version(owner, &file, b"second contents").await.unwrap();
    let v3 = engine.upload_next_version(owner, &file, b"third contents!").await.unwrap();
    assert_eq!(v3.version, 3);

    let restored = engine
        .versions
        .restore_version(file.file_id, 1, owner)
        .await
        .unwrap();

    // Restoring never reuses old numbers: version 4, content of version 1.
    assert_eq!(restored.version, 4);
    assert_eq!(restored.content_hash, h1);
    assert_eq!(engine.download(&restored).await.unwrap(), b"first contents");

    let versions = engine.versions.list_versions(file.file_id).await.unwrap();
    assert_eq!(versions.len(), 4);
    assert!(versions[0].restored_at.is_some(), "source version stamped");
    assert!(versions[1].restored_at.is_none());
    assert!(versions[2].restored_at.is_none());

    // Restoring again creates yet another version, never reusing 1.
    let again = engine
        .versions
        .restore_version(file.file_id, 1, owner)
        .await
        .unwrap();
    assert_eq!(again.version, 5);
    assert_eq!(again.content_hash, h1);
}

#[tokio::test]
async fn test_duplicate_storage_key_conflicts() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let file = engine.upload_file(owner, "k.txt", b"keyed").await.unwrap();

    // A retried completion would re-insert the same deterministic key;
    // the store's idempotency guard rejects it.
    let err = engine
        .versions
        .create_initial_version(
            drive_entity::file::NewFile {
                owner_id: owner,
                name: "k.txt".to_string(),
                folder_id: None,
                content_type: None,
                metadata: Default::default(),
            },
            file.location(),
            file.content_hash.clone(),
            file.size_bytes,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[tokio::test]
async fn test_restore_missing_version_is_not_found() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let file = engine.upload_file(owner, "m.txt", b"only one").await.unwrap();

    let err = engine
        .versions
        .restore_version(file.file_id, 7, owner)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_prune_respects_retention_and_reference_counts() {
    let engine = common::engine();
    let owner = OwnerId::new();

    // v1 and v2 have unique content; v3 shares v2's bytes via dedup;
    // v4 is current.
    let file = engine.upload_file(owner, "p.bin", b"version-one!").await.unwrap();
    let v2 = engine.upload_next_version(owner, &file, b"version-two!").await.unwrap();
    engine.upload_next_version(owner, &file, b"version-two!").await.unwrap();
    engine.upload_next_version(owner, &file, b"version-four").await.unwrap();

    let before = engine.blobs.object_count();
    let policy = RetentionConfig {
        max_versions_per_file: 2,
        max_age_days: None,
    };
    let outcome = engine
        .versions
        .prune_old_versions(file.file_id, &policy)
        .await
        .unwrap();

    // v1 and v2 rows pruned; v3 and v4 retained.
    assert_eq!(outcome.versions_removed, 2);
    let numbers: Vec<i32> = engine
        .versions
        .list_versions(file.file_id)
        .await
        .unwrap()
        .iter()
        .map(|v| v.version_number)
        .collect();
    assert_eq!(numbers, vec![3, 4]);

    // v1's blob lost its last reference; v2's bytes survive through v3.
    assert_eq!(outcome.blobs_deleted, 1);
    assert_eq!(engine.blobs.object_count(), before - 1);
    let shared = engine.blobs.get_object_bytes(&v2.location()).await.unwrap();
    assert_eq!(shared, b"version-two!".as_slice());
}

#[tokio::test]
async fn test_soft_deleted_file_rejects_new_versions() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let file = engine.upload_file(owner, "gone.txt", b"here today").await.unwrap();

    engine.versions.delete_file(file.file_id).await.unwrap();

    let err = engine
        .upload_next_version(owner, &file, b"gone tomorrow")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_version_events_are_published() {
    let engine = common::engine();
    let mut events = engine.publisher.subscribe();
    let owner = OwnerId::new();

    let file = engine.upload_file(owner, "e.txt", b"event payload").await.unwrap();

    match events.recv().await.unwrap() {
        StorageEvent::VersionCreated {
            file_id,
            version_number,
            owner_id,
            size_bytes,
            content_hash,
        } => {
            assert_eq!(file_id, file.file_id);
            assert_eq!(version_number, 1);
            assert_eq!(owner_id, owner);
            assert_eq!(size_bytes, 13);
            assert_eq!(content_hash, ContentHasher::hash_bytes(b"event payload"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}
