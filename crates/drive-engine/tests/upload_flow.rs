//! Upload session lifecycle: round-trips, the exact index-set rule,
//! duplicate chunks, idempotent completion, aborts, and sweeping.

mod common;

use bytes::Bytes;
use drive_blob::hasher::ContentHasher;
use drive_core::error::ErrorKind;
use drive_core::types::OwnerId;
use drive_database::stores::UploadStore;
use drive_engine::upload::InitiateUploadRequest;
use drive_entity::file::UploadStatus;

#[tokio::test]
async fn test_upload_roundtrip_preserves_content() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let data = b"the quick brown fox jumps over the lazy dog";

    let record = engine.upload_file(owner, "fox.txt", data).await.unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(record.size_bytes, data.len() as i64);
    assert_eq!(record.content_hash, ContentHasher::hash_bytes(data));

    let downloaded = engine.download(&record).await.unwrap();
    assert_eq!(downloaded, data);
    assert_eq!(
        ContentHasher::hash_bytes(&downloaded),
        record.content_hash
    );
}

#[tokio::test]
async fn test_chunks_may_arrive_out_of_order() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let data = b"abcdefgh"; // two chunks of four bytes

    let session = engine.initiate(owner, "f.bin", data).await.unwrap();
    assert_eq!(session.expected_chunks, 2);

    engine
        .manager
        .upload_chunk(session.id, 2, Bytes::from_static(b"efgh"))
        .await
        .unwrap();
    engine
        .manager
        .upload_chunk(session.id, 1, Bytes::from_static(b"abcd"))
        .await
        .unwrap();

    let record = engine.manager.complete(session.id).await.unwrap();
    assert_eq!(engine.download(&record).await.unwrap(), data);
}

#[tokio::test]
async fn test_completion_requires_exact_index_set() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let data = b"abcdefghij"; // three chunks: 4 + 4 + 2

    let session = engine.initiate(owner, "gap.bin", data).await.unwrap();
    assert_eq!(session.expected_chunks, 3);

    engine
        .manager
        .upload_chunk(session.id, 1, Bytes::from_static(b"abcd"))
        .await
        .unwrap();
    engine
        .manager
        .upload_chunk(session.id, 3, Bytes::from_static(b"ij"))
        .await
        .unwrap();

    let err = engine.manager.complete(session.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
    assert!(err.message.contains('2'), "missing index named: {err}");

    // Filling the gap makes the session completable.
    engine
        .manager
        .upload_chunk(session.id, 2, Bytes::from_static(b"efgh"))
        .await
        .unwrap();
    engine.manager.complete(session.id).await.unwrap();
}

#[tokio::test]
async fn test_chunk_index_out_of_range_is_rejected() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let session = engine.initiate(owner, "r.bin", b"abcd").await.unwrap();

    for bad_index in [0, -1, 2] {
        let err = engine
            .manager
            .upload_chunk(session.id, bad_index, Bytes::from_static(b"abcd"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}

#[tokio::test]
async fn test_duplicate_chunk_same_content_is_idempotent() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let session = engine.initiate(owner, "dup.bin", b"abcdefgh").await.unwrap();

    let manager = &engine.manager;
    let (a, b) = tokio::join!(
        manager.upload_chunk(session.id, 1, Bytes::from_static(b"abcd")),
        manager.upload_chunk(session.id, 1, Bytes::from_static(b"abcd")),
    );
    a.unwrap();
    b.unwrap();

    // Both submissions succeeded, but only one descriptor was recorded.
    let stored = engine.uploads.find(session.id).await.unwrap().unwrap();
    assert_eq!(stored.chunk_descriptors().len(), 1);
}

#[tokio::test]
async fn test_duplicate_chunk_different_content_conflicts() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let session = engine.initiate(owner, "dup.bin", b"abcdefgh").await.unwrap();

    engine
        .manager
        .upload_chunk(session.id, 1, Bytes::from_static(b"abcd"))
        .await
        .unwrap();
    let err = engine
        .manager
        .upload_chunk(session.id, 1, Bytes::from_static(b"XXXX"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[tokio::test]
async fn test_repeated_completion_replays_prior_result() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let data = b"idempotent";

    let session = engine.initiate(owner, "i.bin", data).await.unwrap();
    engine.upload_all_chunks(&session, data).await.unwrap();

    let first = engine.manager.complete(session.id).await.unwrap();
    let second = engine.manager.complete(session.id).await.unwrap();
    assert_eq!(first.file_id, second.file_id);
    assert_eq!(first.version, second.version);

    // No second lineage was created.
    let stored = engine.uploads.find(session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, UploadStatus::Completed);
    assert_eq!(stored.result_file_id, Some(first.file_id));
}

#[tokio::test]
async fn test_concurrent_completion_has_one_winner() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let data = b"race";

    let session = engine.initiate(owner, "race.bin", data).await.unwrap();
    engine.upload_all_chunks(&session, data).await.unwrap();

    let manager = &engine.manager;
    let (a, b) = tokio::join!(manager.complete(session.id), manager.complete(session.id));

    // One side always wins; the loser either replays the winner's result
    // or observes the in-flight completion.
    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert!(winners >= 1);
    for result in [a, b] {
        match result {
            Ok(record) => assert_eq!(record.version, 1),
            Err(e) => assert_eq!(e.kind, ErrorKind::Conflict),
        }
    }
}

#[tokio::test]
async fn test_size_mismatch_aborts_with_integrity_failure() {
    let engine = common::engine();
    let owner = OwnerId::new();

    // Declare 8 bytes but upload 7: chunk sizes cannot add up.
    let session = engine.initiate(owner, "short.bin", b"abcdefgh").await.unwrap();
    engine
        .manager
        .upload_chunk(session.id, 1, Bytes::from_static(b"abcd"))
        .await
        .unwrap();
    engine
        .manager
        .upload_chunk(session.id, 2, Bytes::from_static(b"efg"))
        .await
        .unwrap();

    let err = engine.manager.complete(session.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::IntegrityFailure);
    assert!(err.message.contains("declared 8"), "details: {err}");

    // The abort released the reservation and removed the session.
    assert!(engine.uploads.find(session.id).await.unwrap().is_none());
    let account = engine.ledger.usage(owner).await.unwrap();
    assert_eq!(account.used_bytes, 0);
    assert_eq!(account.reserved_bytes, 0);
}

#[tokio::test]
async fn test_declared_hash_mismatch_aborts() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let data = b"payload!";

    let session = engine
        .manager
        .initiate(InitiateUploadRequest {
            owner_id: owner,
            file_id: None,
            file_name: "h.bin".to_string(),
            folder_id: None,
            content_type: None,
            declared_size: data.len() as i64,
            expected_hash: Some(ContentHasher::hash_bytes(b"something else")),
        })
        .await
        .unwrap();
    engine.upload_all_chunks(&session, data).await.unwrap();

    let err = engine.manager.complete(session.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::IntegrityFailure);
    assert!(err.message.contains("hash mismatch"), "details: {err}");
}

#[tokio::test]
async fn test_abort_is_idempotent_and_releases_quota() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let data = b"going nowhere";

    let session = engine.initiate(owner, "a.bin", data).await.unwrap();
    engine
        .manager
        .upload_chunk(session.id, 1, Bytes::from_static(b"goin"))
        .await
        .unwrap();

    engine.manager.abort(session.id).await.unwrap();
    // A second abort of the now-missing session still succeeds.
    engine.manager.abort(session.id).await.unwrap();

    assert!(engine.uploads.find(session.id).await.unwrap().is_none());
    let account = engine.ledger.usage(owner).await.unwrap();
    assert_eq!(account.reserved_bytes, 0);
    assert_eq!(account.used_bytes, 0);
}

#[tokio::test]
async fn test_abort_after_completion_is_invalid_state() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let data = b"done";

    let session = engine.initiate(owner, "d.bin", data).await.unwrap();
    engine.upload_all_chunks(&session, data).await.unwrap();
    engine.manager.complete(session.id).await.unwrap();

    let err = engine.manager.abort(session.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidState);
}

#[tokio::test]
async fn test_chunks_rejected_after_abort() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let session = engine.initiate(owner, "x.bin", b"abcdefgh").await.unwrap();

    engine.manager.abort(session.id).await.unwrap();
    let err = engine
        .manager
        .upload_chunk(session.id, 1, Bytes::from_static(b"abcd"))
        .await
        .unwrap_err();
    // The session record is deleted by abort, so the chunk finds nothing.
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_simple_upload_matches_chunked_semantics() {
    let engine = common::engine();
    let owner = OwnerId::new();
    let data = b"small enough for one request";

    let record = engine
        .manager
        .simple_upload(
            InitiateUploadRequest {
                owner_id: owner,
                file_id: None,
                file_name: "small.txt".to_string(),
                folder_id: None,
                content_type: Some("text/plain".to_string()),
                declared_size: data.len() as i64,
                expected_hash: None,
            },
            Bytes::from_static(data),
        )
        .await
        .unwrap();

    assert_eq!(record.version, 1);
    assert_eq!(record.content_hash, ContentHasher::hash_bytes(data));
    assert_eq!(engine.download(&record).await.unwrap(), data);

    let account = engine.ledger.usage(owner).await.unwrap();
    assert_eq!(account.used_bytes, data.len() as i64);
    assert_eq!(account.reserved_bytes, 0);

    // A simple upload can also land as the next version of the file.
    let next = engine
        .manager
        .simple_upload(
            InitiateUploadRequest {
                owner_id: owner,
                file_id: Some(record.file_id),
                file_name: record.name.clone(),
                folder_id: None,
                content_type: record.content_type.clone(),
                declared_size: 7,
                expected_hash: None,
            },
            Bytes::from_static(b"updated"),
        )
        .await
        .unwrap();
    assert_eq!(next.version, 2);
}

#[tokio::test]
async fn test_presigned_download_points_at_current_content() {
    let engine = common::engine();
    let owner = OwnerId::new();

    let record = engine.upload_file(owner, "p.txt", b"presign me").await.unwrap();
    let url = engine
        .versions
        .presign_current(record.file_id, std::time::Duration::from_secs(60))
        .await
        .unwrap();
    assert!(url.contains(&record.key), "url addresses the object: {url}");
    assert!(url.contains("token="), "url carries a token: {url}");
}

#[tokio::test]
async fn test_sweeper_aborts_idle_sessions() {
    let mut upload = common::upload_config();
    upload.idle_window_seconds = 0; // everything is instantly idle
    let engine = common::engine_with(upload, Default::default());
    let owner = OwnerId::new();

    let session = engine.initiate(owner, "idle.bin", b"abcdefgh").await.unwrap();
    engine
        .manager
        .upload_chunk(session.id, 1, Bytes::from_static(b"abcd"))
        .await
        .unwrap();

    let outcome = engine.sweeper.sweep_once().await.unwrap();
    assert_eq!(outcome.aborted, 1);

    assert!(engine.uploads.find(session.id).await.unwrap().is_none());
    let account = engine.ledger.usage(owner).await.unwrap();
    assert_eq!(account.reserved_bytes, 0);
}

#[tokio::test]
async fn test_sweeper_leaves_active_sessions_alone() {
    let engine = common::engine(); // default one-hour idle window
    let owner = OwnerId::new();

    let session = engine.initiate(owner, "busy.bin", b"abcdefgh").await.unwrap();
    engine
        .manager
        .upload_chunk(session.id, 1, Bytes::from_static(b"abcd"))
        .await
        .unwrap();

    let outcome = engine.sweeper.sweep_once().await.unwrap();
    assert_eq!(outcome, drive_engine::upload::sweeper::SweepOutcome::default());
    assert!(engine.uploads.find(session.id).await.unwrap().is_some());
}
