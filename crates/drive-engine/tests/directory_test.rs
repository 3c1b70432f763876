//! Folder tree: materialized paths, moves, renames, cascading
//! soft-delete, and both listing indexes.

mod common;

use drive_core::error::ErrorKind;
use drive_core::events::StorageEvent;
use drive_core::types::OwnerId;
use drive_engine::upload::InitiateUploadRequest;
use drive_entity::folder::NewFolder;

fn new_folder(owner: OwnerId, name: &str, parent: Option<drive_core::types::FolderId>) -> NewFolder {
    NewFolder {
        owner_id: owner,
        name: name.to_string(),
        parent_id: parent,
    }
}

#[tokio::test]
async fn test_materialized_paths_follow_the_tree() {
    let engine = common::engine();
    let owner = OwnerId::new();

    let docs = engine
        .directory
        .create_folder(new_folder(owner, "docs", None))
        .await
        .unwrap();
    let reports = engine
        .directory
        .create_folder(new_folder(owner, "reports", Some(docs.id)))
        .await
        .unwrap();
    let q3 = engine
        .directory
        .create_folder(new_folder(owner, "q3", Some(reports.id)))
        .await
        .unwrap();

    assert_eq!(docs.path, "/docs");
    assert_eq!(reports.path, "/docs/reports");
    assert_eq!(q3.path, "/docs/reports/q3");
    assert_eq!(q3.depth(), 2);
}

#[tokio::test]
async fn test_duplicate_path_conflicts() {
    let engine = common::engine();
    let owner = OwnerId::new();

    engine
        .directory
        .create_folder(new_folder(owner, "docs", None))
        .await
        .unwrap();
    let err = engine
        .directory
        .create_folder(new_folder(owner, "docs", None))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);

    // A different owner may reuse the path.
    engine
        .directory
        .create_folder(new_folder(OwnerId::new(), "docs", None))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_move_rewrites_descendant_paths() {
    let engine = common::engine();
    let owner = OwnerId::new();

    let docs = engine
        .directory
        .create_folder(new_folder(owner, "docs", None))
        .await
        .unwrap();
    let archive = engine
        .directory
        .create_folder(new_folder(owner, "archive", None))
        .await
        .unwrap();
    let reports = engine
        .directory
        .create_folder(new_folder(owner, "reports", Some(docs.id)))
        .await
        .unwrap();
    let q3 = engine
        .directory
        .create_folder(new_folder(owner, "q3", Some(reports.id)))
        .await
        .unwrap();

    let moved = engine
        .directory
        .move_folder(reports.id, Some(archive.id))
        .await
        .unwrap();
    assert_eq!(moved.path, "/archive/reports");

    let q3_after = engine.directory.get_folder(q3.id).await.unwrap();
    assert_eq!(q3_after.path, "/archive/reports/q3");
    assert_eq!(q3_after.parent_id, Some(reports.id));
}

#[tokio::test]
async fn test_move_into_own_subtree_is_rejected() {
    let engine = common::engine();
    let owner = OwnerId::new();

    let a = engine
        .directory
        .create_folder(new_folder(owner, "a", None))
        .await
        .unwrap();
    let b = engine
        .directory
        .create_folder(new_folder(owner, "b", Some(a.id)))
        .await
        .unwrap();

    let err = engine.directory.move_folder(a.id, Some(b.id)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let err = engine.directory.move_folder(a.id, Some(a.id)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_rename_rewrites_subtree() {
    let engine = common::engine();
    let owner = OwnerId::new();

    let docs = engine
        .directory
        .create_folder(new_folder(owner, "docs", None))
        .await
        .unwrap();
    let inner = engine
        .directory
        .create_folder(new_folder(owner, "inner", Some(docs.id)))
        .await
        .unwrap();

    let renamed = engine.directory.rename_folder(docs.id, "papers").await.unwrap();
    assert_eq!(renamed.path, "/papers");

    let inner_after = engine.directory.get_folder(inner.id).await.unwrap();
    assert_eq!(inner_after.path, "/papers/inner");
}

#[tokio::test]
async fn test_list_children_returns_direct_children_only() {
    let engine = common::engine();
    let owner = OwnerId::new();

    let root = engine
        .directory
        .create_folder(new_folder(owner, "root", None))
        .await
        .unwrap();
    let child = engine
        .directory
        .create_folder(new_folder(owner, "child", Some(root.id)))
        .await
        .unwrap();
    engine
        .directory
        .create_folder(new_folder(owner, "grandchild", Some(child.id)))
        .await
        .unwrap();

    // A file placed directly in the root folder.
    let session = engine
        .manager
        .initiate(InitiateUploadRequest {
            owner_id: owner,
            file_id: None,
            file_name: "notes.txt".to_string(),
            folder_id: Some(root.id),
            content_type: Some("text/plain".to_string()),
            declared_size: 5,
            expected_hash: None,
        })
        .await
        .unwrap();
    engine.upload_all_chunks(&session, b"notes").await.unwrap();
    engine.manager.complete(session.id).await.unwrap();

    let listing = engine.directory.list_children(root.id).await.unwrap();
    assert_eq!(listing.folders.len(), 1);
    assert_eq!(listing.folders[0].id, child.id);
    assert_eq!(listing.files.len(), 1);
    assert_eq!(listing.files[0].name, "notes.txt");

    // The recursive view sees the whole subtree.
    let subtree = engine.directory.list_subtree(root.id).await.unwrap();
    assert_eq!(subtree.len(), 2);
}

#[tokio::test]
async fn test_soft_delete_cascades_to_subtree_and_files() {
    let engine = common::engine();
    let mut events = engine.publisher.subscribe();
    let owner = OwnerId::new();

    let root = engine
        .directory
        .create_folder(new_folder(owner, "root", None))
        .await
        .unwrap();
    let child = engine
        .directory
        .create_folder(new_folder(owner, "child", Some(root.id)))
        .await
        .unwrap();

    let session = engine
        .manager
        .initiate(InitiateUploadRequest {
            owner_id: owner,
            file_id: None,
            file_name: "inside.txt".to_string(),
            folder_id: Some(child.id),
            content_type: None,
            declared_size: 6,
            expected_hash: None,
        })
        .await
        .unwrap();
    engine.upload_all_chunks(&session, b"inside").await.unwrap();
    let file = engine.manager.complete(session.id).await.unwrap();

    let affected = engine.directory.soft_delete_folder(root.id).await.unwrap();
    assert_eq!(affected, 3); // two folders and one file

    // Both folders are gone from lookups, and the file rejects updates.
    for folder_id in [root.id, child.id] {
        let err = engine.directory.get_folder(folder_id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
    let err = engine.versions.current(file.file_id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    // Deleting again cascades over nothing new.
    let err = engine.directory.soft_delete_folder(root.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    // The upload's version event comes first, then the deletions.
    let mut deleted_files = 0;
    let mut deleted_folders = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            StorageEvent::FileDeleted { file_id, .. } => {
                assert_eq!(file_id, file.file_id);
                deleted_files += 1;
            }
            StorageEvent::FolderDeleted { folder_id, .. } => {
                assert_eq!(folder_id, root.id);
                deleted_folders += 1;
            }
            StorageEvent::VersionCreated { .. } => {}
        }
    }
    assert_eq!(deleted_files, 1);
    assert_eq!(deleted_folders, 1);
}

#[tokio::test]
async fn test_upload_into_missing_folder_fails() {
    let engine = common::engine();
    let owner = OwnerId::new();

    let err = engine
        .manager
        .initiate(InitiateUploadRequest {
            owner_id: owner,
            file_id: None,
            file_name: "lost.txt".to_string(),
            folder_id: Some(drive_core::types::FolderId::new()),
            content_type: None,
            declared_size: 4,
            expected_hash: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}
