//! Shared test harness: a full engine wired against the in-memory stores
//! and blob backend.
#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;

use drive_blob::providers::memory::MemoryBlobStore;
use drive_core::config::quota::QuotaConfig;
use drive_core::config::upload::UploadConfig;
use drive_core::result::AppResult;
use drive_core::types::OwnerId;
use drive_database::memory::{
    MemoryFileStore, MemoryFolderStore, MemoryQuotaStore, MemoryUploadStore,
};
use drive_engine::{
    BroadcastPublisher, FileDirectory, QuotaLedger, UploadSessionManager, UploadSweeper,
    VersionStore,
};
use drive_engine::upload::InitiateUploadRequest;
use drive_entity::file::{FileRecord, UploadSession};

/// A fully wired engine over in-memory backends.
pub struct TestEngine {
    pub blobs: Arc<MemoryBlobStore>,
    pub uploads: Arc<MemoryUploadStore>,
    pub publisher: Arc<BroadcastPublisher>,
    pub ledger: Arc<QuotaLedger>,
    pub versions: Arc<VersionStore>,
    pub directory: Arc<FileDirectory>,
    pub manager: Arc<UploadSessionManager>,
    pub sweeper: UploadSweeper,
    pub upload_config: UploadConfig,
}

/// Chunk size used by the test configuration; small enough that test
/// payloads split into several chunks.
pub const TEST_CHUNK_SIZE: u64 = 4;

/// Default test upload configuration.
pub fn upload_config() -> UploadConfig {
    UploadConfig {
        chunk_size_bytes: TEST_CHUNK_SIZE,
        ..UploadConfig::default()
    }
}

/// Build an engine with the given configuration.
pub fn engine_with(upload: UploadConfig, quota: QuotaConfig) -> TestEngine {
    let blobs = Arc::new(MemoryBlobStore::new());
    let files = Arc::new(MemoryFileStore::new());
    let folders = Arc::new(MemoryFolderStore::new());
    let uploads = Arc::new(MemoryUploadStore::new());
    let quotas = Arc::new(MemoryQuotaStore::new());
    let publisher = Arc::new(BroadcastPublisher::default());

    let ledger = Arc::new(QuotaLedger::new(quotas, quota));
    let versions = Arc::new(VersionStore::new(
        files.clone(),
        blobs.clone(),
        Arc::clone(&ledger),
        publisher.clone(),
    ));
    let directory = Arc::new(FileDirectory::new(folders, files, publisher.clone()));
    let manager = Arc::new(UploadSessionManager::new(
        uploads.clone(),
        blobs.clone(),
        Arc::clone(&ledger),
        Arc::clone(&versions),
        Arc::clone(&directory),
        upload.clone(),
        "test-bucket",
    ));
    let sweeper = UploadSweeper::new(Arc::clone(&manager), uploads.clone(), upload.clone());

    TestEngine {
        blobs,
        uploads,
        publisher,
        ledger,
        versions,
        directory,
        manager,
        sweeper,
        upload_config: upload,
    }
}

/// Build an engine with the default test configuration.
pub fn engine() -> TestEngine {
    engine_with(upload_config(), QuotaConfig::default())
}

impl TestEngine {
    /// Initiate an upload of `data` as a new file.
    pub async fn initiate(
        &self,
        owner: OwnerId,
        name: &str,
        data: &[u8],
    ) -> AppResult<UploadSession> {
        self.manager
            .initiate(InitiateUploadRequest {
                owner_id: owner,
                file_id: None,
                file_name: name.to_string(),
                folder_id: None,
                content_type: None,
                declared_size: data.len() as i64,
                expected_hash: None,
            })
            .await
    }

    /// Upload every chunk of `data` for the given session, in order.
    pub async fn upload_all_chunks(&self, session: &UploadSession, data: &[u8]) -> AppResult<()> {
        for (i, chunk) in data.chunks(TEST_CHUNK_SIZE as usize).enumerate() {
            self.manager
                .upload_chunk(session.id, (i + 1) as i32, Bytes::copy_from_slice(chunk))
                .await?;
        }
        Ok(())
    }

    /// Run a complete upload of `data` as a new file owned by `owner`.
    pub async fn upload_file(
        &self,
        owner: OwnerId,
        name: &str,
        data: &[u8],
    ) -> AppResult<FileRecord> {
        let session = self.initiate(owner, name, data).await?;
        self.upload_all_chunks(&session, data).await?;
        self.manager.complete(session.id).await
    }

    /// Run a complete upload of `data` as the next version of a file.
    pub async fn upload_next_version(
        &self,
        owner: OwnerId,
        file: &FileRecord,
        data: &[u8],
    ) -> AppResult<FileRecord> {
        let session = self
            .manager
            .initiate(InitiateUploadRequest {
                owner_id: owner,
                file_id: Some(file.file_id),
                file_name: file.name.clone(),
                folder_id: file.folder_id,
                content_type: file.content_type.clone(),
                declared_size: data.len() as i64,
                expected_hash: None,
            })
            .await?;
        self.upload_all_chunks(&session, data).await?;
        self.manager.complete(session.id).await
    }

    /// Read the current content of a file fully into memory.
    pub async fn download(&self, file: &FileRecord) -> AppResult<Vec<u8>> {
        let (_, stream) = self.versions.read_current(file.file_id).await?;
        use futures::StreamExt;
        let mut stream = stream;
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk.map_err(drive_core::error::AppError::from)?);
        }
        Ok(out)
    }
}
