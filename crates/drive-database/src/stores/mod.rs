//! Store traits the engine operates against.
//!
//! Each trait owns one family of records, mirroring component ownership:
//! [`FileStore`] serves the version store, [`FolderStore`] the file
//! directory, [`UploadStore`] the upload session manager, and
//! [`QuotaStore`] the quota ledger. Methods that must not partially
//! commit are compound by design — a backend implements each as one
//! atomic unit.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use drive_core::result::AppResult;
use drive_core::types::{BlobLocation, ContentHash, FileId, FolderId, OwnerId, ReservationId, UploadId};
use drive_entity::file::{ChunkDescriptor, FileRecord, FileVersionRecord, UploadSession};
use drive_entity::folder::FolderRecord;
use drive_entity::quota::{QuotaAccount, Reservation};

/// Outcome of recording an uploaded chunk.
#[derive(Debug)]
pub enum ChunkRecordOutcome {
    /// The chunk was recorded; the updated session is returned.
    Recorded(UploadSession),
    /// The same index with the same content tag was already recorded;
    /// accepted silently without a second descriptor.
    Duplicate(UploadSession),
}

impl ChunkRecordOutcome {
    /// The session in either outcome.
    pub fn session(&self) -> &UploadSession {
        match self {
            Self::Recorded(s) | Self::Duplicate(s) => s,
        }
    }
}

/// Outcome of claiming the exclusive right to complete a session.
#[derive(Debug)]
pub enum CompletionClaim {
    /// The caller holds the completion; snapshot taken at claim time.
    Claimed(UploadSession),
    /// The session already completed; returned for idempotent replay of
    /// the prior result.
    AlreadyCompleted(UploadSession),
}

/// Persistence for file records and their version chains.
#[async_trait]
pub trait FileStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert the first record (version 1, current) of a new lineage
    /// together with its version row, atomically. Fails with `Conflict`
    /// when a version-1 record with the same storage key already exists
    /// (idempotency guard against retried completions).
    async fn insert_initial(
        &self,
        record: &FileRecord,
        version: &FileVersionRecord,
    ) -> AppResult<()>;

    /// The lineage's current record, soft-deleted or not.
    async fn find_current(&self, file_id: FileId) -> AppResult<Option<FileRecord>>;

    /// Atomically: demote the current record (which must still be at
    /// `expected_version`, else `Conflict`), insert the successor record,
    /// and insert its version row. A failure leaves the prior current
    /// record untouched.
    async fn transition_version(
        &self,
        file_id: FileId,
        expected_version: i32,
        next: &FileRecord,
        version_row: &FileVersionRecord,
    ) -> AppResult<()>;

    /// All version rows of a file, ascending by version number.
    async fn list_versions(&self, file_id: FileId) -> AppResult<Vec<FileVersionRecord>>;

    /// One version row.
    async fn find_version(
        &self,
        file_id: FileId,
        version_number: i32,
    ) -> AppResult<Option<FileVersionRecord>>;

    /// Stamp a version's restoration timestamp.
    async fn mark_version_restored(
        &self,
        file_id: FileId,
        version_number: i32,
        at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Delete the given version rows. Returns rows removed.
    async fn delete_versions(&self, file_id: FileId, version_numbers: &[i32]) -> AppResult<u64>;

    /// Deduplication lookup: a surviving location holding this owner's
    /// content hash, if any. Scoped per owner — hashes never match across
    /// tenants.
    async fn find_location_by_hash(
        &self,
        owner_id: OwnerId,
        hash: &ContentHash,
    ) -> AppResult<Option<BlobLocation>>;

    /// Number of surviving records (current rows and version rows) that
    /// reference this owner's hash. Physical deletion is allowed only at
    /// zero.
    async fn count_hash_references(
        &self,
        owner_id: OwnerId,
        hash: &ContentHash,
    ) -> AppResult<u64>;

    /// Live current records placed in a folder.
    async fn list_in_folder(&self, folder_id: FolderId) -> AppResult<Vec<FileRecord>>;

    /// Soft-delete the current record of one lineage. Fails `NotFound`
    /// when the lineage is absent or already deleted.
    async fn soft_delete_file(&self, file_id: FileId, at: DateTime<Utc>) -> AppResult<FileRecord>;

    /// Soft-delete every live current record in the given folders,
    /// idempotently. Returns the affected `(file, owner)` pairs.
    async fn soft_delete_in_folders(
        &self,
        folder_ids: &[FolderId],
        at: DateTime<Utc>,
    ) -> AppResult<Vec<(FileId, OwnerId)>>;

    /// Record a read of the current content.
    async fn touch_last_accessed(&self, file_id: FileId, at: DateTime<Utc>) -> AppResult<()>;
}

/// Persistence for the folder tree.
#[async_trait]
pub trait FolderStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a folder. Fails with `Conflict` when a live folder already
    /// occupies the owner's path.
    async fn insert(&self, folder: &FolderRecord) -> AppResult<()>;

    /// Find a folder by id.
    async fn find(&self, id: FolderId) -> AppResult<Option<FolderRecord>>;

    /// Find a live folder by owner and materialized path.
    async fn find_by_path(&self, owner_id: OwnerId, path: &str) -> AppResult<Option<FolderRecord>>;

    /// Live direct children, via the parent-reference index.
    async fn list_children(&self, parent_id: FolderId) -> AppResult<Vec<FolderRecord>>;

    /// Live root folders of an owner.
    async fn list_roots(&self, owner_id: OwnerId) -> AppResult<Vec<FolderRecord>>;

    /// Live folders whose path starts with the prefix, via the
    /// path-prefix index. The prefix must end with the separator so
    /// `/ab` does not match `/abc`.
    async fn list_subtree(
        &self,
        owner_id: OwnerId,
        path_prefix: &str,
    ) -> AppResult<Vec<FolderRecord>>;

    /// Persist name/parent/path changes of one folder.
    async fn update(&self, folder: &FolderRecord) -> AppResult<()>;

    /// Rewrite the path prefix of every live descendant. Idempotent:
    /// already-rewritten paths are left alone, so a partial failure can
    /// be retried. Returns rows changed.
    async fn rewrite_subtree_paths(
        &self,
        owner_id: OwnerId,
        old_prefix: &str,
        new_prefix: &str,
    ) -> AppResult<u64>;

    /// Set the soft-delete timestamp on the given folders where not
    /// already set. Returns rows changed.
    async fn soft_delete(&self, ids: &[FolderId], at: DateTime<Utc>) -> AppResult<u64>;
}

/// Persistence for upload sessions.
///
/// All state transitions are compare-and-swap per session: exactly one
/// completion attempt proceeds, and abort races resolve to a single
/// winner.
#[async_trait]
pub trait UploadStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a freshly initiated session.
    async fn insert(&self, session: &UploadSession) -> AppResult<()>;

    /// Find a session by id.
    async fn find(&self, id: UploadId) -> AppResult<Option<UploadSession>>;

    /// Record a chunk descriptor, atomically per session. A duplicate
    /// index with the same etag is accepted silently; a duplicate index
    /// with a different etag is `Conflict`; a terminal or completing
    /// session is `InvalidState`. Moves `Initiated` to `InProgress` and
    /// bumps the activity timestamp.
    async fn record_chunk(
        &self,
        id: UploadId,
        chunk: &ChunkDescriptor,
    ) -> AppResult<ChunkRecordOutcome>;

    /// Claim the exclusive right to complete. Verifies the received index
    /// set exactly equals `{1..expected_chunks}` (`InvalidState` listing
    /// the missing indices otherwise, without a state change), then moves
    /// the session to `Completing`. A completed session returns
    /// [`CompletionClaim::AlreadyCompleted`]; an aborted one is
    /// `InvalidState`; a concurrent claim is `Conflict`.
    async fn claim_completion(&self, id: UploadId) -> AppResult<CompletionClaim>;

    /// `Completing` → `Completed`, recording the produced lineage.
    async fn finish_completion(&self, id: UploadId, file_id: FileId) -> AppResult<()>;

    /// `Completing` → `InProgress`, after a finalize failure the client
    /// may recover from. Only the completion claim holder calls this.
    async fn yield_completion(&self, id: UploadId) -> AppResult<()>;

    /// `Completing` → `Aborted`, when the claim holder gives up (size or
    /// hash mismatch). Only the completion claim holder calls this.
    async fn abort_from_completion(&self, id: UploadId) -> AppResult<()>;

    /// Claim an external abort: `Initiated`/`InProgress` → `Aborted`,
    /// returning the prior session for cleanup. An already-aborted or
    /// missing session returns `None` (idempotent); a completed session
    /// is `InvalidState`; a session mid-completion is `Conflict`.
    async fn claim_abort(&self, id: UploadId) -> AppResult<Option<UploadSession>>;

    /// Remove a session record.
    async fn delete(&self, id: UploadId) -> AppResult<()>;

    /// Sessions the sweeper should act on: non-terminal sessions past
    /// expiry or idle beyond the window, plus terminal sessions past
    /// expiry (record garbage collection).
    async fn find_sweepable(
        &self,
        now: DateTime<Utc>,
        idle_window: Duration,
    ) -> AppResult<Vec<UploadSession>>;
}

/// Persistence for quota accounts.
///
/// Every method is atomic per owner; two concurrent reservations can
/// never both pass a check that together they would fail.
#[async_trait]
pub trait QuotaStore: Send + Sync + std::fmt::Debug + 'static {
    /// Fetch the owner's account, creating it with the default limit on
    /// first use.
    async fn get_or_create(&self, owner_id: OwnerId, default_limit: i64)
    -> AppResult<QuotaAccount>;

    /// Replace the owner's quota limit.
    async fn set_limit(&self, owner_id: OwnerId, limit_bytes: i64) -> AppResult<QuotaAccount>;

    /// Record a reservation if `used + reserved + bytes <= limit`, else
    /// fail with `QuotaExceeded` carrying usage and limit. Creates the
    /// account with the default limit on first use.
    async fn reserve(
        &self,
        reservation: &Reservation,
        default_limit: i64,
    ) -> AppResult<QuotaAccount>;

    /// Convert a reservation into committed usage of `actual_bytes`
    /// (the blob store's size, which may differ from the declared size).
    /// Fails `NotFound` for an unknown reservation.
    async fn commit(
        &self,
        owner_id: OwnerId,
        reservation_id: ReservationId,
        actual_bytes: i64,
    ) -> AppResult<QuotaAccount>;

    /// Cancel a reservation without touching committed usage. A missing
    /// reservation is a no-op so that abort paths stay idempotent.
    async fn release(&self, owner_id: OwnerId, reservation_id: ReservationId) -> AppResult<()>;

    /// Subtract committed usage (version pruning), clamped at zero.
    async fn credit_usage(&self, owner_id: OwnerId, bytes: i64) -> AppResult<QuotaAccount>;
}
