//! Version store — the append-only version chain per file, deduplication,
//! restore, and retention pruning.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};

use drive_core::config::retention::RetentionConfig;
use drive_core::error::AppError;
use drive_core::events::StorageEvent;
use drive_core::result::AppResult;
use drive_core::traits::blob::{BlobStore, ByteStream};
use drive_core::traits::events::EventPublisher;
use drive_core::types::{BlobLocation, ContentHash, FileId, FileRecordId, FileVersionId, OwnerId};
use drive_database::stores::FileStore;
use drive_entity::file::{FileRecord, FileVersionRecord, NewFile, ProcessingStatus};

use crate::quota::QuotaLedger;

/// Outcome of a prune pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    /// Version rows removed.
    pub versions_removed: u64,
    /// Blobs physically deleted (reference count reached zero).
    pub blobs_deleted: u64,
    /// Logical bytes credited back to the owner's quota.
    pub bytes_credited: i64,
}

/// Owns [`FileRecord`] lineages and their version chains.
///
/// Mutations of one file's chain are serialized through a per-file lock
/// plus an optimistic version check in the store, so version numbers are
/// assigned gaplessly even under concurrent writers, and a reader always
/// observes a prefix-consistent 1..N sequence.
pub struct VersionStore {
    /// File record store.
    files: Arc<dyn FileStore>,
    /// Blob store for content reads and physical deletes.
    blobs: Arc<dyn BlobStore>,
    /// Quota ledger, consulted by restore and credited by prune.
    ledger: Arc<QuotaLedger>,
    /// Event publisher.
    publisher: Arc<dyn EventPublisher>,
    /// Per-file chain locks.
    chain_locks: DashMap<FileId, Arc<tokio::sync::Mutex<()>>>,
}

impl std::fmt::Debug for VersionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionStore").finish()
    }
}

impl VersionStore {
    /// Creates a new version store.
    pub fn new(
        files: Arc<dyn FileStore>,
        blobs: Arc<dyn BlobStore>,
        ledger: Arc<QuotaLedger>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            files,
            blobs,
            ledger,
            publisher,
            chain_locks: DashMap::new(),
        }
    }

    fn chain_lock(&self, file_id: FileId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.chain_locks
                .entry(file_id)
                .or_default()
                .value(),
        )
    }

    async fn publish_version_created(&self, record: &FileRecord) {
        let event = StorageEvent::VersionCreated {
            file_id: record.file_id,
            version_number: record.version,
            owner_id: record.owner_id,
            size_bytes: record.size_bytes,
            content_hash: record.content_hash.clone(),
        };
        if let Err(e) = self.publisher.publish(event).await {
            warn!(file_id = %record.file_id, error = %e, "Failed to publish version event");
        }
    }

    /// The live current record of a lineage.
    async fn require_current(&self, file_id: FileId) -> AppResult<FileRecord> {
        self.files
            .find_current(file_id)
            .await?
            .filter(|r| r.is_active())
            .ok_or_else(|| AppError::not_found(format!("File {file_id} not found")))
    }

    /// Create version 1 of a new file.
    ///
    /// Fails with `Conflict` when a file already exists at the same
    /// storage key — the idempotency guard against retried upload
    /// completions.
    pub async fn create_initial_version(
        &self,
        new_file: NewFile,
        location: BlobLocation,
        hash: ContentHash,
        size_bytes: i64,
    ) -> AppResult<FileRecord> {
        let now = Utc::now();
        let file_id = FileId::new();

        let record = FileRecord {
            id: FileRecordId::new(),
            file_id,
            owner_id: new_file.owner_id,
            name: new_file.name,
            folder_id: new_file.folder_id,
            bucket: location.bucket.clone(),
            key: location.key.clone(),
            size_bytes,
            content_type: new_file.content_type,
            content_hash: hash.clone(),
            version: 1,
            is_current: true,
            parent_version: None,
            processing_status: ProcessingStatus::Pending,
            metadata: new_file.metadata.to_json_value(),
            deleted_at: None,
            last_accessed_at: None,
            created_at: now,
            updated_at: now,
        };
        let version_row = FileVersionRecord {
            id: FileVersionId::new(),
            file_id,
            version_number: 1,
            bucket: location.bucket,
            key: location.key,
            size_bytes,
            content_hash: hash,
            description: None,
            created_by: record.owner_id,
            created_at: now,
            restored_at: None,
        };

        self.files.insert_initial(&record, &version_row).await?;

        info!(
            file_id = %file_id,
            owner_id = %record.owner_id,
            name = %record.name,
            size = size_bytes,
            "File created at version 1"
        );
        self.publish_version_created(&record).await;
        Ok(record)
    }

    /// Append the next version to an existing file.
    ///
    /// When the owner already stores content with this hash, the new
    /// version points at the existing blob and the freshly uploaded
    /// staging object is discarded — the version record is still created,
    /// history is never skipped.
    pub async fn create_next_version(
        &self,
        file_id: FileId,
        uploaded: BlobLocation,
        hash: ContentHash,
        size_bytes: i64,
        description: Option<String>,
        actor: OwnerId,
    ) -> AppResult<FileRecord> {
        let lock = self.chain_lock(file_id);
        let _guard = lock.lock().await;

        let current = self.require_current(file_id).await?;
        let location = self
            .resolve_dedup_location(current.owner_id, &hash, uploaded)
            .await?;

        let record = self
            .transition(&current, location, hash, size_bytes, description, actor)
            .await?;
        self.publish_version_created(&record).await;
        Ok(record)
    }

    /// Promote a historical version back to current, as a new version.
    ///
    /// Restoring never reuses old version numbers: the result is version
    /// `max + 1` sharing the historical content, and the source version's
    /// restoration timestamp is stamped. Aside from its hash matching a
    /// historical one, the restore is indistinguishable from an update.
    pub async fn restore_version(
        &self,
        file_id: FileId,
        version_number: i32,
        actor: OwnerId,
    ) -> AppResult<FileRecord> {
        let lock = self.chain_lock(file_id);
        let _guard = lock.lock().await;

        let current = self.require_current(file_id).await?;
        let target = self
            .files
            .find_version(file_id, version_number)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "Version {version_number} of file {file_id} not found"
                ))
            })?;

        // Restore is a size-changing operation: the new version counts
        // against quota like any other.
        let reservation = self
            .ledger
            .reserve(current.owner_id, target.size_bytes)
            .await?;

        let result = self
            .transition(
                &current,
                target.location(),
                target.content_hash.clone(),
                target.size_bytes,
                Some(format!("Restored from version {version_number}")),
                actor,
            )
            .await;

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                if let Err(release_err) = self
                    .ledger
                    .release(current.owner_id, reservation.id)
                    .await
                {
                    warn!(file_id = %file_id, error = %release_err, "Failed to release restore reservation");
                }
                return Err(e);
            }
        };

        self.files
            .mark_version_restored(file_id, version_number, Utc::now())
            .await?;
        self.ledger
            .commit(current.owner_id, reservation.id, target.size_bytes)
            .await?;

        info!(
            file_id = %file_id,
            restored_version = version_number,
            new_version = record.version,
            "Version restored"
        );
        self.publish_version_created(&record).await;
        Ok(record)
    }

    /// Delete version rows beyond the retention policy.
    ///
    /// The current version always survives. Physical blobs are deleted
    /// only once no surviving record — current or retained version —
    /// references their hash; pruned logical bytes are credited back to
    /// the owner's quota.
    pub async fn prune_old_versions(
        &self,
        file_id: FileId,
        policy: &RetentionConfig,
    ) -> AppResult<PruneOutcome> {
        let lock = self.chain_lock(file_id);
        let _guard = lock.lock().await;

        let current = self
            .files
            .find_current(file_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File {file_id} not found")))?;
        let versions = self.files.list_versions(file_id).await?;

        let keep_newest = policy.max_versions_per_file as usize;
        let age_cutoff = policy
            .max_age_days
            .map(|days| Utc::now() - chrono::Duration::days(days as i64));

        let total = versions.len();
        let prunable: Vec<&FileVersionRecord> = versions
            .iter()
            .enumerate()
            .filter(|(idx, v)| {
                if v.version_number == current.version {
                    return false;
                }
                let beyond_count = total - idx > keep_newest;
                let beyond_age = age_cutoff.is_some_and(|cutoff| v.created_at < cutoff);
                beyond_count || beyond_age
            })
            .map(|(_, v)| v)
            .collect();

        if prunable.is_empty() {
            return Ok(PruneOutcome::default());
        }

        let numbers: Vec<i32> = prunable.iter().map(|v| v.version_number).collect();
        let mut by_hash: HashMap<ContentHash, BlobLocation> = HashMap::new();
        let mut bytes_credited = 0i64;
        for v in &prunable {
            by_hash.insert(v.content_hash.clone(), v.location());
            bytes_credited += v.size_bytes;
        }

        let versions_removed = self.files.delete_versions(file_id, &numbers).await?;

        // Rows are gone; whatever hashes now have zero surviving
        // references lose their physical blob.
        let mut blobs_deleted = 0u64;
        for (hash, location) in by_hash {
            let references = self
                .files
                .count_hash_references(current.owner_id, &hash)
                .await?;
            if references == 0 {
                self.blobs.delete_object(&location).await?;
                blobs_deleted += 1;
            }
        }

        self.ledger.credit(current.owner_id, bytes_credited).await?;

        info!(
            file_id = %file_id,
            versions_removed,
            blobs_deleted,
            bytes_credited,
            "Old versions pruned"
        );
        Ok(PruneOutcome {
            versions_removed,
            blobs_deleted,
            bytes_credited,
        })
    }

    /// List a file's versions, ascending by number.
    pub async fn list_versions(&self, file_id: FileId) -> AppResult<Vec<FileVersionRecord>> {
        self.require_current(file_id).await?;
        self.files.list_versions(file_id).await
    }

    /// The live current record.
    pub async fn current(&self, file_id: FileId) -> AppResult<FileRecord> {
        self.require_current(file_id).await
    }

    /// Open the current content for reading and record the access.
    pub async fn read_current(&self, file_id: FileId) -> AppResult<(FileRecord, ByteStream)> {
        let record = self.require_current(file_id).await?;
        let stream = self.blobs.get_object(&record.location()).await?;
        self.files
            .touch_last_accessed(file_id, Utc::now())
            .await?;
        Ok((record, stream))
    }

    /// A presigned download URL for the current content.
    pub async fn presign_current(
        &self,
        file_id: FileId,
        ttl: std::time::Duration,
    ) -> AppResult<String> {
        let record = self.require_current(file_id).await?;
        let url = self.blobs.presign_download(&record.location(), ttl).await?;
        self.files
            .touch_last_accessed(file_id, Utc::now())
            .await?;
        Ok(url)
    }

    /// Soft-delete a file and emit the deletion event.
    pub async fn delete_file(&self, file_id: FileId) -> AppResult<FileRecord> {
        let record = self.files.soft_delete_file(file_id, Utc::now()).await?;

        info!(file_id = %file_id, owner_id = %record.owner_id, "File soft-deleted");
        if let Err(e) = self
            .publisher
            .publish(StorageEvent::FileDeleted {
                file_id,
                owner_id: record.owner_id,
            })
            .await
        {
            warn!(file_id = %file_id, error = %e, "Failed to publish deletion event");
        }
        Ok(record)
    }

    /// Pick the location a new version should reference: an existing
    /// per-owner blob with the same hash when one exists (the staging
    /// upload is then discarded), else the uploaded location itself.
    async fn resolve_dedup_location(
        &self,
        owner_id: OwnerId,
        hash: &ContentHash,
        uploaded: BlobLocation,
    ) -> AppResult<BlobLocation> {
        match self.files.find_location_by_hash(owner_id, hash).await? {
            Some(existing) if existing != uploaded => {
                if let Err(e) = self.blobs.delete_object(&uploaded).await {
                    // The orphaned staging object costs space, not
                    // correctness; leave it for maintenance.
                    warn!(location = %uploaded, error = %e, "Failed to discard duplicate upload");
                }
                info!(owner_id = %owner_id, hash = %hash, "Content deduplicated");
                Ok(existing)
            }
            _ => Ok(uploaded),
        }
    }

    /// Build and atomically apply the successor record and version row.
    async fn transition(
        &self,
        current: &FileRecord,
        location: BlobLocation,
        hash: ContentHash,
        size_bytes: i64,
        description: Option<String>,
        actor: OwnerId,
    ) -> AppResult<FileRecord> {
        let now = Utc::now();
        let next_version = current.version + 1;

        let next = FileRecord {
            id: FileRecordId::new(),
            file_id: current.file_id,
            owner_id: current.owner_id,
            name: current.name.clone(),
            folder_id: current.folder_id,
            bucket: location.bucket.clone(),
            key: location.key.clone(),
            size_bytes,
            content_type: current.content_type.clone(),
            content_hash: hash.clone(),
            version: next_version,
            is_current: true,
            parent_version: Some(current.version),
            processing_status: ProcessingStatus::Pending,
            metadata: current.metadata.clone(),
            deleted_at: None,
            last_accessed_at: None,
            created_at: now,
            updated_at: now,
        };
        let version_row = FileVersionRecord {
            id: FileVersionId::new(),
            file_id: current.file_id,
            version_number: next_version,
            bucket: location.bucket,
            key: location.key,
            size_bytes,
            content_hash: hash,
            description,
            created_by: actor,
            created_at: now,
            restored_at: None,
        };

        self.files
            .transition_version(current.file_id, current.version, &next, &version_row)
            .await?;

        info!(
            file_id = %current.file_id,
            version = next_version,
            size = size_bytes,
            "Version created"
        );
        Ok(next)
    }
}
