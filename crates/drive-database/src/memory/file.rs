//! In-memory file store.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use drive_core::error::AppError;
use drive_core::result::AppResult;
use drive_core::types::{BlobLocation, ContentHash, FileId, FolderId, OwnerId};
use drive_entity::file::{FileRecord, FileVersionRecord};

use crate::stores::FileStore;

/// One logical file's rows: every record of the lineage plus its version
/// chain, guarded by a single lock so transitions are atomic.
#[derive(Debug, Default)]
struct Lineage {
    records: Vec<FileRecord>,
    versions: BTreeMap<i32, FileVersionRecord>,
}

impl Lineage {
    fn current(&self) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.is_current)
    }

    fn current_mut(&mut self) -> Option<&mut FileRecord> {
        self.records.iter_mut().find(|r| r.is_current)
    }
}

/// In-memory [`FileStore`] backed by per-lineage locks.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    lineages: DashMap<FileId, Arc<RwLock<Lineage>>>,
    /// `bucket/key` of version-1 records, the deterministic-key
    /// idempotency guard.
    initial_keys: DashMap<String, FileId>,
}

impl MemoryFileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lineage(&self, file_id: FileId) -> Option<Arc<RwLock<Lineage>>> {
        self.lineages.get(&file_id).map(|e| Arc::clone(e.value()))
    }

    fn storage_key(record: &FileRecord) -> String {
        format!("{}/{}", record.bucket, record.key)
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn insert_initial(
        &self,
        record: &FileRecord,
        version: &FileVersionRecord,
    ) -> AppResult<()> {
        use dashmap::mapref::entry::Entry;

        match self.initial_keys.entry(Self::storage_key(record)) {
            Entry::Occupied(_) => {
                return Err(AppError::conflict(format!(
                    "A file already exists at storage key {}/{}",
                    record.bucket, record.key
                )));
            }
            Entry::Vacant(e) => {
                e.insert(record.file_id);
            }
        }

        let mut lineage = Lineage::default();
        lineage.records.push(record.clone());
        lineage.versions.insert(version.version_number, version.clone());
        self.lineages
            .insert(record.file_id, Arc::new(RwLock::new(lineage)));
        Ok(())
    }

    async fn find_current(&self, file_id: FileId) -> AppResult<Option<FileRecord>> {
        Ok(self
            .lineage(file_id)
            .and_then(|l| l.read().unwrap().current().cloned()))
    }

    async fn transition_version(
        &self,
        file_id: FileId,
        expected_version: i32,
        next: &FileRecord,
        version_row: &FileVersionRecord,
    ) -> AppResult<()> {
        let lineage = self
            .lineage(file_id)
            .ok_or_else(|| AppError::not_found(format!("File {file_id} not found")))?;
        let mut lineage = lineage.write().unwrap();

        let current = lineage
            .current_mut()
            .ok_or_else(|| AppError::not_found(format!("File {file_id} has no current record")))?;
        if current.version != expected_version {
            return Err(AppError::conflict(format!(
                "File {file_id} moved to version {} while transition from {expected_version} was in flight",
                current.version
            )));
        }

        current.is_current = false;
        current.updated_at = next.created_at;
        lineage.records.push(next.clone());
        lineage
            .versions
            .insert(version_row.version_number, version_row.clone());
        Ok(())
    }

    async fn list_versions(&self, file_id: FileId) -> AppResult<Vec<FileVersionRecord>> {
        Ok(self
            .lineage(file_id)
            .map(|l| l.read().unwrap().versions.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn find_version(
        &self,
        file_id: FileId,
        version_number: i32,
    ) -> AppResult<Option<FileVersionRecord>> {
        Ok(self
            .lineage(file_id)
            .and_then(|l| l.read().unwrap().versions.get(&version_number).cloned()))
    }

    async fn mark_version_restored(
        &self,
        file_id: FileId,
        version_number: i32,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let lineage = self
            .lineage(file_id)
            .ok_or_else(|| AppError::not_found(format!("File {file_id} not found")))?;
        let mut lineage = lineage.write().unwrap();
        let version = lineage.versions.get_mut(&version_number).ok_or_else(|| {
            AppError::not_found(format!("Version {version_number} of file {file_id} not found"))
        })?;
        version.restored_at = Some(at);
        Ok(())
    }

    async fn delete_versions(&self, file_id: FileId, version_numbers: &[i32]) -> AppResult<u64> {
        let Some(lineage) = self.lineage(file_id) else {
            return Ok(0);
        };
        let mut lineage = lineage.write().unwrap();
        let mut removed = 0;
        for number in version_numbers {
            if lineage.versions.remove(number).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn find_location_by_hash(
        &self,
        owner_id: OwnerId,
        hash: &ContentHash,
    ) -> AppResult<Option<BlobLocation>> {
        for entry in self.lineages.iter() {
            let lineage = entry.value().read().unwrap();
            if !lineage.records.iter().any(|r| r.owner_id == owner_id) {
                continue;
            }
            if let Some(v) = lineage.versions.values().find(|v| &v.content_hash == hash) {
                return Ok(Some(v.location()));
            }
            if let Some(r) = lineage.records.iter().find(|r| &r.content_hash == hash) {
                return Ok(Some(r.location()));
            }
        }
        Ok(None)
    }

    async fn count_hash_references(
        &self,
        owner_id: OwnerId,
        hash: &ContentHash,
    ) -> AppResult<u64> {
        let mut count = 0u64;
        for entry in self.lineages.iter() {
            let lineage = entry.value().read().unwrap();
            if !lineage.records.iter().any(|r| r.owner_id == owner_id) {
                continue;
            }
            count += lineage
                .records
                .iter()
                .filter(|r| r.is_current && &r.content_hash == hash)
                .count() as u64;
            count += lineage
                .versions
                .values()
                .filter(|v| &v.content_hash == hash)
                .count() as u64;
        }
        Ok(count)
    }

    async fn list_in_folder(&self, folder_id: FolderId) -> AppResult<Vec<FileRecord>> {
        let mut records: Vec<FileRecord> = self
            .lineages
            .iter()
            .filter_map(|entry| {
                let lineage = entry.value().read().unwrap();
                lineage
                    .current()
                    .filter(|r| r.folder_id == Some(folder_id) && r.is_active())
                    .cloned()
            })
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    async fn soft_delete_file(&self, file_id: FileId, at: DateTime<Utc>) -> AppResult<FileRecord> {
        let lineage = self
            .lineage(file_id)
            .ok_or_else(|| AppError::not_found(format!("File {file_id} not found")))?;
        let mut lineage = lineage.write().unwrap();
        let current = lineage
            .current_mut()
            .filter(|r| r.is_active())
            .ok_or_else(|| AppError::not_found(format!("File {file_id} not found")))?;
        current.deleted_at = Some(at);
        current.updated_at = at;
        Ok(current.clone())
    }

    async fn soft_delete_in_folders(
        &self,
        folder_ids: &[FolderId],
        at: DateTime<Utc>,
    ) -> AppResult<Vec<(FileId, OwnerId)>> {
        let mut affected = Vec::new();
        for entry in self.lineages.iter() {
            let mut lineage = entry.value().write().unwrap();
            if let Some(current) = lineage.current_mut() {
                let in_scope = current
                    .folder_id
                    .is_some_and(|f| folder_ids.contains(&f));
                if in_scope && current.is_active() {
                    current.deleted_at = Some(at);
                    current.updated_at = at;
                    affected.push((current.file_id, current.owner_id));
                }
            }
        }
        Ok(affected)
    }

    async fn touch_last_accessed(&self, file_id: FileId, at: DateTime<Utc>) -> AppResult<()> {
        if let Some(lineage) = self.lineage(file_id) {
            if let Some(current) = lineage.write().unwrap().current_mut() {
                current.last_accessed_at = Some(at);
            }
        }
        Ok(())
    }
}
