//! In-process [`FileRepository`] for tests and local tooling.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use filestore_shared::types::{FileId, TenantId};

use super::error::FileError;
use super::repository::FileRepository;
use super::types::{
    ClaimToken, ClaimedFile, FileRecord, FileStatus, ListFilter, NewFileRecord, Owner,
    StorageUsage,
};

/// Mutex-guarded record table with the same conditional-update semantics as
/// the SQL repository.
#[derive(Debug, Default)]
pub struct InMemoryFileRepository {
    rows: Mutex<HashMap<FileId, FileRecord>>,
    reject_inserts: Mutex<bool>,
}

impl InMemoryFileRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert fail, simulating a metadata-store outage.
    pub fn reject_inserts(&self, reject: bool) {
        if let Ok(mut flag) = self.reject_inserts.lock() {
            *flag = reject;
        }
    }

    /// Backdate a record, for exercising TTL-based sweeps.
    pub fn set_created_at(&self, id: FileId, created_at: DateTime<Utc>) {
        if let Ok(mut rows) = self.rows.lock()
            && let Some(row) = rows.get_mut(&id)
        {
            row.created_at = created_at;
        }
    }

    /// Look up a record regardless of tenant.
    #[must_use]
    pub fn get(&self, id: FileId) -> Option<FileRecord> {
        self.rows.lock().ok()?.get(&id).cloned()
    }

    /// Number of records in any status.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    /// Returns true if no records exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rows(&self) -> Result<MutexGuard<'_, HashMap<FileId, FileRecord>>, FileError> {
        self.rows
            .lock()
            .map_err(|_| FileError::repository("record table poisoned"))
    }

    /// Apply `settle` to the `deleting` rows among `ids` held by `token`,
    /// releasing the hold.
    fn settle(
        &self,
        ids: &[FileId],
        token: ClaimToken,
        now: DateTime<Utc>,
        settle: impl Fn(&mut FileRecord),
    ) -> Result<u64, FileError> {
        let mut rows = self.rows()?;
        let mut affected = 0;
        for id in ids {
            if let Some(row) = rows.get_mut(id)
                && row.status == FileStatus::Deleting
                && row.claim == Some(token)
            {
                settle(row);
                row.claim = None;
                row.updated_at = now;
                affected += 1;
            }
        }
        Ok(affected)
    }
}

fn claim(row: &mut FileRecord, token: ClaimToken, now: DateTime<Utc>) -> ClaimedFile {
    row.status = FileStatus::Deleting;
    row.claim = Some(token);
    row.updated_at = now;
    claimed(row)
}

fn claimed(row: &FileRecord) -> ClaimedFile {
    ClaimedFile {
        id: row.id,
        tenant_id: row.tenant_id,
        storage_key: row.storage_key.clone(),
        bucket: row.bucket.clone(),
    }
}

fn newest_first(mut records: Vec<FileRecord>) -> Vec<FileRecord> {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
    records
}

impl FileRepository for InMemoryFileRepository {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, FileError> {
        if self.reject_inserts.lock().map(|flag| *flag).unwrap_or(false) {
            return Err(FileError::repository("insert rejected"));
        }

        let mut rows = self.rows()?;
        if rows.values().any(|r| r.storage_key == record.storage_key) {
            return Err(FileError::repository(format!(
                "duplicate storage key: {}",
                record.storage_key
            )));
        }

        let row = FileRecord {
            id: record.id,
            tenant_id: record.tenant_id,
            original_name: record.original_name,
            declared_content_type: record.declared_content_type,
            detected_content_type: record.detected_content_type,
            size: record.size,
            checksum: record.checksum,
            storage_key: record.storage_key,
            storage_backend: record.storage_backend,
            bucket: record.bucket,
            owner: None,
            attached_at: None,
            status: FileStatus::Uploaded,
            claim: None,
            deleted_at: None,
            metadata: record.metadata,
            created_at: record.created_at,
            updated_at: record.created_at,
        };
        rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find(&self, tenant_id: TenantId, id: FileId) -> Result<Option<FileRecord>, FileError> {
        Ok(self
            .rows()?
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        filter: &ListFilter,
    ) -> Result<Vec<FileRecord>, FileError> {
        let records = self
            .rows()?
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| {
                filter
                    .owner_type
                    .is_none_or(|t| r.owner.is_some_and(|o| o.owner_type == t))
            })
            .cloned()
            .collect();

        let limit = usize::try_from(filter.limit()).unwrap_or(usize::MAX);
        Ok(newest_first(records).into_iter().take(limit).collect())
    }

    async fn find_by_owner(
        &self,
        tenant_id: TenantId,
        owner: Owner,
    ) -> Result<Vec<FileRecord>, FileError> {
        let records = self
            .rows()?
            .values()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.status == FileStatus::Attached
                    && r.owner == Some(owner)
            })
            .cloned()
            .collect();
        Ok(newest_first(records))
    }

    async fn attach(
        &self,
        tenant_id: TenantId,
        id: FileId,
        owner: Owner,
        now: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, FileError> {
        let mut rows = self.rows()?;
        Ok(rows
            .get_mut(&id)
            .filter(|r| r.tenant_id == tenant_id && r.status == FileStatus::Uploaded)
            .map(|row| {
                row.status = FileStatus::Attached;
                row.owner = Some(owner);
                row.attached_at = Some(now);
                row.updated_at = now;
                row.clone()
            }))
    }

    async fn detach(
        &self,
        tenant_id: TenantId,
        id: FileId,
        now: DateTime<Utc>,
    ) -> Result<bool, FileError> {
        let mut rows = self.rows()?;
        let Some(row) = rows
            .get_mut(&id)
            .filter(|r| r.tenant_id == tenant_id && r.status == FileStatus::Attached)
        else {
            return Ok(false);
        };
        row.status = FileStatus::Uploaded;
        row.owner = None;
        row.attached_at = None;
        row.updated_at = now;
        Ok(true)
    }

    async fn mark_deleting(
        &self,
        tenant_id: TenantId,
        id: FileId,
        now: DateTime<Utc>,
    ) -> Result<bool, FileError> {
        let mut rows = self.rows()?;
        let Some(row) = rows
            .get_mut(&id)
            .filter(|r| r.tenant_id == tenant_id && r.status.is_deletable())
        else {
            return Ok(false);
        };
        row.status = FileStatus::Deleting;
        row.deleted_at = Some(now);
        row.updated_at = now;
        Ok(true)
    }

    async fn mark_owner_deleting(
        &self,
        tenant_id: TenantId,
        owner: Owner,
        now: DateTime<Utc>,
    ) -> Result<u64, FileError> {
        let mut rows = self.rows()?;
        let mut affected = 0;
        for row in rows.values_mut().filter(|r| {
            r.tenant_id == tenant_id && r.status == FileStatus::Attached && r.owner == Some(owner)
        }) {
            row.status = FileStatus::Deleting;
            row.deleted_at = Some(now);
            row.updated_at = now;
            affected += 1;
        }
        Ok(affected)
    }

    async fn claim_orphans(
        &self,
        cutoff: DateTime<Utc>,
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedFile>, FileError> {
        let mut rows = self.rows()?;
        let mut claims = Vec::new();
        for row in rows
            .values_mut()
            .filter(|r| r.status == FileStatus::Uploaded && r.created_at < cutoff)
        {
            row.deleted_at = Some(now);
            claims.push(claim(row, token, now));
        }
        Ok(claims)
    }

    async fn claim_tenant(
        &self,
        tenant_id: TenantId,
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedFile>, FileError> {
        let mut rows = self.rows()?;
        let mut claims = Vec::new();
        for row in rows
            .values_mut()
            .filter(|r| r.tenant_id == tenant_id && r.status.is_deletable())
        {
            row.deleted_at = Some(now);
            claims.push(claim(row, token, now));
        }
        Ok(claims)
    }

    async fn claim_deleting(
        &self,
        limit: u64,
        stale_before: DateTime<Utc>,
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedFile>, FileError> {
        let mut rows = self.rows()?;
        let mut free: Vec<&mut FileRecord> = rows
            .values_mut()
            .filter(|r| {
                r.status == FileStatus::Deleting
                    && (r.claim.is_none() || r.updated_at < stale_before)
            })
            .collect();
        free.sort_by_key(|r| (r.updated_at, r.id.0));

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(free
            .into_iter()
            .take(limit)
            .map(|row| claim(row, token, now))
            .collect())
    }

    async fn mark_deleted(
        &self,
        ids: &[FileId],
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<u64, FileError> {
        self.settle(ids, token, now, |row| row.status = FileStatus::Deleted)
    }

    async fn release_claims(
        &self,
        ids: &[FileId],
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<u64, FileError> {
        self.settle(ids, token, now, |row| {
            row.status = FileStatus::Uploaded;
            row.owner = None;
            row.attached_at = None;
            row.deleted_at = None;
        })
    }

    async fn defer_retry(
        &self,
        ids: &[FileId],
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<u64, FileError> {
        self.settle(ids, token, now, |_| {})
    }

    async fn usage(&self, tenant_id: TenantId) -> Result<StorageUsage, FileError> {
        let rows = self.rows()?;
        let mut usage = StorageUsage::default();
        for row in rows.values().filter(|r| r.tenant_id == tenant_id) {
            *usage.by_status.entry(row.status).or_default() += 1;
            if row.status == FileStatus::Deleted {
                continue;
            }
            usage.total_files += 1;
            usage.total_size += row.size;
            if let (FileStatus::Attached, Some(owner)) = (row.status, row.owner) {
                *usage.by_owner_type.entry(owner.owner_type).or_default() += 1;
            }
        }
        Ok(usage)
    }
}
