//! Ownership registry: attach, detach, soft-delete and serve files.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use filestore_shared::types::{FileId, TenantId};
use tracing::{debug, info, warn};

use super::error::FileError;
use super::repository::FileRepository;
use super::types::{
    FileRecord, FileStatus, ListFilter, Owner, ReadOptions, ReadResult, StorageUsage,
};
use crate::storage::StoragePort;

/// Drives the `uploaded ⇄ attached → deleting` part of the lifecycle.
///
/// Every transition is a single conditional update in the repository. When
/// it affects no row the record is re-read to tell a missing file from one
/// in the wrong status.
pub struct OwnershipRegistry<R: FileRepository, S: StoragePort> {
    repo: Arc<R>,
    storage: Arc<S>,
    redirect_ttl: Duration,
}

impl<R: FileRepository, S: StoragePort> OwnershipRegistry<R, S> {
    /// Create a new registry.
    #[must_use]
    pub fn new(repo: Arc<R>, storage: Arc<S>, redirect_ttl: Duration) -> Self {
        Self {
            repo,
            storage,
            redirect_ttl,
        }
    }

    /// Attach an uploaded file to its owner.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist for this tenant, and
    /// `Conflict` if it is not in `uploaded` (already attached, or deleted).
    pub async fn attach(
        &self,
        tenant_id: TenantId,
        id: FileId,
        owner: Owner,
    ) -> Result<FileRecord, FileError> {
        match self.repo.attach(tenant_id, id, owner, Utc::now()).await? {
            Some(record) => {
                info!(
                    file_id = %id,
                    tenant_id = %tenant_id,
                    owner = %owner,
                    "File attached"
                );
                Ok(record)
            }
            None => Err(self.lost_race(tenant_id, id).await),
        }
    }

    /// Release a file from its owner. It becomes an orphan candidate again.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Conflict` if the file is not attached.
    pub async fn detach(&self, tenant_id: TenantId, id: FileId) -> Result<(), FileError> {
        if self.repo.detach(tenant_id, id, Utc::now()).await? {
            info!(file_id = %id, tenant_id = %tenant_id, "File detached");
            Ok(())
        } else {
            Err(self.lost_race(tenant_id, id).await)
        }
    }

    /// Soft-delete one file. The blob is removed by the next deferred sweep.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist, `Conflict` if it is
    /// already being deleted.
    pub async fn mark_for_deletion(
        &self,
        tenant_id: TenantId,
        id: FileId,
    ) -> Result<(), FileError> {
        if self.repo.mark_deleting(tenant_id, id, Utc::now()).await? {
            info!(file_id = %id, tenant_id = %tenant_id, "File marked for deletion");
            Ok(())
        } else {
            Err(self.lost_race(tenant_id, id).await)
        }
    }

    /// Soft-delete every file attached to an owner that is itself being removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn delete_by_owner(
        &self,
        tenant_id: TenantId,
        owner: Owner,
    ) -> Result<u64, FileError> {
        let count = self
            .repo
            .mark_owner_deleting(tenant_id, owner, Utc::now())
            .await?;
        info!(
            tenant_id = %tenant_id,
            owner = %owner,
            count,
            "Owner files marked for deletion"
        );
        Ok(count)
    }

    /// Deliver the bytes of an attached file.
    ///
    /// Anything that is not attached reads as `NotFound`, whether it is
    /// missing, orphaned, being deleted, or owned by another tenant.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` as above, or `BackendUnavailable` if the blob store
    /// cannot be read.
    pub async fn read(
        &self,
        tenant_id: TenantId,
        id: FileId,
        options: ReadOptions,
    ) -> Result<ReadResult, FileError> {
        let record = self
            .repo
            .find(tenant_id, id)
            .await?
            .filter(|r| r.status == FileStatus::Attached)
            .ok_or(FileError::NotFound(id))?;

        let bucket = record.bucket.as_deref();
        if options.prefer_redirect {
            match self
                .storage
                .redirect_url(&record.storage_key, bucket, self.redirect_ttl)
                .await
            {
                Ok(Some(url)) => {
                    return Ok(ReadResult::Redirect {
                        url,
                        content_type: record.detected_content_type,
                        size: record.size,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(file_id = %id, error = %e, "Redirect unavailable, streaming instead");
                }
            }
        }

        let object = self
            .storage
            .get(&record.storage_key, bucket)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    warn!(file_id = %id, "Attached file has no blob");
                    FileError::NotFound(id)
                } else {
                    FileError::from(e)
                }
            })?;

        debug!(file_id = %id, size = object.size, "Streaming file");
        Ok(ReadResult::Stream {
            body: object.body,
            content_type: record.detected_content_type,
            size: object.size,
        })
    }

    /// Record metadata for any status.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist for this tenant.
    pub async fn get_metadata(
        &self,
        tenant_id: TenantId,
        id: FileId,
    ) -> Result<FileRecord, FileError> {
        self.repo
            .find(tenant_id, id)
            .await?
            .ok_or(FileError::NotFound(id))
    }

    /// Files currently attached to an owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn find_by_owner(
        &self,
        tenant_id: TenantId,
        owner: Owner,
    ) -> Result<Vec<FileRecord>, FileError> {
        self.repo.find_by_owner(tenant_id, owner).await
    }

    /// Whether the file is currently attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn is_attached(&self, tenant_id: TenantId, id: FileId) -> Result<bool, FileError> {
        Ok(self
            .repo
            .find(tenant_id, id)
            .await?
            .is_some_and(|r| r.status == FileStatus::Attached))
    }

    /// List a tenant's files.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn list(
        &self,
        tenant_id: TenantId,
        filter: &ListFilter,
    ) -> Result<Vec<FileRecord>, FileError> {
        self.repo.list(tenant_id, filter).await
    }

    /// Storage usage of a tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn usage(&self, tenant_id: TenantId) -> Result<StorageUsage, FileError> {
        self.repo.usage(tenant_id).await
    }

    /// Explain a conditional update that affected no row.
    async fn lost_race(&self, tenant_id: TenantId, id: FileId) -> FileError {
        match self.repo.find(tenant_id, id).await {
            Ok(Some(record)) => FileError::conflict(id, record.status),
            Ok(None) => FileError::NotFound(id),
            Err(e) => e,
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
