//! Persistence seam for file records.

use std::future::Future;

use chrono::{DateTime, Utc};
use filestore_shared::types::{FileId, TenantId};

use super::error::FileError;
use super::types::{
    ClaimToken, ClaimedFile, FileRecord, ListFilter, NewFileRecord, Owner, StorageUsage,
};

/// Repository trait for file record persistence.
///
/// This trait is implemented by the db crate. Every status change is a
/// conditional update: the row only moves if it is still in the expected
/// source status, and the affected-row count tells the caller whether it won.
///
/// Sweeps stamp the rows they claim with a [`ClaimToken`]. A row in
/// `deleting` without a token (explicit deletion, owner teardown) or whose
/// token is older than the lease is free to claim. Settling a claim only
/// touches rows still carrying the caller's token and clears it.
pub trait FileRepository: Send + Sync {
    /// Insert a freshly uploaded record in status `uploaded`.
    fn insert(
        &self,
        record: NewFileRecord,
    ) -> impl Future<Output = Result<FileRecord, FileError>> + Send;

    /// Find a record by ID within a tenant.
    fn find(
        &self,
        tenant_id: TenantId,
        id: FileId,
    ) -> impl Future<Output = Result<Option<FileRecord>, FileError>> + Send;

    /// List a tenant's records, newest first.
    fn list(
        &self,
        tenant_id: TenantId,
        filter: &ListFilter,
    ) -> impl Future<Output = Result<Vec<FileRecord>, FileError>> + Send;

    /// Attached records of one owner, newest first.
    fn find_by_owner(
        &self,
        tenant_id: TenantId,
        owner: Owner,
    ) -> impl Future<Output = Result<Vec<FileRecord>, FileError>> + Send;

    /// `uploaded` → `attached`. Returns the updated record, or `None` if the
    /// record is missing or not in `uploaded`.
    fn attach(
        &self,
        tenant_id: TenantId,
        id: FileId,
        owner: Owner,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<FileRecord>, FileError>> + Send;

    /// `attached` → `uploaded`, clearing the owner. Returns whether a row moved.
    fn detach(
        &self,
        tenant_id: TenantId,
        id: FileId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, FileError>> + Send;

    /// `uploaded` | `attached` → `deleting`, unclaimed. Returns whether a row moved.
    fn mark_deleting(
        &self,
        tenant_id: TenantId,
        id: FileId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, FileError>> + Send;

    /// Move every `attached` record of an owner to `deleting`, unclaimed.
    fn mark_owner_deleting(
        &self,
        tenant_id: TenantId,
        owner: Owner,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, FileError>> + Send;

    /// Claim `uploaded` records created before `cutoff`, moving them to
    /// `deleting` under `token` in one atomic statement. Only the claimed rows
    /// are returned.
    fn claim_orphans(
        &self,
        cutoff: DateTime<Utc>,
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ClaimedFile>, FileError>> + Send;

    /// Claim every `uploaded` or `attached` record of a tenant under `token`.
    fn claim_tenant(
        &self,
        tenant_id: TenantId,
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ClaimedFile>, FileError>> + Send;

    /// Claim up to `limit` `deleting` records under `token`, least recently
    /// touched first. Rows held by another token are skipped unless that
    /// claim was last touched before `stale_before`.
    fn claim_deleting(
        &self,
        limit: u64,
        stale_before: DateTime<Utc>,
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ClaimedFile>, FileError>> + Send;

    /// `deleting` → `deleted` for the given IDs held by `token`.
    fn mark_deleted(
        &self,
        ids: &[FileId],
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, FileError>> + Send;

    /// `deleting` → `uploaded` for orphans held by `token` whose blob survived.
    fn release_claims(
        &self,
        ids: &[FileId],
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, FileError>> + Send;

    /// Drop `token`'s hold on `deleting` records whose blob deletion failed,
    /// touching them so the next batch picks up other rows first.
    fn defer_retry(
        &self,
        ids: &[FileId],
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, FileError>> + Send;

    /// Aggregate usage of one tenant.
    fn usage(
        &self,
        tenant_id: TenantId,
    ) -> impl Future<Output = Result<StorageUsage, FileError>> + Send;
}
