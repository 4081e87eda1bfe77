//! File record types and data structures.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use filestore_shared::types::{FileId, OwnerId, TenantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::{ByteStream, StorageBackend};

/// Lifecycle status of a file record.
///
/// The valid transitions are:
/// - Uploaded → Attached (attach)
/// - Attached → Uploaded (detach)
/// - Uploaded | Attached → Deleting (explicit deletion, owner deletion, orphan claim)
/// - Deleting → Deleted (confirmed blob deletion)
/// - Deleting → Uploaded (failed blob deletion of a claimed orphan)
///
/// Moves out of `Deleting` are only applied by the holder of the row's
/// current [`ClaimToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Stored, not yet owned by anything.
    Uploaded,
    /// Owned by exactly one entity and servable.
    Attached,
    /// Claimed for blob deletion.
    Deleting,
    /// Blob confirmed gone; tombstone only.
    Deleted,
}

impl FileStatus {
    /// Convert to database string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Attached => "attached",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        }
    }

    /// Returns true if an explicit deletion may claim a record in this status.
    #[must_use]
    pub fn is_deletable(&self) -> bool {
        matches!(self, Self::Uploaded | Self::Attached)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entity a file can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    /// Absence justification document.
    Excuse,
    /// Member profile picture.
    Profile,
    /// Generic shared document.
    Document,
}

impl OwnerType {
    /// Convert to database string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excuse => "excuse",
            Self::Profile => "profile",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity owning an attached file. Type and id always travel together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    /// Owner kind tag.
    pub owner_type: OwnerType,
    /// Owner identifier.
    pub owner_id: OwnerId,
}

impl Owner {
    /// Create an owner reference.
    #[must_use]
    pub const fn new(owner_type: OwnerType, owner_id: OwnerId) -> Self {
        Self {
            owner_type,
            owner_id,
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_type, self.owner_id)
    }
}

/// Persisted file record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    /// Unique identifier.
    pub id: FileId,
    /// Tenant the file belongs to.
    pub tenant_id: TenantId,
    /// Name supplied by the uploader.
    pub original_name: String,
    /// Content type claimed by the uploader. Advisory only.
    pub declared_content_type: String,
    /// Content type derived from the bytes. Used for serving.
    pub detected_content_type: String,
    /// Observed size in bytes.
    pub size: u64,
    /// SHA-256 of the stored bytes, lowercase hex.
    pub checksum: String,
    /// Blob key, unique across all records.
    #[serde(skip_serializing)]
    pub storage_key: String,
    /// Backend the blob was written to.
    pub storage_backend: StorageBackend,
    /// Bucket the blob was written to, if not the default.
    pub bucket: Option<String>,
    /// Owning entity, present only while attached.
    pub owner: Option<Owner>,
    /// When the current owner attached the file.
    pub attached_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: FileStatus,
    /// Sweep currently holding this `deleting` record, if any.
    #[serde(skip)]
    pub claim: Option<ClaimToken>,
    /// When the record was claimed for deletion.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Opaque caller metadata.
    pub metadata: Option<serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Input for inserting a freshly uploaded record.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    /// Record ID.
    pub id: FileId,
    /// Tenant ID.
    pub tenant_id: TenantId,
    /// Original name.
    pub original_name: String,
    /// Declared content type.
    pub declared_content_type: String,
    /// Detected content type.
    pub detected_content_type: String,
    /// Observed size.
    pub size: u64,
    /// SHA-256 hex digest.
    pub checksum: String,
    /// Storage key.
    pub storage_key: String,
    /// Storage backend.
    pub storage_backend: StorageBackend,
    /// Bucket, if any.
    pub bucket: Option<String>,
    /// Opaque metadata.
    pub metadata: Option<serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// An incoming upload.
pub struct UploadRequest {
    /// Tenant uploading the file.
    pub tenant_id: TenantId,
    /// File contents. Untrusted.
    pub body: ByteStream,
    /// Name supplied by the client.
    pub original_name: String,
    /// Content type supplied by the client.
    pub declared_content_type: String,
    /// Size supplied by the client. Only used to pick a strategy and pre-check quota.
    pub declared_size: u64,
    /// Target bucket; `None` selects the provider default.
    pub bucket: Option<String>,
    /// Opaque metadata stored with the record.
    pub metadata: Option<serde_json::Value>,
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("tenant_id", &self.tenant_id)
            .field("original_name", &self.original_name)
            .field("declared_content_type", &self.declared_content_type)
            .field("declared_size", &self.declared_size)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    /// New record ID.
    pub file_id: FileId,
    /// SHA-256 of the stored bytes.
    pub checksum: String,
    /// Observed size in bytes.
    pub size: u64,
    /// Detected content type.
    pub content_type: String,
}

/// How a read should be delivered when both options exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Prefer a signed redirect over proxying bytes.
    pub prefer_redirect: bool,
}

/// Result of reading an attached file.
pub enum ReadResult {
    /// Client should fetch the bytes from a short-lived signed URL.
    Redirect {
        /// Signed URL.
        url: String,
        /// Detected content type.
        content_type: String,
        /// Size in bytes.
        size: u64,
    },
    /// Bytes proxied through this process.
    Stream {
        /// File contents.
        body: ByteStream,
        /// Detected content type.
        content_type: String,
        /// Size in bytes.
        size: u64,
    },
}

impl fmt::Debug for ReadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redirect {
                url,
                content_type,
                size,
            } => f
                .debug_struct("Redirect")
                .field("url", url)
                .field("content_type", content_type)
                .field("size", size)
                .finish(),
            Self::Stream {
                content_type, size, ..
            } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .field("size", size)
                .finish_non_exhaustive(),
        }
    }
}

/// Filter for listing a tenant's files.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Only records in this status.
    pub status: Option<FileStatus>,
    /// Only records attached to this owner kind.
    pub owner_type: Option<OwnerType>,
    /// Maximum rows; defaults to [`ListFilter::DEFAULT_LIMIT`].
    pub limit: Option<u64>,
}

impl ListFilter {
    /// Default page size.
    pub const DEFAULT_LIMIT: u64 = 100;

    /// Effective row limit.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}

/// Aggregate storage usage of one tenant.
///
/// Totals cover live records (everything except `deleted` tombstones);
/// `by_status` counts every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    /// Number of live records.
    pub total_files: u64,
    /// Bytes held by live records.
    pub total_size: u64,
    /// Record count per status.
    pub by_status: BTreeMap<FileStatus, u64>,
    /// Attached record count per owner kind.
    pub by_owner_type: BTreeMap<OwnerType, u64>,
}

/// Stamp identifying one sweep's hold on the rows it claimed.
///
/// A claim held longer than the reaper lease may be taken over by another
/// sweep. Settling (`deleted`, released, deferred) only matches rows still
/// stamped with the caller's token, so the superseded sweep changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimToken(Uuid);

impl ClaimToken {
    /// Fresh token for one sweep.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap a stored token.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for ClaimToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A record claimed for blob deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedFile {
    /// Record ID.
    pub id: FileId,
    /// Tenant ID.
    pub tenant_id: TenantId,
    /// Blob key.
    pub storage_key: String,
    /// Blob bucket.
    pub bucket: Option<String>,
}

/// Outcome counters of one reclamation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records claimed or selected.
    pub claimed: u64,
    /// Records whose blob was deleted and that reached `deleted`.
    pub deleted: u64,
    /// Records whose blob deletion failed.
    pub failed: u64,
}

/// Combined result of a manual cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Orphan sweep outcome.
    pub orphans: SweepReport,
    /// Deferred-delete sweep outcome.
    pub deferred: SweepReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_as_database_value() {
        for status in [
            FileStatus::Uploaded,
            FileStatus::Attached,
            FileStatus::Deleting,
            FileStatus::Deleted,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, status.as_str());
        }
    }

    #[test]
    fn test_claim_tokens_are_distinct() {
        let a = ClaimToken::new();
        let b = ClaimToken::new();
        assert_ne!(a, b);
        assert_eq!(ClaimToken::from_uuid(a.into_inner()), a);
    }

    #[test]
    fn test_deletable_statuses() {
        assert!(FileStatus::Uploaded.is_deletable());
        assert!(FileStatus::Attached.is_deletable());
        assert!(!FileStatus::Deleting.is_deletable());
        assert!(!FileStatus::Deleted.is_deletable());
    }

    #[test]
    fn test_list_filter_default_limit() {
        assert_eq!(ListFilter::default().limit(), 100);
        let filter = ListFilter {
            limit: Some(5),
            ..Default::default()
        };
        assert_eq!(filter.limit(), 5);
    }
}
