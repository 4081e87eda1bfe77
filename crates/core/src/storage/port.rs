//! The Storage Port: the capability set every blob backend offers.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::error::StorageError;

/// A stream of byte chunks moving into or out of the blob store.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Identifier of the backend a blob was written to, persisted per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// S3-compatible object storage.
    S3,
    /// Azure Blob Storage.
    AzureBlob,
    /// Local filesystem.
    Local,
    /// In-process memory.
    Memory,
}

impl StorageBackend {
    /// Convert to database string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::AzureBlob => "azure_blob",
            Self::Local => "local",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may read a blob without going through the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Reachable only through the service or a signed redirect.
    #[default]
    Private,
    /// May be exposed by bucket policy.
    Public,
}

impl Visibility {
    /// Value written to object metadata.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

/// Options for writing a blob.
#[derive(Debug, Clone)]
pub struct PutOptions {
    /// Content type recorded with the object, when the backend supports it.
    pub content_type: String,
    /// Expected size, if known. Advisory only.
    pub size_hint: Option<u64>,
    /// Intended audience, tagged onto the object when the backend keeps
    /// user metadata.
    pub visibility: Visibility,
    /// Target bucket; `None` selects the provider default.
    pub bucket: Option<String>,
}

/// Identifier returned by a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    /// Storage key the object was written under.
    pub key: String,
}

/// An object read back from the blob store.
pub struct StoredObject {
    /// Object contents.
    pub body: ByteStream,
    /// Size in bytes as reported by the backend.
    pub size: u64,
    /// Content type as reported by the backend, if any.
    pub content_type: Option<String>,
}

impl fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredObject")
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Result of a best-effort delete.
///
/// Deleting never fails the caller; the outcome only tells a reaper whether
/// the record may move on to its terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The object is gone (or was never there).
    Deleted,
    /// The backend refused or could not be reached.
    Failed(String),
}

impl DeleteOutcome {
    /// Returns true if the object is gone.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted)
    }
}

/// Blob store capability set.
///
/// Keys are opaque and unique per record. Implementations must treat a delete
/// of a missing key as success.
pub trait StoragePort: Send + Sync {
    /// Backend identifier recorded alongside every blob written through this port.
    fn backend(&self) -> StorageBackend;

    /// Open an object for reading.
    fn get(
        &self,
        key: &str,
        bucket: Option<&str>,
    ) -> impl Future<Output = Result<StoredObject, StorageError>> + Send;

    /// Write an object from a byte stream.
    ///
    /// An `Err` item in `body` aborts the write; no object may become visible
    /// under `key` in that case.
    fn put(
        &self,
        body: ByteStream,
        key: &str,
        options: PutOptions,
    ) -> impl Future<Output = Result<PutReceipt, StorageError>> + Send;

    /// Delete an object. Failures are logged and reported, never raised.
    fn delete(&self, key: &str, bucket: Option<&str>) -> impl Future<Output = DeleteOutcome> + Send;

    /// Short-lived URL a client can fetch the object from directly.
    ///
    /// `Ok(None)` means the backend cannot sign URLs.
    fn redirect_url(
        &self,
        _key: &str,
        _bucket: Option<&str>,
        _ttl: Duration,
    ) -> impl Future<Output = Result<Option<String>, StorageError>> + Send {
        async { Ok(None) }
    }

    /// Check whether an object exists. For operational tooling only.
    fn exists(
        &self,
        _key: &str,
        _bucket: Option<&str>,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send {
        async { Err(StorageError::Unsupported) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_defaults_to_private() {
        assert_eq!(Visibility::default(), Visibility::Private);
        assert_eq!(Visibility::Public.as_str(), "public");
    }

    #[test]
    fn test_delete_outcome() {
        assert!(DeleteOutcome::Deleted.is_deleted());
        assert!(!DeleteOutcome::Failed("boom".into()).is_deleted());
    }
}
