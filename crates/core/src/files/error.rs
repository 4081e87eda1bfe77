//! File lifecycle error types.

use filestore_shared::AppError;
use filestore_shared::types::FileId;
use thiserror::Error;

use super::types::FileStatus;
use crate::storage::StorageError;

/// Reasons an upload or request is rejected before any state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidInput {
    /// No tenant context.
    #[error("tenant id is required")]
    MissingTenant,

    /// The body contained no bytes.
    #[error("file is empty")]
    EmptyStream,

    /// Declared size is already over the ceiling.
    #[error("file too large: {size} bytes exceeds maximum {max} bytes")]
    DeclaredSizeTooLarge {
        /// Declared size.
        size: u64,
        /// Configured ceiling.
        max: u64,
    },

    /// Observed bytes crossed the ceiling mid-stream.
    #[error("file exceeds maximum size of {max} bytes")]
    SizeLimitExceeded {
        /// Configured ceiling.
        max: u64,
    },

    /// Original name is empty or too long.
    #[error("invalid file name: {0}")]
    InvalidName(String),

    /// Bucket name is not a single valid bucket segment.
    #[error("invalid bucket name: {0:?}")]
    InvalidBucket(String),

    /// Detected content type is not on the allow-list.
    #[error("content type not allowed: {0}")]
    DisallowedContentType(String),

    /// The client body failed before it was fully read.
    #[error("upload stream interrupted: {0}")]
    StreamInterrupted(String),
}

/// File lifecycle errors.
#[derive(Debug, Error)]
pub enum FileError {
    /// Request rejected by validation.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),

    /// Tenant quota would be exceeded.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// File record not found, or not visible to this tenant.
    #[error("file not found: {0}")]
    NotFound(FileId),

    /// File exists but is in the wrong status for the operation.
    #[error("file {id} is {status}")]
    Conflict {
        /// File ID.
        id: FileId,
        /// Current status.
        status: FileStatus,
    },

    /// Blob store refused or could not be reached.
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Repository operation failed.
    #[error("repository error: {0}")]
    Repository(String),
}

impl FileError {
    /// Create a repository error.
    #[must_use]
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    /// Create a quota exceeded error.
    #[must_use]
    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    /// Create a conflict error.
    #[must_use]
    pub fn conflict(id: FileId, status: FileStatus) -> Self {
        Self::Conflict { id, status }
    }
}

impl From<StorageError> for FileError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Interrupted(msg) => Self::InvalidInput(InvalidInput::StreamInterrupted(msg)),
            other => Self::BackendUnavailable(other.to_string()),
        }
    }
}

impl From<FileError> for AppError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::InvalidInput(InvalidInput::MissingTenant) => {
                Self::Unauthorized(InvalidInput::MissingTenant.to_string())
            }
            FileError::InvalidInput(reason) => Self::Validation(reason.to_string()),
            FileError::QuotaExceeded(msg) => Self::QuotaExceeded(msg),
            FileError::NotFound(id) => Self::NotFound(format!("file {id}")),
            err @ FileError::Conflict { .. } => Self::Conflict(err.to_string()),
            FileError::BackendUnavailable(msg) => Self::ServiceUnavailable(msg),
            FileError::Repository(msg) => Self::Database(msg),
        }
    }
}
