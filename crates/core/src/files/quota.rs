//! Tenant quota pre-check.

use std::future::Future;
use std::sync::Arc;

use filestore_shared::config::QuotaConfig;
use filestore_shared::types::TenantId;
use tracing::debug;

use super::error::FileError;
use super::repository::FileRepository;

/// Gate consulted before any upload bytes are moved.
pub trait QuotaGate: Send + Sync {
    /// Fail with [`FileError::QuotaExceeded`] if storing `additional_bytes`
    /// more would put the tenant over its limit.
    fn check_quota(
        &self,
        tenant_id: TenantId,
        additional_bytes: u64,
    ) -> impl Future<Output = Result<(), FileError>> + Send;
}

/// Quota gate that admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl QuotaGate for Unlimited {
    async fn check_quota(
        &self,
        _tenant_id: TenantId,
        _additional_bytes: u64,
    ) -> Result<(), FileError> {
        Ok(())
    }
}

/// Quota gate backed by the live usage aggregate.
pub struct UsageQuota<R: FileRepository> {
    repo: Arc<R>,
    config: QuotaConfig,
}

impl<R: FileRepository> UsageQuota<R> {
    /// Create a usage-backed quota gate.
    #[must_use]
    pub fn new(repo: Arc<R>, config: QuotaConfig) -> Self {
        Self { repo, config }
    }
}

impl<R: FileRepository> QuotaGate for UsageQuota<R> {
    async fn check_quota(
        &self,
        tenant_id: TenantId,
        additional_bytes: u64,
    ) -> Result<(), FileError> {
        let usage = self.repo.usage(tenant_id).await?;

        if usage.total_files >= self.config.max_file_count {
            return Err(FileError::quota_exceeded(format!(
                "file limit of {} reached",
                self.config.max_file_count
            )));
        }

        let projected = usage.total_size.saturating_add(additional_bytes);
        if projected > self.config.max_storage_bytes {
            let remaining = self.config.max_storage_bytes.saturating_sub(usage.total_size);
            return Err(FileError::quota_exceeded(format!(
                "{} remaining of {}, upload needs {}",
                format_bytes(remaining),
                format_bytes(self.config.max_storage_bytes),
                format_bytes(additional_bytes)
            )));
        }

        debug!(
            tenant_id = %tenant_id,
            used = usage.total_size,
            additional_bytes,
            "quota check passed"
        );
        Ok(())
    }
}

/// Render a byte count with a binary unit.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut unit = 0;
    let mut whole = bytes;
    let mut rem = 0;
    while whole >= 1024 && unit < UNITS.len() - 1 {
        rem = whole % 1024;
        whole /= 1024;
        unit += 1;
    }

    if unit == 0 {
        format!("{whole} B")
    } else {
        format!("{whole}.{} {}", rem * 10 / 1024, UNITS[unit])
    }
}
