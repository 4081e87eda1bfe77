//! Reclamation reaper.
//!
//! Two sweeps reclaim blobs:
//!
//! - The orphan sweep claims `uploaded` records older than the TTL by moving
//!   them to `deleting` in one statement, then deletes their blobs. A record
//!   whose blob survives goes back to `uploaded` and is retried next pass.
//! - The deferred sweep claims a batch of unheld `deleting` records (from
//!   explicit deletions, owner teardown, or a sweep whose lease ran out) and
//!   deletes their blobs. A record whose blob survives stays in `deleting`.
//!
//! Every sweep stamps its rows with a fresh [`ClaimToken`], so overlapping
//! sweeps see disjoint rows, and a sweep that outlived its lease cannot
//! settle rows another sweep has since taken over. One record's failure
//! never aborts the batch; only repository errors do.

use std::sync::Arc;

use chrono::{Duration, Utc};
use filestore_shared::config::ReaperConfig;
use filestore_shared::types::{FileId, TenantId};
use tracing::{info, warn};

use super::error::FileError;
use super::repository::FileRepository;
use super::types::{ClaimToken, ClaimedFile, CleanupReport, SweepReport};
use crate::storage::StoragePort;

/// Blob deletion outcome for a batch of claimed records.
struct Deletions {
    deleted: Vec<FileId>,
    failed: Vec<FileId>,
}

/// Reclaims orphaned and soft-deleted files.
pub struct Reaper<R: FileRepository, S: StoragePort> {
    repo: Arc<R>,
    storage: Arc<S>,
    orphan_ttl: Duration,
    claim_lease: Duration,
    batch_size: u64,
}

impl<R: FileRepository, S: StoragePort> Reaper<R, S> {
    /// Create a new reaper.
    #[must_use]
    pub fn new(repo: Arc<R>, storage: Arc<S>, config: &ReaperConfig) -> Self {
        Self {
            repo,
            storage,
            orphan_ttl: Duration::hours(config.orphan_ttl_hours),
            claim_lease: Duration::seconds(
                i64::try_from(config.claim_lease_secs).unwrap_or(i64::MAX),
            ),
            batch_size: config.batch_size,
        }
    }

    /// Claim and reclaim `uploaded` records older than the orphan TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn sweep_orphans(&self) -> Result<SweepReport, FileError> {
        let now = Utc::now();
        let token = ClaimToken::new();
        let claimed = self
            .repo
            .claim_orphans(now - self.orphan_ttl, token, now)
            .await?;
        if claimed.is_empty() {
            return Ok(SweepReport::default());
        }

        let outcome = self.delete_blobs(&claimed).await;
        // Failed claims go back first so a crash below never strands them.
        if !outcome.failed.is_empty() {
            let released = self
                .repo
                .release_claims(&outcome.failed, token, Utc::now())
                .await?;
            if released < outcome.failed.len() as u64 {
                warn!(
                    claim = %token,
                    lost = outcome.failed.len() as u64 - released,
                    "Orphan claims taken over before release"
                );
            }
        }
        let deleted = self
            .repo
            .mark_deleted(&outcome.deleted, token, Utc::now())
            .await?;

        let report = SweepReport {
            claimed: claimed.len() as u64,
            deleted,
            failed: outcome.failed.len() as u64,
        };
        info!(
            claimed = report.claimed,
            deleted = report.deleted,
            failed = report.failed,
            "Orphan sweep finished"
        );
        Ok(report)
    }

    /// Delete blobs of up to one batch of `deleting` records.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn sweep_deferred(&self) -> Result<SweepReport, FileError> {
        let now = Utc::now();
        let token = ClaimToken::new();
        let pending = self
            .repo
            .claim_deleting(self.batch_size, now - self.claim_lease, token, now)
            .await?;
        if pending.is_empty() {
            return Ok(SweepReport::default());
        }

        let report = self.settle(&pending, token).await?;
        info!(
            claimed = report.claimed,
            deleted = report.deleted,
            failed = report.failed,
            "Deferred delete sweep finished"
        );
        Ok(report)
    }

    /// Run both sweeps once, orphans first.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn run_once(&self) -> Result<CleanupReport, FileError> {
        let orphans = self.sweep_orphans().await?;
        let deferred = self.sweep_deferred().await?;
        Ok(CleanupReport { orphans, deferred })
    }

    /// Claim and reclaim every live file of one tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository fails.
    pub async fn cleanup_tenant(&self, tenant_id: TenantId) -> Result<SweepReport, FileError> {
        let token = ClaimToken::new();
        let claimed = self
            .repo
            .claim_tenant(tenant_id, token, Utc::now())
            .await?;
        if claimed.is_empty() {
            return Ok(SweepReport::default());
        }

        let report = self.settle(&claimed, token).await?;
        info!(
            tenant_id = %tenant_id,
            claimed = report.claimed,
            deleted = report.deleted,
            failed = report.failed,
            "Tenant cleanup finished"
        );
        Ok(report)
    }

    /// Delete blobs of records claimed into `deleting`. Failures stay there,
    /// unheld, for the next deferred sweep.
    async fn settle(
        &self,
        records: &[ClaimedFile],
        token: ClaimToken,
    ) -> Result<SweepReport, FileError> {
        let outcome = self.delete_blobs(records).await;
        let deleted = self
            .repo
            .mark_deleted(&outcome.deleted, token, Utc::now())
            .await?;
        if !outcome.failed.is_empty() {
            self.repo
                .defer_retry(&outcome.failed, token, Utc::now())
                .await?;
        }

        Ok(SweepReport {
            claimed: records.len() as u64,
            deleted,
            failed: outcome.failed.len() as u64,
        })
    }

    async fn delete_blobs(&self, records: &[ClaimedFile]) -> Deletions {
        let mut outcome = Deletions {
            deleted: Vec::with_capacity(records.len()),
            failed: Vec::new(),
        };

        for record in records {
            let result = self
                .storage
                .delete(&record.storage_key, record.bucket.as_deref())
                .await;
            if result.is_deleted() {
                outcome.deleted.push(record.id);
            } else {
                warn!(
                    file_id = %record.id,
                    tenant_id = %record.tenant_id,
                    outcome = ?result,
                    "Blob deletion failed"
                );
                outcome.failed.push(record.id);
            }
        }
        outcome
    }
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
