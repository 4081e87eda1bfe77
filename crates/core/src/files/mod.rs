//! File lifecycle: ingestion, ownership, reclamation and quota.
//!
//! # Lifecycle
//!
//! ```text
//!               attach
//!   uploaded ────────────▶ attached
//!     │  ▲  ◀────────────     │
//!     │  │      detach        │ mark_for_deletion, delete_by_owner
//!     │  │                    ▼
//!     │  └─ blob delete ─── deleting ── blob deleted ──▶ deleted
//!     │     failed (orphan)   ▲
//!     └───────────────────────┘
//!       orphan TTL, mark_for_deletion
//! ```
//!
//! The record table is the only source of truth for status. Each transition
//! is one conditional update keyed on the current status. Rows leaving
//! `deleting` are additionally keyed on the claim token of the sweep that
//! holds them.

mod error;
mod ingest;
mod memory;
mod quota;
mod reaper;
mod registry;
mod repository;
mod scheduler;
pub mod sniff;
mod types;

#[cfg(test)]
mod test_support;

pub use error::{FileError, InvalidInput};
pub use ingest::UploadIngestor;
pub use memory::InMemoryFileRepository;
pub use quota::{QuotaGate, Unlimited, UsageQuota, format_bytes};
pub use reaper::Reaper;
pub use registry::OwnershipRegistry;
pub use repository::FileRepository;
pub use scheduler::ReaperScheduler;
pub use types::{
    ClaimToken, ClaimedFile, CleanupReport, FileRecord, FileStatus, ListFilter, NewFileRecord, Owner,
    OwnerType, ReadOptions, ReadResult, StorageUsage, SweepReport, UploadRequest, UploadResult,
};
