//! Blob storage behind an abstract port, backed by Apache OpenDAL.
//!
//! Supported backends:
//! - S3-compatible: Cloudflare R2, Supabase Storage, AWS S3, DigitalOcean Spaces
//! - Azure Blob Storage
//! - Local filesystem (development only)
//! - In-process memory (tests only)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         StoragePort                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ get(key, bucket)           │ redirect_url(key, bucket, ttl)     │
//! │ put(stream, key, options)  │ exists(key, bucket)                │
//! │ delete(key, bucket)  -> DeleteOutcome (never an error)          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                  OpendalStorage (Operator per bucket)           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod error;
mod operator;
mod port;

pub use error::StorageError;
pub use operator::OpendalStorage;
pub use port::{
    ByteStream, DeleteOutcome, PutOptions, PutReceipt, StorageBackend, StoragePort, StoredObject,
    Visibility,
};
