//! Core lifecycle logic for the file storage service.
//!
//! This crate contains the parts that reason about two independently
//! failing systems, the metadata store and the blob store:
//! - `storage` - the Storage Port and its OpenDAL-backed implementation
//! - `files` - upload ingestion, ownership, reclamation and quota
//!
//! It has no database or web dependencies; the `db` crate implements
//! [`files::FileRepository`] and the `api` crate exposes the services.

pub mod files;
pub mod storage;
