//! Shared types, errors, and configuration for the file storage service.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for tenants, files and owners
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
