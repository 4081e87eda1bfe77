//! Request middleware and extractors.

pub mod tenant;

pub use tenant::{TENANT_HEADER, TenantContext};
