//! `SeaORM` active enums for the `files` table.
//!
//! Stored as short strings guarded by CHECK constraints.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum FileStatus {
    #[sea_orm(string_value = "uploaded")]
    Uploaded,
    #[sea_orm(string_value = "attached")]
    Attached,
    #[sea_orm(string_value = "deleting")]
    Deleting,
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum OwnerType {
    #[sea_orm(string_value = "excuse")]
    Excuse,
    #[sea_orm(string_value = "profile")]
    Profile,
    #[sea_orm(string_value = "document")]
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum StorageBackend {
    #[sea_orm(string_value = "s3")]
    S3,
    #[sea_orm(string_value = "azure_blob")]
    AzureBlob,
    #[sea_orm(string_value = "local")]
    Local,
    #[sea_orm(string_value = "memory")]
    Memory,
}
