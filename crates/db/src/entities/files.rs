//! `SeaORM` Entity for files table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{FileStatus, OwnerType, StorageBackend};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub original_name: String,
    pub declared_content_type: String,
    pub detected_content_type: String,
    pub size_bytes: i64,
    pub checksum_sha256: String,
    #[sea_orm(unique)]
    pub storage_key: String,
    pub storage_backend: StorageBackend,
    pub bucket: Option<String>,
    pub owner_type: Option<OwnerType>,
    pub owner_id: Option<Uuid>,
    pub attached_at: Option<DateTimeWithTimeZone>,
    pub status: FileStatus,
    pub deleted_at: Option<DateTimeWithTimeZone>,
    pub claim_token: Option<Uuid>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub metadata: Option<Json>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
