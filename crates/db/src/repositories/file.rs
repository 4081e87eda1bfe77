//! File repository for database operations.
//!
//! Implements the file lifecycle persistence using SeaORM. Every status
//! change is an `UPDATE ... WHERE status = <expected>`, so concurrent callers
//! racing on the same row see exactly one winner.
//!
//! Sweeps stamp the rows they claim with a `claim_token`. Moving a row out
//! of `deleting` also matches on that token, so a sweep whose claim was
//! taken over after its lease expired updates nothing.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
    prelude::DateTimeWithTimeZone,
};
use tracing::debug;
use uuid::Uuid;

use crate::entities::{
    files,
    sea_orm_active_enums::{
        FileStatus as DbFileStatus, OwnerType as DbOwnerType, StorageBackend as DbStorageBackend,
    },
};
use filestore_core::files::{
    ClaimToken, ClaimedFile, FileError, FileRecord, FileRepository as FileRepoTrait, FileStatus, ListFilter,
    NewFileRecord, Owner, OwnerType, StorageUsage,
};
use filestore_core::storage::StorageBackend;
use filestore_shared::types::{FileId, OwnerId, TenantId};

/// File repository implementation.
#[derive(Debug, Clone)]
pub struct FileRepository {
    db: DatabaseConnection,
}

impl FileRepository {
    /// Create a new file repository.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Settle `deleting` rows still held by `token` and drop the claim.
    async fn settle_claimed(
        &self,
        ids: &[FileId],
        token: ClaimToken,
        update: sea_orm::UpdateMany<files::Entity>,
    ) -> Result<u64, FileError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| id.into_inner()).collect();

        let result = update
            .col_expr(files::Column::ClaimToken, Expr::value(Option::<Uuid>::None))
            .filter(files::Column::Id.is_in(ids))
            .filter(files::Column::Status.eq(DbFileStatus::Deleting))
            .filter(files::Column::ClaimToken.eq(token.into_inner()))
            .exec(&self.db)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;

        Ok(result.rows_affected)
    }
}

impl FileRepoTrait for FileRepository {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord, FileError> {
        let created_at: DateTimeWithTimeZone = record.created_at.into();
        let size = i64::try_from(record.size)
            .map_err(|_| FileError::repository(format!("size {} out of range", record.size)))?;

        let active_model = files::ActiveModel {
            id: Set(record.id.into_inner()),
            tenant_id: Set(record.tenant_id.into_inner()),
            original_name: Set(record.original_name),
            declared_content_type: Set(record.declared_content_type),
            detected_content_type: Set(record.detected_content_type),
            size_bytes: Set(size),
            checksum_sha256: Set(record.checksum),
            storage_key: Set(record.storage_key),
            storage_backend: Set(to_db_backend(record.storage_backend)),
            bucket: Set(record.bucket),
            owner_type: Set(None),
            owner_id: Set(None),
            attached_at: Set(None),
            status: Set(DbFileStatus::Uploaded),
            deleted_at: Set(None),
            claim_token: Set(None),
            metadata: Set(record.metadata),
            created_at: Set(created_at),
            updated_at: Set(created_at),
        };

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;
        let model = active_model
            .insert(&txn)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;
        txn.commit()
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;

        to_domain(model)
    }

    async fn find(&self, tenant_id: TenantId, id: FileId) -> Result<Option<FileRecord>, FileError> {
        let model = files::Entity::find_by_id(id.into_inner())
            .filter(files::Column::TenantId.eq(tenant_id.into_inner()))
            .one(&self.db)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;

        model.map(to_domain).transpose()
    }

    async fn list(
        &self,
        tenant_id: TenantId,
        filter: &ListFilter,
    ) -> Result<Vec<FileRecord>, FileError> {
        let mut query = files::Entity::find()
            .filter(files::Column::TenantId.eq(tenant_id.into_inner()));

        if let Some(status) = filter.status {
            query = query.filter(files::Column::Status.eq(to_db_status(status)));
        }
        if let Some(owner_type) = filter.owner_type {
            query = query.filter(files::Column::OwnerType.eq(to_db_owner_type(owner_type)));
        }

        let models = query
            .order_by_desc(files::Column::CreatedAt)
            .order_by_desc(files::Column::Id)
            .limit(filter.limit())
            .all(&self.db)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;

        models.into_iter().map(to_domain).collect()
    }

    async fn find_by_owner(
        &self,
        tenant_id: TenantId,
        owner: Owner,
    ) -> Result<Vec<FileRecord>, FileError> {
        let models = files::Entity::find()
            .filter(files::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(files::Column::OwnerType.eq(to_db_owner_type(owner.owner_type)))
            .filter(files::Column::OwnerId.eq(owner.owner_id.into_inner()))
            .filter(files::Column::Status.eq(DbFileStatus::Attached))
            .order_by_desc(files::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;

        models.into_iter().map(to_domain).collect()
    }

    async fn attach(
        &self,
        tenant_id: TenantId,
        id: FileId,
        owner: Owner,
        now: DateTime<Utc>,
    ) -> Result<Option<FileRecord>, FileError> {
        let now: DateTimeWithTimeZone = now.into();

        let models = files::Entity::update_many()
            .col_expr(
                files::Column::Status,
                Expr::value(DbFileStatus::Attached.to_value()),
            )
            .col_expr(
                files::Column::OwnerType,
                Expr::value(to_db_owner_type(owner.owner_type).to_value()),
            )
            .col_expr(
                files::Column::OwnerId,
                Expr::value(owner.owner_id.into_inner()),
            )
            .col_expr(files::Column::AttachedAt, Expr::value(now))
            .col_expr(files::Column::UpdatedAt, Expr::value(now))
            .filter(files::Column::Id.eq(id.into_inner()))
            .filter(files::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(files::Column::Status.eq(DbFileStatus::Uploaded))
            .exec_with_returning(&self.db)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;

        models.into_iter().next().map(to_domain).transpose()
    }

    async fn detach(
        &self,
        tenant_id: TenantId,
        id: FileId,
        now: DateTime<Utc>,
    ) -> Result<bool, FileError> {
        let now: DateTimeWithTimeZone = now.into();

        let result = files::Entity::update_many()
            .col_expr(
                files::Column::Status,
                Expr::value(DbFileStatus::Uploaded.to_value()),
            )
            .col_expr(files::Column::OwnerType, Expr::value(Option::<String>::None))
            .col_expr(files::Column::OwnerId, Expr::value(Option::<Uuid>::None))
            .col_expr(
                files::Column::AttachedAt,
                Expr::value(Option::<DateTimeWithTimeZone>::None),
            )
            .col_expr(files::Column::UpdatedAt, Expr::value(now))
            .filter(files::Column::Id.eq(id.into_inner()))
            .filter(files::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(files::Column::Status.eq(DbFileStatus::Attached))
            .exec(&self.db)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }

    async fn mark_deleting(
        &self,
        tenant_id: TenantId,
        id: FileId,
        now: DateTime<Utc>,
    ) -> Result<bool, FileError> {
        let now: DateTimeWithTimeZone = now.into();

        let result = files::Entity::update_many()
            .col_expr(
                files::Column::Status,
                Expr::value(DbFileStatus::Deleting.to_value()),
            )
            .col_expr(files::Column::DeletedAt, Expr::value(now))
            .col_expr(files::Column::UpdatedAt, Expr::value(now))
            .filter(files::Column::Id.eq(id.into_inner()))
            .filter(files::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(
                files::Column::Status.is_in([DbFileStatus::Uploaded, DbFileStatus::Attached]),
            )
            .exec(&self.db)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }

    async fn mark_owner_deleting(
        &self,
        tenant_id: TenantId,
        owner: Owner,
        now: DateTime<Utc>,
    ) -> Result<u64, FileError> {
        let now: DateTimeWithTimeZone = now.into();

        let result = files::Entity::update_many()
            .col_expr(
                files::Column::Status,
                Expr::value(DbFileStatus::Deleting.to_value()),
            )
            .col_expr(files::Column::DeletedAt, Expr::value(now))
            .col_expr(files::Column::UpdatedAt, Expr::value(now))
            .filter(files::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(files::Column::OwnerType.eq(to_db_owner_type(owner.owner_type)))
            .filter(files::Column::OwnerId.eq(owner.owner_id.into_inner()))
            .filter(files::Column::Status.eq(DbFileStatus::Attached))
            .exec(&self.db)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;

        Ok(result.rows_affected)
    }

    async fn claim_orphans(
        &self,
        cutoff: DateTime<Utc>,
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedFile>, FileError> {
        let cutoff: DateTimeWithTimeZone = cutoff.into();
        let now: DateTimeWithTimeZone = now.into();

        let models = files::Entity::update_many()
            .col_expr(
                files::Column::Status,
                Expr::value(DbFileStatus::Deleting.to_value()),
            )
            .col_expr(files::Column::ClaimToken, Expr::value(token.into_inner()))
            .col_expr(files::Column::DeletedAt, Expr::value(now))
            .col_expr(files::Column::UpdatedAt, Expr::value(now))
            .filter(files::Column::Status.eq(DbFileStatus::Uploaded))
            .filter(files::Column::CreatedAt.lt(cutoff))
            .exec_with_returning(&self.db)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;

        debug!(count = models.len(), claim = %token, "Claimed orphan files");

        Ok(models.into_iter().map(to_claimed).collect())
    }

    async fn claim_tenant(
        &self,
        tenant_id: TenantId,
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedFile>, FileError> {
        let now: DateTimeWithTimeZone = now.into();

        let models = files::Entity::update_many()
            .col_expr(
                files::Column::Status,
                Expr::value(DbFileStatus::Deleting.to_value()),
            )
            .col_expr(files::Column::ClaimToken, Expr::value(token.into_inner()))
            .col_expr(files::Column::DeletedAt, Expr::value(now))
            .col_expr(files::Column::UpdatedAt, Expr::value(now))
            .filter(files::Column::TenantId.eq(tenant_id.into_inner()))
            .filter(
                files::Column::Status.is_in([DbFileStatus::Uploaded, DbFileStatus::Attached]),
            )
            .exec_with_returning(&self.db)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;

        Ok(models.into_iter().map(to_claimed).collect())
    }

    async fn claim_deleting(
        &self,
        limit: u64,
        stale_before: DateTime<Utc>,
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedFile>, FileError> {
        let stale_before: DateTimeWithTimeZone = stale_before.into();
        let now: DateTimeWithTimeZone = now.into();
        let claimable = || {
            Condition::all()
                .add(files::Column::Status.eq(DbFileStatus::Deleting))
                .add(
                    Condition::any()
                        .add(files::Column::ClaimToken.is_null())
                        .add(files::Column::UpdatedAt.lt(stale_before)),
                )
        };

        let ids: Vec<Uuid> = files::Entity::find()
            .select_only()
            .column(files::Column::Id)
            .filter(claimable())
            .order_by_asc(files::Column::UpdatedAt)
            .order_by_asc(files::Column::Id)
            .limit(limit)
            .into_tuple()
            .all(&self.db)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Re-checked under the row lock: a sweep that stamped the row first wins.
        let models = files::Entity::update_many()
            .col_expr(files::Column::ClaimToken, Expr::value(token.into_inner()))
            .col_expr(files::Column::UpdatedAt, Expr::value(now))
            .filter(files::Column::Id.is_in(ids))
            .filter(claimable())
            .exec_with_returning(&self.db)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;

        debug!(count = models.len(), claim = %token, "Claimed deleting files");

        Ok(models.into_iter().map(to_claimed).collect())
    }

    async fn mark_deleted(
        &self,
        ids: &[FileId],
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<u64, FileError> {
        let now: DateTimeWithTimeZone = now.into();
        let update = files::Entity::update_many()
            .col_expr(
                files::Column::Status,
                Expr::value(DbFileStatus::Deleted.to_value()),
            )
            .col_expr(files::Column::UpdatedAt, Expr::value(now));

        self.settle_claimed(ids, token, update).await
    }

    async fn release_claims(
        &self,
        ids: &[FileId],
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<u64, FileError> {
        let now: DateTimeWithTimeZone = now.into();
        let update = files::Entity::update_many()
            .col_expr(
                files::Column::Status,
                Expr::value(DbFileStatus::Uploaded.to_value()),
            )
            .col_expr(files::Column::OwnerType, Expr::value(Option::<String>::None))
            .col_expr(files::Column::OwnerId, Expr::value(Option::<Uuid>::None))
            .col_expr(
                files::Column::AttachedAt,
                Expr::value(Option::<DateTimeWithTimeZone>::None),
            )
            .col_expr(
                files::Column::DeletedAt,
                Expr::value(Option::<DateTimeWithTimeZone>::None),
            )
            .col_expr(files::Column::UpdatedAt, Expr::value(now));

        self.settle_claimed(ids, token, update).await
    }

    async fn defer_retry(
        &self,
        ids: &[FileId],
        token: ClaimToken,
        now: DateTime<Utc>,
    ) -> Result<u64, FileError> {
        let now: DateTimeWithTimeZone = now.into();
        let update = files::Entity::update_many().col_expr(files::Column::UpdatedAt, Expr::value(now));

        self.settle_claimed(ids, token, update).await
    }

    async fn usage(&self, tenant_id: TenantId) -> Result<StorageUsage, FileError> {
        #[derive(Debug, FromQueryResult)]
        struct UsageRow {
            status: DbFileStatus,
            owner_type: Option<DbOwnerType>,
            files: i64,
            total_size: i64,
        }

        let rows = files::Entity::find()
            .select_only()
            .column(files::Column::Status)
            .column(files::Column::OwnerType)
            .column_as(Expr::cust("COUNT(*)"), "files")
            .column_as(Expr::cust("COALESCE(SUM(size_bytes), 0)::BIGINT"), "total_size")
            .filter(files::Column::TenantId.eq(tenant_id.into_inner()))
            .group_by(files::Column::Status)
            .group_by(files::Column::OwnerType)
            .into_model::<UsageRow>()
            .all(&self.db)
            .await
            .map_err(|e| FileError::repository(e.to_string()))?;

        let mut usage = StorageUsage::default();
        for row in rows {
            let status = to_domain_status(row.status);
            let files = to_u64(row.files)?;
            *usage.by_status.entry(status).or_default() += files;
            if status == FileStatus::Deleted {
                continue;
            }
            usage.total_files += files;
            usage.total_size += to_u64(row.total_size)?;
            if let (FileStatus::Attached, Some(owner_type)) = (status, row.owner_type) {
                *usage
                    .by_owner_type
                    .entry(to_domain_owner_type(owner_type))
                    .or_default() += files;
            }
        }

        Ok(usage)
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn to_domain(model: files::Model) -> Result<FileRecord, FileError> {
    let owner = match (model.owner_type, model.owner_id) {
        (Some(owner_type), Some(owner_id)) => Some(Owner::new(
            to_domain_owner_type(owner_type),
            OwnerId::from_uuid(owner_id),
        )),
        _ => None,
    };

    Ok(FileRecord {
        id: FileId::from_uuid(model.id),
        tenant_id: TenantId::from_uuid(model.tenant_id),
        original_name: model.original_name,
        declared_content_type: model.declared_content_type,
        detected_content_type: model.detected_content_type,
        size: to_u64(model.size_bytes)?,
        checksum: model.checksum_sha256,
        storage_key: model.storage_key,
        storage_backend: to_domain_backend(model.storage_backend),
        bucket: model.bucket,
        owner,
        attached_at: model.attached_at.map(|t| t.with_timezone(&Utc)),
        status: to_domain_status(model.status),
        deleted_at: model.deleted_at.map(|t| t.with_timezone(&Utc)),
        claim: model.claim_token.map(ClaimToken::from_uuid),
        metadata: model.metadata,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn to_claimed(model: files::Model) -> ClaimedFile {
    ClaimedFile {
        id: FileId::from_uuid(model.id),
        tenant_id: TenantId::from_uuid(model.tenant_id),
        storage_key: model.storage_key,
        bucket: model.bucket,
    }
}

fn to_u64(value: i64) -> Result<u64, FileError> {
    u64::try_from(value).map_err(|_| FileError::repository(format!("negative size {value}")))
}

fn to_db_status(status: FileStatus) -> DbFileStatus {
    match status {
        FileStatus::Uploaded => DbFileStatus::Uploaded,
        FileStatus::Attached => DbFileStatus::Attached,
        FileStatus::Deleting => DbFileStatus::Deleting,
        FileStatus::Deleted => DbFileStatus::Deleted,
    }
}

fn to_domain_status(status: DbFileStatus) -> FileStatus {
    match status {
        DbFileStatus::Uploaded => FileStatus::Uploaded,
        DbFileStatus::Attached => FileStatus::Attached,
        DbFileStatus::Deleting => FileStatus::Deleting,
        DbFileStatus::Deleted => FileStatus::Deleted,
    }
}

fn to_db_owner_type(owner_type: OwnerType) -> DbOwnerType {
    match owner_type {
        OwnerType::Excuse => DbOwnerType::Excuse,
        OwnerType::Profile => DbOwnerType::Profile,
        OwnerType::Document => DbOwnerType::Document,
    }
}

fn to_domain_owner_type(owner_type: DbOwnerType) -> OwnerType {
    match owner_type {
        DbOwnerType::Excuse => OwnerType::Excuse,
        DbOwnerType::Profile => OwnerType::Profile,
        DbOwnerType::Document => OwnerType::Document,
    }
}

fn to_db_backend(backend: StorageBackend) -> DbStorageBackend {
    match backend {
        StorageBackend::S3 => DbStorageBackend::S3,
        StorageBackend::AzureBlob => DbStorageBackend::AzureBlob,
        StorageBackend::Local => DbStorageBackend::Local,
        StorageBackend::Memory => DbStorageBackend::Memory,
    }
}

fn to_domain_backend(backend: DbStorageBackend) -> StorageBackend {
    match backend {
        DbStorageBackend::S3 => StorageBackend::S3,
        DbStorageBackend::AzureBlob => StorageBackend::AzureBlob,
        DbStorageBackend::Local => StorageBackend::Local,
        DbStorageBackend::Memory => StorageBackend::Memory,
    }
}
