//! Files table for the storage lifecycle.
//!
//! Status transitions are conditional updates against this table, so the
//! indexes follow the sweep predicates: `(status, created_at)` for the
//! orphan claim and `(status, updated_at)` for the deferred batch.
//!
//! `claim_token` names the sweep holding a `deleting` row. It is cleared
//! whenever the row leaves `deleting`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(FILES_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP TABLE IF EXISTS files CASCADE;")
            .await?;
        Ok(())
    }
}

const FILES_SQL: &str = r"
CREATE TABLE files (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    original_name VARCHAR(500) NOT NULL,
    declared_content_type VARCHAR(255) NOT NULL,
    detected_content_type VARCHAR(255) NOT NULL,
    size_bytes BIGINT NOT NULL,
    checksum_sha256 VARCHAR(64) NOT NULL,
    storage_key VARCHAR(512) NOT NULL,
    storage_backend VARCHAR(16) NOT NULL,
    bucket VARCHAR(255),
    owner_type VARCHAR(16),
    owner_id UUID,
    attached_at TIMESTAMPTZ,
    status VARCHAR(16) NOT NULL DEFAULT 'uploaded',
    deleted_at TIMESTAMPTZ,
    claim_token UUID,
    metadata JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_files_storage_key UNIQUE (storage_key),
    CONSTRAINT chk_files_size CHECK (size_bytes > 0),
    CONSTRAINT chk_files_status CHECK (status IN ('uploaded', 'attached', 'deleting', 'deleted')),
    CONSTRAINT chk_files_owner_type CHECK (owner_type IN ('excuse', 'profile', 'document')),
    CONSTRAINT chk_files_backend CHECK (storage_backend IN ('s3', 'azure_blob', 'local', 'memory')),
    -- owner type and id travel together
    CONSTRAINT chk_files_owner_pair CHECK ((owner_type IS NULL) = (owner_id IS NULL)),
    CONSTRAINT chk_files_attached_owner CHECK (
        status <> 'attached' OR (owner_id IS NOT NULL AND attached_at IS NOT NULL)
    ),
    CONSTRAINT chk_files_uploaded_unowned CHECK (
        status <> 'uploaded' OR (owner_id IS NULL AND attached_at IS NULL)
    ),
    CONSTRAINT chk_files_claim_deleting CHECK (status = 'deleting' OR claim_token IS NULL)
);

-- Tenant listing, newest first
CREATE INDEX idx_files_tenant ON files(tenant_id, created_at DESC);

-- Owner lookups (find_by_owner, delete_by_owner)
CREATE INDEX idx_files_owner ON files(tenant_id, owner_type, owner_id) WHERE owner_id IS NOT NULL;

-- Orphan claim
CREATE INDEX idx_files_status_created ON files(status, created_at);

-- Deferred delete batches
CREATE INDEX idx_files_status_updated ON files(status, updated_at);
";
