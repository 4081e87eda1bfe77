//! Storage Port implementation using Apache OpenDAL.

use std::time::Duration;

use dashmap::DashMap;
use filestore_shared::config::{StorageConfig, StorageProvider};
use futures::StreamExt;
use opendal::{ErrorKind, Operator, services};
use tracing::{debug, warn};

use super::error::StorageError;
use super::port::{
    ByteStream, DeleteOutcome, PutOptions, PutReceipt, StorageBackend, StoragePort, StoredObject,
};

/// Object metadata key carrying [`super::port::Visibility`].
pub const VISIBILITY_METADATA_KEY: &str = "visibility";

/// OpenDAL-backed blob store.
///
/// The provider is selected once at startup. Operators for buckets other
/// than the provider default are built on first use and cached.
pub struct OpendalStorage {
    provider: StorageProvider,
    default: Operator,
    buckets: DashMap<String, Operator>,
}

impl OpendalStorage {
    /// Create a storage backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage provider cannot be initialized.
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let default = create_operator(&config.provider)?;
        Ok(Self {
            provider: config.provider.clone(),
            default,
            buckets: DashMap::new(),
        })
    }

    /// In-process store, used by tests and local tooling.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory service cannot be initialized.
    pub fn memory() -> Result<Self, StorageError> {
        Self::from_config(&StorageConfig::new(StorageProvider::Memory))
    }

    fn operator(&self, bucket: Option<&str>) -> Result<Operator, StorageError> {
        let Some(name) = bucket else {
            return Ok(self.default.clone());
        };
        if self.provider.default_bucket() == Some(name) {
            return Ok(self.default.clone());
        }
        if let Some(op) = self.buckets.get(name) {
            return Ok(op.clone());
        }

        let provider = self
            .provider
            .for_bucket(name)
            .ok_or_else(|| StorageError::configuration(format!("invalid bucket name: {name:?}")))?;
        let op = create_operator(&provider)?;
        self.buckets.insert(name.to_string(), op.clone());
        Ok(op)
    }
}

/// Create OpenDAL operator from provider config.
fn create_operator(provider: &StorageProvider) -> Result<Operator, StorageError> {
    let op = match provider {
        StorageProvider::S3 {
            endpoint,
            bucket,
            access_key_id,
            secret_access_key,
            region,
        } => {
            let builder = services::S3::default()
                .endpoint(endpoint)
                .bucket(bucket)
                .access_key_id(access_key_id)
                .secret_access_key(secret_access_key)
                .region(region);
            Operator::new(builder).map(|b| b.finish())
        }
        StorageProvider::AzureBlob {
            account,
            access_key,
            container,
        } => {
            let builder = services::Azblob::default()
                .account_name(account)
                .account_key(access_key)
                .container(container);
            Operator::new(builder).map(|b| b.finish())
        }
        StorageProvider::LocalFs { root } => {
            let root = root
                .to_str()
                .ok_or_else(|| StorageError::configuration("invalid path"))?;
            Operator::new(services::Fs::default().root(root)).map(|b| b.finish())
        }
        StorageProvider::Memory => Operator::new(services::Memory::default()).map(|b| b.finish()),
    };

    op.map_err(|e| StorageError::configuration(e.to_string()))
}

impl StoragePort for OpendalStorage {
    fn backend(&self) -> StorageBackend {
        match self.provider {
            StorageProvider::S3 { .. } => StorageBackend::S3,
            StorageProvider::AzureBlob { .. } => StorageBackend::AzureBlob,
            StorageProvider::LocalFs { .. } => StorageBackend::Local,
            StorageProvider::Memory => StorageBackend::Memory,
        }
    }

    async fn get(&self, key: &str, bucket: Option<&str>) -> Result<StoredObject, StorageError> {
        let op = self.operator(bucket)?;
        let meta = op.stat(key).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::not_found(key),
            _ => StorageError::from(e),
        })?;

        let body = op
            .reader(key)
            .await?
            .into_bytes_stream(..)
            .await?
            .boxed();

        Ok(StoredObject {
            body,
            size: meta.content_length(),
            content_type: meta.content_type().map(String::from),
        })
    }

    async fn put(
        &self,
        mut body: ByteStream,
        key: &str,
        options: PutOptions,
    ) -> Result<PutReceipt, StorageError> {
        let op = self.operator(options.bucket.as_deref())?;

        let capability = op.info().full_capability();
        let mut write = op.writer_with(key);
        if capability.write_with_content_type {
            write = write.content_type(&options.content_type);
        }
        if capability.write_with_user_metadata {
            write = write.user_metadata([(
                VISIBILITY_METADATA_KEY.to_string(),
                options.visibility.as_str().to_string(),
            )]);
        }
        let mut writer = write.await?;

        while let Some(chunk) = body.next().await {
            let written = match chunk {
                Ok(bytes) => writer.write(bytes).await.map_err(StorageError::from),
                Err(e) => Err(StorageError::Interrupted(e.to_string())),
            };
            if let Err(e) = written {
                if let Err(abort) = writer.abort().await {
                    debug!(key, error = %abort, "Writer abort failed");
                }
                return Err(e);
            }
        }

        writer.close().await?;
        debug!(
            key,
            size_hint = ?options.size_hint,
            visibility = options.visibility.as_str(),
            "Blob written"
        );

        Ok(PutReceipt {
            key: key.to_string(),
        })
    }

    async fn delete(&self, key: &str, bucket: Option<&str>) -> DeleteOutcome {
        let result = match self.operator(bucket) {
            Ok(op) => op.delete(key).await.map_err(StorageError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(key, "Blob deleted");
                DeleteOutcome::Deleted
            }
            Err(e) => {
                warn!(key, error = %e, "Blob delete failed");
                DeleteOutcome::Failed(e.to_string())
            }
        }
    }

    async fn redirect_url(
        &self,
        key: &str,
        bucket: Option<&str>,
        ttl: Duration,
    ) -> Result<Option<String>, StorageError> {
        let op = self.operator(bucket)?;
        if !op.info().full_capability().presign_read {
            return Ok(None);
        }

        let presigned = op.presign_read(key, ttl).await?;
        Ok(Some(presigned.uri().to_string()))
    }

    async fn exists(&self, key: &str, bucket: Option<&str>) -> Result<bool, StorageError> {
        let op = self.operator(bucket)?;
        match op.stat(key).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
