//! Upload ingestion.
//!
//! An upload is validated, quota-checked and sniffed before any bytes reach
//! the blob store. Small uploads are buffered and written in one call; large
//! ones are piped to the store through a bounded channel so a slow backend
//! stalls the client instead of filling memory. Either way the checksum and
//! size come from the bytes that actually left the process.
//!
//! The blob is written first and the record second. If anything fails after
//! the write started, the blob is deleted before the error is returned.

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use filestore_shared::config::{UploadConfig, is_valid_bucket_name};
use filestore_shared::types::{FileId, TenantId};
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt, stream};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{FileError, InvalidInput};
use super::quota::QuotaGate;
use super::repository::FileRepository;
use super::sniff::{self, SNIFF_WINDOW};
use super::types::{NewFileRecord, UploadRequest, UploadResult};
use crate::storage::{ByteStream, PutOptions, StoragePort, Visibility};

/// Running checksum and byte count with a hard ceiling.
struct Meter {
    hasher: Sha256,
    size: u64,
    max: u64,
}

/// Checksum and size of the bytes handed to the blob store.
struct Observed {
    checksum: String,
    size: u64,
}

impl Meter {
    fn new(max: u64) -> Self {
        Self {
            hasher: Sha256::new(),
            size: 0,
            max,
        }
    }

    fn observe(&mut self, chunk: &[u8]) -> Result<(), InvalidInput> {
        self.size = self.size.saturating_add(chunk.len() as u64);
        if self.size > self.max {
            return Err(InvalidInput::SizeLimitExceeded { max: self.max });
        }
        self.hasher.update(chunk);
        Ok(())
    }

    fn finish(self) -> Observed {
        Observed {
            checksum: format!("{:x}", self.hasher.finalize()),
            size: self.size,
        }
    }
}

/// Ingests uploads into the blob store and the record table.
pub struct UploadIngestor<R: FileRepository, S: StoragePort, Q: QuotaGate> {
    repo: Arc<R>,
    storage: Arc<S>,
    quota: Arc<Q>,
    config: UploadConfig,
}

impl<R: FileRepository, S: StoragePort, Q: QuotaGate> UploadIngestor<R, S, Q> {
    /// Create a new ingestor.
    #[must_use]
    pub fn new(repo: Arc<R>, storage: Arc<S>, quota: Arc<Q>, config: UploadConfig) -> Self {
        Self {
            repo,
            storage,
            quota,
            config,
        }
    }

    /// Upload limits in effect.
    #[must_use]
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Store a new file in status `uploaded`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The tenant, name or declared size is invalid
    /// - The body is empty, or crosses the size ceiling while being read
    /// - The detected content type is not allowed
    /// - The tenant quota would be exceeded
    /// - The blob store or the repository fails (the blob is removed first)
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadResult, FileError> {
        self.validate(&request)?;
        self.quota
            .check_quota(request.tenant_id, request.declared_size)
            .await?;

        let UploadRequest {
            tenant_id,
            body,
            original_name,
            declared_content_type,
            declared_size,
            bucket,
            metadata,
        } = request;

        let (prefix, rest) = read_prefix(body).await?;
        let head: Vec<u8> = prefix.iter().flat_map(|c| c.iter().copied()).collect();
        if head.is_empty() {
            return Err(InvalidInput::EmptyStream.into());
        }

        let detected = sniff::detect(&head);
        if !self.config.is_content_type_allowed(detected) {
            debug!(
                tenant_id = %tenant_id,
                declared = %declared_content_type,
                detected,
                "Rejected upload content type"
            );
            return Err(InvalidInput::DisallowedContentType(detected.to_string()).into());
        }

        let body: ByteStream = stream::iter(prefix.into_iter().map(Ok)).chain(rest).boxed();
        let storage_key = storage_key(tenant_id);
        let options = PutOptions {
            content_type: detected.to_string(),
            size_hint: Some(declared_size),
            visibility: Visibility::Private,
            bucket: bucket.clone(),
        };

        let stored = if declared_size <= self.config.stream_threshold {
            self.put_buffered(body, &storage_key, options).await
        } else {
            self.put_streaming(body, &storage_key, options).await
        };
        let observed = match stored {
            Ok(observed) => observed,
            Err(e) => {
                self.discard(&storage_key, bucket.as_deref(), &e).await;
                return Err(e);
            }
        };

        let record = NewFileRecord {
            id: FileId::new(),
            tenant_id,
            original_name,
            declared_content_type,
            detected_content_type: detected.to_string(),
            size: observed.size,
            checksum: observed.checksum,
            storage_key: storage_key.clone(),
            storage_backend: self.storage.backend(),
            bucket: bucket.clone(),
            metadata,
            created_at: Utc::now(),
        };

        let record = match self.repo.insert(record).await {
            Ok(record) => record,
            Err(e) => {
                self.discard(&storage_key, bucket.as_deref(), &e).await;
                return Err(e);
            }
        };

        info!(
            file_id = %record.id,
            tenant_id = %tenant_id,
            size = record.size,
            content_type = %record.detected_content_type,
            "File uploaded"
        );

        Ok(UploadResult {
            file_id: record.id,
            checksum: record.checksum,
            size: record.size,
            content_type: record.detected_content_type,
        })
    }

    fn validate(&self, request: &UploadRequest) -> Result<(), InvalidInput> {
        if request.tenant_id.is_nil() {
            return Err(InvalidInput::MissingTenant);
        }
        if request.declared_size == 0 {
            return Err(InvalidInput::EmptyStream);
        }
        if request.declared_size > self.config.max_file_size {
            return Err(InvalidInput::DeclaredSizeTooLarge {
                size: request.declared_size,
                max: self.config.max_file_size,
            });
        }

        let name = request.original_name.trim();
        if name.is_empty() {
            return Err(InvalidInput::InvalidName("name is required".to_string()));
        }
        if name.chars().count() > self.config.max_name_length {
            return Err(InvalidInput::InvalidName(format!(
                "name exceeds {} characters",
                self.config.max_name_length
            )));
        }
        if let Some(bucket) = request.bucket.as_deref()
            && !is_valid_bucket_name(bucket)
        {
            return Err(InvalidInput::InvalidBucket(bucket.to_string()));
        }
        Ok(())
    }

    /// Read the whole body into memory, then write it in one call.
    ///
    /// The declared size only chose this path. A body that outgrows the
    /// stream threshold is handed, with what was read so far, to the
    /// streaming path instead of growing the buffer further.
    async fn put_buffered(
        &self,
        mut body: ByteStream,
        key: &str,
        options: PutOptions,
    ) -> Result<Observed, FileError> {
        let mut buffer = BytesMut::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(interrupted)?;
            buffer.extend_from_slice(&chunk);

            let buffered = buffer.len() as u64;
            if buffered > self.config.max_file_size {
                return Err(InvalidInput::SizeLimitExceeded {
                    max: self.config.max_file_size,
                }
                .into());
            }
            if buffered > self.config.stream_threshold {
                debug!(key, buffered, "Upload outgrew buffered path, streaming the rest");
                let head = stream::iter([Ok::<_, io::Error>(buffer.freeze())]);
                return self
                    .put_streaming(head.chain(body).boxed(), key, options)
                    .await;
            }
        }

        let mut meter = Meter::new(self.config.max_file_size);
        meter.observe(&buffer)?;
        self.storage
            .put(stream::iter([Ok(buffer.freeze())]).boxed(), key, options)
            .await?;
        Ok(meter.finish())
    }

    /// Pump the body through a bounded pipe into a concurrent write.
    ///
    /// A ceiling violation or a client error is forwarded down the pipe as
    /// an error item, which makes the store abort the write.
    async fn put_streaming(
        &self,
        mut body: ByteStream,
        key: &str,
        options: PutOptions,
    ) -> Result<Observed, FileError> {
        let (mut tx, rx) = mpsc::channel::<io::Result<Bytes>>(self.config.stream_buffer_chunks);
        let mut meter = Meter::new(self.config.max_file_size);

        let pump = async move {
            while let Some(chunk) = body.next().await {
                let checked = chunk
                    .map_err(interrupted)
                    .and_then(|chunk| meter.observe(&chunk).map(|()| chunk));
                match checked {
                    Ok(chunk) => {
                        if tx.send(Ok(chunk)).await.is_err() {
                            // Sink hung up; the write result carries the reason.
                            break;
                        }
                    }
                    Err(reason) => {
                        let _ = tx.send(Err(io::Error::other(reason.to_string()))).await;
                        return Err(reason);
                    }
                }
            }
            Ok(meter)
        };
        let write = self.storage.put(rx.boxed(), key, options);

        let (pumped, written) = futures::join!(pump, write);
        let meter = pumped?;
        written?;
        Ok(meter.finish())
    }

    /// Compensating delete for a blob whose record will never exist.
    async fn discard(&self, key: &str, bucket: Option<&str>, cause: &FileError) {
        let outcome = self.storage.delete(key, bucket).await;
        if outcome.is_deleted() {
            debug!(key, cause = %cause, "Discarded blob of failed upload");
        } else {
            warn!(key, cause = %cause, "Blob of failed upload left for manual cleanup");
        }
    }
}

fn interrupted(err: io::Error) -> InvalidInput {
    InvalidInput::StreamInterrupted(err.to_string())
}

/// Fresh key per upload; never derived from client input.
fn storage_key(tenant_id: TenantId) -> String {
    format!("{tenant_id}/{}", Uuid::now_v7())
}

/// Pull chunks until at least [`SNIFF_WINDOW`] bytes are buffered or the
/// body ends. Returns the buffered chunks and the unread remainder.
async fn read_prefix(mut body: ByteStream) -> Result<(Vec<Bytes>, ByteStream), InvalidInput> {
    let mut chunks = Vec::new();
    let mut buffered = 0;

    while buffered < SNIFF_WINDOW {
        match body.next().await {
            Some(Ok(chunk)) => {
                buffered += chunk.len();
                chunks.push(chunk);
            }
            Some(Err(e)) => return Err(interrupted(e)),
            None => break,
        }
    }
    Ok((chunks, body))
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
