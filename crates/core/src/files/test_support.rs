//! Shared fixtures for lifecycle tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use filestore_shared::types::{FileId, TenantId};
use futures::{StreamExt, TryStreamExt, stream};
use tokio::sync::Notify;

use super::types::NewFileRecord;
use crate::storage::{
    ByteStream, DeleteOutcome, OpendalStorage, PutOptions, PutReceipt, StorageBackend,
    StorageError, StoragePort, StoredObject,
};

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01";

pub fn new_record(tenant_id: TenantId, size: u64) -> NewFileRecord {
    let id = FileId::new();
    NewFileRecord {
        id,
        tenant_id,
        original_name: "photo.png".to_string(),
        declared_content_type: "image/png".to_string(),
        detected_content_type: "image/png".to_string(),
        size,
        checksum: "0".repeat(64),
        storage_key: format!("{tenant_id}/{id}"),
        storage_backend: StorageBackend::Memory,
        bucket: None,
        metadata: None,
        created_at: Utc::now(),
    }
}

/// Single-chunk body.
pub fn body(bytes: &[u8]) -> ByteStream {
    stream::once(futures::future::ready(Ok(Bytes::copy_from_slice(bytes)))).boxed()
}

/// Body split into `chunk`-sized pieces.
pub fn chunked(bytes: &[u8], chunk: usize) -> ByteStream {
    let chunks: Vec<std::io::Result<Bytes>> = bytes
        .chunks(chunk)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    stream::iter(chunks).boxed()
}

pub async fn read_all(body: ByteStream) -> Vec<u8> {
    body.try_fold(Vec::new(), |mut acc, chunk| async move {
        acc.extend_from_slice(&chunk);
        Ok(acc)
    })
    .await
    .unwrap()
}

/// Memory storage with switchable failures.
pub struct FlakyStorage {
    pub inner: OpendalStorage,
    pub fail_puts: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub redirect: Option<String>,
    pub deletes: AtomicUsize,
    pub puts: AtomicUsize,
    pub put_chunks: Arc<AtomicUsize>,
    pub last_key: Mutex<Option<String>>,
    pub park_next_delete: AtomicBool,
    pub parked: Notify,
    pub resume: Notify,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self {
            inner: OpendalStorage::memory().unwrap(),
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            redirect: None,
            deletes: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            put_chunks: Arc::new(AtomicUsize::new(0)),
            last_key: Mutex::new(None),
            park_next_delete: AtomicBool::new(false),
            parked: Notify::new(),
            resume: Notify::new(),
        }
    }

    pub fn with_redirect(url: &str) -> Self {
        Self {
            redirect: Some(url.to_string()),
            ..Self::new()
        }
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// The next delete blocks until [`Self::resume_delete`], then fails.
    pub fn park_next_delete(&self) {
        self.park_next_delete.store(true, Ordering::SeqCst);
    }

    pub async fn delete_parked(&self) {
        self.parked.notified().await;
    }

    pub fn resume_delete(&self) {
        self.resume.notify_one();
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Chunks handed to the backend across all puts.
    pub fn chunks_written(&self) -> usize {
        self.put_chunks.load(Ordering::SeqCst)
    }

    /// Key of the most recent put attempt.
    pub fn last_key(&self) -> String {
        self.last_key.lock().unwrap().clone().unwrap()
    }

    pub async fn contains(&self, key: &str, bucket: Option<&str>) -> bool {
        self.inner.exists(key, bucket).await.unwrap()
    }
}

impl StoragePort for FlakyStorage {
    fn backend(&self) -> StorageBackend {
        self.inner.backend()
    }

    async fn get(&self, key: &str, bucket: Option<&str>) -> Result<StoredObject, StorageError> {
        self.inner.get(key, bucket).await
    }

    async fn put(
        &self,
        body: ByteStream,
        key: &str,
        options: PutOptions,
    ) -> Result<PutReceipt, StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        *self.last_key.lock().unwrap() = Some(key.to_string());
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("injected put failure"));
        }
        let counter = Arc::clone(&self.put_chunks);
        let body = body
            .inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .boxed();
        self.inner.put(body, key, options).await
    }

    async fn delete(&self, key: &str, bucket: Option<&str>) -> DeleteOutcome {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.park_next_delete.swap(false, Ordering::SeqCst) {
            self.parked.notify_one();
            self.resume.notified().await;
            return DeleteOutcome::Failed("delete timed out".to_string());
        }
        if self.fail_deletes.load(Ordering::SeqCst) {
            return DeleteOutcome::Failed("injected delete failure".to_string());
        }
        self.inner.delete(key, bucket).await
    }

    async fn redirect_url(
        &self,
        key: &str,
        _bucket: Option<&str>,
        _ttl: Duration,
    ) -> Result<Option<String>, StorageError> {
        match &self.redirect {
            Some(url) if url == "error" => Err(StorageError::unavailable("signer down")),
            Some(url) => Ok(Some(format!("{url}/{key}"))),
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &str, bucket: Option<&str>) -> Result<bool, StorageError> {
        self.inner.exists(key, bucket).await
    }
}
