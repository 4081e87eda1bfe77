//! Application configuration management.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Blob storage configuration.
    pub storage: StorageConfig,
    /// Upload ingestion limits.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Reclamation reaper schedule.
    #[serde(default)]
    pub reaper: ReaperConfig,
    /// Per-tenant storage quota.
    #[serde(default)]
    pub quota: QuotaConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Blob storage provider.
///
/// Deserialized from a `type` tag; an unknown tag is rejected when the
/// configuration is loaded, not when the first blob is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageProvider {
    /// S3-compatible storage: Cloudflare R2, Supabase, AWS S3, DigitalOcean Spaces
    S3 {
        /// S3 endpoint URL.
        endpoint: String,
        /// Default bucket name.
        bucket: String,
        /// Access key ID.
        access_key_id: String,
        /// Secret access key.
        secret_access_key: String,
        /// Region.
        region: String,
    },
    /// Azure Blob Storage
    AzureBlob {
        /// Storage account name.
        account: String,
        /// Storage access key.
        access_key: String,
        /// Default container name.
        container: String,
    },
    /// Local filesystem (development only)
    LocalFs {
        /// Root directory path.
        root: PathBuf,
    },
    /// In-process memory (tests only)
    Memory,
}

impl StorageProvider {
    /// Create S3-compatible provider (Cloudflare R2, Supabase, AWS S3).
    #[must_use]
    pub fn s3(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self::S3 {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    /// Create Azure Blob Storage provider.
    #[must_use]
    pub fn azure_blob(
        account: impl Into<String>,
        access_key: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self::AzureBlob {
            account: account.into(),
            access_key: access_key.into(),
            container: container.into(),
        }
    }

    /// Create local filesystem provider (development only).
    #[must_use]
    pub fn local_fs(root: impl Into<PathBuf>) -> Self {
        Self::LocalFs { root: root.into() }
    }

    /// Returns the default bucket or container, if the provider has one.
    #[must_use]
    pub fn default_bucket(&self) -> Option<&str> {
        match self {
            Self::S3 { bucket, .. } => Some(bucket),
            Self::AzureBlob { container, .. } => Some(container),
            Self::LocalFs { .. } | Self::Memory => None,
        }
    }

    /// Returns a copy of this provider pointed at another bucket, or `None`
    /// if `name` is not a valid bucket name.
    ///
    /// Filesystem and memory providers map buckets to subdirectories.
    #[must_use]
    pub fn for_bucket(&self, name: &str) -> Option<Self> {
        if !is_valid_bucket_name(name) {
            return None;
        }
        let provider = match self {
            Self::S3 {
                endpoint,
                access_key_id,
                secret_access_key,
                region,
                ..
            } => Self::S3 {
                endpoint: endpoint.clone(),
                bucket: name.to_string(),
                access_key_id: access_key_id.clone(),
                secret_access_key: secret_access_key.clone(),
                region: region.clone(),
            },
            Self::AzureBlob {
                account,
                access_key,
                ..
            } => Self::AzureBlob {
                account: account.clone(),
                access_key: access_key.clone(),
                container: name.to_string(),
            },
            Self::LocalFs { root } => Self::LocalFs {
                root: root.join(name),
            },
            Self::Memory => Self::Memory,
        };
        Some(provider)
    }
}

/// Checks a bucket name against the rules shared by S3 and Azure containers:
/// 3 to 63 lowercase letters, digits, `-` or `.`, starting and ending with a
/// letter or digit, with no `..`.
///
/// A valid name is always a single path segment, so it can never leave the
/// filesystem root.
#[must_use]
pub fn is_valid_bucket_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    let edge = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();

    (3..=63).contains(&bytes.len())
        && bytes.first().is_some_and(edge)
        && bytes.last().is_some_and(edge)
        && bytes
            .iter()
            .all(|b| edge(b) || *b == b'-' || *b == b'.')
        && !name.contains("..")
}

/// Blob storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Storage provider configuration.
    pub provider: StorageProvider,
    /// Signed redirect URL TTL in seconds (default: 3600 = 1 hour).
    #[serde(default = "default_redirect_ttl")]
    pub redirect_ttl_secs: u64,
}

fn default_redirect_ttl() -> u64 {
    3600
}

impl StorageConfig {
    /// Create a storage config with default settings.
    #[must_use]
    pub fn new(provider: StorageProvider) -> Self {
        Self {
            provider,
            redirect_ttl_secs: default_redirect_ttl(),
        }
    }
}

/// Upload ingestion limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Hard byte ceiling for a single upload.
    pub max_file_size: u64,
    /// Declared sizes above this are streamed instead of buffered.
    pub stream_threshold: u64,
    /// Maximum length of the original file name, in characters.
    pub max_name_length: usize,
    /// Detected content types accepted for upload.
    pub allowed_content_types: Vec<String>,
    /// Number of chunks the streaming pipe holds before stalling the source.
    pub stream_buffer_chunks: usize,
}

impl UploadConfig {
    /// Default max file size: 50MB.
    pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
    /// Default streaming threshold: 10MB.
    pub const DEFAULT_STREAM_THRESHOLD: u64 = 10 * 1024 * 1024;
    /// Default file name ceiling.
    pub const DEFAULT_MAX_NAME_LENGTH: usize = 500;

    /// Set maximum file size.
    #[must_use]
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Set the buffered/streaming threshold.
    #[must_use]
    pub fn with_stream_threshold(mut self, size: u64) -> Self {
        self.stream_threshold = size;
        self
    }

    /// Set allowed content types.
    #[must_use]
    pub fn with_allowed_content_types(mut self, types: Vec<String>) -> Self {
        self.allowed_content_types = types;
        self
    }

    /// Default allowed content types.
    #[must_use]
    pub fn default_content_types() -> Vec<String> {
        vec![
            "image/jpeg".to_string(),
            "image/png".to_string(),
            "image/gif".to_string(),
            "image/webp".to_string(),
            "application/pdf".to_string(),
            "text/plain".to_string(),
        ]
    }

    /// Check if a detected content type is allowed.
    #[must_use]
    pub fn is_content_type_allowed(&self, content_type: &str) -> bool {
        self.allowed_content_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(content_type))
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: Self::DEFAULT_MAX_FILE_SIZE,
            stream_threshold: Self::DEFAULT_STREAM_THRESHOLD,
            max_name_length: Self::DEFAULT_MAX_NAME_LENGTH,
            allowed_content_types: Self::default_content_types(),
            stream_buffer_chunks: 8,
        }
    }
}

/// Reclamation reaper schedule.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Whether the periodic sweeps run at all.
    pub enabled: bool,
    /// Age after which a never-attached upload is reclaimed.
    pub orphan_ttl_hours: i64,
    /// Maximum number of `deleting` records handled per deferred sweep.
    pub batch_size: u64,
    /// Orphan sweep period in seconds.
    pub orphan_interval_secs: u64,
    /// Deferred-delete sweep period in seconds.
    pub deferred_interval_secs: u64,
    /// Seconds a sweep holds its claimed rows before another sweep may take
    /// them over.
    pub claim_lease_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            orphan_ttl_hours: 24,
            batch_size: 100,
            orphan_interval_secs: 3600,
            deferred_interval_secs: 3600,
            claim_lease_secs: 900,
        }
    }
}

/// Per-tenant storage quota.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Aggregate bytes a tenant may hold.
    pub max_storage_bytes: u64,
    /// Number of files a tenant may hold.
    pub max_file_count: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_storage_bytes: 2 * 1024 * 1024 * 1024,
            max_file_count: 10_000,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("FILESTORE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
