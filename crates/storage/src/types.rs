//! Shared data structures for provisioning operations.

use std::fmt;
use std::path::PathBuf;

use crate::error::{StorageError, TransferError};

/// Which backend serves a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendRoute {
    /// Storage-grid object via the external download tool.
    GridObject,
    /// Synapse entity.
    Repository,
    /// S3-compatible object store.
    ObjectStore,
    /// Local file, hard-linked or copied.
    Local,
    /// Any other URL, via the scheme registry.
    GenericRemote,
}

impl fmt::Display for BackendRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = match self {
            BackendRoute::GridObject => "grid-object",
            BackendRoute::Repository => "repository",
            BackendRoute::ObjectStore => "object-store",
            BackendRoute::Local => "local",
            BackendRoute::GenericRemote => "generic-remote",
        };
        f.write_str(name)
    }
}

/// Bucket and key parsed out of an `s3://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    /// Bucket name (first path segment).
    pub bucket: String,
    /// Object key (remaining segments joined with `/`).
    pub key: String,
}

impl ObjectLocation {
    /// Parse `s3://bucket/key/...`.
    ///
    /// # Errors
    /// Returns `InvalidUri` if the prefix, bucket or key is missing.
    pub fn parse(uri: &str) -> Result<Self, StorageError> {
        let trimmed: &str =
            uri.strip_prefix(crate::classify::OBJECT_STORE_PREFIX)
                .ok_or_else(|| StorageError::InvalidUri {
                    uri: uri.to_string(),
                    message: "expected an s3:// URI".to_string(),
                })?;

        let (bucket, key) = trimmed.split_once('/').unwrap_or((trimmed, ""));
        if bucket.is_empty() {
            return Err(StorageError::InvalidUri {
                uri: uri.to_string(),
                message: "missing bucket".to_string(),
            });
        }
        if key.is_empty() {
            return Err(StorageError::InvalidUri {
                uri: uri.to_string(),
                message: "missing object key".to_string(),
            });
        }

        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// An input to stage: logical source and local destination.
#[derive(Debug, Clone)]
pub struct InputRequest {
    /// Logical source path, as supplied by the caller.
    pub source: String,
    /// Local destination file.
    pub destination: PathBuf,
}

impl InputRequest {
    /// Create an input request.
    pub fn new(source: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// An output to push: local source and remote destination.
#[derive(Debug, Clone)]
pub struct OutputRequest {
    /// Local file produced by the job.
    pub source: PathBuf,
    /// Destination URL.
    pub destination: String,
}

impl OutputRequest {
    /// Create an output request.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// What a single provisioning call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    /// Backend that served the transfer; `None` for a cache hit.
    pub route: Option<BackendRoute>,
    /// Local file written (input) or read (output).
    pub local_path: PathBuf,
    /// Satisfied from the cache without touching a backend.
    pub cache_hit: bool,
    /// Bytes moved by the backend (0 on a cache hit).
    pub bytes_transferred: u64,
    /// A new cache entry was created for this input.
    pub cached: bool,
}

/// Aggregated statistics for batch operations.
#[derive(Debug, Default)]
pub struct TransferStatistics {
    /// Total files processed.
    pub files_processed: u64,
    /// Files moved by a backend.
    pub files_transferred: u64,
    /// Files satisfied from the cache.
    pub cache_hits: u64,
    /// Total bytes moved by backends.
    pub bytes_transferred: u64,
    /// Per-file failures; other files still completed.
    pub errors: Vec<TransferError>,
}

impl TransferStatistics {
    /// Fold one outcome into the totals.
    pub fn record(&mut self, outcome: &ProvisionOutcome) {
        self.files_processed += 1;
        if outcome.cache_hit {
            self.cache_hits += 1;
        } else {
            self.files_transferred += 1;
            self.bytes_transferred += outcome.bytes_transferred;
        }
    }

    /// Record a failed file.
    pub fn record_error(&mut self, error: TransferError) {
        self.files_processed += 1;
        self.errors.push(error);
    }

    /// Whether every file succeeded.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}
