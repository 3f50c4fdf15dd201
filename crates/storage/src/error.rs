//! Error types for provisioning operations.

use rusty_provisioning_common::PathError;
use thiserror::Error;

/// Errors raised by transfer backends and their collaborators.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// Object not found in the object store.
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Nothing exists at a remote URL.
    #[error("Not found: {uri}")]
    RemoteNotFound { uri: String },

    /// Access denied.
    #[error("Access denied to {resource}: {message}")]
    AccessDenied { resource: String, message: String },

    /// Network error.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// External download tool failed or could not be started.
    #[error("{program} failed: {message}")]
    ToolFailed { program: String, message: String },

    /// External tool reported success but its output file is absent.
    #[error("Expected downloaded file is missing: {path}")]
    MissingOutput { path: String },

    /// A remote location could not be parsed.
    #[error("Invalid URI {uri}: {message}")]
    InvalidUri { uri: String, message: String },

    /// No scheme handler is registered for this URL scheme.
    #[error("Unsupported URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    /// The engine was not given a backend for the selected route.
    #[error("No backend configured for {route}")]
    NoBackend { route: String },

    /// Operation cancelled by a progress callback.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl StorageError {
    /// Check if this error is retryable.
    ///
    /// The engine never retries; this is advisory for callers that do.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::NetworkError { retryable, .. } => *retryable,
            StorageError::NotFound { .. }
            | StorageError::RemoteNotFound { .. }
            | StorageError::AccessDenied { .. }
            | StorageError::IoError { .. }
            | StorageError::ToolFailed { .. }
            | StorageError::MissingOutput { .. }
            | StorageError::InvalidUri { .. }
            | StorageError::UnsupportedScheme { .. }
            | StorageError::NoBackend { .. }
            | StorageError::Cancelled
            | StorageError::InvalidConfig { .. }
            | StorageError::Other { .. } => false,
        }
    }

    /// Build an `IoError` tagged with the path it occurred on.
    pub fn io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        StorageError::IoError {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

impl From<PathError> for StorageError {
    fn from(err: PathError) -> Self {
        StorageError::IoError {
            path: err.path,
            message: err.message,
        }
    }
}

/// Fatal failure of a single provisioning operation.
///
/// Non-fatal conditions (cache link failures, classification fallbacks)
/// never surface here; they are logged and the operation degrades.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The cache root does not exist and could not be created.
    #[error("Could not create provisioning cache {path}: {message}")]
    CacheUnavailable { path: String, message: String },

    /// Settings could not be loaded or are inconsistent.
    #[error("Provisioning configuration error")]
    Config(#[source] StorageError),

    /// An input file could not be staged.
    #[error("Could not provision input file {source_path}")]
    Input {
        source_path: String,
        #[source]
        source: StorageError,
    },

    /// An output file could not be pushed.
    #[error("Could not provision output file to {destination}")]
    Output {
        destination: String,
        #[source]
        source: StorageError,
    },
}

impl ProvisionError {
    /// The backend error underneath this failure, if any.
    pub fn storage_error(&self) -> Option<&StorageError> {
        match self {
            ProvisionError::CacheUnavailable { .. } => None,
            ProvisionError::Config(source)
            | ProvisionError::Input { source, .. }
            | ProvisionError::Output { source, .. } => Some(source),
        }
    }
}

/// Non-fatal error encountered during a batch transfer.
#[derive(Debug)]
pub struct TransferError {
    /// The logical path or destination that failed.
    pub key: String,
    /// The error that occurred.
    pub error: ProvisionError,
}

impl TransferError {
    /// Create a new transfer error.
    pub fn new(key: impl Into<String>, error: ProvisionError) -> Self {
        Self {
            key: key.into(),
            error,
        }
    }
}
