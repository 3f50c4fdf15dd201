//! Error types for the AWS SDK client.

use rusty_provisioning_storage::StorageError;
use thiserror::Error;

/// Errors specific to the AWS SDK client.
#[derive(Error, Debug)]
pub enum CrtError {
    /// AWS SDK error.
    #[error("AWS SDK error: {message}")]
    SdkError { message: String, retryable: bool },

    /// The service denied access to a bucket or object.
    #[error("Access denied to {resource}: {message}")]
    AccessDenied { resource: String, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error on a local file.
    #[error("I/O error on {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<CrtError> for StorageError {
    fn from(err: CrtError) -> Self {
        match err {
            CrtError::SdkError { message, retryable } => {
                StorageError::NetworkError { message, retryable }
            }
            CrtError::AccessDenied { resource, message } => {
                StorageError::AccessDenied { resource, message }
            }
            CrtError::ConfigError(message) => StorageError::InvalidConfig { message },
            CrtError::IoError { path, source } => StorageError::IoError {
                path,
                message: source.to_string(),
            },
        }
    }
}
