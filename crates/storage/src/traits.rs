//! Capability traits the engine and its backends are built on.
//!
//! Each trait is a seam where a real network client or process launcher is
//! plugged in; tests substitute in-memory fakes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusty_provisioning_common::{ProgressCallback, TransferProgress};
use tokio::io::AsyncRead;
use url::Url;

use crate::classify::LogicalPath;
use crate::error::StorageError;
use crate::types::BackendRoute;

/// Progress sink passed through every transfer.
pub type Progress<'a> = &'a dyn ProgressCallback<TransferProgress>;

/// One way of moving bytes between a logical path and the local filesystem.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// The route this backend serves.
    fn route(&self) -> BackendRoute;

    /// Fetch `source` into the local file `destination`.
    ///
    /// An existing `destination` may be a hard link to a cache entry, so it
    /// must be replaced rather than written through; see
    /// [`crate::create_destination_file`].
    ///
    /// # Returns
    /// Total bytes written to `destination`.
    async fn fetch(
        &self,
        source: &LogicalPath,
        destination: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError>;

    /// Push the local file `source` to `destination`.
    ///
    /// # Returns
    /// Total bytes sent.
    async fn push(
        &self,
        source: &Path,
        destination: &str,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let _ = (source, progress);
        Err(StorageError::Other {
            message: format!("{} backend cannot push to {}", self.route(), destination),
        })
    }
}

/// Result of running an external tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Whether the tool exited with status zero.
    pub success: bool,
    /// Exit code, if the tool exited normally.
    pub code: Option<i32>,
    /// Captured standard error.
    pub stderr: String,
}

/// Launches external command-line tools.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `program` with `args` to completion.
    ///
    /// # Errors
    /// Returns `ToolFailed` only if the process could not be started; a
    /// non-zero exit is reported through [`ToolOutput::success`].
    async fn run(&self, program: &Path, args: &[String]) -> Result<ToolOutput, StorageError>;
}

/// Object-store operations, implemented per SDK.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Stream an object into a local file, creating parent directories.
    ///
    /// # Returns
    /// Bytes written.
    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError>;

    /// Upload a local file, in parts if it is large.
    ///
    /// # Returns
    /// Bytes uploaded.
    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError>;
}

#[async_trait]
impl<T: ObjectStoreClient + ?Sized> ObjectStoreClient for Arc<T> {
    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        (**self)
            .get_object_to_file(bucket, key, file_path, progress)
            .await
    }

    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        (**self)
            .put_object_from_file(bucket, key, file_path, progress)
            .await
    }
}

/// An open remote byte source.
pub struct RemoteReader {
    /// The content stream.
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Content length, when the remote reports one.
    pub size: Option<u64>,
}

/// Access to one family of URL schemes for the generic remote backend.
#[async_trait]
pub trait SchemeHandler: Send + Sync {
    /// Schemes this handler serves, lowercase.
    fn schemes(&self) -> &[&'static str];

    /// Open `uri` for reading.
    async fn open_read(&self, uri: &Url) -> Result<RemoteReader, StorageError>;

    /// Write the local file `source` to `uri`.
    ///
    /// # Returns
    /// Bytes written.
    async fn write_from_file(
        &self,
        source: &Path,
        uri: &Url,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError>;
}

/// Client for a named data repository (Synapse).
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Download the current version of `entity_id` to `destination`.
    ///
    /// # Returns
    /// Bytes written.
    async fn download_latest(
        &self,
        entity_id: &str,
        destination: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError>;
}

#[async_trait]
impl<T: RepositoryClient + ?Sized> RepositoryClient for Arc<T> {
    async fn download_latest(
        &self,
        entity_id: &str,
        destination: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        (**self)
            .download_latest(entity_id, destination, progress)
            .await
    }
}
