//! Generic remote files, resolved through a registry of scheme handlers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rusty_provisioning_common::{lexical_normalize, resolve_against, to_absolute, OperationType};
use tokio::fs::File;
use url::Url;

use crate::classify::LogicalPath;
use crate::copy::{copy_with_progress, create_destination_file};
use crate::error::StorageError;
use crate::traits::{Progress, RemoteReader, SchemeHandler, TransferBackend};
use crate::types::BackendRoute;

/// Serves `file://` URLs from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSchemeHandler;

fn url_to_path(uri: &Url) -> Result<PathBuf, StorageError> {
    uri.to_file_path().map_err(|()| StorageError::InvalidUri {
        uri: uri.to_string(),
        message: "not a local file URL".to_string(),
    })
}

#[async_trait]
impl SchemeHandler for FileSchemeHandler {
    fn schemes(&self) -> &[&'static str] {
        &["file"]
    }

    async fn open_read(&self, uri: &Url) -> Result<RemoteReader, StorageError> {
        let path: PathBuf = url_to_path(uri)?;
        let file: File = File::open(&path)
            .await
            .map_err(|e: std::io::Error| StorageError::io(&path, e))?;
        let size: u64 = file
            .metadata()
            .await
            .map_err(|e: std::io::Error| StorageError::io(&path, e))?
            .len();
        Ok(RemoteReader {
            reader: Box::new(file),
            size: Some(size),
        })
    }

    async fn write_from_file(
        &self,
        source: &Path,
        uri: &Url,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let destination: PathBuf = url_to_path(uri)?;
        let mut input: File = File::open(source)
            .await
            .map_err(|e: std::io::Error| StorageError::io(source, e))?;
        let size: u64 = input
            .metadata()
            .await
            .map_err(|e: std::io::Error| StorageError::io(source, e))?
            .len();
        let mut output: File = create_destination_file(&destination).await?;

        copy_with_progress(
            &mut input,
            &mut output,
            uri.as_str(),
            OperationType::Uploading,
            Some(size),
            progress,
        )
        .await
    }
}

/// Catch-all backend for URL-addressed files.
///
/// `file://` is always available; other schemes (HTTP and friends) are
/// registered by the caller.
pub struct GenericRemoteClient {
    handlers: HashMap<String, Arc<dyn SchemeHandler>>,
    working_dir: Option<PathBuf>,
}

impl Default for GenericRemoteClient {
    fn default() -> Self {
        Self::new(None)
    }
}

impl GenericRemoteClient {
    /// Create a client with only the `file` scheme registered.
    ///
    /// # Arguments
    /// * `working_dir` - Base for relative output destinations
    pub fn new(working_dir: Option<PathBuf>) -> Self {
        let mut client: GenericRemoteClient = Self {
            handlers: HashMap::new(),
            working_dir,
        };
        client.register(Arc::new(FileSchemeHandler));
        client
    }

    /// Register a handler for each scheme it reports, replacing earlier ones.
    pub fn register(&mut self, handler: Arc<dyn SchemeHandler>) {
        for scheme in handler.schemes() {
            self.handlers
                .insert(scheme.to_ascii_lowercase(), Arc::clone(&handler));
        }
    }

    /// Builder form of [`GenericRemoteClient::register`].
    pub fn with_handler(mut self, handler: Arc<dyn SchemeHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Whether a handler exists for `scheme`.
    pub fn supports(&self, scheme: &str) -> bool {
        self.handlers.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Turn a destination into a URL. Plain paths become `file://` URLs.
    fn resolve(&self, location: &str) -> Result<Url, StorageError> {
        if let LogicalPath::Remote { uri } = LogicalPath::classify(location) {
            return Url::parse(&uri).map_err(|e: url::ParseError| StorageError::InvalidUri {
                uri: uri.clone(),
                message: e.to_string(),
            });
        }

        let raw: &Path = Path::new(location);
        let absolute: PathBuf = match &self.working_dir {
            Some(base) => resolve_against(raw, base),
            None => to_absolute(raw)?,
        };
        Url::from_file_path(lexical_normalize(&absolute)).map_err(|()| StorageError::InvalidUri {
            uri: location.to_string(),
            message: "cannot express as a file URL".to_string(),
        })
    }

    fn handler_for(&self, uri: &Url) -> Result<&Arc<dyn SchemeHandler>, StorageError> {
        self.handlers
            .get(uri.scheme())
            .ok_or_else(|| StorageError::UnsupportedScheme {
                scheme: uri.scheme().to_string(),
            })
    }
}

#[async_trait]
impl TransferBackend for GenericRemoteClient {
    fn route(&self) -> BackendRoute {
        BackendRoute::GenericRemote
    }

    async fn fetch(
        &self,
        source: &LogicalPath,
        destination: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let uri: Url = self.resolve(source.as_str())?;
        let handler: &Arc<dyn SchemeHandler> = self.handler_for(&uri)?;

        let mut remote: RemoteReader = handler.open_read(&uri).await?;

        let mut output: File = create_destination_file(destination).await?;

        copy_with_progress(
            &mut remote.reader,
            &mut output,
            uri.as_str(),
            OperationType::Downloading,
            remote.size,
            progress,
        )
        .await
    }

    async fn push(
        &self,
        source: &Path,
        destination: &str,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let uri: Url = self.resolve(destination)?;
        let handler: &Arc<dyn SchemeHandler> = self.handler_for(&uri)?;
        handler.write_from_file(source, &uri, progress).await
    }
}
