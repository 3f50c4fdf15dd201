//! S3-compatible object stores.

use std::path::Path;

use async_trait::async_trait;

use crate::classify::LogicalPath;
use crate::copy::prepare_destination;
use crate::error::StorageError;
use crate::traits::{ObjectStoreClient, Progress, TransferBackend};
use crate::types::{BackendRoute, ObjectLocation};

/// Fetches and pushes `s3://bucket/key` URIs through an [`ObjectStoreClient`].
pub struct ObjectStoreBackend<C: ObjectStoreClient> {
    client: C,
}

impl<C: ObjectStoreClient> ObjectStoreBackend<C> {
    /// Wrap an object-store client.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<C: ObjectStoreClient> TransferBackend for ObjectStoreBackend<C> {
    fn route(&self) -> BackendRoute {
        BackendRoute::ObjectStore
    }

    async fn fetch(
        &self,
        source: &LogicalPath,
        destination: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let location: ObjectLocation = ObjectLocation::parse(source.as_str())?;
        log::info!("Downloading {} to {}", location, destination.display());
        prepare_destination(destination).await?;
        self.client
            .get_object_to_file(&location.bucket, &location.key, destination, progress)
            .await
    }

    async fn push(
        &self,
        source: &Path,
        destination: &str,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let location: ObjectLocation = ObjectLocation::parse(destination)?;
        log::info!("Uploading {} to {}", source.display(), location);
        self.client
            .put_object_from_file(&location.bucket, &location.key, source, progress)
            .await
    }
}
