//! Named data repository entities (Synapse `syn` identifiers).

use std::path::Path;

use async_trait::async_trait;

use crate::classify::{has_repository_prefix, LogicalPath};
use crate::copy::prepare_destination;
use crate::error::StorageError;
use crate::traits::{Progress, RepositoryClient, TransferBackend};
use crate::types::BackendRoute;

/// Fetches repository entities through a [`RepositoryClient`].
pub struct RepositoryBackend<C: RepositoryClient> {
    client: C,
}

impl<C: RepositoryClient> RepositoryBackend<C> {
    /// Wrap a repository client.
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: RepositoryClient> TransferBackend for RepositoryBackend<C> {
    fn route(&self) -> BackendRoute {
        BackendRoute::Repository
    }

    async fn fetch(
        &self,
        source: &LogicalPath,
        destination: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let entity_id: &str = source.as_str();
        if !has_repository_prefix(entity_id) {
            return Err(StorageError::InvalidUri {
                uri: entity_id.to_string(),
                message: "not a repository entity id".to_string(),
            });
        }
        prepare_destination(destination).await?;
        log::info!("Downloading {} to {}", entity_id, destination.display());
        self.client
            .download_latest(entity_id, destination, progress)
            .await
    }
}
