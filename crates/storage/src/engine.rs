//! Provisioning engine: classify, consult the cache, dispatch to a backend,
//! populate the cache.
//!
//! Input staging runs
//! `classify -> cache lookup -> (hit: done | miss: fetch -> populate -> done)`.
//! Output provisioning is `route -> push -> done` with no caching.
//!
//! Only backend failures are fatal. Cache problems are logged and degrade to
//! an uncached transfer; the engine itself never retries.

use std::collections::HashMap;
use std::io::Stderr;
use std::path::Path;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use rusty_provisioning_common::{NoOpProgress, ProgressBar};

use crate::backends::{GenericRemoteClient, GridObjectClient, LocalLinker};
use crate::cache::ContentCache;
use crate::classify::{has_repository_prefix, is_object_store_uri, is_repository_id, LogicalPath};
use crate::error::{ProvisionError, StorageError, TransferError};
use crate::settings::ProvisionSettings;
use crate::traits::{Progress, TransferBackend};
use crate::types::{
    BackendRoute, InputRequest, OutputRequest, ProvisionOutcome, TransferStatistics,
};

/// A path being routed, with the settings that affect routing.
struct RouteQuery<'a> {
    raw: &'a str,
    path: &'a LogicalPath,
    strict_repository_ids: bool,
}

/// Decides whether a route applies to a path.
type RoutePredicate = fn(&RouteQuery<'_>) -> bool;

fn grid_object(query: &RouteQuery<'_>) -> bool {
    query.path.is_grid_object()
}

fn repository(query: &RouteQuery<'_>) -> bool {
    if query.strict_repository_ids {
        is_repository_id(query.raw)
    } else {
        has_repository_prefix(query.raw)
    }
}

fn object_store(query: &RouteQuery<'_>) -> bool {
    is_object_store_uri(query.raw)
}

fn local(query: &RouteQuery<'_>) -> bool {
    query.path.is_local()
}

fn any(_query: &RouteQuery<'_>) -> bool {
    true
}

/// Input routes, first match wins.
const INPUT_ROUTES: &[(RoutePredicate, BackendRoute)] = &[
    (grid_object, BackendRoute::GridObject),
    (repository, BackendRoute::Repository),
    (object_store, BackendRoute::ObjectStore),
    (local, BackendRoute::Local),
    (any, BackendRoute::GenericRemote),
];

/// Output routes, first match wins.
const OUTPUT_ROUTES: &[(RoutePredicate, BackendRoute)] = &[
    (object_store, BackendRoute::ObjectStore),
    (any, BackendRoute::GenericRemote),
];

fn select(routes: &[(RoutePredicate, BackendRoute)], query: &RouteQuery<'_>) -> BackendRoute {
    routes
        .iter()
        .find(|(applies, _)| applies(query))
        .map(|(_, route)| *route)
        .unwrap_or(BackendRoute::GenericRemote)
}

/// Backend that stages an input with source string `raw`.
///
/// # Arguments
/// * `raw` - Source string as the caller gave it
/// * `path` - Its classification
/// * `strict_repository_ids` - Send only `syn<digits>` to the repository
///   rather than everything starting with `syn`
pub fn select_input_route(
    raw: &str,
    path: &LogicalPath,
    strict_repository_ids: bool,
) -> BackendRoute {
    let query: RouteQuery<'_> = RouteQuery {
        raw,
        path,
        strict_repository_ids,
    };
    select(INPUT_ROUTES, &query)
}

/// Backend that receives an output sent to `destination`.
pub fn select_output_route(destination: &str) -> BackendRoute {
    let path: LogicalPath = LogicalPath::classify(destination);
    let query: RouteQuery<'_> = RouteQuery {
        raw: destination,
        path: &path,
        strict_repository_ids: false,
    };
    select(OUTPUT_ROUTES, &query)
}

/// Builder for [`ProvisioningEngine`].
///
/// Local, grid-object and generic-remote (file scheme only) backends are
/// registered from the settings; object-store and repository backends, and
/// any HTTP-capable remote client, are supplied by the caller.
pub struct ProvisioningEngineBuilder {
    settings: ProvisionSettings,
    backends: HashMap<BackendRoute, Arc<dyn TransferBackend>>,
}

impl ProvisioningEngineBuilder {
    /// Start from `settings` with the default backends.
    pub fn new(settings: ProvisionSettings) -> Self {
        let mut backends: HashMap<BackendRoute, Arc<dyn TransferBackend>> = HashMap::new();
        backends.insert(
            BackendRoute::Local,
            Arc::new(LocalLinker::new(settings.working_dir.clone())),
        );
        backends.insert(
            BackendRoute::GridObject,
            Arc::new(GridObjectClient::new(settings.dcc_storage_client.clone())),
        );
        backends.insert(
            BackendRoute::GenericRemote,
            Arc::new(GenericRemoteClient::new(settings.working_dir.clone())),
        );
        Self { settings, backends }
    }

    /// Register a backend for the route it reports, replacing any existing one.
    pub fn with_backend(mut self, backend: Arc<dyn TransferBackend>) -> Self {
        self.backends.insert(backend.route(), backend);
        self
    }

    /// Finish building.
    pub fn build(self) -> ProvisioningEngine {
        ProvisioningEngine {
            cache: ContentCache::new(self.settings.cache_dir.clone()),
            settings: self.settings,
            backends: self.backends,
        }
    }
}

/// Stages job inputs into a working directory and pushes outputs.
pub struct ProvisioningEngine {
    settings: ProvisionSettings,
    cache: ContentCache,
    backends: HashMap<BackendRoute, Arc<dyn TransferBackend>>,
}

impl ProvisioningEngine {
    /// Engine with the default backends for `settings`.
    pub fn new(settings: ProvisionSettings) -> Self {
        ProvisioningEngineBuilder::new(settings).build()
    }

    /// Engine with the default backends, configured from an INI file.
    ///
    /// # Errors
    /// Returns `Config` if the file cannot be read or holds invalid values.
    pub fn from_ini_file(path: &Path) -> Result<Self, ProvisionError> {
        let settings: ProvisionSettings =
            ProvisionSettings::from_ini_file(path).map_err(|e: StorageError| {
                log::error!("Could not load provisioning settings: {}", e);
                ProvisionError::Config(e)
            })?;
        Ok(Self::new(settings))
    }

    /// Start building an engine.
    pub fn builder(settings: ProvisionSettings) -> ProvisioningEngineBuilder {
        ProvisioningEngineBuilder::new(settings)
    }

    /// The engine's settings.
    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    /// The cache this engine reads and populates.
    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    fn backend(&self, route: BackendRoute) -> Result<&Arc<dyn TransferBackend>, StorageError> {
        self.backends.get(&route).ok_or_else(|| StorageError::NoBackend {
            route: route.to_string(),
        })
    }

    fn progress_bar(&self) -> Option<ProgressBar<Stderr>> {
        self.settings.show_progress.then(ProgressBar::stderr)
    }

    /// Stage `source` at `destination`, drawing a progress bar if enabled.
    ///
    /// # Arguments
    /// * `source` - Logical source path (local path, `icgc:` id, `syn` id, URL)
    /// * `destination` - Local file to create
    ///
    /// # Errors
    /// Fails if the cache root cannot be created or the backend fails.
    pub async fn provision_input(
        &self,
        source: &str,
        destination: &Path,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let bar: Option<ProgressBar<Stderr>> = self.progress_bar();
        let progress: Progress<'_> = match &bar {
            Some(bar) => bar,
            None => &NoOpProgress,
        };
        let result = self
            .provision_input_with_progress(source, destination, progress)
            .await;
        if let Some(bar) = &bar {
            match &result {
                Ok(outcome) if !outcome.cache_hit => bar.complete(),
                _ => bar.abandon(),
            }
        }
        result
    }

    /// Stage `source` at `destination`, reporting progress to `progress`.
    pub async fn provision_input_with_progress(
        &self,
        source: &str,
        destination: &Path,
        progress: Progress<'_>,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let logical: LogicalPath = LogicalPath::classify(source);
        let use_cache: bool = !self.settings.bypass_cache;

        if use_cache {
            self.cache.ensure_root().await?;
            if self.cache.lookup(source, destination).await.is_some() {
                return Ok(ProvisionOutcome {
                    route: None,
                    local_path: destination.to_path_buf(),
                    cache_hit: true,
                    bytes_transferred: 0,
                    cached: false,
                });
            }
        }

        let route: BackendRoute =
            select_input_route(source, &logical, self.settings.strict_repository_ids);
        let input_error = |e: StorageError| ProvisionError::Input {
            source_path: source.to_string(),
            source: e,
        };
        let backend: &Arc<dyn TransferBackend> = self.backend(route).map_err(input_error)?;

        log::info!(
            "Provisioning {} to {} via {} backend",
            source,
            destination.display(),
            route
        );
        let bytes_transferred: u64 = backend
            .fetch(&logical, destination, progress)
            .await
            .map_err(|e: StorageError| {
                log::error!("Could not provision {}: {}", source, e);
                input_error(e)
            })?;

        let cached: bool = use_cache && self.cache.populate(source, destination).await;

        Ok(ProvisionOutcome {
            route: Some(route),
            local_path: destination.to_path_buf(),
            cache_hit: false,
            bytes_transferred,
            cached,
        })
    }

    /// Push the local file `source` to `destination`, drawing a progress bar
    /// if enabled.
    ///
    /// # Errors
    /// Fails if no backend accepts the destination or the push fails.
    pub async fn provision_output(
        &self,
        source: &Path,
        destination: &str,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let bar: Option<ProgressBar<Stderr>> = self.progress_bar();
        let progress: Progress<'_> = match &bar {
            Some(bar) => bar,
            None => &NoOpProgress,
        };
        let result = self
            .provision_output_with_progress(source, destination, progress)
            .await;
        if let Some(bar) = &bar {
            match &result {
                Ok(_) => bar.complete(),
                Err(_) => bar.abandon(),
            }
        }
        result
    }

    /// Push `source` to `destination`, reporting progress to `progress`.
    pub async fn provision_output_with_progress(
        &self,
        source: &Path,
        destination: &str,
        progress: Progress<'_>,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        let route: BackendRoute = select_output_route(destination);
        let output_error = |e: StorageError| ProvisionError::Output {
            destination: destination.to_string(),
            source: e,
        };
        let backend: &Arc<dyn TransferBackend> = self.backend(route).map_err(output_error)?;

        log::info!(
            "Provisioning output {} to {} via {} backend",
            source.display(),
            destination,
            route
        );
        let bytes_transferred: u64 = backend
            .push(source, destination, progress)
            .await
            .map_err(|e: StorageError| {
                log::error!("Could not provision output to {}: {}", destination, e);
                output_error(e)
            })?;

        Ok(ProvisionOutcome {
            route: Some(route),
            local_path: source.to_path_buf(),
            cache_hit: false,
            bytes_transferred,
            cached: false,
        })
    }

    /// Stage many inputs concurrently.
    ///
    /// Each file is an independent provisioning call; a failure is recorded
    /// and the rest continue. At most `max_concurrency` run at once.
    pub async fn provision_inputs(&self, requests: Vec<InputRequest>) -> TransferStatistics {
        let max_concurrency: usize = self.settings.max_concurrency.max(1);
        let results: Vec<(String, Result<ProvisionOutcome, ProvisionError>)> =
            stream::iter(requests)
                .map(|request: InputRequest| async move {
                    let result = self
                        .provision_input(&request.source, &request.destination)
                        .await;
                    (request.source, result)
                })
                .buffer_unordered(max_concurrency)
                .collect()
                .await;

        collect_statistics(results)
    }

    /// Push many outputs concurrently.
    pub async fn provision_outputs(&self, requests: Vec<OutputRequest>) -> TransferStatistics {
        let max_concurrency: usize = self.settings.max_concurrency.max(1);
        let results: Vec<(String, Result<ProvisionOutcome, ProvisionError>)> =
            stream::iter(requests)
                .map(|request: OutputRequest| async move {
                    let result = self
                        .provision_output(&request.source, &request.destination)
                        .await;
                    (request.destination, result)
                })
                .buffer_unordered(max_concurrency)
                .collect()
                .await;

        collect_statistics(results)
    }
}

fn collect_statistics(
    results: Vec<(String, Result<ProvisionOutcome, ProvisionError>)>,
) -> TransferStatistics {
    let mut stats: TransferStatistics = TransferStatistics::default();
    for (key, result) in results {
        match result {
            Ok(outcome) => stats.record(&outcome),
            Err(e) => stats.record_error(TransferError::new(key, e)),
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(raw: &str) -> BackendRoute {
        select_input_route(raw, &LogicalPath::classify(raw), false)
    }

    fn strict_route(raw: &str) -> BackendRoute {
        select_input_route(raw, &LogicalPath::classify(raw), true)
    }

    #[test]
    fn test_input_routes() {
        assert_eq!(route("icgc:OBJ-1"), BackendRoute::GridObject);
        assert_eq!(route("syn12345"), BackendRoute::Repository);
        assert_eq!(route("s3://bucket/key/sub"), BackendRoute::ObjectStore);
        assert_eq!(route("/abs/local/file.txt"), BackendRoute::Local);
        assert_eq!(route("relative/file.txt"), BackendRoute::Local);
        assert_eq!(route("synthetic.fq"), BackendRoute::Repository);
        assert_eq!(route("https://example.org/a.bam"), BackendRoute::GenericRemote);
        assert_eq!(route("ftp://example.org/a.bam"), BackendRoute::GenericRemote);
    }

    #[test]
    fn test_strict_repository_ids() {
        assert_eq!(strict_route("syn12345"), BackendRoute::Repository);
        assert_eq!(strict_route("synthetic.fq"), BackendRoute::Local);
        assert_eq!(strict_route("syn"), BackendRoute::Local);
        assert_eq!(strict_route("icgc:OBJ-1"), BackendRoute::GridObject);
    }

    #[test]
    fn test_output_routes() {
        assert_eq!(select_output_route("s3://bucket/out"), BackendRoute::ObjectStore);
        assert_eq!(
            select_output_route("https://example.org/upload/out"),
            BackendRoute::GenericRemote
        );
        assert_eq!(select_output_route("/results/out"), BackendRoute::GenericRemote);
    }

    #[test]
    fn test_default_backends_registered() {
        let engine: ProvisioningEngine =
            ProvisioningEngine::new(ProvisionSettings::default().with_progress(false));
        assert!(engine.backend(BackendRoute::Local).is_ok());
        assert!(engine.backend(BackendRoute::GridObject).is_ok());
        assert!(engine.backend(BackendRoute::GenericRemote).is_ok());
        assert!(matches!(
            engine.backend(BackendRoute::ObjectStore),
            Err(StorageError::NoBackend { .. })
        ));
    }

    #[test]
    fn test_from_ini_file_reports_config_errors() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path: std::path::PathBuf = dir.path().join("provision.ini");
        std::fs::write(&path, "max-concurrency = 0\n").unwrap();

        let err: ProvisionError = match ProvisioningEngine::from_ini_file(&path) {
            Ok(_) => panic!("zero concurrency accepted"),
            Err(e) => e,
        };
        assert!(matches!(err, ProvisionError::Config(StorageError::InvalidConfig { .. })));
        assert!(matches!(
            err.storage_error(),
            Some(StorageError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_from_ini_file_applies_settings() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path: std::path::PathBuf = dir.path().join("provision.ini");
        std::fs::write(&path, "cache-bypass = true\nsynapse-strict-ids = true\n").unwrap();

        let engine: ProvisioningEngine = ProvisioningEngine::from_ini_file(&path).unwrap();
        assert!(engine.settings().bypass_cache);
        assert!(engine.settings().strict_repository_ids);
    }
}
