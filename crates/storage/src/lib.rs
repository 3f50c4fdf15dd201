//! File provisioning for workflow jobs.
//!
//! Stages job inputs into a working directory and pushes job outputs to
//! their destinations. Inputs are identified by a logical path string that
//! may be a local path, a storage-grid object id (`icgc:`), a Synapse entity
//! id (`syn123`), an object-store URI (`s3://bucket/key`) or any other URL.
//!
//! # Routing
//!
//! Each logical path is classified and dispatched to exactly one
//! [`TransferBackend`]. Backends that need network clients
//! ([`ObjectStoreClient`], [`RepositoryClient`], HTTP [`SchemeHandler`]s) are
//! implemented in sibling crates and registered on the engine builder.
//!
//! # Caching
//!
//! Downloaded inputs are hard-linked into a content cache keyed by the SHA-1
//! of the logical path string. Later requests for the same logical path are
//! served by hard-linking the cached file to the new destination. Any cache
//! failure is logged and treated as a miss.

pub mod backends;
mod cache;
mod classify;
mod copy;
mod engine;
mod error;
mod settings;
mod traits;
mod types;

pub use cache::{CacheKey, ContentCache};
pub use classify::{
    has_repository_prefix, is_object_store_uri, is_repository_id, LogicalPath, GRID_SCHEME,
    OBJECT_STORE_PREFIX, REPOSITORY_PREFIX,
};
pub use copy::{copy_with_progress, create_destination_file, prepare_destination};
pub use engine::{
    select_input_route, select_output_route, ProvisioningEngine, ProvisioningEngineBuilder,
};
pub use error::{ProvisionError, StorageError, TransferError};
pub use settings::{default_cache_dir, ProvisionSettings, DEFAULT_S3_REGION};
pub use traits::{
    ObjectStoreClient, Progress, RemoteReader, RepositoryClient, SchemeHandler, ToolOutput,
    ToolRunner, TransferBackend,
};
pub use types::{
    BackendRoute, InputRequest, ObjectLocation, OutputRequest, ProvisionOutcome,
    TransferStatistics,
};

// Progress types appear in the backend traits; re-export for implementors.
pub use rusty_provisioning_common::{OperationType, ProgressCallback, TransferProgress};
