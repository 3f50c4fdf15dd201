//! Transfer backends, one per kind of source.

mod grid;
mod local;
mod object_store;
mod remote;
mod repository;

pub use grid::{GridObjectClient, ProcessToolRunner, GRID_OUTPUT_LAYOUT};
pub use local::LocalLinker;
pub use object_store::ObjectStoreBackend;
pub use remote::{FileSchemeHandler, GenericRemoteClient};
pub use repository::RepositoryBackend;
