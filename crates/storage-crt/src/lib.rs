//! AWS SDK object-store client for rusty-provisioning.
//!
//! Implements [`ObjectStoreClient`](rusty_provisioning_storage::ObjectStoreClient)
//! for S3 and S3-compatible endpoints. Register it with the engine through
//! an [`ObjectStoreBackend`](rusty_provisioning_storage::backends::ObjectStoreBackend).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rusty_provisioning_storage::backends::ObjectStoreBackend;
//! use rusty_provisioning_storage::{ProvisionSettings, ProvisioningEngine};
//! use rusty_provisioning_storage_crt::CrtObjectStoreClient;
//!
//! let settings = ProvisionSettings::from_ini_file(path)?;
//! let client = CrtObjectStoreClient::new(&settings).await?;
//! let engine = ProvisioningEngine::builder(settings)
//!     .with_backend(Arc::new(ObjectStoreBackend::new(client)))
//!     .build();
//! ```

mod client;
mod error;

pub use client::{
    multipart_part_count, uses_multipart, CrtObjectStoreClient, StaticCredentials,
    MULTIPART_PART_SIZE,
};
pub use error::CrtError;
