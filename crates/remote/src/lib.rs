//! Network clients for rusty-provisioning.
//!
//! - [`HttpSchemeHandler`] serves `http`/`https` URLs for the generic remote
//!   backend.
//! - [`SynapseClient`] resolves and downloads Synapse entities for the
//!   repository backend.

mod http;
mod synapse;

use std::path::PathBuf;
use std::sync::Arc;

use rusty_provisioning_storage::backends::GenericRemoteClient;
use rusty_provisioning_storage::StorageError;

pub use http::{HttpSchemeHandler, HTTP_SCHEMES};
pub use synapse::{SynapseClient, SYNAPSE_REPO_ENDPOINT};

/// Generic remote client serving `file`, `http` and `https` URLs.
///
/// # Arguments
/// * `working_dir` - Base for relative output destinations
pub fn http_remote_client(working_dir: Option<PathBuf>) -> Result<GenericRemoteClient, StorageError> {
    let http: HttpSchemeHandler = HttpSchemeHandler::new()?;
    Ok(GenericRemoteClient::new(working_dir).with_handler(Arc::new(http)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_remote_client_schemes() {
        let client: GenericRemoteClient = http_remote_client(None).unwrap();
        assert!(client.supports("file"));
        assert!(client.supports("http"));
        assert!(client.supports("HTTPS"));
        assert!(!client.supports("ftp"));
    }
}
