//! Synapse repository client.
//!
//! Requests are signed with the account's API key: the `signature` header is
//! the base64 HMAC-SHA1 of `userId + request path + signatureTimestamp`,
//! keyed by the base64-decoded API key.

use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use rusty_provisioning_storage::{
    copy_with_progress, create_destination_file, has_repository_prefix, OperationType, Progress,
    ProvisionSettings, RemoteReader, RepositoryClient, StorageError,
};
use sha1::Sha1;
use tokio::fs::File;
use url::Url;

use crate::http::{body_reader, build_client, check_status, request_error};

type HmacSha1 = Hmac<Sha1>;

/// Production Synapse REST endpoint.
pub const SYNAPSE_REPO_ENDPOINT: &str = "https://repo-prod.prod.sagebase.org/repo/v1";

const HEADER_USER_ID: &str = "userId";
const HEADER_TIMESTAMP: &str = "signatureTimestamp";
const HEADER_SIGNATURE: &str = "signature";

/// Downloads the current version of Synapse file entities.
#[derive(Debug, Clone)]
pub struct SynapseClient {
    http: Client,
    endpoint: Url,
    user_name: String,
    api_key: Vec<u8>,
}

impl SynapseClient {
    /// Create a client for `user_name` with a base64 API key.
    ///
    /// # Errors
    /// `InvalidConfig` if the key is not valid base64.
    pub fn new(user_name: impl Into<String>, api_key: &str) -> Result<Self, StorageError> {
        let api_key: Vec<u8> =
            STANDARD
                .decode(api_key.trim())
                .map_err(|e| StorageError::InvalidConfig {
                    message: format!("Synapse API key is not valid base64: {}", e),
                })?;
        let endpoint: Url =
            Url::parse(SYNAPSE_REPO_ENDPOINT).map_err(|e| StorageError::InvalidConfig {
                message: format!("bad Synapse endpoint: {}", e),
            })?;
        Ok(Self {
            http: build_client()?,
            endpoint,
            user_name: user_name.into(),
            api_key,
        })
    }

    /// Create a client from the `synapse-user-name` and `synapse-api-key`
    /// settings.
    ///
    /// # Errors
    /// `InvalidConfig` if either setting is missing.
    pub fn from_settings(settings: &ProvisionSettings) -> Result<Self, StorageError> {
        match (&settings.synapse_user_name, &settings.synapse_api_key) {
            (Some(user_name), Some(api_key)) => Self::new(user_name.clone(), api_key),
            _ => Err(StorageError::InvalidConfig {
                message: "Synapse downloads need synapse-user-name and synapse-api-key"
                    .to_string(),
            }),
        }
    }

    /// Point the client at another repository endpoint.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Share an existing HTTP client.
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// The account these requests are signed for.
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// URL that resolves an entity's current file to a download URL.
    pub fn file_handle_url(&self, entity_id: &str) -> Result<Url, StorageError> {
        let base: &str = self.endpoint.as_str().trim_end_matches('/');
        let raw: String = format!("{}/entity/{}/file?redirect=false", base, entity_id);
        Url::parse(&raw).map_err(|e| StorageError::InvalidUri {
            uri: raw.clone(),
            message: e.to_string(),
        })
    }

    /// Signature for a request to `path` at `timestamp`.
    ///
    /// # Arguments
    /// * `path` - Request path, without query string
    /// * `timestamp` - Value sent in the `signatureTimestamp` header
    pub fn sign(&self, path: &str, timestamp: &str) -> Result<String, StorageError> {
        let mut mac: HmacSha1 =
            HmacSha1::new_from_slice(&self.api_key).map_err(|e| StorageError::InvalidConfig {
                message: format!("unusable Synapse API key: {}", e),
            })?;
        mac.update(self.user_name.as_bytes());
        mac.update(path.as_bytes());
        mac.update(timestamp.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Resolve an entity to a short-lived download URL.
    async fn download_url(&self, entity_id: &str) -> Result<Url, StorageError> {
        let url: Url = self.file_handle_url(entity_id)?;
        let timestamp: String = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let signature: String = self.sign(url.path(), &timestamp)?;

        let response: Response = self
            .http
            .get(url.clone())
            .header(HEADER_USER_ID, self.user_name.as_str())
            .header(HEADER_TIMESTAMP, timestamp.as_str())
            .header(HEADER_SIGNATURE, signature.as_str())
            .send()
            .await
            .map_err(|e: reqwest::Error| request_error(e, &url))?;
        let response: Response = check_status(response, &url)?;
        let body: String = response
            .text()
            .await
            .map_err(|e: reqwest::Error| request_error(e, &url))?;

        Url::parse(body.trim()).map_err(|e| StorageError::InvalidUri {
            uri: body.trim().to_string(),
            message: format!("Synapse returned an unusable download URL: {}", e),
        })
    }
}

#[async_trait]
impl RepositoryClient for SynapseClient {
    async fn download_latest(
        &self,
        entity_id: &str,
        destination: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        if !has_repository_prefix(entity_id) {
            return Err(StorageError::InvalidUri {
                uri: entity_id.to_string(),
                message: "not a Synapse entity id".to_string(),
            });
        }

        let download: Url = self.download_url(entity_id).await?;
        log::debug!("Synapse resolved {} to {}", entity_id, download.host_str().unwrap_or(""));

        let response: Response = self
            .http
            .get(download.clone())
            .send()
            .await
            .map_err(|e: reqwest::Error| request_error(e, &download))?;
        let mut remote: RemoteReader = body_reader(check_status(response, &download)?);

        let mut file: File = create_destination_file(destination).await?;
        copy_with_progress(
            &mut remote.reader,
            &mut file,
            entity_id,
            OperationType::Downloading,
            remote.size,
            progress,
        )
        .await
    }
}
