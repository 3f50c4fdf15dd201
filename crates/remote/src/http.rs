//! HTTP(S) transfers for the generic remote backend.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Client, Response, StatusCode};
use rusty_provisioning_storage::{
    OperationType, Progress, RemoteReader, SchemeHandler, StorageError, TransferProgress,
};
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_util::io::{ReaderStream, StreamReader};
use url::Url;

/// Schemes served by [`HttpSchemeHandler`].
pub const HTTP_SCHEMES: &[&str] = &["http", "https"];

const USER_AGENT: &str = concat!("rusty-provisioning/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Map a non-success status to a storage error.
pub(crate) fn status_error(status: StatusCode, url: &Url) -> StorageError {
    match status {
        StatusCode::NOT_FOUND => StorageError::RemoteNotFound {
            uri: url.to_string(),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::AccessDenied {
            resource: url.to_string(),
            message: status.to_string(),
        },
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            StorageError::NetworkError {
                message: format!("{} returned {}", url, s),
                retryable: true,
            }
        }
        s => StorageError::NetworkError {
            message: format!("{} returned {}", url, s),
            retryable: false,
        },
    }
}

/// Map a transport failure to a storage error.
pub(crate) fn request_error(err: reqwest::Error, url: &Url) -> StorageError {
    StorageError::NetworkError {
        message: format!("request to {} failed: {}", url, err),
        retryable: err.is_timeout() || err.is_connect(),
    }
}

/// Fail on non-success responses.
pub(crate) fn check_status(response: Response, url: &Url) -> Result<Response, StorageError> {
    let status: StatusCode = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(status_error(status, url))
    }
}

/// Turn a response body into an async reader.
pub(crate) fn body_reader(response: Response) -> RemoteReader {
    let size: Option<u64> = response.content_length();
    let stream = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
    RemoteReader {
        reader: Box::new(StreamReader::new(stream)),
        size,
    }
}

/// HTTP client with the crate's user agent and timeouts.
pub(crate) fn build_client() -> Result<Client, StorageError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e: reqwest::Error| StorageError::InvalidConfig {
            message: format!("could not build HTTP client: {}", e),
        })
}

/// Reads with GET and writes with PUT.
#[derive(Debug, Clone)]
pub struct HttpSchemeHandler {
    client: Client,
}

impl HttpSchemeHandler {
    /// Create a handler with its own connection pool.
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            client: build_client()?,
        })
    }

    /// Create a handler sharing an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SchemeHandler for HttpSchemeHandler {
    fn schemes(&self) -> &[&'static str] {
        HTTP_SCHEMES
    }

    async fn open_read(&self, uri: &Url) -> Result<RemoteReader, StorageError> {
        log::debug!("GET {}", uri);
        let response: Response = self
            .client
            .get(uri.clone())
            .send()
            .await
            .map_err(|e: reqwest::Error| request_error(e, uri))?;
        let response: Response = check_status(response, uri)?;
        Ok(body_reader(response))
    }

    async fn write_from_file(
        &self,
        source: &Path,
        uri: &Url,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let file: File = File::open(source)
            .await
            .map_err(|e: std::io::Error| StorageError::io(source, e))?;
        let size: u64 = file
            .metadata()
            .await
            .map_err(|e: std::io::Error| StorageError::io(source, e))?
            .len();
        let label: String = uri.to_string();

        // The body stream must be 'static, so it reports sent bytes over a
        // channel and this task forwards them to the progress sink.
        let (sent_tx, mut sent_rx) = mpsc::unbounded_channel::<u64>();
        let mut sent: u64 = 0;
        let body_stream = ReaderStream::new(file).inspect_ok(move |chunk| {
            sent += chunk.len() as u64;
            let _ = sent_tx.send(sent);
        });

        if !progress.on_progress(&TransferProgress::new(
            OperationType::Uploading,
            label.as_str(),
            0,
            Some(size),
        )) {
            return Err(StorageError::Cancelled);
        }

        log::debug!("PUT {} ({} bytes)", uri, size);
        let request = self
            .client
            .put(uri.clone())
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(body_stream))
            .send();
        tokio::pin!(request);

        let response: Response = loop {
            tokio::select! {
                result = &mut request => {
                    break result.map_err(|e: reqwest::Error| request_error(e, uri))?;
                }
                Some(sent) = sent_rx.recv() => {
                    let update = TransferProgress::new(
                        OperationType::Uploading,
                        label.as_str(),
                        sent,
                        Some(size),
                    );
                    if !progress.on_progress(&update) {
                        return Err(StorageError::Cancelled);
                    }
                }
            }
        };
        check_status(response, uri)?;

        if !progress.on_progress(&TransferProgress::new(
            OperationType::Uploading,
            label.as_str(),
            size,
            Some(size),
        )) {
            return Err(StorageError::Cancelled);
        }
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_not_found_names_url() {
        let err: StorageError =
            status_error(StatusCode::NOT_FOUND, &url("https://example.org/data/a.bam"));
        match &err {
            StorageError::RemoteNotFound { uri } => {
                assert_eq!(uri, "https://example.org/data/a.bam");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "Not found: https://example.org/data/a.bam");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_auth_statuses_are_access_denied() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let err: StorageError = status_error(status, &url("https://example.org/x"));
            assert!(matches!(err, StorageError::AccessDenied { .. }));
        }
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let u: Url = url("https://example.org/x");
        assert!(status_error(StatusCode::BAD_GATEWAY, &u).is_retryable());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, &u).is_retryable());
        assert!(!status_error(StatusCode::BAD_REQUEST, &u).is_retryable());
    }

    #[test]
    fn test_schemes() {
        let handler: HttpSchemeHandler = HttpSchemeHandler::new().unwrap();
        assert_eq!(handler.schemes(), &["http", "https"]);
    }
}
