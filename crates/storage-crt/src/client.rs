//! AWS SDK S3 client implementation.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use rusty_provisioning_storage::{
    create_destination_file, OperationType, ObjectStoreClient, Progress, ProvisionSettings,
    StorageError, TransferProgress,
};

use crate::error::CrtError;

/// Part size for multipart uploads; files at or below this go in one request.
pub const MULTIPART_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Whether a file of `size` bytes is uploaded in parts.
pub fn uses_multipart(size: u64) -> bool {
    size > MULTIPART_PART_SIZE
}

/// Number of parts a multipart upload of `size` bytes uses.
pub fn multipart_part_count(size: u64) -> u64 {
    size.div_ceil(MULTIPART_PART_SIZE).max(1)
}

/// Explicit access keys, for endpoints outside the default credential chain.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// [`ObjectStoreClient`] backed by the AWS SDK for Rust.
///
/// Honors the custom endpoint and path-style addressing from
/// [`ProvisionSettings`], so it also serves S3-compatible stores.
pub struct CrtObjectStoreClient {
    s3_client: S3Client,
}

impl CrtObjectStoreClient {
    /// Create a client using the default credential chain.
    ///
    /// # Arguments
    /// * `settings` - Provisioning settings carrying region and endpoint
    pub async fn new(settings: &ProvisionSettings) -> Result<Self, StorageError> {
        Self::build(settings, None).await
    }

    /// Create a client with explicit access keys.
    pub async fn with_credentials(
        settings: &ProvisionSettings,
        credentials: StaticCredentials,
    ) -> Result<Self, StorageError> {
        Self::build(settings, Some(credentials)).await
    }

    async fn build(
        settings: &ProvisionSettings,
        credentials: Option<StaticCredentials>,
    ) -> Result<Self, StorageError> {
        if settings.s3_region.trim().is_empty() {
            return Err(CrtError::ConfigError("S3 region must not be empty".to_string()).into());
        }

        let config_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(settings.s3_region.clone()));

        let config_loader = if let Some(creds) = credentials {
            let credentials = Credentials::new(
                creds.access_key_id,
                creds.secret_access_key,
                creds.session_token,
                None,
                "rusty-provisioning",
            );
            config_loader.credentials_provider(credentials)
        } else {
            config_loader
        };

        let sdk_config = config_loader.load().await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.s3_path_style_access);
        if let Some(ref endpoint) = settings.s3_endpoint {
            log::info!("Using S3 endpoint {}", endpoint);
            s3_config = s3_config.endpoint_url(endpoint);
        }

        Ok(Self {
            s3_client: S3Client::from_conf(s3_config.build()),
        })
    }

    /// Create a client from an existing S3Client.
    pub fn from_client(s3_client: S3Client) -> Self {
        Self { s3_client }
    }

    async fn put_single(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        size: u64,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let label: String = format!("s3://{}/{}", bucket, key);
        report(progress, OperationType::Uploading, &label, 0, size)?;

        let body = ByteStream::from_path(file_path)
            .await
            .map_err(|e| StorageError::IoError {
                path: file_path.display().to_string(),
                message: e.to_string(),
            })?;

        self.s3_client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|err| sdk_failure(err, &label))?;

        report(progress, OperationType::Uploading, &label, size, size)?;
        Ok(size)
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        size: u64,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let label: String = format!("s3://{}/{}", bucket, key);

        let created = self
            .s3_client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| sdk_failure(err, &label))?;
        let upload_id: String = created
            .upload_id()
            .ok_or_else(|| CrtError::SdkError {
                message: format!("no upload id returned for {}", label),
                retryable: true,
            })?
            .to_string();

        log::debug!(
            "Uploading {} in {} parts (upload id {})",
            label,
            multipart_part_count(size),
            upload_id
        );

        match self
            .upload_parts(bucket, key, &upload_id, file_path, size, &label, progress)
            .await
        {
            Ok(parts) => {
                self.s3_client
                    .complete_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send()
                    .await
                    .map_err(|err| sdk_failure(err, &label))?;
                Ok(size)
            }
            Err(e) => {
                if let Err(abort_err) = self
                    .s3_client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    log::warn!(
                        "Could not abort multipart upload {} for {}: {}",
                        upload_id,
                        label,
                        DisplayErrorContext(&abort_err)
                    );
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        file_path: &Path,
        size: u64,
        label: &str,
        progress: Progress<'_>,
    ) -> Result<Vec<CompletedPart>, StorageError> {
        let mut file: File = File::open(file_path)
            .await
            .map_err(|e: std::io::Error| StorageError::io(file_path, e))?;
        let mut parts: Vec<CompletedPart> = Vec::new();
        let mut uploaded: u64 = 0;
        let mut part_number: i32 = 1;

        report(progress, OperationType::Uploading, label, 0, size)?;

        loop {
            let mut buffer: Vec<u8> = Vec::with_capacity(MULTIPART_PART_SIZE as usize);
            (&mut file)
                .take(MULTIPART_PART_SIZE)
                .read_to_end(&mut buffer)
                .await
                .map_err(|e: std::io::Error| StorageError::io(file_path, e))?;
            if buffer.is_empty() {
                break;
            }
            let part_len: u64 = buffer.len() as u64;

            let output = self
                .s3_client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buffer))
                .send()
                .await
                .map_err(|err| sdk_failure(err, label))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(|s: &str| s.to_string()))
                    .part_number(part_number)
                    .build(),
            );
            uploaded += part_len;
            part_number += 1;
            report(progress, OperationType::Uploading, label, uploaded, size)?;
        }

        Ok(parts)
    }
}

/// Send a progress update, turning a cancellation request into an error.
fn report(
    progress: Progress<'_>,
    operation: OperationType,
    label: &str,
    transferred: u64,
    total: u64,
) -> Result<(), StorageError> {
    if progress.on_progress(&TransferProgress::new(operation, label, transferred, Some(total))) {
        Ok(())
    } else {
        Err(StorageError::Cancelled)
    }
}

/// Map an SDK failure to a storage error.
fn sdk_failure<E, R>(err: SdkError<E, R>, resource: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let retryable: bool = matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    );
    let message: String = DisplayErrorContext(&err).to_string();
    match err.code() {
        Some("AccessDenied") | Some("Forbidden") => CrtError::AccessDenied {
            resource: resource.to_string(),
            message,
        }
        .into(),
        Some("SlowDown") | Some("InternalError") | Some("ServiceUnavailable") => {
            CrtError::SdkError {
                message,
                retryable: true,
            }
            .into()
        }
        _ => CrtError::SdkError { message, retryable }.into(),
    }
}

#[async_trait]
impl ObjectStoreClient for CrtObjectStoreClient {
    async fn get_object_to_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let label: String = format!("s3://{}/{}", bucket, key);

        let response = self
            .s3_client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let missing: bool = err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    sdk_failure(err, &label)
                }
            })?;

        let total: Option<u64> = response
            .content_length()
            .and_then(|len: i64| u64::try_from(len).ok());
        let mut file: File = create_destination_file(file_path).await?;

        let started = TransferProgress::new(OperationType::Downloading, label.as_str(), 0, total);
        if !progress.on_progress(&started) {
            return Err(StorageError::Cancelled);
        }

        let mut written: u64 = 0;
        let mut body = response.body;
        while let Some(chunk) = body.try_next().await.map_err(|e| CrtError::SdkError {
            message: e.to_string(),
            retryable: true,
        })? {
            file.write_all(&chunk)
                .await
                .map_err(|e: std::io::Error| StorageError::io(file_path, e))?;
            written += chunk.len() as u64;

            let update =
                TransferProgress::new(OperationType::Downloading, label.as_str(), written, total);
            if !progress.on_progress(&update) {
                return Err(StorageError::Cancelled);
            }
        }

        file.flush()
            .await
            .map_err(|e: std::io::Error| StorageError::io(file_path, e))?;

        Ok(written)
    }

    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let size: u64 = tokio::fs::metadata(file_path)
            .await
            .map_err(|e: std::io::Error| StorageError::io(file_path, e))?
            .len();

        if uses_multipart(size) {
            self.put_multipart(bucket, key, file_path, size, progress)
                .await
        } else {
            self.put_single(bucket, key, file_path, size, progress).await
        }
    }
}
