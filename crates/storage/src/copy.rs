//! Streamed copy with progress reporting.
//!
//! Staged files are often hard links to a cache entry or to a user's source
//! file, so transfers never write through an existing destination. They
//! unlink it first and write a new inode.

use std::io::ErrorKind;
use std::path::Path;

use rusty_provisioning_common::{OperationType, TransferProgress, COPY_BUFFER_SIZE};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::StorageError;
use crate::traits::Progress;

/// Copy `reader` to `writer`, reporting cumulative bytes after every chunk.
///
/// One update is sent before the first read so zero-length sources still
/// report completion.
///
/// # Arguments
/// * `reader` - Byte source
/// * `writer` - Byte sink; flushed before returning
/// * `label` - Key reported in progress updates and I/O errors
/// * `operation` - Direction reported in progress updates
/// * `total` - Expected length, if known
/// * `progress` - Progress sink; returning `false` cancels the copy
///
/// # Returns
/// Bytes copied.
pub async fn copy_with_progress<R, W>(
    reader: &mut R,
    writer: &mut W,
    label: &str,
    operation: OperationType,
    total: Option<u64>,
    progress: Progress<'_>,
) -> Result<u64, StorageError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let io_error = |e: std::io::Error| StorageError::IoError {
        path: label.to_string(),
        message: e.to_string(),
    };

    let mut buffer: Vec<u8> = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied: u64 = 0;

    if !progress.on_progress(&TransferProgress::new(operation, label, 0, total)) {
        return Err(StorageError::Cancelled);
    }

    loop {
        let read: usize = reader.read(&mut buffer).await.map_err(io_error)?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read]).await.map_err(io_error)?;
        copied += read as u64;

        if !progress.on_progress(&TransferProgress::new(operation, label, copied, total)) {
            return Err(StorageError::Cancelled);
        }
    }

    writer.flush().await.map_err(io_error)?;
    Ok(copied)
}

/// Make `destination` writable as a new file.
///
/// Creates missing parent directories and unlinks whatever file is already
/// there. Other links to the old inode keep their contents.
pub async fn prepare_destination(destination: &Path) -> Result<(), StorageError> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e: std::io::Error| StorageError::io(parent, e))?;
    }

    match tokio::fs::remove_file(destination).await {
        Ok(()) => {
            log::debug!("Replacing existing {}", destination.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(destination, e)),
    }
}

/// Open a new, empty file at `destination` for a transfer to write into.
///
/// An existing file is unlinked rather than truncated. Fails if something
/// reappears at the path before the file is created.
pub async fn create_destination_file(destination: &Path) -> Result<File, StorageError> {
    prepare_destination(destination).await?;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .await
        .map_err(|e: std::io::Error| StorageError::io(destination, e))
}

/// Whether two paths name the same file.
#[cfg(unix)]
pub(crate) async fn is_same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (tokio::fs::metadata(a).await, tokio::fs::metadata(b).await) {
        (Ok(left), Ok(right)) => left.dev() == right.dev() && left.ino() == right.ino(),
        _ => false,
    }
}

/// Whether two paths name the same file.
#[cfg(not(unix))]
pub(crate) async fn is_same_file(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}
