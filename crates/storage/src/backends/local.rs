//! Local files: hard link when possible, copy otherwise.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusty_provisioning_common::{
    lexical_normalize, resolve_against, to_absolute, OperationType, TransferProgress,
};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::classify::LogicalPath;
use crate::copy::{create_destination_file, is_same_file, prepare_destination};
use crate::error::StorageError;
use crate::traits::{Progress, TransferBackend};
use crate::types::BackendRoute;

/// Stages local files into the working directory.
#[derive(Debug, Clone, Default)]
pub struct LocalLinker {
    working_dir: Option<PathBuf>,
}

impl LocalLinker {
    /// Create a linker.
    ///
    /// # Arguments
    /// * `working_dir` - Base for relative sources; `None` uses the process
    ///   working directory
    pub fn new(working_dir: Option<PathBuf>) -> Self {
        Self { working_dir }
    }

    /// Resolve a local source path to an absolute one.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let raw: &Path = Path::new(path);
        let absolute: PathBuf = match &self.working_dir {
            Some(base) => resolve_against(raw, base),
            None => to_absolute(raw)?,
        };
        Ok(lexical_normalize(&absolute))
    }

    /// Hard-link `source` to `destination`, copying if the link is refused.
    ///
    /// A destination that is already a link to `source` is left as is. Any
    /// other existing file is unlinked first, never overwritten, so files
    /// sharing its inode keep their contents.
    ///
    /// # Returns
    /// Size of the staged file.
    pub async fn link_or_copy(
        &self,
        source: &Path,
        destination: &Path,
    ) -> Result<u64, StorageError> {
        tokio::fs::metadata(source)
            .await
            .map_err(|e: std::io::Error| StorageError::io(source, e))?;

        if is_same_file(source, destination).await {
            log::debug!(
                "{} is already linked to {}",
                destination.display(),
                source.display()
            );
        } else {
            prepare_destination(destination).await?;
            match tokio::fs::hard_link(source, destination).await {
                Ok(()) => {
                    log::debug!("Hard-linked {} to {}", source.display(), destination.display());
                }
                Err(link_err) => {
                    log::warn!(
                        "Could not link {} to {}, copying instead: {}",
                        source.display(),
                        destination.display(),
                        link_err
                    );
                    self.copy_fresh(source, destination).await?;
                }
            }
        }

        let metadata: std::fs::Metadata = tokio::fs::metadata(destination)
            .await
            .map_err(|e: std::io::Error| StorageError::io(destination, e))?;
        Ok(metadata.len())
    }

    /// Copy `source` into a file created at `destination`.
    async fn copy_fresh(&self, source: &Path, destination: &Path) -> Result<u64, StorageError> {
        let copy_error = |e: std::io::Error| StorageError::IoError {
            path: source.display().to_string(),
            message: format!("could not copy to {}: {}", destination.display(), e),
        };
        let mut reader: File = File::open(source).await.map_err(copy_error)?;
        let mut writer: File = create_destination_file(destination).await?;
        let copied: u64 = tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(copy_error)?;
        writer.flush().await.map_err(copy_error)?;
        Ok(copied)
    }
}

#[async_trait]
impl TransferBackend for LocalLinker {
    fn route(&self) -> BackendRoute {
        BackendRoute::Local
    }

    async fn fetch(
        &self,
        source: &LogicalPath,
        destination: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let LogicalPath::Local { path } = source else {
            return Err(StorageError::InvalidUri {
                uri: source.to_string(),
                message: "not a local path".to_string(),
            });
        };

        let resolved: PathBuf = self.resolve(path)?;
        let size: u64 = self.link_or_copy(&resolved, destination).await?;

        // A link is instantaneous; report it as one finished step.
        progress.on_progress(&TransferProgress::new(
            OperationType::Copying,
            path.as_str(),
            size,
            Some(size),
        ));
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_provisioning_common::NoOpProgress;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn same_inode(a: &Path, b: &Path) -> bool {
        use std::os::unix::fs::MetadataExt;
        std::fs::metadata(a).unwrap().ino() == std::fs::metadata(b).unwrap().ino()
    }

    #[tokio::test]
    async fn test_fetch_absolute_hard_links() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let source: PathBuf = dir.path().join("src/file.txt");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, b"local bytes").unwrap();
        let dest: PathBuf = dir.path().join("work/nested/file.txt");

        let linker: LocalLinker = LocalLinker::default();
        let logical: LogicalPath = LogicalPath::classify(source.to_str().unwrap());
        let size: u64 = linker.fetch(&logical, &dest, &NoOpProgress).await.unwrap();

        assert_eq!(size, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"local bytes");
        #[cfg(unix)]
        assert!(same_inode(&source, &dest));
    }

    #[tokio::test]
    async fn test_fetch_relative_uses_working_dir() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("inputs")).unwrap();
        std::fs::write(dir.path().join("inputs/a.txt"), b"relative").unwrap();
        let dest: PathBuf = dir.path().join("work/a.txt");

        let linker: LocalLinker = LocalLinker::new(Some(dir.path().to_path_buf()));
        let logical: LogicalPath = LogicalPath::classify("inputs/./a.txt");
        linker.fetch(&logical, &dest, &NoOpProgress).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"relative");
    }

    #[tokio::test]
    async fn test_existing_destination_is_replaced() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let source: PathBuf = dir.path().join("src.txt");
        std::fs::write(&source, b"fresh").unwrap();
        let dest: PathBuf = dir.path().join("dest.txt");
        std::fs::write(&dest, b"stale contents").unwrap();
        let other_link: PathBuf = dir.path().join("other.txt");
        std::fs::hard_link(&dest, &other_link).unwrap();

        let linker: LocalLinker = LocalLinker::default();
        let size: u64 = linker.link_or_copy(&source, &dest).await.unwrap();
        assert_eq!(size, 5);
        assert_eq!(std::fs::read(&dest).unwrap(), b"fresh");
        assert_eq!(std::fs::read(&source).unwrap(), b"fresh");
        assert_eq!(std::fs::read(&other_link).unwrap(), b"stale contents");
    }

    #[tokio::test]
    async fn test_relink_onto_own_link_keeps_source() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let source: PathBuf = dir.path().join("src.txt");
        std::fs::write(&source, b"user data").unwrap();
        let dest: PathBuf = dir.path().join("work/src.txt");

        let linker: LocalLinker = LocalLinker::default();
        assert_eq!(linker.link_or_copy(&source, &dest).await.unwrap(), 9);
        assert_eq!(linker.link_or_copy(&source, &dest).await.unwrap(), 9);

        assert_eq!(std::fs::read(&source).unwrap(), b"user data");
        assert_eq!(std::fs::read(&dest).unwrap(), b"user data");
        #[cfg(unix)]
        assert!(same_inode(&source, &dest));
    }

    #[tokio::test]
    async fn test_copy_fresh_does_not_touch_old_inode() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let source: PathBuf = dir.path().join("src.txt");
        std::fs::write(&source, b"copied").unwrap();
        let dest: PathBuf = dir.path().join("dest.txt");
        std::fs::write(&dest, b"linked elsewhere").unwrap();
        let other_link: PathBuf = dir.path().join("cache-entry");
        std::fs::hard_link(&dest, &other_link).unwrap();

        let linker: LocalLinker = LocalLinker::default();
        assert_eq!(linker.copy_fresh(&source, &dest).await.unwrap(), 6);
        assert_eq!(std::fs::read(&dest).unwrap(), b"copied");
        assert_eq!(std::fs::read(&other_link).unwrap(), b"linked elsewhere");
        #[cfg(unix)]
        assert!(!same_inode(&source, &dest));
    }

    #[tokio::test]
    async fn test_missing_source_is_fatal() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let linker: LocalLinker = LocalLinker::new(Some(dir.path().to_path_buf()));
        let logical: LogicalPath = LogicalPath::classify("missing.txt");
        let result = linker
            .fetch(&logical, &dir.path().join("dest"), &NoOpProgress)
            .await;
        assert!(matches!(result, Err(StorageError::IoError { .. })));
    }

    #[tokio::test]
    async fn test_rejects_remote_source() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let logical: LogicalPath = LogicalPath::classify("https://example.org/x");
        let result = LocalLinker::default()
            .fetch(&logical, &dir.path().join("dest"), &NoOpProgress)
            .await;
        assert!(matches!(result, Err(StorageError::InvalidUri { .. })));
    }
}
