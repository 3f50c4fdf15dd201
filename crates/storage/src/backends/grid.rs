//! Storage-grid objects, downloaded by an external command-line tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use rusty_provisioning_common::{to_absolute, OperationType, TransferProgress};

use crate::classify::LogicalPath;
use crate::error::StorageError;
use crate::traits::{Progress, ToolOutput, ToolRunner, TransferBackend};
use crate::types::BackendRoute;

/// Output layout that makes the tool write `<output-dir>/<object-id>`.
pub const GRID_OUTPUT_LAYOUT: &str = "id";

/// Runs tools as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessToolRunner;

#[async_trait]
impl ToolRunner for ProcessToolRunner {
    async fn run(&self, program: &Path, args: &[String]) -> Result<ToolOutput, StorageError> {
        log::info!("Running {} {}", program.display(), args.join(" "));
        let output: std::process::Output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e: std::io::Error| StorageError::ToolFailed {
                program: program.display().to_string(),
                message: format!("could not start: {}", e),
            })?;

        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Downloads grid objects with the storage client tool, then moves the
/// result into place.
pub struct GridObjectClient<R: ToolRunner = ProcessToolRunner> {
    tool: PathBuf,
    runner: R,
}

impl GridObjectClient<ProcessToolRunner> {
    /// Create a client that launches `tool` as a child process.
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self::with_runner(tool, ProcessToolRunner)
    }
}

impl<R: ToolRunner> GridObjectClient<R> {
    /// Create a client with a custom tool runner.
    pub fn with_runner(tool: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            tool: tool.into(),
            runner,
        }
    }

    /// Tool arguments for one download.
    pub fn download_args(object_id: &str, output_dir: &Path) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "download".to_string(),
            "--object-id".to_string(),
            object_id.to_string(),
            "--output-dir".to_string(),
            output_dir.display().to_string(),
            "--output-layout".to_string(),
            GRID_OUTPUT_LAYOUT.to_string(),
        ]
    }

    async fn download(&self, object_id: &str, destination: &Path) -> Result<u64, StorageError> {
        let destination: PathBuf = to_absolute(destination)?;
        let output_dir: PathBuf = destination
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StorageError::IoError {
                path: destination.display().to_string(),
                message: "destination has no parent directory".to_string(),
            })?;
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e: std::io::Error| StorageError::io(&output_dir, e))?;

        let args: Vec<String> = Self::download_args(object_id, &output_dir);
        let output: ToolOutput = self.runner.run(&self.tool, &args).await?;
        if !output.success {
            let status: String = output
                .code
                .map(|c: i32| format!("exit code {}", c))
                .unwrap_or_else(|| "terminated by signal".to_string());
            log::error!("{} failed for {}: {}", self.tool.display(), object_id, status);
            return Err(StorageError::ToolFailed {
                program: self.tool.display().to_string(),
                message: format!("{}: {}", status, output.stderr.trim()),
            });
        }

        let downloaded: PathBuf = output_dir.join(object_id);
        if tokio::fs::metadata(&downloaded).await.is_err() {
            return Err(StorageError::MissingOutput {
                path: downloaded.display().to_string(),
            });
        }
        log::info!("Downloaded {} to {}", object_id, downloaded.display());

        if downloaded != destination {
            tokio::fs::rename(&downloaded, &destination)
                .await
                .map_err(|e: std::io::Error| StorageError::IoError {
                    path: downloaded.display().to_string(),
                    message: format!("could not move to {}: {}", destination.display(), e),
                })?;
        }

        let metadata: std::fs::Metadata = tokio::fs::metadata(&destination)
            .await
            .map_err(|e: std::io::Error| StorageError::io(&destination, e))?;
        Ok(metadata.len())
    }
}

#[async_trait]
impl<R: ToolRunner> TransferBackend for GridObjectClient<R> {
    fn route(&self) -> BackendRoute {
        BackendRoute::GridObject
    }

    async fn fetch(
        &self,
        source: &LogicalPath,
        destination: &Path,
        progress: Progress<'_>,
    ) -> Result<u64, StorageError> {
        let LogicalPath::GridObject { object_id } = source else {
            return Err(StorageError::InvalidUri {
                uri: source.to_string(),
                message: "not a grid object identifier".to_string(),
            });
        };

        // The tool reports nothing incremental; signal start and end.
        progress.on_progress(&TransferProgress::new(
            OperationType::Downloading,
            object_id.as_str(),
            0,
            None,
        ));
        let size: u64 = self.download(object_id, destination).await?;
        progress.on_progress(&TransferProgress::new(
            OperationType::Downloading,
            object_id.as_str(),
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
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Pretends to be the storage client: records its arguments and writes
    /// the object file when asked to succeed.
    struct ScriptedRunner {
        exit_code: i32,
        write_output: bool,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(exit_code: i32, write_output: bool) -> Self {
            Self {
                exit_code,
                write_output,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ToolRunner for ScriptedRunner {
        async fn run(&self, _program: &Path, args: &[String]) -> Result<ToolOutput, StorageError> {
            self.calls.lock().unwrap().push(args.to_vec());
            let object_id: &str = &args[3];
            let output_dir: &str = &args[5];
            if self.write_output {
                std::fs::write(Path::new(output_dir).join(object_id), b"grid bytes").unwrap();
            }
            Ok(ToolOutput {
                success: self.exit_code == 0,
                code: Some(self.exit_code),
                stderr: if self.exit_code == 0 {
                    String::new()
                } else {
                    "object not found".to_string()
                },
            })
        }
    }

    #[tokio::test]
    async fn test_download_moves_into_place() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let dest: PathBuf = dir.path().join("work/reads.bam");
        let client = GridObjectClient::with_runner("/opt/dcc", ScriptedRunner::new(0, true));

        let logical: LogicalPath = LogicalPath::classify("icgc:OBJ-1");
        let size: u64 = client.fetch(&logical, &dest, &NoOpProgress).await.unwrap();

        assert_eq!(size, 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"grid bytes");
        assert!(!dir.path().join("work/obj-1").exists());

        let calls = client.runner.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            GridObjectClient::<ScriptedRunner>::download_args("obj-1", &dir.path().join("work"))
        );
        assert_eq!(calls[0][7], "id");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_fatal() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let client = GridObjectClient::with_runner("/opt/dcc", ScriptedRunner::new(3, false));
        let logical: LogicalPath = LogicalPath::classify("icgc:obj-2");
        let err: StorageError = client
            .fetch(&logical, &dir.path().join("out"), &NoOpProgress)
            .await
            .unwrap_err();
        match err {
            StorageError::ToolFailed { message, .. } => {
                assert!(message.contains("exit code 3"));
                assert!(message.contains("object not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_output_is_fatal() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let client = GridObjectClient::with_runner("/opt/dcc", ScriptedRunner::new(0, false));
        let logical: LogicalPath = LogicalPath::classify("icgc:obj-3");
        let result = client
            .fetch(&logical, &dir.path().join("out"), &NoOpProgress)
            .await;
        assert!(matches!(result, Err(StorageError::MissingOutput { .. })));
    }

    #[tokio::test]
    async fn test_unstartable_tool() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let client = GridObjectClient::new(dir.path().join("no-such-tool"));
        let logical: LogicalPath = LogicalPath::classify("icgc:obj-4");
        let result = client
            .fetch(&logical, &dir.path().join("out"), &NoOpProgress)
            .await;
        assert!(matches!(result, Err(StorageError::ToolFailed { .. })));
    }
}
