//! Error returned by the path helpers.

use thiserror::Error;

/// A path could not be made absolute.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Cannot resolve {path}: {message}")]
pub struct PathError {
    /// The path being resolved.
    pub path: String,
    /// Why resolution failed.
    pub message: String,
}

impl PathError {
    /// Wrap an I/O failure encountered while resolving `path`.
    ///
    /// # Arguments
    /// * `path` - The path being resolved
    /// * `err` - The underlying I/O error
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        Self {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
