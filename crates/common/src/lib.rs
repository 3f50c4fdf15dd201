//! Shared types and utilities for rusty-provisioning.
//!
//! This crate provides common functionality used across all rusty-provisioning crates:
//! - Cache-key hashing of logical source paths
//! - Local path resolution against the working directory
//! - Generic progress callback trait and the terminal progress bar
//! - Shared constants and error types

pub mod constants;
pub mod error;
pub mod hash;
pub mod path_utils;
pub mod progress;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::PathError;
pub use hash::{hash_bytes, hash_string, SHA1_HEX_LEN};
pub use path_utils::{lexical_normalize, resolve_against, to_absolute};
pub use progress::{
    percent_complete, progress_fn, FnProgress, NoOpProgress, OperationType, ProgressBar,
    ProgressCallback, TransferProgress,
};
