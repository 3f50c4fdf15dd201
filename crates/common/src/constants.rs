//! Shared constants used across rusty-provisioning crates.

/// Width of the rendered progress bar, in characters.
pub const PROGRESS_BAR_WIDTH: usize = 50;

/// Number of leading hex characters of a cache key used as the directory name.
pub const CACHE_PREFIX_LEN: usize = 2;

/// Directory (under the user's home) that holds provisioning state.
pub const DEFAULT_STATE_DIR_NAME: &str = ".dockstore";

/// Cache subdirectory under [`DEFAULT_STATE_DIR_NAME`].
pub const DEFAULT_CACHE_DIR_NAME: &str = "cache";

/// Default location of the storage-grid download tool.
pub const DEFAULT_DCC_STORAGE_CLIENT: &str = "/icgc/dcc-storage/bin/dcc-storage-client";

/// Buffer size for streamed copies (64KB).
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Default number of files staged concurrently by batch operations.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
