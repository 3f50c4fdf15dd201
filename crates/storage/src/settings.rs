//! Provisioning settings and INI configuration loading.

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, File, FileFormat};
use rusty_provisioning_common::{
    DEFAULT_CACHE_DIR_NAME, DEFAULT_DCC_STORAGE_CLIENT, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_STATE_DIR_NAME,
};

use crate::error::StorageError;

/// INI key for the cache root directory.
pub const KEY_CACHE_DIR: &str = "cache-dir";
/// INI key that disables cache lookup and population.
pub const KEY_CACHE_BYPASS: &str = "cache-bypass";
/// INI key for a custom object-store endpoint.
pub const KEY_S3_ENDPOINT: &str = "s3.endpoint";
/// INI key for path-style object-store addressing.
pub const KEY_S3_PATH_STYLE: &str = "s3.path-style-access";
/// INI key for the object-store signing region.
pub const KEY_S3_REGION: &str = "s3.region";
/// INI key for the Synapse API key.
pub const KEY_SYNAPSE_API_KEY: &str = "synapse-api-key";
/// INI key for the Synapse user name.
pub const KEY_SYNAPSE_USER: &str = "synapse-user-name";
/// INI key restricting repository routing to `syn<digits>` ids.
pub const KEY_SYNAPSE_STRICT_IDS: &str = "synapse-strict-ids";
/// INI key for the storage-grid download tool.
pub const KEY_DCC_CLIENT: &str = "dcc_storage.client";
/// INI key bounding concurrent batch transfers.
pub const KEY_MAX_CONCURRENCY: &str = "max-concurrency";

/// Default object-store signing region.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Configuration consumed by the provisioning engine and its backends.
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    /// Root of the hard-link cache.
    pub cache_dir: PathBuf,
    /// Skip cache lookup and population entirely.
    pub bypass_cache: bool,
    /// Custom object-store endpoint (e.g. a local S3-compatible server).
    pub s3_endpoint: Option<String>,
    /// Address buckets as `endpoint/bucket` rather than `bucket.endpoint`.
    pub s3_path_style_access: bool,
    /// Object-store signing region.
    pub s3_region: String,
    /// Synapse API key (base64, as issued by Synapse).
    pub synapse_api_key: Option<String>,
    /// Synapse user name the API key belongs to.
    pub synapse_user_name: Option<String>,
    /// Route only `syn<digits>` to the repository instead of every `syn`
    /// prefix.
    pub strict_repository_ids: bool,
    /// Storage-grid download tool.
    pub dcc_storage_client: PathBuf,
    /// Bound on concurrent transfers in batch operations.
    pub max_concurrency: usize,
    /// Directory relative local sources are resolved against.
    /// `None` means the process working directory.
    pub working_dir: Option<PathBuf>,
    /// Draw a progress bar on stderr for each transfer.
    pub show_progress: bool,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            bypass_cache: false,
            s3_endpoint: None,
            s3_path_style_access: false,
            s3_region: DEFAULT_S3_REGION.to_string(),
            synapse_api_key: None,
            synapse_user_name: None,
            strict_repository_ids: false,
            dcc_storage_client: PathBuf::from(DEFAULT_DCC_STORAGE_CLIENT),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            working_dir: None,
            show_progress: true,
        }
    }
}

/// `$HOME/.dockstore/cache`, or a relative `.dockstore/cache` without a home.
pub fn default_cache_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_STATE_DIR_NAME)
        .join(DEFAULT_CACHE_DIR_NAME)
}

impl ProvisionSettings {
    /// Load settings from an INI file.
    ///
    /// Dotted keys live in sections: `s3.endpoint` is `endpoint` under
    /// `[s3]`. Absent keys take their defaults.
    ///
    /// # Arguments
    /// * `path` - Path to the INI file
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the file is missing or malformed, or a
    /// value has the wrong type.
    pub fn from_ini_file(path: &Path) -> Result<Self, StorageError> {
        let config: Config = Config::builder()
            .add_source(File::from(path.to_path_buf()).format(FileFormat::Ini))
            .build()
            .map_err(|e: ConfigError| StorageError::InvalidConfig {
                message: format!("{}: {}", path.display(), e),
            })?;
        Self::from_config(&config)
    }

    /// Load settings from INI text.
    ///
    /// # Arguments
    /// * `contents` - INI document
    pub fn from_ini_str(contents: &str) -> Result<Self, StorageError> {
        let config: Config = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Ini))
            .build()
            .map_err(invalid_config)?;
        Self::from_config(&config)
    }

    fn from_config(config: &Config) -> Result<Self, StorageError> {
        let defaults: ProvisionSettings = ProvisionSettings::default();

        let s3_endpoint: Option<String> = optional(config.get_string(KEY_S3_ENDPOINT))?;
        // A custom endpoint almost always means an S3-compatible server that
        // only understands path-style requests.
        let s3_path_style_access: bool =
            optional(config.get_bool(KEY_S3_PATH_STYLE))?.unwrap_or(s3_endpoint.is_some());

        let max_concurrency: usize = match optional(config.get_int(KEY_MAX_CONCURRENCY))? {
            Some(value) if value >= 1 => value as usize,
            Some(value) => {
                return Err(StorageError::InvalidConfig {
                    message: format!("{} must be at least 1, got {}", KEY_MAX_CONCURRENCY, value),
                })
            }
            None => defaults.max_concurrency,
        };

        Ok(Self {
            cache_dir: optional(config.get_string(KEY_CACHE_DIR))?
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            bypass_cache: optional(config.get_bool(KEY_CACHE_BYPASS))?.unwrap_or(false),
            s3_endpoint,
            s3_path_style_access,
            s3_region: optional(config.get_string(KEY_S3_REGION))?.unwrap_or(defaults.s3_region),
            synapse_api_key: optional(config.get_string(KEY_SYNAPSE_API_KEY))?,
            synapse_user_name: optional(config.get_string(KEY_SYNAPSE_USER))?,
            strict_repository_ids: optional(config.get_bool(KEY_SYNAPSE_STRICT_IDS))?
                .unwrap_or(false),
            dcc_storage_client: optional(config.get_string(KEY_DCC_CLIENT))?
                .map(PathBuf::from)
                .unwrap_or(defaults.dcc_storage_client),
            max_concurrency,
            working_dir: None,
            show_progress: defaults.show_progress,
        })
    }

    /// Set the cache root.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Enable or disable the cache.
    pub fn with_bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    /// Set the directory relative local sources resolve against.
    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    /// Choose between `syn` prefix routing and strict `syn<digits>` ids.
    pub fn with_strict_repository_ids(mut self, strict: bool) -> Self {
        self.strict_repository_ids = strict;
        self
    }

    /// Set the storage-grid download tool.
    pub fn with_dcc_storage_client(mut self, client: impl Into<PathBuf>) -> Self {
        self.dcc_storage_client = client.into();
        self
    }

    /// Set a custom object-store endpoint and addressing style.
    pub fn with_s3_endpoint(mut self, endpoint: impl Into<String>, path_style: bool) -> Self {
        self.s3_endpoint = Some(endpoint.into());
        self.s3_path_style_access = path_style;
        self
    }

    /// Set the bound on concurrent batch transfers.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Enable or disable the stderr progress bar.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

/// Map a missing key to `None` and any other lookup failure to `InvalidConfig`.
fn optional<T>(result: Result<T, ConfigError>) -> Result<Option<T>, StorageError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(invalid_config(e)),
    }
}

fn invalid_config(err: ConfigError) -> StorageError {
    StorageError::InvalidConfig {
        message: err.to_string(),
    }
}
