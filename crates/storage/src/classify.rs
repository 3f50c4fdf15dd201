//! Classification of logical source and destination paths.
//!
//! Classification is a pure function of the input string: no filesystem or
//! network access, and never an error. Anything that does not parse as an
//! absolute URI is treated as a local file.

use std::fmt;

use url::Url;

/// URI scheme reserved for storage-grid object identifiers.
pub const GRID_SCHEME: &str = "icgc";

/// Prefix of object-store URIs.
pub const OBJECT_STORE_PREFIX: &str = "s3://";

/// Prefix of Synapse entity identifiers.
pub const REPOSITORY_PREFIX: &str = "syn";

/// A caller-supplied path, classified by where its bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalPath {
    /// A file on the local filesystem (absolute or working-directory relative).
    Local { path: String },
    /// An object in the storage grid, addressed by its lowercased identifier.
    GridObject { object_id: String },
    /// Anything URL-shaped; the original string, unmodified.
    Remote { uri: String },
}

impl LogicalPath {
    /// Classify a raw path string.
    ///
    /// # Arguments
    /// * `raw` - Path or URI as supplied by the caller
    pub fn classify(raw: &str) -> Self {
        let url: Url = match Url::parse(raw) {
            Ok(url) => url,
            Err(e) => {
                log::debug!("Treating {} as a local path ({})", raw, e);
                return LogicalPath::Local {
                    path: raw.to_string(),
                };
            }
        };

        // `C:\data\in.txt` parses with scheme `c`; a one-letter scheme is a
        // drive letter, not a protocol.
        if url.scheme().len() == 1 {
            return LogicalPath::Local {
                path: raw.to_string(),
            };
        }

        if url.scheme().eq_ignore_ascii_case(GRID_SCHEME) {
            return LogicalPath::GridObject {
                object_id: scheme_specific_part(raw).to_lowercase(),
            };
        }

        LogicalPath::Remote {
            uri: raw.to_string(),
        }
    }

    /// The string this path was classified from (object ids are lowercased).
    pub fn as_str(&self) -> &str {
        match self {
            LogicalPath::Local { path } => path,
            LogicalPath::GridObject { object_id } => object_id,
            LogicalPath::Remote { uri } => uri,
        }
    }

    /// Whether this is a local file.
    pub fn is_local(&self) -> bool {
        matches!(self, LogicalPath::Local { .. })
    }

    /// Whether this is a storage-grid object.
    pub fn is_grid_object(&self) -> bool {
        matches!(self, LogicalPath::GridObject { .. })
    }

    /// The URL scheme of a remote path, lowercased.
    pub fn scheme(&self) -> Option<String> {
        match self {
            LogicalPath::Remote { uri } => Url::parse(uri)
                .ok()
                .map(|url: Url| url.scheme().to_ascii_lowercase()),
            LogicalPath::GridObject { .. } => Some(GRID_SCHEME.to_string()),
            LogicalPath::Local { .. } => None,
        }
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalPath::Local { path } => write!(f, "local:{}", path),
            LogicalPath::GridObject { object_id } => write!(f, "{}:{}", GRID_SCHEME, object_id),
            LogicalPath::Remote { uri } => write!(f, "{}", uri),
        }
    }
}

/// Everything after the scheme's colon, without any fragment.
fn scheme_specific_part(raw: &str) -> &str {
    let rest: &str = raw.split_once(':').map(|(_, rest)| rest).unwrap_or("");
    rest.split_once('#').map(|(ssp, _)| ssp).unwrap_or(rest)
}

/// Whether `raw` is addressed to the repository by its `syn` prefix.
///
/// This is the default routing rule. It also claims names such as
/// `synthetic.fq`; [`is_repository_id`] is the strict alternative.
pub fn has_repository_prefix(raw: &str) -> bool {
    raw.starts_with(REPOSITORY_PREFIX)
}

/// Whether `raw` is a well-formed Synapse entity id (`syn` followed by digits).
pub fn is_repository_id(raw: &str) -> bool {
    match raw.strip_prefix(REPOSITORY_PREFIX) {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b: u8| b.is_ascii_digit()),
        None => false,
    }
}

/// Whether `raw` is an object-store URI.
pub fn is_object_store_uri(raw: &str) -> bool {
    raw.starts_with(OBJECT_STORE_PREFIX)
}
