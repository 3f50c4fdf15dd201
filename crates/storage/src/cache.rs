//! Hard-link cache keyed by logical source path.
//!
//! Layout: `root/<first 2 hex chars>/<remaining 38 hex chars>`, where the hex
//! string is the SHA-1 of the logical path. The key covers the path string
//! only: a remote object that changes behind an unchanged path is still a
//! cache hit.
//!
//! The cache is never locked. Concurrent populates of one key race on
//! `link(2)`, which refuses to replace an existing entry, so the first
//! writer wins and later writers just skip caching.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rusty_provisioning_common::{hash_string, CACHE_PREFIX_LEN};

use crate::copy::is_same_file;
use crate::error::ProvisionError;

/// Cache address of a logical path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: String,
}

impl CacheKey {
    /// Compute the key for a logical path string.
    ///
    /// # Arguments
    /// * `logical_path` - The caller-supplied source path, exactly as given
    pub fn for_path(logical_path: &str) -> Self {
        Self {
            digest: hash_string(logical_path),
        }
    }

    /// Full 40-character hex digest.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Directory component (first two hex characters).
    pub fn prefix(&self) -> &str {
        &self.digest[..CACHE_PREFIX_LEN]
    }

    /// File name component (remaining hex characters).
    pub fn suffix(&self) -> &str {
        &self.digest[CACHE_PREFIX_LEN..]
    }

    /// `prefix/suffix`, relative to a cache root.
    pub fn relative_path(&self) -> PathBuf {
        Path::new(self.prefix()).join(self.suffix())
    }
}

/// Handle to a cache directory.
///
/// Holds only the resolved root; any number of handles may point at the
/// same directory.
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    /// Create a handle for the cache rooted at `root`.
    ///
    /// Nothing is created until [`ContentCache::ensure_root`] is called.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the entry for `key` lives.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Create the cache root (recursively) if it does not exist.
    ///
    /// # Errors
    /// Returns `CacheUnavailable` if the directory cannot be created.
    pub async fn ensure_root(&self) -> Result<(), ProvisionError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e: std::io::Error| ProvisionError::CacheUnavailable {
                path: self.root.display().to_string(),
                message: e.to_string(),
            })
    }

    /// Satisfy a request for `logical_path` by hard-linking the cached entry
    /// to `destination`.
    ///
    /// A destination that is already a link to the entry is a hit. Any
    /// failure (no entry, unreadable entry, link refused) is a miss and never
    /// fails the caller. An unrelated file at `destination` is left in place.
    ///
    /// # Arguments
    /// * `logical_path` - The caller-supplied source path
    /// * `destination` - Where the consumer wants the file
    ///
    /// # Returns
    /// The cache entry that was linked, on a hit.
    pub async fn lookup(&self, logical_path: &str, destination: &Path) -> Option<PathBuf> {
        let entry: PathBuf = self.entry_path(&CacheKey::for_path(logical_path));

        let metadata: std::fs::Metadata = match tokio::fs::metadata(&entry).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Cannot inspect cache entry {}: {}", entry.display(), e);
                return None;
            }
        };
        if !metadata.is_file() {
            log::warn!(
                "Cache entry {} for {} is not a regular file, ignoring it",
                entry.display(),
                logical_path
            );
            return None;
        }
        if let Err(e) = tokio::fs::File::open(&entry).await {
            log::warn!("Cache entry {} is not readable: {}", entry.display(), e);
            return None;
        }

        if let Some(parent) = destination.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                log::warn!("Cannot create {} for cached file: {}", parent.display(), e);
                return None;
            }
        }

        if is_same_file(&entry, destination).await {
            log::info!(
                "Found {} in cache, already linked at {}",
                logical_path,
                destination.display()
            );
            return Some(entry);
        }

        match tokio::fs::hard_link(&entry, destination).await {
            Ok(()) => {
                log::info!(
                    "Found {} in cache, hard-linked to {}",
                    logical_path,
                    destination.display()
                );
                Some(entry)
            }
            Err(e) => {
                log::warn!(
                    "Cannot create hard link from cached file {} to {}, you may want to move your cache: {}",
                    entry.display(),
                    destination.display(),
                    e
                );
                None
            }
        }
    }

    /// Record `populated_file` as the cached copy of `logical_path`.
    ///
    /// Does nothing if an entry already exists. Failures are logged and
    /// leave the key uncached.
    ///
    /// # Arguments
    /// * `logical_path` - The caller-supplied source path
    /// * `populated_file` - A freshly provisioned local file
    ///
    /// # Returns
    /// `true` if a new cache entry was created.
    pub async fn populate(&self, logical_path: &str, populated_file: &Path) -> bool {
        let entry: PathBuf = self.entry_path(&CacheKey::for_path(logical_path));

        if tokio::fs::symlink_metadata(&entry).await.is_ok() {
            return false;
        }

        if let Some(parent) = entry.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                log::warn!("Cannot create cache directory {}: {}", parent.display(), e);
                return false;
            }
        }

        match tokio::fs::hard_link(populated_file, &entry).await {
            Ok(()) => {
                log::info!(
                    "Cached {} as {}",
                    populated_file.display(),
                    entry.display()
                );
                true
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                log::debug!("Cache entry {} was populated concurrently", entry.display());
                false
            }
            Err(e) => {
                log::warn!(
                    "Cannot create hard link for {} in cache, skipping: {}",
                    populated_file.display(),
                    e
                );
                false
            }
        }
    }

    /// Whether an entry exists for `logical_path`.
    pub async fn contains(&self, logical_path: &str) -> bool {
        let entry: PathBuf = self.entry_path(&CacheKey::for_path(logical_path));
        tokio::fs::metadata(&entry)
            .await
            .map(|m: std::fs::Metadata| m.is_file())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(path: &Path, contents: &[u8]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_key_layout() {
        let key: CacheKey = CacheKey::for_path("abc");
        assert_eq!(key.prefix(), "a9");
        assert_eq!(key.suffix(), "993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            key.relative_path(),
            PathBuf::from("a9/993e364706816aba3e25717850c26c9cd0d89d")
        );
    }

    #[test]
    fn test_key_depends_only_on_string() {
        let a: String = "s3://bucket/key".to_string();
        let b: String = ["s3://", "bucket/key"].concat();
        assert_eq!(CacheKey::for_path(&a), CacheKey::for_path(&b));
        assert_ne!(
            CacheKey::for_path("s3://bucket/key"),
            CacheKey::for_path("s3://bucket/key2")
        );
    }

    #[tokio::test]
    async fn test_ensure_root_creates_nested() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let cache: ContentCache = ContentCache::new(dir.path().join("a/b/cache"));
        cache.ensure_root().await.unwrap();
        assert!(cache.root().is_dir());
    }

    #[tokio::test]
    async fn test_ensure_root_fails_under_file() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let blocker: PathBuf = dir.path().join("blocker");
        write_file(&blocker, b"x");
        let cache: ContentCache = ContentCache::new(blocker.join("cache"));
        let result: Result<(), ProvisionError> = cache.ensure_root().await;
        assert!(matches!(result, Err(ProvisionError::CacheUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_lookup_empty_cache_misses() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let cache: ContentCache = ContentCache::new(dir.path().join("cache"));
        cache.ensure_root().await.unwrap();
        let dest: PathBuf = dir.path().join("work/in.txt");
        assert!(cache.lookup("/data/in.txt", &dest).await.is_none());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_populate_then_lookup_hits() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let cache: ContentCache = ContentCache::new(dir.path().join("cache"));
        cache.ensure_root().await.unwrap();

        let fetched: PathBuf = dir.path().join("work1/in.txt");
        write_file(&fetched, b"reference data");
        assert!(cache.populate("s3://bucket/ref.fa", &fetched).await);
        assert!(cache.contains("s3://bucket/ref.fa").await);

        let dest: PathBuf = dir.path().join("work2/in.txt");
        let entry: PathBuf = cache.lookup("s3://bucket/ref.fa", &dest).await.unwrap();
        assert_eq!(
            entry,
            cache.entry_path(&CacheKey::for_path("s3://bucket/ref.fa"))
        );
        assert_eq!(std::fs::read(&dest).unwrap(), b"reference data");
    }

    #[tokio::test]
    async fn test_populate_keeps_first_entry() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let cache: ContentCache = ContentCache::new(dir.path().join("cache"));
        cache.ensure_root().await.unwrap();

        let first: PathBuf = dir.path().join("first");
        let second: PathBuf = dir.path().join("second");
        write_file(&first, b"first");
        write_file(&second, b"second");

        assert!(cache.populate("key", &first).await);
        assert!(!cache.populate("key", &second).await);

        let dest: PathBuf = dir.path().join("dest");
        cache.lookup("key", &dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_lookup_non_file_entry_is_miss() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let cache: ContentCache = ContentCache::new(dir.path().join("cache"));
        cache.ensure_root().await.unwrap();
        let entry: PathBuf = cache.entry_path(&CacheKey::for_path("/data/in.txt"));
        std::fs::create_dir_all(&entry).unwrap();

        let dest: PathBuf = dir.path().join("dest");
        assert!(cache.lookup("/data/in.txt", &dest).await.is_none());
        assert!(!cache.contains("/data/in.txt").await);
    }

    #[tokio::test]
    async fn test_lookup_existing_destination_is_miss() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let cache: ContentCache = ContentCache::new(dir.path().join("cache"));
        cache.ensure_root().await.unwrap();

        let fetched: PathBuf = dir.path().join("fetched");
        write_file(&fetched, b"cached");
        cache.populate("key", &fetched).await;

        let dest: PathBuf = dir.path().join("dest");
        write_file(&dest, b"already here");
        assert!(cache.lookup("key", &dest).await.is_none());
        assert_eq!(std::fs::read(&dest).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn test_lookup_already_linked_destination_hits() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let cache: ContentCache = ContentCache::new(dir.path().join("cache"));
        cache.ensure_root().await.unwrap();

        let dest: PathBuf = dir.path().join("work/in.txt");
        write_file(&dest, b"staged once");
        assert!(cache.populate("/data/in.txt", &dest).await);

        assert!(cache.lookup("/data/in.txt", &dest).await.is_some());
        assert_eq!(std::fs::read(&dest).unwrap(), b"staged once");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_lookup_unreadable_entry_is_miss() {
        use std::os::unix::fs::PermissionsExt;

        let dir: TempDir = tempfile::tempdir().unwrap();
        let cache: ContentCache = ContentCache::new(dir.path().join("cache"));
        cache.ensure_root().await.unwrap();
        let fetched: PathBuf = dir.path().join("fetched");
        write_file(&fetched, b"secret");
        assert!(cache.populate("key", &fetched).await);

        let entry: PathBuf = cache.entry_path(&CacheKey::for_path("key"));
        std::fs::set_permissions(&entry, std::fs::Permissions::from_mode(0o000)).unwrap();
        if std::fs::File::open(&entry).is_ok() {
            // Privileged users ignore file modes.
            std::fs::set_permissions(&entry, std::fs::Permissions::from_mode(0o644)).unwrap();
            return;
        }

        let dest: PathBuf = dir.path().join("dest");
        assert!(cache.lookup("key", &dest).await.is_none());
        assert!(!dest.exists());
        std::fs::set_permissions(&entry, std::fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[tokio::test]
    async fn test_populate_missing_source_is_silent() {
        let dir: TempDir = tempfile::tempdir().unwrap();
        let cache: ContentCache = ContentCache::new(dir.path().join("cache"));
        cache.ensure_root().await.unwrap();
        assert!(!cache.populate("key", &dir.path().join("nope")).await);
        assert!(!cache.contains("key").await);
    }
}
