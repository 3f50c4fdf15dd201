//! Local path resolution utilities.

use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Convert a path to absolute without resolving symlinks.
///
/// # Arguments
/// * `path` - Path to convert (relative or absolute)
///
/// # Returns
/// Absolute path, joining with current directory if relative.
///
/// # Errors
/// Returns error if current directory cannot be determined.
pub fn to_absolute(path: &Path) -> Result<PathBuf, PathError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        std::env::current_dir()
            .map(|cwd: PathBuf| cwd.join(path))
            .map_err(|e: std::io::Error| PathError::from_io(path.display().to_string(), e))
    }
}

/// Resolve a path against an explicit base directory.
///
/// Absolute paths are returned unchanged; relative paths are joined onto
/// `base`. Neither is normalized.
///
/// # Arguments
/// * `path` - Path to resolve
/// * `base` - Directory that relative paths are relative to
pub fn resolve_against(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Lexical path normalization without filesystem access.
///
/// Removes `.` components and resolves `..` components lexically.
/// Does not access the filesystem or resolve symlinks.
///
/// # Arguments
/// * `path` - Path to normalize
///
/// # Returns
/// Normalized path with `.` and `..` resolved lexically.
pub fn lexical_normalize(path: &Path) -> PathBuf {
    let mut components: Vec<Component> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !components.is_empty()
                    && !matches!(
                        components.last(),
                        Some(Component::ParentDir) | Some(Component::RootDir)
                    )
                {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_absolute_keeps_absolute() {
        let path: PathBuf = PathBuf::from("/abs/local/file.txt");
        assert_eq!(to_absolute(&path).unwrap(), path);
    }

    #[test]
    fn test_to_absolute_joins_cwd() {
        let cwd: PathBuf = std::env::current_dir().unwrap();
        let result: PathBuf = to_absolute(Path::new("data/in.txt")).unwrap();
        assert_eq!(result, cwd.join("data/in.txt"));
    }

    #[test]
    fn test_resolve_against_relative() {
        let result: PathBuf = resolve_against(Path::new("in.txt"), Path::new("/work"));
        assert_eq!(result, PathBuf::from("/work/in.txt"));
    }

    #[test]
    fn test_resolve_against_absolute() {
        let result: PathBuf = resolve_against(Path::new("/data/in.txt"), Path::new("/work"));
        assert_eq!(result, PathBuf::from("/data/in.txt"));
    }

    #[test]
    fn test_lexical_normalize_removes_dot() {
        let normalized: PathBuf = lexical_normalize(Path::new("/a/./b/./c"));
        assert_eq!(normalized, PathBuf::from("/a/b/c"));
    }

    #[test]
    fn test_lexical_normalize_resolves_dotdot() {
        let normalized: PathBuf = lexical_normalize(Path::new("/a/b/../c"));
        assert_eq!(normalized, PathBuf::from("/a/c"));
    }
}
