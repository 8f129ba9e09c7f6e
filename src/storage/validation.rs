//! Path validation
//!
//! Resolves client-supplied paths against the session's working directory.
//! Virtual paths are always absolute, normalized and confined to the root.

use std::path::{Path, PathBuf};

use crate::error::FileSystemError;

/// Deepest virtual path accepted from a client.
pub const MAX_DIRECTORY_DEPTH: usize = 32;

/// Resolves `target` relative to `cwd` into a normalized virtual path.
///
/// `..` never climbs above `/`. Segments that could escape the root on the
/// host (backslashes, NUL bytes) are rejected.
pub fn resolve_virtual_path(cwd: &str, target: &str) -> Result<String, FileSystemError> {
    let mut segments: Vec<&str> = Vec::new();
    if !target.starts_with('/') {
        segments.extend(cwd.split('/').filter(|s| !s.is_empty()));
    }

    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s if s.contains('\\') || s.contains('\0') => {
                return Err(FileSystemError::InvalidPath(target.to_string()));
            }
            s => segments.push(s),
        }
    }

    if segments.len() > MAX_DIRECTORY_DEPTH {
        return Err(FileSystemError::InvalidPath(target.to_string()));
    }

    Ok(format!("/{}", segments.join("/")))
}

/// Maps a normalized virtual path onto the host file system under `root`.
pub fn virtual_to_real_path(root: &Path, virtual_path: &str) -> PathBuf {
    let relative = virtual_path.trim_start_matches('/');
    if relative.is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

/// Parent directory of a normalized virtual path.
pub fn parent_of(virtual_path: &str) -> String {
    match virtual_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => virtual_path[..idx].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_extend_cwd() {
        assert_eq!(resolve_virtual_path("/", "docs").unwrap(), "/docs");
        assert_eq!(resolve_virtual_path("/docs", "a/b.txt").unwrap(), "/docs/a/b.txt");
        assert_eq!(resolve_virtual_path("/docs", "./a").unwrap(), "/docs/a");
    }

    #[test]
    fn test_absolute_paths_ignore_cwd() {
        assert_eq!(resolve_virtual_path("/docs", "/pub").unwrap(), "/pub");
        assert_eq!(resolve_virtual_path("/docs", "/").unwrap(), "/");
    }

    #[test]
    fn test_parent_segments_are_clamped_at_root() {
        assert_eq!(resolve_virtual_path("/docs", "..").unwrap(), "/");
        assert_eq!(resolve_virtual_path("/", "../../etc/passwd").unwrap(), "/etc/passwd");
        assert_eq!(resolve_virtual_path("/a/b", "../c").unwrap(), "/a/c");
    }

    #[test]
    fn test_rejects_host_separators() {
        assert!(matches!(
            resolve_virtual_path("/", "..\\secret"),
            Err(FileSystemError::InvalidPath(_))
        ));
        assert!(resolve_virtual_path("/", "a\0b").is_err());
    }

    #[test]
    fn test_rejects_excessive_depth() {
        let deep = vec!["d"; MAX_DIRECTORY_DEPTH + 1].join("/");
        assert!(resolve_virtual_path("/", &deep).is_err());
    }

    #[test]
    fn test_virtual_to_real_path() {
        let root = Path::new("/srv/ftp");
        assert_eq!(virtual_to_real_path(root, "/"), PathBuf::from("/srv/ftp"));
        assert_eq!(
            virtual_to_real_path(root, "/docs/a.txt"),
            PathBuf::from("/srv/ftp/docs/a.txt")
        );
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/"), "/");
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of("/a/b"), "/a");
    }
}
