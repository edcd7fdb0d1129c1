//! Path validation and canonicalization utilities.
//!
//! Provides security-critical path validation to prevent directory traversal.
//! All file access triggered by HTTP requests or watcher events MUST validate
//! paths before touching the filesystem.

use std::path::{Path, PathBuf};

/// Error types for path validation.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    /// Path cannot be canonicalized (doesn't exist or permission denied)
    #[error("cannot canonicalize path: {0}")]
    CannotCanonicalize(String),

    /// Resolved path escapes the watched root
    #[error("path escapes watch root: {0} (root: {1})")]
    OutsideRoot(String, String),

    /// Path contains suspicious traversal patterns
    #[error("path contains suspicious traversal patterns: {0}")]
    SuspiciousTraversal(String),

    /// Symlink points outside the watched root
    #[error("symlink escapes watch root: {0} -> {1}")]
    SymlinkEscape(String, String),
}

/// Canonicalize a path using std::fs::canonicalize.
pub fn canonicalize_path(path: &Path) -> Result<PathBuf, PathValidationError> {
    std::fs::canonicalize(path)
        .map_err(|_| PathValidationError::CannotCanonicalize(path.to_string_lossy().to_string()))
}

/// Validate that a path is within the given watch root directory.
///
/// This is the PRIMARY defense against directory traversal: all file access
/// reachable from an HTTP request MUST go through this validation.
pub fn validate_path_within_root(path: &Path, root: &Path) -> Result<PathBuf, PathValidationError> {
    let path_str = path.to_string_lossy();
    if has_suspicious_traversal(&path_str) {
        return Err(PathValidationError::SuspiciousTraversal(path_str.to_string()));
    }

    let canonical_path = canonicalize_path(path)?;
    let canonical_root = canonicalize_path(root)
        .map_err(|_| PathValidationError::CannotCanonicalize(root.to_string_lossy().to_string()))?;

    if !canonical_path.starts_with(&canonical_root) {
        return Err(PathValidationError::OutsideRoot(
            canonical_path.to_string_lossy().to_string(),
            canonical_root.to_string_lossy().to_string(),
        ));
    }

    Ok(canonical_path)
}

/// Check for suspicious path traversal patterns before canonicalization,
/// since canonicalization fails silently for non-existent intermediate dirs.
pub fn has_suspicious_traversal(path: &str) -> bool {
    let path_normalized = path.replace('\\', "/");

    let parent_count = path_normalized.matches("../").count();
    if parent_count >= 3 {
        return true;
    }

    if path_normalized.starts_with("../") && !path_normalized.starts_with("../../") {
        let depth = path_normalized.matches('/').count();
        if depth <= 2 {
            return true;
        }
    }

    let path_win = path.replace('/', "\\");
    if path_win.starts_with("..\\") && !path_win.starts_with("..\\..\\") {
        let depth = path_win.matches('\\').count();
        if depth <= 2 {
            return true;
        }
    }

    let parts: Vec<&str> = path_normalized.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "." && i < parts.len() - 1 && parts[i + 1..].iter().any(|p| *p == "..") {
            return true;
        }
    }

    let parts_win: Vec<&str> = path_win.split('\\').collect();
    for (i, part) in parts_win.iter().enumerate() {
        if *part == "." && i < parts_win.len() - 1 && parts_win[i + 1..].iter().any(|p| *p == "..") {
            return true;
        }
    }

    false
}

/// Validate a path that may not exist yet (e.g. a file about to be
/// written). Canonicalizes the nearest existing ancestor directory instead
/// of the path itself, then re-joins the remaining components.
pub fn validate_new_path_within_root(path: &Path, root: &Path) -> Result<PathBuf, PathValidationError> {
    let path_str = path.to_string_lossy();
    if has_suspicious_traversal(&path_str) {
        return Err(PathValidationError::SuspiciousTraversal(path_str.to_string()));
    }

    let canonical_root = canonicalize_path(root)
        .map_err(|_| PathValidationError::CannotCanonicalize(root.to_string_lossy().to_string()))?;

    let mut existing = path.to_path_buf();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => {
                remainder.push(name.to_os_string());
                existing = existing
                    .parent()
                    .map(PathBuf::from)
                    .ok_or_else(|| PathValidationError::CannotCanonicalize(path_str.to_string()))?;
            }
            None => return Err(PathValidationError::CannotCanonicalize(path_str.to_string())),
        }
    }

    let mut canonical = canonicalize_path(&existing)?;
    for component in remainder.into_iter().rev() {
        canonical.push(component);
    }

    if !canonical.starts_with(&canonical_root) {
        return Err(PathValidationError::OutsideRoot(
            canonical.to_string_lossy().to_string(),
            canonical_root.to_string_lossy().to_string(),
        ));
    }

    Ok(canonical)
}

/// Check if a symlink is safe (doesn't escape the watch root).
pub fn is_safe_symlink(symlink_path: &Path, root: &Path) -> Result<bool, PathValidationError> {
    let target = std::fs::read_link(symlink_path).map_err(|_| {
        PathValidationError::CannotCanonicalize(symlink_path.to_string_lossy().to_string())
    })?;

    let resolved = if target.is_absolute() {
        target.clone()
    } else {
        let parent = symlink_path.parent().unwrap_or(symlink_path);
        parent.join(&target)
    };

    match validate_path_within_root(&resolved, root) {
        Ok(_) => Ok(true),
        Err(PathValidationError::OutsideRoot(_, _)) => Err(PathValidationError::SymlinkEscape(
            symlink_path.to_string_lossy().to_string(),
            target.to_string_lossy().to_string(),
        )),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn suspicious_traversal_parent_patterns() {
        assert!(has_suspicious_traversal("../../../etc/passwd"));
        assert!(has_suspicious_traversal("../config"));
        assert!(has_suspicious_traversal("..\\config"));
    }

    #[test]
    fn suspicious_traversal_mixed_patterns() {
        assert!(has_suspicious_traversal("./subdir/../../etc"));
    }

    #[test]
    fn normal_paths_are_not_suspicious() {
        assert!(!has_suspicious_traversal("notes/todo.md"));
        assert!(!has_suspicious_traversal("./notes/todo.md"));
        assert!(!has_suspicious_traversal("../parent/notes/todo.md"));
    }

    #[test]
    fn validate_path_within_root_accepts_contained_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let file_path = root.join("todo.md");
        fs::write(&file_path, b"- [ ] write tests").unwrap();

        let result = validate_path_within_root(&file_path, root);
        assert!(result.is_ok());
        assert!(result.unwrap().starts_with(root));
    }

    #[test]
    fn validate_path_within_root_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let outside = root.join("../../../etc/passwd");

        let result = validate_path_within_root(&outside, root);
        assert!(matches!(
            result.unwrap_err(),
            PathValidationError::SuspiciousTraversal(_)
        ));
    }

    #[test]
    fn validate_new_path_within_root_accepts_a_not_yet_created_nested_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("notes")).unwrap();

        let target = root.join("notes").join("new.md");
        let result = validate_new_path_within_root(&target, root);
        assert!(result.is_ok());
        assert!(result.unwrap().starts_with(root));
    }

    #[test]
    fn validate_new_path_within_root_rejects_traversal_above_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let outside = root.join("../../../etc/new.conf");

        let result = validate_new_path_within_root(&outside, root);
        assert!(matches!(
            result.unwrap_err(),
            PathValidationError::SuspiciousTraversal(_)
        ));
    }

    #[test]
    fn symlink_escaping_root_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let outside_dir = TempDir::new().unwrap();
        let target = outside_dir.path().join("outside.md");
        fs::write(&target, b"outside").unwrap();

        let symlink = root.join("link.md");
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, &symlink).unwrap();

        #[cfg(unix)]
        {
            let result = is_safe_symlink(&symlink, root);
            assert!(result.is_err());
        }
    }
}
