//! Entry path normalization and security checks for extraction.
//!
//! Readers pass every raw entry name through [`normalize_entry_path`] so
//! that `./a/b`, `a//b` and `a/b/` all surface as `a/b`. The extractor then
//! runs [`validate_entry_path`] before touching the filesystem, which
//! rejects zip-slip style names and enforces the name length and nesting
//! depth limits.

use crate::error::SecurityError;
use crate::types::Limits;
use std::path::{Component, Path, PathBuf};

/// Normalizes a raw archive entry name.
///
/// Backslashes are left alone; only `/` separates components. Empty and
/// `.` segments are dropped, as is any trailing separator. `..` segments
/// are kept verbatim so the extractor can reject them.
///
/// # Examples
///
/// ```
/// use unarc::safety::normalize_entry_path;
///
/// assert_eq!(normalize_entry_path("./a/b"), "a/b");
/// assert_eq!(normalize_entry_path("a//b"), "a/b");
/// assert_eq!(normalize_entry_path("dir/"), "dir");
/// assert_eq!(normalize_entry_path("/etc/passwd"), "/etc/passwd");
/// ```
pub fn normalize_entry_path(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    if raw.starts_with('/') {
        out.push('/');
    }
    for segment in raw.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if !out.is_empty() && !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

/// Validates and normalizes an archive entry path to prevent security vulnerabilities.
///
/// This function performs the following checks:
/// - Rejects empty paths
/// - Rejects paths longer than `limits.max_name` bytes
/// - Rejects absolute paths
/// - Rejects paths containing ".." components (path traversal)
/// - Rejects paths nested deeper than `limits.max_nested_depth` components
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use unarc::safety::validate_entry_path;
/// use unarc::Limits;
///
/// let limits = Limits::default();
///
/// // Valid relative path
/// let safe_path = validate_entry_path(Path::new("dir/file.txt"), &limits).unwrap();
/// assert_eq!(safe_path, Path::new("dir/file.txt"));
///
/// // Path traversal attempt - rejected
/// assert!(validate_entry_path(Path::new("../../etc/passwd"), &limits).is_err());
///
/// // Absolute path - rejected
/// assert!(validate_entry_path(Path::new("/etc/passwd"), &limits).is_err());
/// ```
pub fn validate_entry_path(path: &Path, limits: &Limits) -> Result<PathBuf, SecurityError> {
    let limits = limits.resolved();
    let display = path.display().to_string();

    if path.as_os_str().is_empty() {
        return Err(SecurityError::EmptyPath);
    }

    let len = path.as_os_str().len() as u64;
    if len > limits.max_name {
        return Err(SecurityError::PathTooLong {
            len,
            limit: limits.max_name,
        });
    }

    if path.is_absolute() || path.has_root() {
        return Err(SecurityError::AbsolutePath(display));
    }

    let mut normalized = PathBuf::new();
    let mut depth = 0u64;

    for component in path.components() {
        match component {
            Component::Normal(part) => {
                depth += 1;
                normalized.push(part);
            }
            Component::CurDir => continue,
            Component::ParentDir => {
                return Err(SecurityError::PathTraversal(format!(
                    "Path contains '..' component: {}",
                    display
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                // Windows-style prefixes ("C:") land here too
                return Err(SecurityError::AbsolutePath(display));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(SecurityError::EmptyPath);
    }

    if depth > limits.max_nested_depth {
        return Err(SecurityError::PathTooDeep {
            depth,
            limit: limits.max_nested_depth,
        });
    }

    Ok(normalized)
}

/// Strips `count` leading components from a validated path.
///
/// Returns an empty path when nothing is left.
pub fn strip_path_components(path: &Path, count: u32) -> PathBuf {
    if count == 0 {
        return path.to_path_buf();
    }

    let components: Vec<_> = path.components().collect();
    let skip = count as usize;

    if skip >= components.len() {
        return PathBuf::new();
    }

    components[skip..].iter().collect()
}
