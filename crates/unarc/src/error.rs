//! Error types for archive reading and extraction.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for archive operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Archive file not found at the specified path.
    #[error("Archive not found: {0}")]
    NotFound(PathBuf),

    /// The input does not look like any archive format we can read.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The archive uses a feature this reader does not implement
    /// (compression method, 7z coder, multi-folder layout, ...).
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The archive is corrupted or malformed.
    #[error("Corrupted archive: {0}")]
    Corrupted(String),

    /// A declared size or count exceeds the configured limits.
    #[error("Limit exceeded: {what} is {actual}, limit is {limit}")]
    LimitExceeded {
        /// Which quantity tripped the limit
        what: &'static str,
        /// Declared or observed value
        actual: u64,
        /// Configured limit
        limit: u64,
    },

    /// The reader API was called out of order.
    #[error("Invalid reader state: {0}")]
    InvalidState(&'static str),

    /// A security violation was detected during extraction.
    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    /// Some entries could not be extracted.
    #[error("Extraction failed for {failed} of {total} entries")]
    ExtractionFailed {
        /// Number of entries that failed
        failed: u64,
        /// Number of entries visited
        total: u64,
    },

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The extraction was cancelled by the user.
    #[error("Cancelled by user")]
    Cancelled,
}

impl ArchiveError {
    pub(crate) fn corrupted(msg: impl Into<String>) -> Self {
        ArchiveError::Corrupted(msg.into())
    }

    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        ArchiveError::Unsupported(msg.into())
    }

    /// Maps a short read of a fixed-size structure to a corruption error.
    pub(crate) fn truncated(what: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            ArchiveError::Corrupted(format!("truncated {}", what))
        } else {
            ArchiveError::Io(err)
        }
    }
}

/// Security-related errors during extraction.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Path traversal attempt detected (e.g., "../../../etc/passwd").
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Absolute path not allowed in archive entries.
    #[error("Absolute path not allowed: {0}")]
    AbsolutePath(String),

    /// Entry path is empty after normalization.
    #[error("Empty entry path")]
    EmptyPath,

    /// Entry path is longer than the configured maximum.
    #[error("Path too long: {len} bytes > {limit} bytes")]
    PathTooLong {
        /// Path length in bytes
        len: u64,
        /// Configured maximum
        limit: u64,
    },

    /// Entry path nests deeper than the configured maximum.
    #[error("Path too deep: {depth} components > {limit}")]
    PathTooDeep {
        /// Number of path components
        depth: u64,
        /// Configured maximum
        limit: u64,
    },

    /// A component of the destination path is a symlink.
    #[error("Refusing to write through symlink: {0}")]
    SymlinkInPath(PathBuf),
}
