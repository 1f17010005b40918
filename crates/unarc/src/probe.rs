//! Archive probing functionality for reading metadata without extraction.

use crate::error::ArchiveError;
use crate::reader::ArchiveReader;
use crate::types::{ArchiveInfo, Limits};
use std::path::Path;

/// Probe an archive to retrieve metadata without extracting.
///
/// Every entry header is read; entry data is never decoded except where
/// the format needs it to find the next header (streaming ZIP).
///
/// # Arguments
///
/// * `path` - Path to the archive file
/// * `limits` - Limits applied while reading headers
///
/// # Returns
///
/// Returns `ArchiveInfo` containing the archive metadata.
///
/// # Errors
///
/// Returns an error if:
/// - The archive file doesn't exist
/// - The format is unsupported or corrupted
/// - A limit is exceeded
pub fn probe_archive(path: &Path, limits: Limits) -> Result<ArchiveInfo, ArchiveError> {
    let mut reader = ArchiveReader::open_path(path, limits)?;
    let compressed_bytes = std::fs::metadata(path).ok().map(|m| m.len());

    let mut entry_list = Vec::new();
    while let Some(entry) = reader.next_entry()? {
        entry_list.push(entry);
    }

    let entries = entry_list.len() as u64;
    let uncompressed_estimate = if entry_list.is_empty() {
        None
    } else {
        Some(entry_list.iter().map(|e| e.size).fold(0u64, u64::saturating_add))
    };

    let info = ArchiveInfo {
        format: reader.format(),
        compression: reader.compression(),
        entries,
        compressed_bytes,
        uncompressed_estimate,
        entry_list,
    };
    reader.close();
    Ok(info)
}
