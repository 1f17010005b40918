//! # unarc
//!
//! A streaming archive reader with built-in decompression bomb limits.
//!
//! Archives are read entry by entry through [`ArchiveReader`]: each call to
//! `next_entry` yields fresh metadata, and `open_data` returns a stream over
//! that entry's bytes, bounded by its declared size and by
//! [`Limits::max_uncompressed_bytes`]. Extraction validates every entry path
//! before touching the filesystem.
//!
//! ## Supported Formats
//!
//! - TAR (ustar, pax, GNU long names), optionally gzip, bzip2 or xz compressed
//! - ZIP (including ZIP64), via the central directory or streamed from local headers
//! - 7-Zip, single folder and single file, with Copy, LZMA or LZMA2
//! - A bare `.gz`, `.bz2` or `.xz` file, exposed as a one-entry archive
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::io::Read;
//! use std::path::Path;
//! use unarc::{open, extract, ExtractOptions, Limits};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // List entries and read the first file
//! let mut reader = open(Path::new("archive.tar.gz"), Limits::default())?;
//! while let Some(entry) = reader.next_entry()? {
//!     println!("{} ({} bytes)", entry.path, entry.size);
//!     if entry.path == "README" {
//!         let mut text = String::new();
//!         reader.open_data()?.read_to_string(&mut text)?;
//!     }
//! }
//!
//! // Extract with default options
//! let stats = extract(
//!     Path::new("archive.zip"),
//!     Path::new("output"),
//!     Limits::default(),
//!     &ExtractOptions::default(),
//! )?;
//! println!("Extracted {} files ({} bytes)", stats.files_extracted, stats.bytes_written);
//! # Ok(())
//! # }
//! ```

pub mod compressed;
pub mod detect;
pub mod error;
pub mod extract;
pub mod filter;
pub mod probe;
pub mod reader;
pub mod safety;
pub mod sevenz;
pub mod stream;
pub mod tar;
pub mod types;
pub mod zip;

// Re-export main types
pub use error::{ArchiveError, SecurityError};
pub use extract::{extract_entry, extract_to_path, extract_with_progress};
pub use reader::ArchiveReader;
pub use stream::{DataStream, FileStream, MemoryStream, Stream, SubStream};
pub use types::{
    ArchiveFormat, ArchiveInfo, Compression, Entry, EntryType, ExtractOptions, ExtractStats,
    Limits,
};

use std::path::Path;

/// Type alias for progress callback functions.
///
/// The callback receives:
/// - `file`: The entry path just written
/// - `bytes_written`: Number of bytes written so far
/// - `total_bytes`: Declared size of the entry
///
/// Returns `true` to continue extraction, `false` to cancel.
pub type ProgressCallback = dyn Fn(&str, u64, Option<u64>) -> bool + Send + Sync;

/// Open an archive file, detecting its format and compression.
pub fn open(path: &Path, limits: Limits) -> Result<ArchiveReader<'static>, ArchiveError> {
    ArchiveReader::open_path(path, limits)
}

/// Probe an archive to retrieve metadata without extracting.
///
/// # Errors
///
/// Returns an error if:
/// - The archive file doesn't exist
/// - The format is unsupported or corrupted
/// - A limit is exceeded while reading headers
pub fn probe(path: &Path) -> Result<ArchiveInfo, ArchiveError> {
    probe::probe_archive(path, Limits::default())
}

/// Extract an archive file to the specified output directory.
///
/// # Arguments
///
/// * `archive_path` - Path to the archive file
/// * `output_dir` - Directory where files will be extracted
/// * `limits` - Limits applied while reading the archive
/// * `options` - Extraction options
///
/// # Errors
///
/// Returns an error if:
/// - The archive file doesn't exist or is corrupted
/// - Any entry failed to extract (`ExtractionFailed`)
/// - I/O errors occur
pub fn extract(
    archive_path: &Path,
    output_dir: &Path,
    limits: Limits,
    options: &ExtractOptions,
) -> Result<ExtractStats, ArchiveError> {
    let mut reader = ArchiveReader::open_path(archive_path, limits)?;
    let stats = extract_to_path(&mut reader, output_dir, options)?;
    reader.close();
    Ok(stats)
}
