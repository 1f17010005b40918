//! Format and compression detection.
//!
//! Detection sniffs magic bytes at offset 0. When the input starts with a
//! gzip, bzip2 or xz signature, the first block is decompressed through a
//! throwaway [`Decompressor`] so the container inside can be recognized.
//!
//! # Two-phase contract
//!
//! Decompression filters cannot seek, so peeking through one is
//! destructive. [`detect`] always rewinds the underlying stream to offset 0
//! before returning; the caller must then build a *fresh* decoder for the
//! reported [`Compression`]. Reusing anything from the detection pass is
//! not possible by construction: the throwaway filter only borrows the
//! stream and is dropped inside [`detect`].
//!
//! # Rules
//!
//! 1. gzip `1F 8B`, bzip2 `BZh`, xz `FD 37 7A 58 5A 00` select a compression.
//! 2. On the (possibly decompressed) prefix: a ZIP local, central or EOCD
//!    signature means ZIP; the 6-byte 7z signature means 7z; a non-zero
//!    512-byte block with `ustar` magic, or with a valid checksum and a
//!    printable first byte, means TAR.
//! 3. A compressed stream that holds anything else is a bare compressed
//!    file, unless its path looks like a compressed tar (`*.tar.*`,
//!    `.tgz`, `.tbz2`, `.txz`), in which case it is reported as corrupt.
//!    The suffix list is a heuristic, not a format guarantee.
//! 4. Compressed ZIP and 7z cannot be read without seeking and are
//!    treated as bare compressed files.

use crate::error::ArchiveError;
use crate::filter::Decompressor;
use crate::sevenz;
use crate::stream::{read_full, Stream};
use crate::tar;
use crate::types::{ArchiveFormat, Compression, Limits};
use crate::zip;
use std::io::{self, Read, SeekFrom};
use std::path::Path;
use tracing::debug;

/// gzip member magic.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
/// bzip2 stream magic.
pub const BZIP2_MAGIC: [u8; 3] = *b"BZh";
/// xz stream magic.
pub const XZ_MAGIC: [u8; 6] = [0xFD, b'7', b'z', b'X', b'Z', 0x00];

/// Result of sniffing a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    /// Container format
    pub format: ArchiveFormat,
    /// Compression around the container (always set for `Compressed`)
    pub compression: Option<Compression>,
}

/// Identifies the compression from the first bytes of a stream.
pub fn compression_from_magic(magic: &[u8]) -> Option<Compression> {
    if magic.starts_with(&XZ_MAGIC) {
        Some(Compression::Xz)
    } else if magic.starts_with(&GZIP_MAGIC) {
        Some(Compression::Gzip)
    } else if magic.starts_with(&BZIP2_MAGIC) {
        Some(Compression::Bzip2)
    } else {
        None
    }
}

/// Identifies a container from an uncompressed prefix.
pub fn container_from_prefix(prefix: &[u8]) -> Option<ArchiveFormat> {
    if prefix.len() >= 4 {
        let sig = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if sig == zip::LOCAL_FILE_HEADER_SIGNATURE
            || sig == zip::CENTRAL_DIRECTORY_SIGNATURE
            || sig == zip::EOCD_SIGNATURE
        {
            return Some(ArchiveFormat::Zip);
        }
    }

    if prefix.starts_with(&sevenz::SIGNATURE) {
        return Some(ArchiveFormat::SevenZ);
    }

    if prefix.len() >= tar::BLOCK_SIZE {
        let block = &prefix[..tar::BLOCK_SIZE];
        if !tar::is_zero_block(block)
            && (tar::has_ustar_magic(block)
                || (block[0].is_ascii_graphic() && tar::checksum_matches(block)))
        {
            return Some(ArchiveFormat::Tar);
        }
    }

    None
}

/// Whether a file name suggests a compressed tarball.
///
/// ```
/// use std::path::Path;
/// use unarc::detect::path_looks_like_tar;
///
/// assert!(path_looks_like_tar(Path::new("backup.tar.gz")));
/// assert!(path_looks_like_tar(Path::new("backup.tgz")));
/// assert!(!path_looks_like_tar(Path::new("notes.txt.gz")));
/// ```
pub fn path_looks_like_tar(path: &Path) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    if name.contains(".tar.") {
        return true;
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    matches!(extension.as_str(), "tgz" | "tbz2" | "txz")
}

/// Reads a prefix through a decoder. Errors after some bytes were decoded
/// are left for the real decoder to report.
fn peek_decoded<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) if filled > 0 => break,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Detects the archive format of `stream`, leaving it rewound to offset 0.
///
/// `path_hint` is only consulted to tell a corrupt `.tar.gz` apart from a
/// bare compressed file.
pub fn detect<S: Stream + ?Sized>(
    stream: &mut S,
    path_hint: Option<&Path>,
    limits: &Limits,
) -> Result<Detection, ArchiveError> {
    let limits = limits.resolved();

    stream.seek(SeekFrom::Start(0))?;
    let mut prefix = vec![0u8; tar::BLOCK_SIZE];
    let raw_len = read_full(stream, &mut prefix)?;

    let compression = compression_from_magic(&prefix[..raw_len]);
    let prefix_len = match compression {
        None => raw_len,
        Some(compression) => {
            stream.seek(SeekFrom::Start(0))?;
            let mut decoder =
                Decompressor::new(compression, &mut *stream, limits.max_uncompressed_bytes);
            peek_decoded(&mut decoder, &mut prefix).map_err(|e| {
                ArchiveError::corrupted(format!("cannot decode {} stream: {}", compression, e))
            })?
        }
    };
    stream.seek(SeekFrom::Start(0))?;

    let looks_like_tar = path_hint.map(path_looks_like_tar).unwrap_or(false);
    let container = if prefix_len >= 2 {
        container_from_prefix(&prefix[..prefix_len])
    } else {
        None
    };

    let detection = match (container, compression) {
        (Some(ArchiveFormat::Tar), compression) => Detection {
            format: ArchiveFormat::Tar,
            compression,
        },
        (Some(format), None) => Detection {
            format,
            compression: None,
        },
        (_, Some(compression)) => {
            if container.is_none() && looks_like_tar {
                return Err(ArchiveError::corrupted(format!(
                    "compressed tarball does not contain a tar archive ({})",
                    compression
                )));
            }
            Detection {
                format: ArchiveFormat::Compressed,
                compression: Some(compression),
            }
        }
        (None, None) => {
            return Err(ArchiveError::UnsupportedFormat(
                "unrecognized archive signature".to_string(),
            ))
        }
    };

    debug!(
        format = %detection.format,
        compression = ?detection.compression,
        "detected archive format"
    );
    Ok(detection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;
    use std::io::Write;

    fn tar_bytes() -> Vec<u8> {
        let mut builder = ::tar::Builder::new(Vec::new());
        let mut header = ::tar::Header::new_ustar();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "a.txt", &b"hello"[..]).unwrap();
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn run(data: Vec<u8>, path: Option<&str>) -> Result<Detection, ArchiveError> {
        let mut stream = MemoryStream::new(data);
        let detection = detect(&mut stream, path.map(Path::new), &Limits::default());
        // Always rewound, even after peeking through a decoder
        assert_eq!(stream.tell().unwrap(), 0);
        detection
    }

    #[test]
    fn test_detect_plain_tar() {
        let detection = run(tar_bytes(), None).unwrap();
        assert_eq!(detection.format, ArchiveFormat::Tar);
        assert_eq!(detection.compression, None);
    }

    #[test]
    fn test_detect_gzipped_tar() {
        let detection = run(gzip(&tar_bytes()), Some("x.tar.gz")).unwrap();
        assert_eq!(detection.format, ArchiveFormat::Tar);
        assert_eq!(detection.compression, Some(Compression::Gzip));
    }

    #[test]
    fn test_detect_zip_signatures() {
        assert_eq!(
            run(b"PK\x03\x04rest of a zip".to_vec(), None).unwrap().format,
            ArchiveFormat::Zip
        );
        // An empty zip is just an end-of-central-directory record
        let mut empty = b"PK\x05\x06".to_vec();
        empty.extend_from_slice(&[0u8; 18]);
        assert_eq!(run(empty, None).unwrap().format, ArchiveFormat::Zip);
    }

    #[test]
    fn test_detect_sevenz_signature() {
        let mut data = sevenz::SIGNATURE.to_vec();
        data.extend_from_slice(&[0u8; 26]);
        assert_eq!(run(data, None).unwrap().format, ArchiveFormat::SevenZ);
    }

    #[test]
    fn test_detect_bare_gzip() {
        let detection = run(gzip(b"just some text"), Some("notes.txt.gz")).unwrap();
        assert_eq!(detection.format, ArchiveFormat::Compressed);
        assert_eq!(detection.compression, Some(Compression::Gzip));
    }

    #[test]
    fn test_detect_tiny_gzip_is_bare() {
        let detection = run(gzip(b"x"), None).unwrap();
        assert_eq!(detection.format, ArchiveFormat::Compressed);
    }

    #[test]
    fn test_detect_fake_tarball_is_corrupt() {
        let result = run(gzip(b"this is not a tar archive"), Some("fake.tgz"));
        assert!(matches!(result, Err(ArchiveError::Corrupted(_))));

        let result = run(gzip(b"this is not a tar archive"), Some("fake.tar.gz"));
        assert!(matches!(result, Err(ArchiveError::Corrupted(_))));
    }

    #[test]
    fn test_detect_gzipped_zip_is_bare() {
        let detection = run(gzip(b"PK\x03\x04 zip inside gzip"), Some("a.zip.gz")).unwrap();
        assert_eq!(detection.format, ArchiveFormat::Compressed);
    }

    #[test]
    fn test_detect_unknown() {
        let result = run(b"plain text, nothing to see".to_vec(), None);
        assert!(matches!(result, Err(ArchiveError::UnsupportedFormat(_))));

        let result = run(Vec::new(), None);
        assert!(matches!(result, Err(ArchiveError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_compression_from_magic() {
        assert_eq!(compression_from_magic(&[0x1F, 0x8B, 8]), Some(Compression::Gzip));
        assert_eq!(compression_from_magic(b"BZh91AY"), Some(Compression::Bzip2));
        assert_eq!(compression_from_magic(&XZ_MAGIC), Some(Compression::Xz));
        assert_eq!(compression_from_magic(b"\xFD7zX"), None);
    }

    #[test]
    fn test_path_looks_like_tar() {
        assert!(path_looks_like_tar(Path::new("a.tar.gz")));
        assert!(path_looks_like_tar(Path::new("a.tar.bz2")));
        assert!(path_looks_like_tar(Path::new("dir/A.TAR.XZ")));
        assert!(path_looks_like_tar(Path::new("a.tgz")));
        assert!(path_looks_like_tar(Path::new("a.tbz2")));
        assert!(path_looks_like_tar(Path::new("a.txz")));
        assert!(!path_looks_like_tar(Path::new("a.gz")));
        assert!(!path_looks_like_tar(Path::new("a.tar")));
        assert!(!path_looks_like_tar(Path::new("tar.gz")));
    }
}
