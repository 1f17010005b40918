//! A single compressed file (`.gz`, `.bz2`, `.xz`) exposed as a one-entry archive.
//!
//! The entry is named after the input file with the compression suffix
//! removed (`notes.txt.gz` -> `notes.txt`), or `file` when no name is
//! known. Before decoding starts, the declared size is read from the gzip
//! ISIZE trailer or the xz index; bzip2 records no size and reports 0.

use crate::detect::GZIP_MAGIC;
use crate::error::ArchiveError;
use crate::filter::Decompressor;
use crate::stream::{read_full, DataStream, Stream};
use crate::types::{Compression, Entry, EntryType, Limits};
use std::io::{self, SeekFrom};
use std::path::Path;
use tracing::trace;

const XZ_FOOTER_LEN: u64 = 12;
const XZ_FOOTER_MAGIC: &[u8; 2] = b"YZ";
/// Upper bound on the xz index we are willing to read for a size estimate.
const MAX_XZ_INDEX: u64 = 16 * 1024 * 1024;

/// Derives the virtual entry name from the input path.
///
/// ```
/// use std::path::Path;
/// use unarc::compressed::entry_name;
/// use unarc::Compression;
///
/// assert_eq!(entry_name(Some(Path::new("/tmp/notes.txt.gz")), Compression::Gzip), "notes.txt");
/// assert_eq!(entry_name(Some(Path::new("data.BZ2")), Compression::Bzip2), "data");
/// assert_eq!(entry_name(None, Compression::Xz), "file");
/// ```
pub fn entry_name(path: Option<&Path>, compression: Compression) -> String {
    let Some(name) = path.and_then(|p| p.file_name()).and_then(|n| n.to_str()) else {
        return "file".to_string();
    };

    let suffix = format!(".{}", compression.extension());
    let stem = if name.len() > suffix.len() && name.to_ascii_lowercase().ends_with(&suffix) {
        &name[..name.len() - suffix.len()]
    } else {
        name
    };

    if stem.is_empty() {
        "file".to_string()
    } else {
        stem.to_string()
    }
}

/// Reads the gzip ISIZE trailer (uncompressed size modulo 2^32).
pub fn gzip_declared_size<S: Stream + ?Sized>(stream: &mut S) -> io::Result<u64> {
    let mut trailer = [0u8; 4];
    stream.seek(SeekFrom::End(-4))?;
    stream.read_exact(&mut trailer)?;
    Ok(u64::from(u32::from_le_bytes(trailer)))
}

/// Reads the gzip header MTIME field; 0 means unset.
fn gzip_mtime<S: Stream + ?Sized>(stream: &mut S) -> io::Result<u32> {
    let mut header = [0u8; 8];
    stream.seek(SeekFrom::Start(0))?;
    if read_full(stream, &mut header)? < header.len() || header[..2] != GZIP_MAGIC {
        return Ok(0);
    }
    Ok(u32::from_le_bytes([header[4], header[5], header[6], header[7]]))
}

/// Decodes an xz multibyte integer (7 bits per byte, least significant first).
fn xz_varint(data: &[u8], pos: &mut usize) -> Option<u64> {
    let mut value = 0u64;
    for i in 0..9 {
        let byte = *data.get(*pos)?;
        *pos += 1;
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Some(value);
        }
    }
    None
}

/// Sums the uncompressed sizes recorded in the index of the last xz stream.
///
/// Returns `Ok(None)` when the footer or index cannot be understood.
pub fn xz_declared_size<S: Stream + ?Sized>(stream: &mut S) -> io::Result<Option<u64>> {
    let len = stream.seek(SeekFrom::End(0))?;
    if len < XZ_FOOTER_LEN * 2 {
        return Ok(None);
    }

    let mut footer = [0u8; XZ_FOOTER_LEN as usize];
    stream.seek(SeekFrom::Start(len - XZ_FOOTER_LEN))?;
    stream.read_exact(&mut footer)?;
    if &footer[10..] != XZ_FOOTER_MAGIC {
        return Ok(None);
    }

    let backward_size = (u64::from(u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]])) + 1) * 4;
    if backward_size > MAX_XZ_INDEX || backward_size + XZ_FOOTER_LEN > len {
        return Ok(None);
    }

    let mut index = vec![0u8; backward_size as usize];
    stream.seek(SeekFrom::Start(len - XZ_FOOTER_LEN - backward_size))?;
    stream.read_exact(&mut index)?;
    if index[0] != 0x00 {
        return Ok(None);
    }

    let mut pos = 1;
    let Some(records) = xz_varint(&index, &mut pos) else {
        return Ok(None);
    };
    let mut total = 0u64;
    for _ in 0..records {
        let (Some(_unpadded), Some(uncompressed)) =
            (xz_varint(&index, &mut pos), xz_varint(&index, &mut pos))
        else {
            return Ok(None);
        };
        total = total.saturating_add(uncompressed);
    }
    Ok(Some(total))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Pending,
    Current { skipped: bool },
    Done,
}

/// One-entry reader over a bare compressed stream.
pub struct CompressedReader<S> {
    stream: S,
    compression: Compression,
    limits: Limits,
    entry: Entry,
    cursor: Cursor,
}

impl<S: Stream> CompressedReader<S> {
    /// Builds the virtual entry. Size and mtime are best effort: a stream
    /// that cannot seek simply reports 0 for both.
    pub fn new(
        mut stream: S,
        compression: Compression,
        path_hint: Option<&Path>,
        limits: Limits,
    ) -> Result<Self, ArchiveError> {
        let limits = limits.resolved();
        let mut entry = Entry::new(entry_name(path_hint, compression), EntryType::File);

        match compression {
            Compression::Gzip => {
                entry.size = gzip_declared_size(&mut stream).unwrap_or(0);
                entry.mtime = i64::from(gzip_mtime(&mut stream).unwrap_or(0));
            }
            Compression::Xz => {
                entry.size = xz_declared_size(&mut stream).ok().flatten().unwrap_or(0);
            }
            Compression::Bzip2 => {}
        }

        rewind(&mut stream)?;
        Ok(Self {
            stream,
            compression,
            limits,
            entry,
            cursor: Cursor::Pending,
        })
    }

    /// Compression of the wrapped stream.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Unwraps the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Yields the single entry once.
    pub fn next_entry(&mut self) -> Result<Option<Entry>, ArchiveError> {
        match self.cursor {
            Cursor::Pending => {
                self.cursor = Cursor::Current { skipped: false };
                trace!(path = %self.entry.path, size = self.entry.size, "compressed entry");
                Ok(Some(self.entry.clone()))
            }
            _ => {
                self.cursor = Cursor::Done;
                Ok(None)
            }
        }
    }

    /// Returns a fresh decoder over the whole stream, capped at
    /// `max_uncompressed_bytes`.
    pub fn open_data(&mut self) -> Result<DataStream<'_>, ArchiveError> {
        match self.cursor {
            Cursor::Current { skipped: false } => {}
            Cursor::Current { skipped: true } => {
                return Err(ArchiveError::InvalidState("entry data was already skipped"))
            }
            _ => return Err(ArchiveError::InvalidState("no current entry")),
        }

        rewind(&mut self.stream)?;
        Ok(Box::new(Decompressor::new(
            self.compression,
            &mut self.stream,
            self.limits.max_uncompressed_bytes,
        )))
    }

    /// Marks the entry's data as consumed.
    pub fn skip_data(&mut self) -> Result<(), ArchiveError> {
        match self.cursor {
            Cursor::Current { .. } => {
                self.cursor = Cursor::Current { skipped: true };
                Ok(())
            }
            _ => Err(ArchiveError::InvalidState("no current entry")),
        }
    }
}

fn rewind<S: Stream + ?Sized>(stream: &mut S) -> io::Result<()> {
    if stream.tell()? != 0 {
        stream.seek(SeekFrom::Start(0))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;
    use flate2::write::GzEncoder;
    use std::io::{Read, Write};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_entry_name() {
        assert_eq!(entry_name(Some(Path::new("a/b/report.csv.gz")), Compression::Gzip), "report.csv");
        assert_eq!(entry_name(Some(Path::new("log.xz")), Compression::Xz), "log");
        // Suffix of another compression is kept
        assert_eq!(entry_name(Some(Path::new("log.xz")), Compression::Gzip), "log.xz");
        // A bare suffix does not produce an empty name
        assert_eq!(entry_name(Some(Path::new(".gz")), Compression::Gzip), ".gz");
    }

    #[test]
    fn test_xz_varint() {
        let mut pos = 0;
        assert_eq!(xz_varint(&[0x05], &mut pos), Some(5));
        let mut pos = 0;
        assert_eq!(xz_varint(&[0x80, 0x01], &mut pos), Some(128));
        assert_eq!(pos, 2);
        let mut pos = 0;
        assert_eq!(xz_varint(&[0x80], &mut pos), None);
    }

    #[test]
    fn test_gzip_entry_and_data() {
        let payload = b"compressed payload ".repeat(100);
        let mut reader = CompressedReader::new(
            MemoryStream::new(gzip(&payload)),
            Compression::Gzip,
            Some(Path::new("payload.bin.gz")),
            Limits::default(),
        )
        .unwrap();

        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.path, "payload.bin");
        assert_eq!(entry.size, payload.len() as u64);
        assert_eq!(entry.entry_type, EntryType::File);

        let mut data = Vec::new();
        reader.open_data().unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, payload);

        assert!(reader.next_entry().unwrap().is_none());
        assert!(reader.open_data().is_err());
    }

    #[test]
    fn test_data_is_capped_by_limit() {
        let payload = vec![b'z'; 10_000];
        let limits = Limits {
            max_uncompressed_bytes: 1000,
            ..Limits::unset()
        };
        let mut reader = CompressedReader::new(
            MemoryStream::new(gzip(&payload)),
            Compression::Gzip,
            None,
            limits,
        )
        .unwrap();

        assert_eq!(reader.next_entry().unwrap().unwrap().path, "file");
        let mut data = Vec::new();
        reader.open_data().unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data.len(), 1000);
    }
}
