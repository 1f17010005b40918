//! Format-independent reader facade.
//!
//! [`ArchiveReader`] detects the format of its input and dispatches to the
//! matching reader. Every reader owns its stream chain; dropping the
//! `ArchiveReader` (or calling [`ArchiveReader::close`]) releases all of it
//! exactly once, including the base file behind a decompression filter.
//!
//! The data handle returned by [`ArchiveReader::open_data`] borrows the
//! reader mutably, so it must be dropped before the next `next_entry` or
//! `skip_data` call. At most one entry's data is ever open.

use crate::compressed::CompressedReader;
use crate::detect::detect;
use crate::error::ArchiveError;
use crate::filter::Decompressor;
use crate::sevenz::SevenZReader;
use crate::stream::{DataStream, FileStream, Stream};
use crate::tar::TarReader;
use crate::types::{ArchiveFormat, Compression, Entry, Limits};
use crate::zip::ZipReader;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::debug;

/// Multiplier applied to the file size to bound raw reads of an archive
/// file. ZIP and 7z re-read parts of the file (central directory, local
/// headers), so the bound is a multiple of the size, never below it.
const FILE_READ_FACTOR: u64 = 10;

enum Inner<'a> {
    Tar(TarReader<DataStream<'a>>),
    Zip(ZipReader<DataStream<'a>>),
    SevenZ(SevenZReader<DataStream<'a>>),
    Compressed(CompressedReader<DataStream<'a>>),
}

/// Reader over any supported archive.
pub struct ArchiveReader<'a> {
    inner: Inner<'a>,
    format: ArchiveFormat,
    compression: Option<Compression>,
    limits: Limits,
}

impl ArchiveReader<'static> {
    /// Opens the archive at `path`, detecting its format.
    ///
    /// The file name doubles as the path hint for detection and as the
    /// entry name of a bare compressed file.
    pub fn open_path(path: &Path, limits: Limits) -> Result<Self, ArchiveError> {
        let limits = limits.resolved();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ArchiveError::NotFound(path.to_path_buf()),
            _ => ArchiveError::Io(e),
        })?;

        let size = file.metadata()?.len();
        let byte_limit = size
            .saturating_mul(FILE_READ_FACTOR)
            .min(limits.max_uncompressed_bytes)
            .max(size);
        let stream = FileStream::new(file, byte_limit)?;

        Self::open_stream_with_hint(Box::new(stream), Some(path), limits)
    }
}

impl<'a> ArchiveReader<'a> {
    /// Opens an archive from an arbitrary stream, detecting its format.
    ///
    /// Detection, ZIP and 7z need a seekable stream.
    pub fn open_stream<S: Stream + 'a>(stream: S, limits: Limits) -> Result<Self, ArchiveError> {
        Self::open_stream_with_hint(Box::new(stream), None, limits)
    }

    /// Like [`open_stream`](Self::open_stream), with a file name used for
    /// detection heuristics and bare compressed entry names.
    pub fn open_stream_with_hint(
        mut stream: DataStream<'a>,
        path_hint: Option<&Path>,
        limits: Limits,
    ) -> Result<Self, ArchiveError> {
        let limits = limits.resolved();
        let detection = detect(&mut stream, path_hint, &limits)?;

        let inner = match detection.format {
            ArchiveFormat::Tar => {
                let stream: DataStream<'a> = match detection.compression {
                    Some(compression) => Box::new(Decompressor::new(
                        compression,
                        stream,
                        limits.max_uncompressed_bytes,
                    )),
                    None => stream,
                };
                Inner::Tar(TarReader::new(stream, limits))
            }
            ArchiveFormat::Zip => Inner::Zip(ZipReader::new(stream, limits)?),
            ArchiveFormat::SevenZ => Inner::SevenZ(SevenZReader::new(stream, limits)?),
            ArchiveFormat::Compressed => {
                let compression = detection.compression.ok_or_else(|| {
                    ArchiveError::UnsupportedFormat("compressed file without compression".to_string())
                })?;
                Inner::Compressed(CompressedReader::new(stream, compression, path_hint, limits)?)
            }
        };

        debug!(
            format = %detection.format,
            compression = ?detection.compression,
            "archive opened"
        );
        Ok(Self {
            inner,
            format: detection.format,
            compression: detection.compression,
            limits,
        })
    }

    /// Container format.
    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    /// Compression around the container, if any.
    pub fn compression(&self) -> Option<Compression> {
        self.compression
    }

    /// Effective limits (defaults filled in).
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Advances to the next entry; `Ok(None)` at the end of the archive.
    pub fn next_entry(&mut self) -> Result<Option<Entry>, ArchiveError> {
        match &mut self.inner {
            Inner::Tar(r) => r.next_entry(),
            Inner::Zip(r) => r.next_entry(),
            Inner::SevenZ(r) => r.next_entry(),
            Inner::Compressed(r) => r.next_entry(),
        }
    }

    /// Opens the data of the entry most recently returned by
    /// [`next_entry`](Self::next_entry).
    pub fn open_data(&mut self) -> Result<DataStream<'_>, ArchiveError> {
        match &mut self.inner {
            Inner::Tar(r) => r.open_data(),
            Inner::Zip(r) => r.open_data(),
            Inner::SevenZ(r) => r.open_data(),
            Inner::Compressed(r) => r.open_data(),
        }
    }

    /// Discards the current entry's data without decoding it where the
    /// format allows.
    pub fn skip_data(&mut self) -> Result<(), ArchiveError> {
        match &mut self.inner {
            Inner::Tar(r) => r.skip_data(),
            Inner::Zip(r) => r.skip_data(),
            Inner::SevenZ(r) => r.skip_data(),
            Inner::Compressed(r) => r.skip_data(),
        }
    }

    /// Closes the reader and the stream chain it owns.
    pub fn close(self) {
        debug!(format = %self.format, "archive closed");
    }
}

impl Iterator for ArchiveReader<'_> {
    type Item = Result<Entry, ArchiveError>;

    /// Iterates entries without opening their data.
    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;
    use std::io::Read;

    fn tar_with(name: &str, data: &[u8]) -> Vec<u8> {
        let mut builder = ::tar::Builder::new(Vec::new());
        let mut header = ::tar::Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o600);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_open_stream_tar() {
        let mut reader =
            ArchiveReader::open_stream(MemoryStream::new(tar_with("x.txt", b"abc")), Limits::default())
                .unwrap();
        assert_eq!(reader.format(), ArchiveFormat::Tar);
        assert_eq!(reader.compression(), None);
        assert_eq!(reader.limits().max_entries, Limits::DEFAULT_MAX_ENTRIES);

        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.path, "x.txt");
        assert_eq!(entry.mode, 0o600);

        let mut data = String::new();
        reader.open_data().unwrap().read_to_string(&mut data).unwrap();
        assert_eq!(data, "abc");
        assert!(reader.next_entry().unwrap().is_none());
        reader.close();
    }

    #[test]
    fn test_iterator_lists_entries() {
        let reader =
            ArchiveReader::open_stream(MemoryStream::new(tar_with("one", b"1")), Limits::default())
                .unwrap();
        let names: Vec<String> = reader.map(|e| e.unwrap().path).collect();
        assert_eq!(names, vec!["one"]);
    }

    #[test]
    fn test_open_missing_path() {
        let err = ArchiveReader::open_path(Path::new("/nonexistent/archive.tar"), Limits::default())
            .err()
            .unwrap();
        assert!(matches!(err, ArchiveError::NotFound(_)));
    }

    #[test]
    fn test_unknown_format() {
        let err = ArchiveReader::open_stream(
            MemoryStream::new(b"plain text, nothing to see".to_vec()),
            Limits::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ArchiveError::UnsupportedFormat(_)));
    }
}
