//! Constrained 7z reader: one folder, one coder, one file.
//!
//! Handles the common single-file 7z produced by `7z a -ms=on file.7z file`
//! and similar tools: exactly one packed stream decoded by a single Copy,
//! LZMA or LZMA2 coder. Anything else (multi-coder folders such as BCJ +
//! LZMA2, several folders, several files in one folder, encryption) is
//! rejected as [`ArchiveError::Unsupported`] before any entry is returned.
//!
//! # Layout
//! ```text
//! 0      signature header (32 bytes): magic, version, start header CRC,
//!        next header offset/size/CRC
//! 32     packed streams
//! 32+N   header, either kHeader or kEncodedHeader (a packed kHeader)
//! ```
//!
//! Numbers in the header use the 7z variable-length encoding: the count of
//! leading one bits in the first byte gives the number of extra
//! little-endian bytes, and the remaining low bits of the first byte are
//! the most significant part.

use crate::error::ArchiveError;
use crate::filter::{LzmaConfig, LzmaFilter};
use crate::stream::{stream_len, DataStream, MemoryStream, Stream, SubStream};
use crate::types::{Entry, EntryType, Limits};
use flate2::Crc;
use std::io::{Read, SeekFrom};
use tracing::{debug, trace};

/// 7z file signature.
pub const SIGNATURE: [u8; 6] = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

const SIGNATURE_HEADER_LEN: u64 = 32;
const MAX_HEADER_SIZE: u64 = 64 * 1024 * 1024;

/// Property IDs used in 7z headers.
mod id {
    pub const END: u8 = 0x00;
    pub const HEADER: u8 = 0x01;
    pub const ARCHIVE_PROPERTIES: u8 = 0x02;
    pub const ADDITIONAL_STREAMS_INFO: u8 = 0x03;
    pub const MAIN_STREAMS_INFO: u8 = 0x04;
    pub const FILES_INFO: u8 = 0x05;
    pub const PACK_INFO: u8 = 0x06;
    pub const UNPACK_INFO: u8 = 0x07;
    pub const SUBSTREAMS_INFO: u8 = 0x08;
    pub const SIZE: u8 = 0x09;
    pub const CRC: u8 = 0x0A;
    pub const FOLDER: u8 = 0x0B;
    pub const CODERS_UNPACK_SIZE: u8 = 0x0C;
    pub const NUM_UNPACK_STREAM: u8 = 0x0D;
    pub const EMPTY_STREAM: u8 = 0x0E;
    pub const NAME: u8 = 0x11;
    pub const MTIME: u8 = 0x14;
    pub const ATTRIBUTES: u8 = 0x15;
    pub const ENCODED_HEADER: u8 = 0x17;
}

const METHOD_COPY: u64 = 0x00;
const METHOD_LZMA: u64 = 0x03_01_01;
const METHOD_LZMA2: u64 = 0x21;

const ATTRIBUTE_DIRECTORY: u32 = 0x10;
const ATTRIBUTE_UNIX_EXTENSION: u32 = 0x8000;
const UNIX_TYPE_MASK: u32 = 0o170000;
const UNIX_DIRECTORY: u32 = 0o040000;

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_OFFSET: i64 = 11_644_473_600;

/// Cursor over an in-memory header.
struct HeaderReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> HeaderReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn truncated() -> ArchiveError {
        ArchiveError::corrupted("truncated 7z header")
    }

    fn byte(&mut self) -> Result<u8, ArchiveError> {
        let b = *self.data.get(self.pos).ok_or_else(Self::truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn expect(&mut self, want: u8) -> Result<(), ArchiveError> {
        let got = self.byte()?;
        if got != want {
            return Err(ArchiveError::corrupted(format!(
                "7z header: expected property {:#04x}, found {:#04x}",
                want, got
            )));
        }
        Ok(())
    }

    fn take(&mut self, n: u64) -> Result<&'a [u8], ArchiveError> {
        let n = usize::try_from(n).map_err(|_| Self::truncated())?;
        if self.data.len() - self.pos < n {
            return Err(Self::truncated());
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32, ArchiveError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, ArchiveError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    /// Reads a 7z variable-length number.
    fn number(&mut self) -> Result<u64, ArchiveError> {
        let first = self.byte()?;
        let mut mask = 0x80u8;
        let mut value = 0u64;
        for i in 0..8 {
            if first & mask == 0 {
                let high = u64::from(first & mask.wrapping_sub(1));
                value |= high << (8 * i);
                return Ok(value);
            }
            value |= u64::from(self.byte()?) << (8 * i);
            mask >>= 1;
        }
        Ok(value)
    }

    /// A number used as an item count; must fit in what is left of the header.
    fn count(&mut self) -> Result<u64, ArchiveError> {
        let n = self.number()?;
        if n > (self.data.len() - self.pos) as u64 * 8 + 1 {
            return Err(ArchiveError::corrupted("7z item count exceeds header size"));
        }
        Ok(n)
    }

    /// MSB-first bit vector of `count` items.
    fn bits(&mut self, count: u64) -> Result<Vec<bool>, ArchiveError> {
        let bytes = self.take(count.div_ceil(8))?;
        Ok((0..count as usize)
            .map(|i| bytes[i / 8] & (0x80 >> (i % 8)) != 0)
            .collect())
    }

    /// An "all defined" byte followed by a bit vector when it is zero.
    fn defined(&mut self, count: u64) -> Result<Vec<bool>, ArchiveError> {
        if self.byte()? != 0 {
            Ok(vec![true; count as usize])
        } else {
            self.bits(count)
        }
    }

    /// A digest list; returns the CRC of each item, if defined.
    fn digests(&mut self, count: u64) -> Result<Vec<Option<u32>>, ArchiveError> {
        self.defined(count)?
            .into_iter()
            .map(|defined| if defined { self.u32().map(Some) } else { Ok(None) })
            .collect()
    }

    fn skip_external(&mut self) -> Result<(), ArchiveError> {
        if self.byte()? != 0 {
            return Err(ArchiveError::unsupported("7z external header data"));
        }
        Ok(())
    }
}

/// Coder methods this reader can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Copy,
    Lzma(LzmaConfig),
}

/// One folder with its single coder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Folder {
    method: Method,
    pack_pos: u64,
    pack_size: u64,
    unpack_size: u64,
    crc: Option<u32>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct FileInfo {
    name: Option<String>,
    mtime: Option<i64>,
    attributes: Option<u32>,
    has_stream: bool,
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    crc.sum()
}

fn filetime_to_unix(filetime: u64) -> i64 {
    (filetime / 10_000_000) as i64 - FILETIME_UNIX_OFFSET
}

fn parse_method(coder_id: u64, props: &[u8]) -> Result<Method, ArchiveError> {
    let bad_props = |e: std::io::Error| ArchiveError::corrupted(format!("7z coder properties: {}", e));
    match coder_id {
        METHOD_COPY => Ok(Method::Copy),
        METHOD_LZMA => Ok(Method::Lzma(
            LzmaConfig::from_lzma_props(props).map_err(bad_props)?,
        )),
        METHOD_LZMA2 => Ok(Method::Lzma(
            LzmaConfig::from_lzma2_props(props).map_err(bad_props)?,
        )),
        other => Err(ArchiveError::unsupported(format!("7z coder {:#x}", other))),
    }
}

/// Parses a `StreamsInfo` block restricted to one pack stream and one
/// single-coder folder. Returns `None` for a block without folders.
fn parse_streams_info(r: &mut HeaderReader<'_>) -> Result<Option<Folder>, ArchiveError> {
    let mut pack: Option<(u64, u64)> = None;
    let mut folder: Option<(Method, u64, Option<u32>)> = None;

    loop {
        match r.byte()? {
            id::END => break,
            id::PACK_INFO => pack = Some(parse_pack_info(r)?),
            id::UNPACK_INFO => folder = parse_unpack_info(r)?,
            id::SUBSTREAMS_INFO => {
                let folder_crc = folder.as_ref().and_then(|f| f.2);
                if let Some(crc) = parse_substreams_info(r, folder_crc)? {
                    if let Some(f) = folder.as_mut() {
                        f.2 = Some(crc);
                    }
                }
            }
            other => {
                return Err(ArchiveError::corrupted(format!(
                    "unexpected 7z streams property {:#04x}",
                    other
                )))
            }
        }
    }

    match (pack, folder) {
        (Some((pack_pos, pack_size)), Some((method, unpack_size, crc))) => Ok(Some(Folder {
            method,
            pack_pos,
            pack_size,
            unpack_size,
            crc,
        })),
        (None, None) => Ok(None),
        _ => Err(ArchiveError::corrupted("7z pack and unpack info disagree")),
    }
}

fn parse_pack_info(r: &mut HeaderReader<'_>) -> Result<(u64, u64), ArchiveError> {
    let pack_pos = r.number()?;
    let streams = r.count()?;
    if streams != 1 {
        return Err(ArchiveError::unsupported(format!(
            "7z archive with {} pack streams",
            streams
        )));
    }

    let mut size = None;
    loop {
        match r.byte()? {
            id::END => break,
            id::SIZE => size = Some(r.number()?),
            id::CRC => {
                r.digests(streams)?;
            }
            other => {
                return Err(ArchiveError::corrupted(format!(
                    "unexpected 7z pack property {:#04x}",
                    other
                )))
            }
        }
    }

    let size = size.ok_or_else(|| ArchiveError::corrupted("7z pack info without sizes"))?;
    Ok((pack_pos, size))
}

fn parse_unpack_info(r: &mut HeaderReader<'_>) -> Result<Option<(Method, u64, Option<u32>)>, ArchiveError> {
    r.expect(id::FOLDER)?;
    let folders = r.count()?;
    if folders == 0 {
        return Ok(None);
    }
    if folders != 1 {
        return Err(ArchiveError::unsupported(format!(
            "7z archive with {} folders",
            folders
        )));
    }
    r.skip_external()?;

    let coders = r.count()?;
    if coders != 1 {
        return Err(ArchiveError::unsupported(format!(
            "7z folder with {} coders",
            coders
        )));
    }

    let flags = r.byte()?;
    let id_len = flags & 0x0F;
    if flags & 0x10 != 0 {
        return Err(ArchiveError::unsupported("7z coder with multiple streams"));
    }
    if flags & 0xC0 != 0 {
        return Err(ArchiveError::unsupported("7z coder with alternative methods"));
    }
    if id_len == 0 || id_len > 8 {
        return Err(ArchiveError::corrupted("invalid 7z coder id length"));
    }
    let coder_id = r
        .take(id_len.into())?
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    let props = if flags & 0x20 != 0 {
        let len = r.number()?;
        r.take(len)?
    } else {
        &[][..]
    };
    let method = parse_method(coder_id, props)?;

    r.expect(id::CODERS_UNPACK_SIZE)?;
    let unpack_size = r.number()?;

    let mut crc = None;
    loop {
        match r.byte()? {
            id::END => break,
            id::CRC => crc = r.digests(1)?.into_iter().next().flatten(),
            other => {
                return Err(ArchiveError::corrupted(format!(
                    "unexpected 7z unpack property {:#04x}",
                    other
                )))
            }
        }
    }

    Ok(Some((method, unpack_size, crc)))
}

/// Parses `SubStreamsInfo` for the single folder. Returns the stream CRC
/// when one is recorded here.
fn parse_substreams_info(r: &mut HeaderReader<'_>, folder_crc: Option<u32>) -> Result<Option<u32>, ArchiveError> {
    let mut streams = 1u64;
    let mut crc = None;

    loop {
        match r.byte()? {
            id::END => break,
            id::NUM_UNPACK_STREAM => {
                streams = r.number()?;
                if streams > 1 {
                    return Err(ArchiveError::unsupported(format!(
                        "7z folder with {} files",
                        streams
                    )));
                }
            }
            id::SIZE => {
                // One size per stream except the last; none for a single stream
            }
            id::CRC => {
                let count = if streams == 1 && folder_crc.is_some() { 0 } else { streams };
                crc = r.digests(count)?.into_iter().next().flatten();
            }
            other => {
                return Err(ArchiveError::corrupted(format!(
                    "unexpected 7z substreams property {:#04x}",
                    other
                )))
            }
        }
    }

    Ok(crc)
}

fn parse_files_info(r: &mut HeaderReader<'_>, limits: &Limits) -> Result<Vec<FileInfo>, ArchiveError> {
    let count = r.count()?;
    if count > 1 {
        return Err(ArchiveError::unsupported(format!(
            "7z archive with {} files",
            count
        )));
    }
    let mut files = vec![
        FileInfo {
            has_stream: true,
            ..FileInfo::default()
        };
        count as usize
    ];

    loop {
        let property = r.byte()?;
        if property == id::END {
            break;
        }
        let size = r.number()?;
        let mut body = HeaderReader::new(r.take(size)?);

        match property {
            id::EMPTY_STREAM => {
                for (file, empty) in files.iter_mut().zip(body.bits(count)?) {
                    file.has_stream = !empty;
                }
            }
            id::NAME => {
                body.skip_external()?;
                let raw = body.take((body.data.len() - body.pos) as u64)?;
                let units: Vec<u16> = raw
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                for (file, name) in files.iter_mut().zip(units.split(|&u| u == 0)) {
                    if name.len() as u64 * 2 > limits.max_name {
                        return Err(ArchiveError::LimitExceeded {
                            what: "entry name length",
                            actual: name.len() as u64 * 2,
                            limit: limits.max_name,
                        });
                    }
                    file.name = Some(String::from_utf16_lossy(name));
                }
            }
            id::MTIME => {
                let defined = body.defined(count)?;
                body.skip_external()?;
                for (file, defined) in files.iter_mut().zip(defined) {
                    if defined {
                        file.mtime = Some(filetime_to_unix(body.u64()?));
                    }
                }
            }
            id::ATTRIBUTES => {
                let defined = body.defined(count)?;
                body.skip_external()?;
                for (file, defined) in files.iter_mut().zip(defined) {
                    if defined {
                        file.attributes = Some(body.u32()?);
                    }
                }
            }
            // kEmptyFile, kAnti, other times and kDummy padding carry nothing we report
            _ => {}
        }
    }

    Ok(files)
}

/// Parses a plain `kHeader` block (the leading ID already consumed).
fn parse_header(
    r: &mut HeaderReader<'_>,
    limits: &Limits,
) -> Result<(Option<Folder>, Vec<FileInfo>), ArchiveError> {
    let mut folder = None;
    let mut files = Vec::new();

    loop {
        match r.byte()? {
            id::END => break,
            id::ARCHIVE_PROPERTIES => loop {
                let property = r.byte()?;
                if property == id::END {
                    break;
                }
                let size = r.number()?;
                r.take(size)?;
            },
            id::ADDITIONAL_STREAMS_INFO => {
                return Err(ArchiveError::unsupported("7z additional streams"));
            }
            id::MAIN_STREAMS_INFO => folder = parse_streams_info(r)?,
            id::FILES_INFO => files = parse_files_info(r, limits)?,
            other => {
                return Err(ArchiveError::corrupted(format!(
                    "unexpected 7z header property {:#04x}",
                    other
                )))
            }
        }
    }

    Ok((folder, files))
}

/// Decodes a folder fully into memory.
fn decode_folder<S: Stream>(stream: &mut S, folder: &Folder, len: u64) -> Result<Vec<u8>, ArchiveError> {
    let offset = SIGNATURE_HEADER_LEN + folder.pack_pos;
    if offset.saturating_add(folder.pack_size) > len {
        return Err(ArchiveError::corrupted("7z packed stream out of bounds"));
    }

    stream.seek(SeekFrom::Start(offset))?;
    let window = SubStream::new(&mut *stream, offset, folder.pack_size);
    let mut decoded = Vec::new();
    match folder.method {
        Method::Copy => {
            let mut window = window;
            window.read_to_end(&mut decoded)?;
        }
        Method::Lzma(config) => {
            let mut filter = LzmaFilter::new(window, config, folder.unpack_size);
            filter
                .read_to_end(&mut decoded)
                .map_err(|e| ArchiveError::truncated("7z encoded header", e))?;
        }
    }

    if decoded.len() as u64 != folder.unpack_size {
        return Err(ArchiveError::corrupted("7z encoded header has the wrong size"));
    }
    if let Some(expected) = folder.crc {
        if crc32(&decoded) != expected {
            return Err(ArchiveError::corrupted("7z encoded header CRC mismatch"));
        }
    }
    Ok(decoded)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Pending,
    Current { skipped: bool },
    Done,
}

/// Reader for single-file 7z archives.
pub struct SevenZReader<S> {
    stream: S,
    limits: Limits,
    entry: Entry,
    folder: Option<Folder>,
    cursor: Cursor,
}

impl<S: Stream> SevenZReader<S> {
    /// Parses the signature header and the (possibly encoded) header.
    pub fn new(mut stream: S, limits: Limits) -> Result<Self, ArchiveError> {
        let limits = limits.resolved();
        let len = stream_len(&mut stream)?;

        let mut start = [0u8; SIGNATURE_HEADER_LEN as usize];
        stream.seek(SeekFrom::Start(0))?;
        stream
            .read_exact(&mut start)
            .map_err(|e| ArchiveError::truncated("7z signature header", e))?;
        if start[..6] != SIGNATURE {
            return Err(ArchiveError::corrupted("bad 7z signature"));
        }

        let mut fields = HeaderReader::new(&start[8..]);
        let start_crc = fields.u32()?;
        if crc32(&start[12..]) != start_crc {
            return Err(ArchiveError::corrupted("7z start header CRC mismatch"));
        }
        let next_offset = fields.u64()?;
        let next_size = fields.u64()?;
        let next_crc = fields.u32()?;

        if next_size == 0 {
            return Err(ArchiveError::corrupted("7z archive without a header"));
        }
        if next_size > MAX_HEADER_SIZE {
            return Err(ArchiveError::LimitExceeded {
                what: "7z header size",
                actual: next_size,
                limit: MAX_HEADER_SIZE,
            });
        }
        let header_pos = SIGNATURE_HEADER_LEN
            .checked_add(next_offset)
            .filter(|pos| pos.saturating_add(next_size) <= len)
            .ok_or_else(|| ArchiveError::corrupted("7z header out of bounds"))?;

        let mut header = vec![0u8; next_size as usize];
        stream.seek(SeekFrom::Start(header_pos))?;
        stream
            .read_exact(&mut header)
            .map_err(|e| ArchiveError::truncated("7z header", e))?;
        if crc32(&header) != next_crc {
            return Err(ArchiveError::corrupted("7z header CRC mismatch"));
        }

        if header[0] == id::ENCODED_HEADER {
            let mut r = HeaderReader::new(&header[1..]);
            let folder = parse_streams_info(&mut r)?
                .ok_or_else(|| ArchiveError::corrupted("7z encoded header without streams"))?;
            let limit = limits.max_uncompressed_bytes.min(MAX_HEADER_SIZE);
            if folder.unpack_size > limit {
                return Err(ArchiveError::LimitExceeded {
                    what: "7z header size",
                    actual: folder.unpack_size,
                    limit,
                });
            }
            debug!(
                pack_size = folder.pack_size,
                unpack_size = folder.unpack_size,
                "decoding 7z encoded header"
            );
            header = decode_folder(&mut stream, &folder, len)?;
        }

        let mut r = HeaderReader::new(&header);
        r.expect(id::HEADER)?;
        let (folder, files) = parse_header(&mut r, &limits)?;

        if let Some(folder) = &folder {
            let end = SIGNATURE_HEADER_LEN.saturating_add(folder.pack_pos).saturating_add(folder.pack_size);
            if end > len {
                return Err(ArchiveError::corrupted("7z packed stream out of bounds"));
            }
        }

        let entry = build_entry(files.into_iter().next().unwrap_or(FileInfo {
            has_stream: true,
            ..FileInfo::default()
        }), folder.as_ref())?;
        debug!(path = %entry.path, size = entry.size, "7z archive opened");

        Ok(Self {
            stream,
            limits,
            entry,
            folder,
            cursor: Cursor::Pending,
        })
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
                trace!(path = %self.entry.path, size = self.entry.size, "7z entry");
                Ok(Some(self.entry.clone()))
            }
            _ => {
                self.cursor = Cursor::Done;
                Ok(None)
            }
        }
    }

    /// Returns a stream over the entry's decoded data.
    pub fn open_data(&mut self) -> Result<DataStream<'_>, ArchiveError> {
        match self.cursor {
            Cursor::Current { skipped: false } => {}
            Cursor::Current { skipped: true } => {
                return Err(ArchiveError::InvalidState("entry data was already skipped"))
            }
            _ => return Err(ArchiveError::InvalidState("no current entry")),
        }

        let folder = match self.folder {
            Some(folder) if self.entry.size > 0 => folder,
            _ => return Ok(Box::new(MemoryStream::new(Vec::new()))),
        };
        let limit = folder.unpack_size.min(self.limits.max_uncompressed_bytes);
        let offset = SIGNATURE_HEADER_LEN + folder.pack_pos;

        match folder.method {
            Method::Copy => Ok(Box::new(SubStream::new(
                &mut self.stream,
                offset,
                folder.pack_size.min(limit),
            ))),
            Method::Lzma(config) => {
                let window = SubStream::new(&mut self.stream, offset, folder.pack_size);
                Ok(Box::new(LzmaFilter::new(window, config, limit)))
            }
        }
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

fn build_entry(file: FileInfo, folder: Option<&Folder>) -> Result<Entry, ArchiveError> {
    let attributes = file.attributes.unwrap_or(0);
    let unix_mode = (attributes & ATTRIBUTE_UNIX_EXTENSION != 0).then_some(attributes >> 16);

    let is_dir = !file.has_stream
        && (attributes & ATTRIBUTE_DIRECTORY != 0
            || unix_mode.is_some_and(|m| m & UNIX_TYPE_MASK == UNIX_DIRECTORY));
    let entry_type = if is_dir {
        EntryType::Directory
    } else {
        EntryType::File
    };

    if file.has_stream && folder.is_none() {
        return Err(ArchiveError::corrupted("7z file refers to a missing stream"));
    }

    let name = file.name.unwrap_or_else(|| "file".to_string());
    let mut entry = Entry::new(crate::safety::normalize_entry_path(&name), entry_type);
    if let Some(mode) = unix_mode.map(|m| m & 0o7777).filter(|&m| m != 0) {
        entry.mode = mode;
    }
    entry.size = match folder {
        Some(folder) if file.has_stream => folder.unpack_size,
        _ => 0,
    };
    entry.mtime = file.mtime.unwrap_or(0);
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_encoding() {
        let mut r = HeaderReader::new(&[0x05]);
        assert_eq!(r.number().unwrap(), 5);

        // One extra byte: 10xxxxxx yyyyyyyy
        let mut r = HeaderReader::new(&[0x81, 0x23]);
        assert_eq!(r.number().unwrap(), 0x123);

        // Two extra bytes
        let mut r = HeaderReader::new(&[0xC0, 0x34, 0x12]);
        assert_eq!(r.number().unwrap(), 0x1234);

        // Full eight bytes
        let mut data = vec![0xFF];
        data.extend_from_slice(&u64::MAX.to_le_bytes());
        let mut r = HeaderReader::new(&data);
        assert_eq!(r.number().unwrap(), u64::MAX);

        let mut r = HeaderReader::new(&[0x81]);
        assert!(matches!(r.number(), Err(ArchiveError::Corrupted(_))));
    }

    #[test]
    fn test_bit_vectors() {
        let mut r = HeaderReader::new(&[0b1010_0000]);
        assert_eq!(r.bits(3).unwrap(), vec![true, false, true]);

        let mut r = HeaderReader::new(&[0x01]);
        assert_eq!(r.defined(2).unwrap(), vec![true, true]);

        let mut r = HeaderReader::new(&[0x00, 0b0100_0000, 0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(r.digests(2).unwrap(), vec![None, Some(0xDEAD_BEEF)]);
    }

    #[test]
    fn test_filetime_to_unix() {
        assert_eq!(filetime_to_unix(116_444_736_000_000_000), 0);
        assert_eq!(filetime_to_unix(116_444_736_000_000_000 + 10_000_000), 1);
    }

    #[test]
    fn test_parse_method() {
        assert_eq!(parse_method(METHOD_COPY, &[]).unwrap(), Method::Copy);
        assert_eq!(
            parse_method(METHOD_LZMA2, &[16]).unwrap(),
            Method::Lzma(LzmaConfig::Lzma2 { dict_size: 1 << 19 })
        );
        assert!(matches!(
            parse_method(METHOD_LZMA2, &[41]),
            Err(ArchiveError::Corrupted(_))
        ));
        // BCJ x86
        assert!(matches!(
            parse_method(0x0303_0103, &[]),
            Err(ArchiveError::Unsupported(_))
        ));
    }

    #[test]
    fn test_two_folders_rejected() {
        let data = [id::FOLDER, 0x02, 0x00];
        let mut r = HeaderReader::new(&data);
        assert!(matches!(
            parse_unpack_info(&mut r),
            Err(ArchiveError::Unsupported(_))
        ));
    }

    #[test]
    fn test_multi_coder_folder_rejected() {
        let data = [id::FOLDER, 0x01, 0x00, 0x02, 0x01, 0x21];
        let mut r = HeaderReader::new(&data);
        assert!(matches!(
            parse_unpack_info(&mut r),
            Err(ArchiveError::Unsupported(_))
        ));
    }

    #[test]
    fn test_single_copy_folder() {
        let data = [
            id::FOLDER,
            0x01,
            0x00,
            0x01,
            0x01,
            0x00,
            id::CODERS_UNPACK_SIZE,
            0x05,
            id::END,
        ];
        let mut r = HeaderReader::new(&data);
        let (method, size, crc) = parse_unpack_info(&mut r).unwrap().unwrap();
        assert_eq!(method, Method::Copy);
        assert_eq!(size, 5);
        assert_eq!(crc, None);
    }

    #[test]
    fn test_directory_entry_from_attributes() {
        let file = FileInfo {
            name: Some("docs".to_string()),
            attributes: Some(ATTRIBUTE_DIRECTORY | ATTRIBUTE_UNIX_EXTENSION | ((0o040750) << 16)),
            has_stream: false,
            ..FileInfo::default()
        };
        let entry = build_entry(file, None).unwrap();
        assert_eq!(entry.entry_type, EntryType::Directory);
        assert_eq!(entry.mode, 0o750);
        assert_eq!(entry.size, 0);
    }
}
