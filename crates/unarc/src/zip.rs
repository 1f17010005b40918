//! ZIP reader with ZIP64 support.
//!
//! # Modes
//!
//! - **Central directory** (preferred): the End Of Central Directory record
//!   is found by scanning backward over the last 64 KiB + 22 bytes. When a
//!   count, size or offset holds its sentinel (`0xFFFF` / `0xFFFFFFFF`) the
//!   ZIP64 locator and EOCD64 supply the real values. Every central record is
//!   parsed up front and entries are yielded in directory order.
//! - **Streaming** (fallback when no EOCD exists): local headers are parsed
//!   in file order. The next header follows `data_start + compressed_size`;
//!   entries with a data descriptor have their end located by scanning
//!   (stored) or by decoding (deflate).
//!
//! # Invariants
//! - Entry data is always located through the local header; the central
//!   record's sizes bound the data but never position it.
//! - Name, extra and comment lengths are checked against [`Limits`] before
//!   anything is read for them.
//! - Decompressed output is capped at `min(uncompressed_size, max_uncompressed_bytes)`.

use crate::error::ArchiveError;
use crate::filter::{DeflateFilter, INPUT_CHUNK};
use crate::safety::normalize_entry_path;
use crate::stream::{read_full, stream_len, DataStream, MemoryStream, Stream, SubStream};
use crate::types::{Entry, EntryType, Limits};
use std::io::{self, SeekFrom};
use tracing::{debug, trace, warn};

/// `PK\x03\x04`
pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x0403_4b50;
/// `PK\x01\x02`
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0201_4b50;
/// `PK\x05\x06`
pub const EOCD_SIGNATURE: u32 = 0x0605_4b50;
/// `PK\x06\x06`
pub const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4b50;
/// `PK\x06\x07`
pub const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
/// `PK\x07\x08`
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;

const EOCD_LEN: u64 = 22;
const MAX_COMMENT_LEN: u64 = 0xFFFF;
const ZIP64_LOCATOR_LEN: u64 = 20;
const ZIP64_EOCD_LEN: usize = 56;
const CENTRAL_HEADER_LEN: usize = 46;
const LOCAL_HEADER_LEN: usize = 30;

const SENTINEL_16: u16 = 0xFFFF;
const SENTINEL_32: u32 = 0xFFFF_FFFF;

const ZIP64_EXTRA_ID: u16 = 0x0001;
const EXTENDED_TIMESTAMP_ID: u16 = 0x5455;

const FLAG_ENCRYPTED: u16 = 0x0001;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

const HOST_UNIX: u8 = 3;
const HOST_DARWIN: u8 = 19;

/// Little-endian field reader over an in-memory record.
struct Fields<'a> {
    data: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> Fields<'a> {
    fn new(data: &'a [u8], what: &'static str) -> Self {
        Self { data, pos: 0, what }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ArchiveError> {
        if self.data.len() - self.pos < n {
            return Err(ArchiveError::corrupted(format!("truncated {}", self.what)));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn u16(&mut self) -> Result<u16, ArchiveError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
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

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Location of the central directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Eocd {
    entries: u64,
    cd_size: u64,
    cd_offset: u64,
    /// Offset of the EOCD record itself
    position: u64,
}

/// Per-entry record shared by both modes.
#[derive(Debug, Clone, Default)]
struct ZipRecord {
    name: String,
    version_made_by: u16,
    flags: u16,
    method: u16,
    dos_time: u16,
    dos_date: u16,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
    external_attrs: u32,
    extended_mtime: Option<i64>,
    /// Known once the local header has been parsed
    data_start: Option<u64>,
}

impl ZipRecord {
    fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    fn unix_mode(&self) -> Option<u32> {
        let host = (self.version_made_by >> 8) as u8;
        let mode = (self.external_attrs >> 16) & 0o7777;
        if matches!(host, HOST_UNIX | HOST_DARWIN) && mode != 0 {
            Some(mode)
        } else {
            None
        }
    }

    fn to_entry(&self) -> Entry {
        let entry_type = if self.is_dir() {
            EntryType::Directory
        } else {
            EntryType::File
        };
        let mut entry = Entry::new(normalize_entry_path(&self.name), entry_type);
        if let Some(mode) = self.unix_mode() {
            entry.mode = mode;
        }
        entry.size = if self.is_dir() { 0 } else { self.uncompressed_size };
        entry.mtime = self
            .extended_mtime
            .unwrap_or_else(|| dos_to_unix(self.dos_date, self.dos_time));
        entry
    }

    /// Applies the ZIP64 and extended-timestamp extra fields.
    ///
    /// Each ZIP64 value is present only when the matching 32-bit field holds
    /// the sentinel, in the order uncompressed size, compressed size, local
    /// header offset. Returns whether a ZIP64 field was seen.
    fn apply_extra(&mut self, extra: &[u8], raw: RawSizes) -> Result<bool, ArchiveError> {
        let mut fields = Fields::new(extra, "zip extra field");
        let mut zip64 = false;

        while fields.remaining() >= 4 {
            let id = fields.u16()?;
            let size = fields.u16()? as usize;
            let data = fields.take(size)?;

            match id {
                ZIP64_EXTRA_ID => {
                    zip64 = true;
                    let mut values = Fields::new(data, "zip64 extra field");
                    if raw.uncompressed == SENTINEL_32 {
                        self.uncompressed_size = values.u64()?;
                    }
                    if raw.compressed == SENTINEL_32 {
                        self.compressed_size = values.u64()?;
                    }
                    if raw.offset == Some(SENTINEL_32) {
                        self.local_header_offset = values.u64()?;
                    }
                }
                EXTENDED_TIMESTAMP_ID => {
                    // flags byte, then mtime when bit 0 is set
                    if data.len() >= 5 && data[0] & 0x01 != 0 {
                        let mtime = i32::from_le_bytes([data[1], data[2], data[3], data[4]]);
                        self.extended_mtime = Some(i64::from(mtime));
                    }
                }
                _ => {}
            }
        }

        Ok(zip64)
    }
}

/// The 32-bit size fields as stored, before ZIP64 resolution.
#[derive(Debug, Clone, Copy)]
struct RawSizes {
    uncompressed: u32,
    compressed: u32,
    offset: Option<u32>,
}

/// Converts a DOS date/time pair (interpreted as UTC) to unix seconds.
pub(crate) fn dos_to_unix(date: u16, time: u16) -> i64 {
    let year = i64::from(date >> 9) + 1980;
    let month = i64::from((date >> 5) & 0x0F).clamp(1, 12);
    let day = i64::from(date & 0x1F).max(1);
    let hour = i64::from(time >> 11);
    let minute = i64::from((time >> 5) & 0x3F);
    let second = i64::from(time & 0x1F) * 2;

    days_from_civil(year, month, day) * 86_400 + hour * 3600 + minute * 60 + second
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    CentralDirectory,
    Streaming { next_offset: u64, done: bool },
}

#[derive(Debug, Clone, Copy)]
struct Current {
    index: usize,
    skipped: bool,
}

/// ZIP reader over a seekable [`Stream`].
pub struct ZipReader<S> {
    stream: S,
    limits: Limits,
    mode: Mode,
    records: Vec<ZipRecord>,
    next_index: usize,
    current: Option<Current>,
    len: u64,
}

impl<S: Stream> ZipReader<S> {
    /// Opens a ZIP archive, parsing the central directory when one exists.
    pub fn new(mut stream: S, limits: Limits) -> Result<Self, ArchiveError> {
        let limits = limits.resolved();
        let len = stream_len(&mut stream)?;

        let (mode, records) = match find_eocd(&mut stream, len, &limits)? {
            Some(eocd) => {
                debug!(
                    entries = eocd.entries,
                    cd_offset = eocd.cd_offset,
                    "reading zip central directory"
                );
                let records = read_central_directory(&mut stream, &eocd, &limits)?;
                (Mode::CentralDirectory, records)
            }
            None => {
                debug!("no end of central directory record, reading zip in streaming mode");
                (
                    Mode::Streaming {
                        next_offset: 0,
                        done: false,
                    },
                    Vec::new(),
                )
            }
        };

        Ok(Self {
            stream,
            limits,
            mode,
            records,
            next_index: 0,
            current: None,
            len,
        })
    }

    /// Whether the archive is being read without a central directory.
    pub fn is_streaming(&self) -> bool {
        matches!(self.mode, Mode::Streaming { .. })
    }

    /// Unwraps the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Advances to the next entry. Returns `Ok(None)` after the last one.
    pub fn next_entry(&mut self) -> Result<Option<Entry>, ArchiveError> {
        self.current = None;

        if self.next_index >= self.records.len() && !self.read_local_entry()? {
            return Ok(None);
        }

        let index = self.next_index;
        self.next_index += 1;
        self.current = Some(Current {
            index,
            skipped: false,
        });

        let entry = self.records[index].to_entry();
        trace!(path = %entry.path, size = entry.size, "zip entry");
        Ok(Some(entry))
    }

    /// Returns a stream over the current entry's decompressed data.
    pub fn open_data(&mut self) -> Result<DataStream<'_>, ArchiveError> {
        let current = self
            .current
            .ok_or(ArchiveError::InvalidState("no current entry"))?;
        if current.skipped {
            return Err(ArchiveError::InvalidState("entry data was already skipped"));
        }

        let record = &self.records[current.index];
        if record.flags & FLAG_ENCRYPTED != 0 {
            return Err(ArchiveError::unsupported(format!(
                "encrypted zip entry: {}",
                record.name
            )));
        }
        let method = record.method;
        let compressed = record.compressed_size;
        let cached_start = record.data_start;
        let local_header_offset = record.local_header_offset;
        let limit = record.uncompressed_size.min(self.limits.max_uncompressed_bytes);

        if !matches!(method, METHOD_STORED | METHOD_DEFLATED) {
            return Err(ArchiveError::unsupported(format!(
                "zip compression method {}",
                method
            )));
        }
        if limit == 0 {
            return Ok(Box::new(MemoryStream::new(Vec::new())));
        }

        let data_start = match cached_start {
            Some(start) => start,
            None => {
                let start = self.local_data_start(local_header_offset)?;
                self.records[current.index].data_start = Some(start);
                start
            }
        };
        if data_start.saturating_add(compressed) > self.len {
            return Err(ArchiveError::corrupted("zip entry data extends past end of archive"));
        }

        if method == METHOD_STORED {
            Ok(Box::new(SubStream::new(
                &mut self.stream,
                data_start,
                compressed.min(limit),
            )))
        } else {
            let window = SubStream::new(&mut self.stream, data_start, compressed);
            Ok(Box::new(DeflateFilter::with_limit(window, limit)))
        }
    }

    /// Marks the current entry's data as consumed. ZIP has no cheap skip
    /// once headers are read, so nothing is read here.
    pub fn skip_data(&mut self) -> Result<(), ArchiveError> {
        let current = self
            .current
            .as_mut()
            .ok_or(ArchiveError::InvalidState("no current entry"))?;
        current.skipped = true;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8], what: &str) -> Result<(), ArchiveError> {
        self.stream.seek(SeekFrom::Start(offset))?;
        self.stream
            .read_exact(buf)
            .map_err(|e| ArchiveError::truncated(what, e))
    }

    /// Re-parses a local header and returns where its data begins.
    fn local_data_start(&mut self, offset: u64) -> Result<u64, ArchiveError> {
        let mut header = [0u8; LOCAL_HEADER_LEN];
        self.read_at(offset, &mut header, "zip local header")?;

        let mut fields = Fields::new(&header, "zip local header");
        if fields.u32()? != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(ArchiveError::corrupted("bad zip local header signature"));
        }
        fields.take(22)?;
        let name_len = u64::from(fields.u16()?);
        let extra_len = u64::from(fields.u16()?);

        Ok(offset + LOCAL_HEADER_LEN as u64 + name_len + extra_len)
    }

    /// Streaming mode: parses the next local header into `records`.
    /// Returns false when there are no more entries.
    fn read_local_entry(&mut self) -> Result<bool, ArchiveError> {
        let offset = match self.mode {
            Mode::Streaming {
                next_offset,
                done: false,
            } => next_offset,
            _ => return Ok(false),
        };

        match self.parse_local_entry(offset)? {
            Some((record, next_offset)) => {
                if self.records.len() as u64 >= self.limits.max_entries {
                    return Err(ArchiveError::LimitExceeded {
                        what: "entry count",
                        actual: self.records.len() as u64 + 1,
                        limit: self.limits.max_entries,
                    });
                }
                self.records.push(record);
                self.mode = Mode::Streaming {
                    next_offset,
                    done: false,
                };
                Ok(true)
            }
            None => {
                self.mode = Mode::Streaming {
                    next_offset: offset,
                    done: true,
                };
                Ok(false)
            }
        }
    }

    fn parse_local_entry(&mut self, offset: u64) -> Result<Option<(ZipRecord, u64)>, ArchiveError> {
        self.stream.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; LOCAL_HEADER_LEN];
        let n = read_full(&mut self.stream, &mut header)?;
        if n == 0 {
            return Ok(None);
        }
        if n >= 4 {
            let sig = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            match sig {
                LOCAL_FILE_HEADER_SIGNATURE => {}
                CENTRAL_DIRECTORY_SIGNATURE
                | EOCD_SIGNATURE
                | ZIP64_EOCD_SIGNATURE
                | ZIP64_LOCATOR_SIGNATURE => return Ok(None),
                _ => {
                    return Err(ArchiveError::corrupted(format!(
                        "unexpected zip signature {:#010x} at offset {}",
                        sig, offset
                    )))
                }
            }
        }
        if n < LOCAL_HEADER_LEN {
            warn!(offset, "truncated trailing zip local header, stopping");
            return Ok(None);
        }

        let mut fields = Fields::new(&header[4..], "zip local header");
        let _version_needed = fields.u16()?;
        let flags = fields.u16()?;
        let method = fields.u16()?;
        let dos_time = fields.u16()?;
        let dos_date = fields.u16()?;
        let _crc32 = fields.u32()?;
        let compressed = fields.u32()?;
        let uncompressed = fields.u32()?;
        let name_len = fields.u16()?;
        let extra_len = fields.u16()?;

        self.check_lengths(name_len, extra_len, 0)?;

        let mut variable = vec![0u8; usize::from(name_len) + usize::from(extra_len)];
        if read_full(&mut self.stream, &mut variable)? < variable.len() {
            warn!(offset, "truncated trailing zip local header, stopping");
            return Ok(None);
        }
        let (name, extra) = variable.split_at(usize::from(name_len));

        let mut record = ZipRecord {
            name: String::from_utf8_lossy(name).into_owned(),
            flags,
            method,
            dos_time,
            dos_date,
            compressed_size: u64::from(compressed),
            uncompressed_size: u64::from(uncompressed),
            local_header_offset: offset,
            ..ZipRecord::default()
        };
        let zip64 = record.apply_extra(
            extra,
            RawSizes {
                uncompressed,
                compressed,
                offset: None,
            },
        )?;

        let data_start = offset + LOCAL_HEADER_LEN as u64 + variable.len() as u64;
        record.data_start = Some(data_start);

        let next_offset = if flags & FLAG_DATA_DESCRIPTOR != 0 {
            self.resolve_descriptor(&mut record, data_start, zip64)?
        } else {
            data_start + record.compressed_size
        };

        Ok(Some((record, next_offset)))
    }

    /// Finds the end of an entry written with a trailing data descriptor,
    /// fills in its sizes and returns the offset after the descriptor.
    fn resolve_descriptor(
        &mut self,
        record: &mut ZipRecord,
        data_start: u64,
        zip64: bool,
    ) -> Result<u64, ArchiveError> {
        let size_len = if zip64 { 8 } else { 4 };

        let compressed = match record.method {
            METHOD_STORED => self.scan_stored_descriptor(data_start, size_len)?,
            METHOD_DEFLATED => {
                let window = SubStream::new(
                    &mut self.stream,
                    data_start,
                    self.len.saturating_sub(data_start),
                );
                let mut filter = DeflateFilter::with_limit(window, self.limits.max_uncompressed_bytes);
                io::copy(&mut filter, &mut io::sink())
                    .map_err(|e| ArchiveError::truncated("zip deflate data", e))?;
                if !filter.is_finished() {
                    if filter.limit_reached() {
                        return Err(ArchiveError::LimitExceeded {
                            what: "uncompressed size",
                            actual: filter.total_out(),
                            limit: self.limits.max_uncompressed_bytes,
                        });
                    }
                    return Err(ArchiveError::corrupted("truncated zip deflate data"));
                }
                filter.compressed_consumed()
            }
            other => {
                return Err(ArchiveError::unsupported(format!(
                    "zip compression method {} with data descriptor",
                    other
                )))
            }
        };

        // Optional signature, then crc32, compressed size, uncompressed size
        let end = data_start + compressed;
        let short_len = 4 + 2 * size_len;
        let mut descriptor = [0u8; 24];
        self.read_at(end, &mut descriptor[..short_len], "zip data descriptor")?;
        let has_signature = descriptor[..4] == DATA_DESCRIPTOR_SIGNATURE.to_le_bytes();
        let total = if has_signature {
            self.stream
                .read_exact(&mut descriptor[short_len..short_len + 4])
                .map_err(|e| ArchiveError::truncated("zip data descriptor", e))?;
            short_len + 4
        } else {
            short_len
        };
        let body = if has_signature {
            &descriptor[4..total]
        } else {
            &descriptor[..total]
        };
        let mut fields = Fields::new(body, "zip data descriptor");
        let _crc32 = fields.u32()?;
        let (recorded_compressed, recorded_uncompressed) = if zip64 {
            (fields.u64()?, fields.u64()?)
        } else {
            (u64::from(fields.u32()?), u64::from(fields.u32()?))
        };

        if recorded_compressed != compressed {
            return Err(ArchiveError::corrupted(format!(
                "zip data descriptor size {} does not match data length {}",
                recorded_compressed, compressed
            )));
        }

        record.compressed_size = compressed;
        record.uncompressed_size = recorded_uncompressed;
        Ok(end + total as u64)
    }

    /// Scans stored data for a descriptor signature whose recorded
    /// compressed size equals the distance from `data_start`.
    fn scan_stored_descriptor(&mut self, data_start: u64, size_len: usize) -> Result<u64, ArchiveError> {
        let signature = DATA_DESCRIPTOR_SIGNATURE.to_le_bytes();
        let need = 8 + size_len;
        let mut window: Vec<u8> = Vec::with_capacity(INPUT_CHUNK + need);
        let mut window_start = data_start;
        let mut chunk = vec![0u8; INPUT_CHUNK];

        self.stream.seek(SeekFrom::Start(data_start))?;
        loop {
            let n = read_full(&mut self.stream, &mut chunk)?;
            window.extend_from_slice(&chunk[..n]);

            let mut i = 0;
            while i + need <= window.len() {
                if window[i..i + 4] == signature {
                    let size_bytes = &window[i + 8..i + 8 + size_len];
                    let recorded = size_bytes
                        .iter()
                        .rev()
                        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
                    let distance = window_start + i as u64 - data_start;
                    if recorded == distance {
                        return Ok(distance);
                    }
                }
                i += 1;
            }

            if n == 0 {
                return Err(ArchiveError::corrupted("zip data descriptor not found"));
            }

            let keep = window.len().min(need - 1);
            let drop = window.len() - keep;
            window.drain(..drop);
            window_start += drop as u64;

            if window_start - data_start > self.limits.max_uncompressed_bytes {
                return Err(ArchiveError::LimitExceeded {
                    what: "uncompressed size",
                    actual: window_start - data_start,
                    limit: self.limits.max_uncompressed_bytes,
                });
            }
        }
    }

    fn check_lengths(&self, name_len: u16, extra_len: u16, comment_len: u16) -> Result<(), ArchiveError> {
        check_lengths(&self.limits, name_len, extra_len, comment_len)
    }
}

fn check_lengths(limits: &Limits, name_len: u16, extra_len: u16, comment_len: u16) -> Result<(), ArchiveError> {
    if u64::from(name_len) > limits.max_name {
        return Err(ArchiveError::LimitExceeded {
            what: "entry name length",
            actual: name_len.into(),
            limit: limits.max_name,
        });
    }
    for (what, len) in [("zip extra field length", extra_len), ("zip comment length", comment_len)] {
        if u64::from(len) > limits.max_extra {
            return Err(ArchiveError::LimitExceeded {
                what,
                actual: len.into(),
                limit: limits.max_extra,
            });
        }
    }
    Ok(())
}

/// Scans backward for the EOCD record and resolves ZIP64 values.
fn find_eocd<S: Stream>(stream: &mut S, len: u64, limits: &Limits) -> Result<Option<Eocd>, ArchiveError> {
    if len < EOCD_LEN {
        return Ok(None);
    }

    let tail_len = len.min(EOCD_LEN + MAX_COMMENT_LEN);
    let tail_start = len - tail_len;
    let mut tail = vec![0u8; tail_len as usize];
    stream.seek(SeekFrom::Start(tail_start))?;
    stream
        .read_exact(&mut tail)
        .map_err(|e| ArchiveError::truncated("zip trailer", e))?;

    let signature = EOCD_SIGNATURE.to_le_bytes();
    let last = tail.len() - EOCD_LEN as usize;
    let found = (0..=last).rev().find(|&i| {
        if tail[i..i + 4] != signature {
            return false;
        }
        let comment_len = u16::from_le_bytes([tail[i + 20], tail[i + 21]]) as usize;
        i + EOCD_LEN as usize + comment_len <= tail.len()
    });
    let Some(pos) = found else {
        return Ok(None);
    };

    let mut fields = Fields::new(&tail[pos + 4..], "end of central directory");
    let _disk = fields.u16()?;
    let _cd_disk = fields.u16()?;
    let _entries_on_disk = fields.u16()?;
    let entries = fields.u16()?;
    let cd_size = fields.u32()?;
    let cd_offset = fields.u32()?;
    let comment_len = fields.u16()?;

    if u64::from(comment_len) > limits.max_extra {
        return Err(ArchiveError::LimitExceeded {
            what: "zip comment length",
            actual: comment_len.into(),
            limit: limits.max_extra,
        });
    }

    let position = tail_start + pos as u64;
    let eocd = Eocd {
        entries: entries.into(),
        cd_size: cd_size.into(),
        cd_offset: cd_offset.into(),
        position,
    };

    if entries == SENTINEL_16 || cd_size == SENTINEL_32 || cd_offset == SENTINEL_32 {
        if let Some(zip64) = read_zip64_eocd(stream, position)? {
            return Ok(Some(zip64));
        }
    }

    Ok(Some(eocd))
}

/// Follows the ZIP64 locator that sits right before the EOCD record.
fn read_zip64_eocd<S: Stream>(stream: &mut S, eocd_position: u64) -> Result<Option<Eocd>, ArchiveError> {
    if eocd_position < ZIP64_LOCATOR_LEN {
        return Ok(None);
    }

    let mut locator = [0u8; ZIP64_LOCATOR_LEN as usize];
    stream.seek(SeekFrom::Start(eocd_position - ZIP64_LOCATOR_LEN))?;
    stream
        .read_exact(&mut locator)
        .map_err(|e| ArchiveError::truncated("zip64 locator", e))?;

    let mut fields = Fields::new(&locator, "zip64 locator");
    if fields.u32()? != ZIP64_LOCATOR_SIGNATURE {
        return Ok(None);
    }
    let _disk = fields.u32()?;
    let eocd64_offset = fields.u64()?;

    if eocd64_offset >= eocd_position {
        return Err(ArchiveError::corrupted("zip64 end of central directory out of bounds"));
    }

    let mut record = [0u8; ZIP64_EOCD_LEN];
    stream.seek(SeekFrom::Start(eocd64_offset))?;
    stream
        .read_exact(&mut record)
        .map_err(|e| ArchiveError::truncated("zip64 end of central directory", e))?;

    let mut fields = Fields::new(&record, "zip64 end of central directory");
    if fields.u32()? != ZIP64_EOCD_SIGNATURE {
        return Err(ArchiveError::corrupted("bad zip64 end of central directory signature"));
    }
    let _record_size = fields.u64()?;
    let _version_made_by = fields.u16()?;
    let _version_needed = fields.u16()?;
    let _disk = fields.u32()?;
    let _cd_disk = fields.u32()?;
    let _entries_on_disk = fields.u64()?;
    let entries = fields.u64()?;
    let cd_size = fields.u64()?;
    let cd_offset = fields.u64()?;

    debug!(entries, cd_offset, "zip64 end of central directory");
    Ok(Some(Eocd {
        entries,
        cd_size,
        cd_offset,
        position: eocd64_offset,
    }))
}

/// Reads and parses every central directory record.
fn read_central_directory<S: Stream>(
    stream: &mut S,
    eocd: &Eocd,
    limits: &Limits,
) -> Result<Vec<ZipRecord>, ArchiveError> {
    if eocd.entries > limits.max_entries {
        return Err(ArchiveError::LimitExceeded {
            what: "entry count",
            actual: eocd.entries,
            limit: limits.max_entries,
        });
    }
    if eocd.cd_offset.saturating_add(eocd.cd_size) > eocd.position {
        return Err(ArchiveError::corrupted("zip central directory out of bounds"));
    }
    if eocd.entries.saturating_mul(CENTRAL_HEADER_LEN as u64) > eocd.cd_size {
        return Err(ArchiveError::corrupted(
            "zip central directory too small for its entry count",
        ));
    }

    let mut directory = vec![0u8; eocd.cd_size as usize];
    stream.seek(SeekFrom::Start(eocd.cd_offset))?;
    stream
        .read_exact(&mut directory)
        .map_err(|e| ArchiveError::truncated("zip central directory", e))?;

    let mut fields = Fields::new(&directory, "zip central directory");
    let mut records = Vec::with_capacity(eocd.entries as usize);

    for _ in 0..eocd.entries {
        if fields.u32()? != CENTRAL_DIRECTORY_SIGNATURE {
            return Err(ArchiveError::corrupted("bad zip central directory signature"));
        }
        let version_made_by = fields.u16()?;
        let _version_needed = fields.u16()?;
        let flags = fields.u16()?;
        let method = fields.u16()?;
        let dos_time = fields.u16()?;
        let dos_date = fields.u16()?;
        let _crc32 = fields.u32()?;
        let compressed = fields.u32()?;
        let uncompressed = fields.u32()?;
        let name_len = fields.u16()?;
        let extra_len = fields.u16()?;
        let comment_len = fields.u16()?;
        let _disk_start = fields.u16()?;
        let _internal_attrs = fields.u16()?;
        let external_attrs = fields.u32()?;
        let offset = fields.u32()?;

        check_lengths(limits, name_len, extra_len, comment_len)?;

        let name = fields.take(name_len.into())?;
        let extra = fields.take(extra_len.into())?;
        fields.take(comment_len.into())?;

        let mut record = ZipRecord {
            name: String::from_utf8_lossy(name).into_owned(),
            version_made_by,
            flags,
            method,
            dos_time,
            dos_date,
            compressed_size: compressed.into(),
            uncompressed_size: uncompressed.into(),
            local_header_offset: offset.into(),
            external_attrs,
            ..ZipRecord::default()
        };
        record.apply_extra(
            extra,
            RawSizes {
                uncompressed,
                compressed,
                offset: Some(offset),
            },
        )?;

        if record.local_header_offset >= eocd.position {
            return Err(ArchiveError::corrupted(format!(
                "zip local header offset out of bounds for {}",
                record.name
            )));
        }
        records.push(record);
    }

    Ok(records)
}
