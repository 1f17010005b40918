//! TAR reader: ustar, pax and GNU extensions.
//!
//! # Invariants
//! - Headers are 512-byte blocks; entry data is padded to the next block.
//! - Every header's checksum is verified. A mismatch is a hard error; an
//!   all-zero block or a clean end of input ends the archive.
//! - After `next_entry` returns, the stream sits at the first data byte of
//!   that entry. The reader only ever moves forward, so it works the same
//!   over files and over non-seekable decompression filters.
//!
//! # Algorithm
//! 1. Finish the previous entry: seek (or read-and-discard) to
//!    `data_offset + padded(stored_size)`.
//! 2. Read headers, folding metadata records into the next real entry:
//!    pax local (`x`), pax global (`g`), GNU long name (`L`) and long link
//!    (`K`). Old GNU sparse (`S`) extension blocks are consumed here too.
//! 3. Build the [`Entry`], resolving the path as local pax `path` > GNU long
//!    name > `GNU.sparse.name` > header name (with ustar prefix).
//!
//! # Design Notes
//! - Global pax records carry ownership, mode and time defaults only. A
//!   global `path` would name every following entry the same and is ignored.
//! - Metadata payloads are capped at 1 MiB and long names at `max_name`
//!   bytes before anything is allocated.

use crate::error::ArchiveError;
use crate::safety::normalize_entry_path;
use crate::stream::{advance_to, read_full, DataStream, Stream, SubStream};
use crate::types::{Entry, EntryType, Limits};
use std::ops::Range;
use tracing::trace;

/// TAR block length.
pub const BLOCK_SIZE: usize = 512;

const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CHKSUM: Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const LINKNAME: Range<usize> = 157..257;
const MAGIC: Range<usize> = 257..263;
const PREFIX: Range<usize> = 345..500;

// Old GNU sparse header layout
const GNU_ISEXTENDED: usize = 482;
const GNU_REALSIZE: Range<usize> = 483..495;
const GNU_EXT_ISEXTENDED: usize = 504;

const POSIX_MAGIC: &[u8] = b"ustar\0";

/// Largest pax or GNU long-name payload accepted.
const MAX_META_SIZE: u64 = 1024 * 1024;

/// Largest number of old GNU sparse extension blocks accepted.
const MAX_SPARSE_BLOCKS: u32 = 4096;

/// Rounds a data length up to the block size.
fn padded(len: u64) -> u64 {
    len.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64
}

/// Whether a block consists only of zero bytes.
pub(crate) fn is_zero_block(block: &[u8]) -> bool {
    block.iter().all(|&b| b == 0)
}

/// Whether a header carries `ustar` magic (POSIX or GNU flavour).
pub(crate) fn has_ustar_magic(block: &[u8]) -> bool {
    block.len() >= MAGIC.end && &block[MAGIC.start..MAGIC.start + 5] == b"ustar"
}

/// Unsigned header sum with the checksum field counted as spaces.
pub(crate) fn header_checksum(block: &[u8]) -> u64 {
    block[..BLOCK_SIZE]
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if CHKSUM.contains(&i) {
                u64::from(b' ')
            } else {
                u64::from(b)
            }
        })
        .sum()
}

/// Whether the stored checksum matches the header contents.
pub(crate) fn checksum_matches(block: &[u8]) -> bool {
    if block.len() < BLOCK_SIZE {
        return false;
    }
    match parse_octal(&block[CHKSUM]) {
        Some(stored) => stored == header_checksum(block),
        None => false,
    }
}

/// Parses an octal field: leading spaces and NULs are skipped, digits end
/// at the first non-octal byte. An empty field is zero.
pub(crate) fn parse_octal(field: &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    let digits = field
        .iter()
        .skip_while(|&&b| b == b' ' || b == 0)
        .take_while(|&&b| (b'0'..=b'7').contains(&b));
    for &digit in digits {
        value = value.checked_mul(8)?.checked_add(u64::from(digit - b'0'))?;
    }
    Some(value)
}

/// Parses a GNU base-256 field: the high bit of the first byte marks the
/// encoding, the rest is a big-endian two's complement number.
pub(crate) fn parse_base256(field: &[u8]) -> Option<i64> {
    let (&first, rest) = field.split_first()?;
    let bits = field.len() * 8 - 1;
    if bits > 127 {
        return None;
    }
    let mut value: u128 = u128::from(first & 0x7F);
    for &b in rest {
        value = (value << 8) | u128::from(b);
    }
    let negative = first & 0x40 != 0;
    let signed = if negative {
        value as i128 - (1i128 << bits)
    } else {
        value as i128
    };
    i64::try_from(signed).ok()
}

/// Parses any numeric header field.
fn parse_numeric(field: &[u8], what: &str) -> Result<i64, ArchiveError> {
    let value = if field.first().is_some_and(|&b| b & 0x80 != 0) {
        parse_base256(field)
    } else {
        parse_octal(field).and_then(|v| i64::try_from(v).ok())
    };
    value.ok_or_else(|| ArchiveError::corrupted(format!("invalid tar {} field", what)))
}

fn parse_unsigned(field: &[u8], what: &str) -> Result<u64, ArchiveError> {
    let value = parse_numeric(field, what)?;
    u64::try_from(value).map_err(|_| ArchiveError::corrupted(format!("negative tar {} field", what)))
}

/// Bytes of a NUL-terminated header string field.
fn field_str(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// One 512-byte header block.
struct Header {
    block: [u8; BLOCK_SIZE],
}

impl Header {
    fn typeflag(&self) -> u8 {
        self.block[TYPEFLAG]
    }

    fn is_posix(&self) -> bool {
        &self.block[MAGIC] == POSIX_MAGIC
    }

    /// Header name joined with the ustar prefix (POSIX headers only; GNU
    /// headers reuse that area for other fields).
    fn path(&self) -> String {
        let name = field_str(&self.block[NAME]);
        if self.is_posix() {
            let prefix = field_str(&self.block[PREFIX]);
            if !prefix.is_empty() {
                let mut joined = prefix.to_vec();
                joined.push(b'/');
                joined.extend_from_slice(name);
                return lossy(&joined);
            }
        }
        lossy(name)
    }

    fn link_name(&self) -> String {
        lossy(field_str(&self.block[LINKNAME]))
    }

    fn size(&self) -> Result<u64, ArchiveError> {
        parse_unsigned(&self.block[SIZE], "size")
    }

    fn mode(&self) -> Result<u32, ArchiveError> {
        Ok((parse_unsigned(&self.block[MODE], "mode")? & 0o7777) as u32)
    }

    fn uid(&self) -> Result<u32, ArchiveError> {
        Ok(parse_unsigned(&self.block[UID], "uid")? as u32)
    }

    fn gid(&self) -> Result<u32, ArchiveError> {
        Ok(parse_unsigned(&self.block[GID], "gid")? as u32)
    }

    fn mtime(&self) -> Result<i64, ArchiveError> {
        parse_numeric(&self.block[MTIME], "mtime")
    }

    fn gnu_sparse_realsize(&self) -> Result<u64, ArchiveError> {
        parse_unsigned(&self.block[GNU_REALSIZE], "sparse realsize")
    }

    fn gnu_is_extended(&self) -> bool {
        matches!(self.block[GNU_ISEXTENDED], 1 | b'1')
    }
}

/// Overrides collected from pax extended header records.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct PaxRecords {
    pub path: Option<String>,
    pub linkpath: Option<String>,
    pub size: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mtime: Option<i64>,
    pub mode: Option<u32>,
    pub sparse_name: Option<String>,
    pub sparse_realsize: Option<u64>,
}

impl PaxRecords {
    /// Parses a `<len> <key>=<value>\n` record block.
    pub(crate) fn parse(data: &[u8]) -> Result<Self, ArchiveError> {
        let mut records = PaxRecords::default();
        let mut rest = data;

        while !rest.is_empty() && rest[0] != 0 {
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| ArchiveError::corrupted("pax record without length"))?;
            let len: usize = std::str::from_utf8(&rest[..space])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| ArchiveError::corrupted("invalid pax record length"))?;
            if len <= space + 1 || len > rest.len() || rest[len - 1] != b'\n' {
                return Err(ArchiveError::corrupted("malformed pax record"));
            }

            let record = &rest[space + 1..len - 1];
            let eq = record
                .iter()
                .position(|&b| b == b'=')
                .ok_or_else(|| ArchiveError::corrupted("pax record without '='"))?;
            let key = &record[..eq];
            let value = lossy(&record[eq + 1..]);
            records.apply(key, value);

            rest = &rest[len..];
        }

        Ok(records)
    }

    fn apply(&mut self, key: &[u8], value: String) {
        match key {
            b"path" => self.path = Some(value),
            b"linkpath" => self.linkpath = Some(value),
            b"size" => self.size = value.parse().ok().or(self.size),
            b"uid" => self.uid = value.parse().ok().or(self.uid),
            b"gid" => self.gid = value.parse().ok().or(self.gid),
            b"mtime" => {
                let whole = value.split('.').next().unwrap_or("");
                self.mtime = whole.parse().ok().or(self.mtime);
            }
            b"mode" => {
                self.mode = u32::from_str_radix(value.trim(), 8)
                    .ok()
                    .map(|m| m & 0o7777)
                    .or(self.mode);
            }
            b"GNU.sparse.name" => self.sparse_name = Some(value),
            b"GNU.sparse.realsize" | b"GNU.sparse.size" => {
                self.sparse_realsize = value.parse().ok().or(self.sparse_realsize);
            }
            _ => {}
        }
    }

    /// Merges global defaults; only ownership, mode and time carry over.
    fn merge_global(&mut self, other: PaxRecords) {
        self.uid = other.uid.or(self.uid);
        self.gid = other.gid.or(self.gid);
        self.mtime = other.mtime.or(self.mtime);
        self.mode = other.mode.or(self.mode);
    }

    fn merge_local(&mut self, other: PaxRecords) {
        self.path = other.path.or(self.path.take());
        self.linkpath = other.linkpath.or(self.linkpath.take());
        self.size = other.size.or(self.size);
        self.uid = other.uid.or(self.uid);
        self.gid = other.gid.or(self.gid);
        self.mtime = other.mtime.or(self.mtime);
        self.mode = other.mode.or(self.mode);
        self.sparse_name = other.sparse_name.or(self.sparse_name.take());
        self.sparse_realsize = other.sparse_realsize.or(self.sparse_realsize);
    }
}

/// GNU long name payloads end at the first NUL or newline.
fn long_text(data: &[u8]) -> String {
    let end = data
        .iter()
        .position(|&b| b == 0 || b == b'\n')
        .unwrap_or(data.len());
    lossy(&data[..end])
}

#[derive(Debug, Clone, Copy)]
struct Current {
    data_offset: u64,
    stored_size: u64,
    skipped: bool,
}

impl Current {
    fn data_end(&self) -> u64 {
        self.data_offset + padded(self.stored_size)
    }
}

/// Sequential TAR reader over any [`Stream`].
pub struct TarReader<S> {
    stream: S,
    limits: Limits,
    global: PaxRecords,
    current: Option<Current>,
    entries: u64,
    eof: bool,
}

impl<S: Stream> TarReader<S> {
    /// Creates a reader positioned at the first header. No I/O happens
    /// until the first [`next_entry`](Self::next_entry).
    pub fn new(stream: S, limits: Limits) -> Self {
        Self {
            stream,
            limits: limits.resolved(),
            global: PaxRecords::default(),
            current: None,
            entries: 0,
            eof: false,
        }
    }

    /// Unwraps the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Advances to the next entry. Returns `Ok(None)` at the end of the archive.
    pub fn next_entry(&mut self) -> Result<Option<Entry>, ArchiveError> {
        if self.eof {
            return Ok(None);
        }
        if let Some(current) = self.current.take() {
            if !current.skipped {
                self.seek_forward(current.data_end())?;
            }
        }

        let mut local = PaxRecords::default();
        let mut long_name: Option<String> = None;
        let mut long_link: Option<String> = None;

        loop {
            let header = match self.read_header()? {
                Some(header) => header,
                None => {
                    self.eof = true;
                    return Ok(None);
                }
            };

            let typeflag = header.typeflag();
            if matches!(typeflag, b'x' | b'g' | b'L' | b'K') {
                let size = header.size()?;
                let data = self.read_meta(size, typeflag)?;
                match typeflag {
                    b'x' => local.merge_local(PaxRecords::parse(&data)?),
                    b'g' => self.global.merge_global(PaxRecords::parse(&data)?),
                    b'L' => long_name = Some(long_text(&data)),
                    _ => long_link = Some(long_text(&data)),
                }
                continue;
            }

            self.entries += 1;
            if self.entries > self.limits.max_entries {
                return Err(ArchiveError::LimitExceeded {
                    what: "entry count",
                    actual: self.entries,
                    limit: self.limits.max_entries,
                });
            }

            if typeflag == b'S' && header.gnu_is_extended() {
                self.skip_sparse_extensions()?;
            }

            let entry = self.build_entry(&header, local, long_name, long_link)?;
            trace!(path = %entry.path, size = entry.size, "tar entry");
            return Ok(Some(entry));
        }
    }

    /// Returns a stream over the current entry's stored data.
    ///
    /// Reading continues where the previous handle for this entry stopped.
    pub fn open_data(&mut self) -> Result<DataStream<'_>, ArchiveError> {
        let current = self
            .current
            .ok_or(ArchiveError::InvalidState("no current entry"))?;
        if current.skipped {
            return Err(ArchiveError::InvalidState("entry data was already skipped"));
        }
        let pos = self.stream.tell()?.saturating_sub(current.data_offset);
        Ok(Box::new(SubStream::resume(
            &mut self.stream,
            current.data_offset,
            current.stored_size,
            pos,
        )))
    }

    /// Skips the current entry's data, seeking when possible.
    pub fn skip_data(&mut self) -> Result<(), ArchiveError> {
        let current = self
            .current
            .ok_or(ArchiveError::InvalidState("no current entry"))?;
        if !current.skipped {
            self.seek_forward(current.data_end())?;
            self.current = Some(Current {
                skipped: true,
                ..current
            });
        }
        Ok(())
    }

    fn seek_forward(&mut self, target: u64) -> Result<(), ArchiveError> {
        advance_to(&mut self.stream, target).map_err(|e| ArchiveError::truncated("tar entry data", e))
    }

    fn read_header(&mut self) -> Result<Option<Header>, ArchiveError> {
        let mut block = [0u8; BLOCK_SIZE];
        let n = read_full(&mut self.stream, &mut block)?;
        if n == 0 || (n == BLOCK_SIZE && is_zero_block(&block)) {
            return Ok(None);
        }
        if n < BLOCK_SIZE {
            return Err(ArchiveError::corrupted("truncated tar header"));
        }
        if !checksum_matches(&block) {
            return Err(ArchiveError::corrupted("tar header checksum mismatch"));
        }
        Ok(Some(Header { block }))
    }

    fn read_meta(&mut self, size: u64, typeflag: u8) -> Result<Vec<u8>, ArchiveError> {
        if size > MAX_META_SIZE {
            return Err(ArchiveError::LimitExceeded {
                what: "tar metadata record size",
                actual: size,
                limit: MAX_META_SIZE,
            });
        }
        if matches!(typeflag, b'L' | b'K') && size > self.limits.max_name + 1 {
            return Err(ArchiveError::LimitExceeded {
                what: "entry name length",
                actual: size,
                limit: self.limits.max_name,
            });
        }

        let start = self.stream.tell()?;
        let mut data = vec![0u8; size as usize];
        self.stream
            .read_exact(&mut data)
            .map_err(|e| ArchiveError::truncated("tar metadata record", e))?;
        self.seek_forward(start + padded(size))?;
        Ok(data)
    }

    fn skip_sparse_extensions(&mut self) -> Result<(), ArchiveError> {
        let mut block = [0u8; BLOCK_SIZE];
        for _ in 0..MAX_SPARSE_BLOCKS {
            self.stream
                .read_exact(&mut block)
                .map_err(|e| ArchiveError::truncated("sparse header", e))?;
            if !matches!(block[GNU_EXT_ISEXTENDED], 1 | b'1') {
                return Ok(());
            }
        }
        Err(ArchiveError::corrupted("too many sparse extension headers"))
    }

    fn build_entry(
        &mut self,
        header: &Header,
        local: PaxRecords,
        long_name: Option<String>,
        long_link: Option<String>,
    ) -> Result<Entry, ArchiveError> {
        let typeflag = header.typeflag();
        let raw_path = local
            .path
            .or(long_name)
            .or(local.sparse_name)
            .unwrap_or_else(|| header.path());

        if raw_path.len() as u64 > self.limits.max_name {
            return Err(ArchiveError::LimitExceeded {
                what: "entry name length",
                actual: raw_path.len() as u64,
                limit: self.limits.max_name,
            });
        }

        let entry_type = match typeflag {
            b'5' => EntryType::Directory,
            b'0' | 0 | b'7' if raw_path.ends_with('/') => EntryType::Directory,
            b'0' | 0 | b'7' | b'S' => EntryType::File,
            b'2' => EntryType::Symlink,
            b'1' => EntryType::Hardlink,
            _ => EntryType::Other,
        };

        let stored_size = match local.size {
            Some(size) => size,
            None => header.size()?,
        };

        let size = match entry_type {
            EntryType::File if typeflag == b'S' => match local.sparse_realsize {
                Some(real) => real,
                None => header.gnu_sparse_realsize()?,
            },
            EntryType::File => local.sparse_realsize.unwrap_or(stored_size),
            _ => 0,
        };

        let link_target = match entry_type {
            EntryType::Symlink | EntryType::Hardlink => {
                let target = local
                    .linkpath
                    .or(long_link)
                    .unwrap_or_else(|| header.link_name());
                Some(target)
            }
            _ => None,
        };

        let mode = match local.mode.or(self.global.mode) {
            Some(mode) => mode,
            None => header.mode()?,
        };
        let uid = match local.uid.or(self.global.uid) {
            Some(uid) => uid,
            None => header.uid()?,
        };
        let gid = match local.gid.or(self.global.gid) {
            Some(gid) => gid,
            None => header.gid()?,
        };
        let mtime = match local.mtime.or(self.global.mtime) {
            Some(mtime) => mtime,
            None => header.mtime()?,
        };

        let data_offset = self.stream.tell()?;
        self.current = Some(Current {
            data_offset,
            stored_size,
            skipped: false,
        });

        Ok(Entry {
            path: normalize_entry_path(&raw_path),
            size,
            mode,
            mtime,
            entry_type,
            link_target,
            uid,
            gid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;
    use std::io::Read;

    fn header_block(name: &str, typeflag: u8, size: u64) -> [u8; BLOCK_SIZE] {
        let mut block = [0u8; BLOCK_SIZE];
        block[..name.len()].copy_from_slice(name.as_bytes());
        block[MODE.start..MODE.start + 7].copy_from_slice(b"0000644");
        block[UID.start..UID.start + 7].copy_from_slice(b"0001750");
        block[GID.start..GID.start + 7].copy_from_slice(b"0001750");
        let size = format!("{:011o}", size);
        block[SIZE.start..SIZE.start + 11].copy_from_slice(size.as_bytes());
        block[MTIME.start..MTIME.start + 11].copy_from_slice(b"14000000000");
        block[TYPEFLAG] = typeflag;
        block[MAGIC].copy_from_slice(POSIX_MAGIC);
        block[263..265].copy_from_slice(b"00");
        let sum = format!("{:06o}\0 ", header_checksum(&block));
        block[CHKSUM].copy_from_slice(sum.as_bytes());
        block
    }

    fn archive(parts: &[(&[u8; BLOCK_SIZE], &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (header, data) in parts {
            out.extend_from_slice(&header[..]);
            out.extend_from_slice(data);
            out.resize(padded(out.len() as u64) as usize, 0);
        }
        out.extend_from_slice(&[0u8; 1024]);
        out
    }

    fn reader(data: Vec<u8>) -> TarReader<MemoryStream<Vec<u8>>> {
        TarReader::new(MemoryStream::new(data), Limits::default())
    }

    #[test]
    fn test_parse_octal() {
        assert_eq!(parse_octal(b"0000644\0"), Some(0o644));
        assert_eq!(parse_octal(b"  755 \0"), Some(0o755));
        assert_eq!(parse_octal(b"\0\0\0\0"), Some(0));
        // Stops at the first non-octal byte
        assert_eq!(parse_octal(b"1238"), Some(0o123));
        assert_eq!(parse_octal(b"77777777777777777777777777"), None);
    }

    #[test]
    fn test_parse_base256() {
        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[11] = 0x01;
        field[10] = 0x02;
        assert_eq!(parse_base256(&field), Some(0x0201));

        // -1 in two's complement
        let negative = [0xFFu8; 12];
        assert_eq!(parse_base256(&negative), Some(-1));
        assert_eq!(parse_numeric(&negative, "mtime").unwrap(), -1);
        assert!(parse_unsigned(&negative, "size").is_err());
    }

    #[test]
    fn test_checksum_roundtrip() {
        let block = header_block("file.txt", b'0', 3);
        assert!(checksum_matches(&block));

        let mut corrupted = block;
        corrupted[10] ^= 0x01;
        assert!(!checksum_matches(&corrupted));
    }

    #[test]
    fn test_pax_record_parsing() {
        let data = b"28 path=some/very/long/name\n11 size=42\n19 mtime=1700.5000\n12 mode=755\n";
        let records = PaxRecords::parse(data).unwrap();
        assert_eq!(records.path.as_deref(), Some("some/very/long/name"));
        assert_eq!(records.size, Some(42));
        assert_eq!(records.mtime, Some(1700));
        assert_eq!(records.mode, Some(0o755));

        assert!(PaxRecords::parse(b"99 path=short\n").is_err());
        assert!(PaxRecords::parse(b"nonsense").is_err());
    }

    #[test]
    fn test_read_entries_and_data() {
        let a = header_block("a.txt", b'0', 5);
        let d = header_block("dir/", b'5', 0);
        let data = archive(&[(&a, b"hello"), (&d, b"")]);

        let mut reader = reader(data);
        let first = reader.next_entry().unwrap().unwrap();
        assert_eq!(first.path, "a.txt");
        assert_eq!(first.size, 5);
        assert_eq!(first.mode, 0o644);
        assert_eq!(first.uid, 1000);
        assert_eq!(first.mtime, 0o14000000000);

        let mut content = String::new();
        reader.open_data().unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello");

        let second = reader.next_entry().unwrap().unwrap();
        assert_eq!(second.path, "dir");
        assert_eq!(second.entry_type, EntryType::Directory);

        assert!(reader.next_entry().unwrap().is_none());
        // Stays at the end
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_checksum_mismatch_fails() {
        let mut a = header_block("a.txt", b'0', 5);
        a[MTIME.start] = b'7';
        let data = archive(&[(&a, b"hello")]);

        let err = reader(data).next_entry().unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupted(_)));
    }

    #[test]
    fn test_pax_local_and_global_overrides() {
        let global_payload = b"14 uid=424242\n";
        let g = header_block("pax_global", b'g', global_payload.len() as u64);
        let local_payload = b"25 path=renamed/file.txt\n";
        let x = header_block("PaxHeaders/f", b'x', local_payload.len() as u64);
        let f = header_block("f", b'0', 2);
        let h = header_block("other", b'0', 0);
        let data = archive(&[
            (&g, &global_payload[..]),
            (&x, &local_payload[..]),
            (&f, b"hi"),
            (&h, b""),
        ]);

        let mut reader = reader(data);
        let first = reader.next_entry().unwrap().unwrap();
        assert_eq!(first.path, "renamed/file.txt");
        assert_eq!(first.uid, 424242);

        // Local records apply to one entry; global ones persist
        let second = reader.next_entry().unwrap().unwrap();
        assert_eq!(second.path, "other");
        assert_eq!(second.uid, 424242);
    }

    #[test]
    fn test_gnu_long_name_and_link() {
        let long_name = format!("{}/file.txt", "d".repeat(150));
        let mut payload = long_name.clone().into_bytes();
        payload.push(0);
        let l = header_block("././@LongLink", b'L', payload.len() as u64);
        let target = "t".repeat(120);
        let mut link_payload = target.clone().into_bytes();
        link_payload.push(0);
        let k = header_block("././@LongLink", b'K', link_payload.len() as u64);
        let s = header_block("short", b'2', 0);
        let data = archive(&[(&l, &payload[..]), (&k, &link_payload[..]), (&s, b"")]);

        let entry = reader(data).next_entry().unwrap().unwrap();
        assert_eq!(entry.path, long_name);
        assert_eq!(entry.entry_type, EntryType::Symlink);
        assert_eq!(entry.link_target.as_deref(), Some(target.as_str()));
    }

    #[test]
    fn test_long_name_over_limit_is_rejected() {
        let payload = vec![b'n'; 300];
        let l = header_block("././@LongLink", b'L', payload.len() as u64);
        let f = header_block("f", b'0', 0);
        let data = archive(&[(&l, &payload[..]), (&f, b"")]);

        let limits = Limits {
            max_name: 100,
            ..Limits::unset()
        };
        let mut reader = TarReader::new(MemoryStream::new(data), limits);
        assert!(matches!(
            reader.next_entry().unwrap_err(),
            ArchiveError::LimitExceeded { .. }
        ));
    }

    #[test]
    fn test_hardlink_has_zero_size() {
        let mut h = header_block("link", b'1', 0);
        h[LINKNAME.start..LINKNAME.start + 6].copy_from_slice(b"target");
        let sum = format!("{:06o}\0 ", header_checksum(&h));
        h[CHKSUM].copy_from_slice(sum.as_bytes());
        let data = archive(&[(&h, b"")]);

        let entry = reader(data).next_entry().unwrap().unwrap();
        assert_eq!(entry.entry_type, EntryType::Hardlink);
        assert_eq!(entry.size, 0);
        assert_eq!(entry.link_target.as_deref(), Some("target"));
    }

    #[test]
    fn test_skip_then_open_is_invalid() {
        let a = header_block("a.txt", b'0', 5);
        let b = header_block("b.txt", b'0', 3);
        let data = archive(&[(&a, b"hello"), (&b, b"abc")]);

        let mut reader = reader(data);
        assert!(matches!(
            reader.open_data().err(),
            Some(ArchiveError::InvalidState(_))
        ));

        reader.next_entry().unwrap().unwrap();
        reader.skip_data().unwrap();
        assert!(reader.open_data().is_err());

        let next = reader.next_entry().unwrap().unwrap();
        assert_eq!(next.path, "b.txt");
        let mut content = Vec::new();
        reader.open_data().unwrap().read_to_end(&mut content).unwrap();
        assert_eq!(content, b"abc");
    }

    #[test]
    fn test_max_entries() {
        let a = header_block("a", b'0', 0);
        let b = header_block("b", b'0', 0);
        let data = archive(&[(&a, b""), (&b, b"")]);
        let limits = Limits {
            max_entries: 1,
            ..Limits::unset()
        };

        let mut reader = TarReader::new(MemoryStream::new(data), limits);
        assert!(reader.next_entry().unwrap().is_some());
        assert!(matches!(
            reader.next_entry().unwrap_err(),
            ArchiveError::LimitExceeded { what: "entry count", .. }
        ));
    }

    #[test]
    fn test_truncated_header() {
        let a = header_block("a", b'0', 0);
        let err = reader(a[..300].to_vec()).next_entry().unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupted(_)));
    }
}
