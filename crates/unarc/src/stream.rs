//! Seekable byte sources with a hard cumulative output budget.
//!
//! Every reader in this crate pulls bytes through the [`Stream`] trait. A
//! stream is a [`Read`] that can also report its position and, depending
//! on its backing, seek. Backings provided here:
//!
//! - [`FileStream`]: an open file
//! - [`MemoryStream`]: any in-memory buffer
//! - [`SubStream`]: a fixed window `[offset, offset + length)` of a parent
//!
//! Decompression filters in [`crate::filter`] are streams too, but they
//! cannot seek: `seek` fails with [`io::ErrorKind::Unsupported`].
//!
//! # Byte budgets
//!
//! File and memory streams carry a [`ByteBudget`]. Once the budget is spent
//! `read` returns `Ok(0)`, which callers cannot tell apart from a real end
//! of data. Truncation is a soft failure: a 4 GiB bomb behind a 1 GiB limit
//! reads as a 1 GiB stream instead of exhausting memory or disk.
//!
//! Seeking a file or memory stream back to offset 0 refills its budget, so
//! format detection can rewind and start over without spending it twice.
//!
//! # Ownership
//!
//! A stream chain is built by the caller, outermost last. Sub-streams and
//! filters either own their parent or borrow it through the `&mut S` impl;
//! dropping a wrapper never closes a borrowed parent.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// A readable byte source that can report its position and optionally seek.
pub trait Stream: Read {
    /// Moves the read position. Streams that cannot seek return an
    /// [`io::ErrorKind::Unsupported`] error.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Current read position.
    fn tell(&self) -> io::Result<u64>;
}

impl<S: Stream + ?Sized> Stream for &mut S {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        (**self).seek(pos)
    }

    fn tell(&self) -> io::Result<u64> {
        (**self).tell()
    }
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        (**self).seek(pos)
    }

    fn tell(&self) -> io::Result<u64> {
        (**self).tell()
    }
}

/// Stream handed out for an entry's data. It borrows the reader it came
/// from, so the reader cannot advance while the handle is alive.
pub type DataStream<'a> = Box<dyn Stream + 'a>;

/// Error returned by streams that cannot seek.
pub(crate) fn seek_unsupported() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "stream is not seekable")
}

/// Cumulative cap on the number of bytes a stream may return.
///
/// A limit of `0` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteBudget {
    limit: u64,
    used: u64,
}

impl ByteBudget {
    /// Creates a budget of `limit` bytes (`0` for unlimited).
    pub const fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    /// A budget that never runs out.
    pub const fn unlimited() -> Self {
        Self::new(0)
    }

    /// Configured limit, `0` when unlimited.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Bytes returned so far.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Bytes still allowed, or `None` when unlimited.
    pub fn remaining(&self) -> Option<u64> {
        if self.limit == 0 {
            None
        } else {
            Some(self.limit.saturating_sub(self.used))
        }
    }

    /// Whether the budget has been spent.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// Clamps a requested read length to what the budget still allows.
    pub fn allow(&self, want: usize) -> usize {
        match self.remaining() {
            None => want,
            Some(left) => want.min(usize::try_from(left).unwrap_or(usize::MAX)),
        }
    }

    /// Records `n` bytes handed to a caller.
    pub fn consume(&mut self, n: usize) {
        self.used = self.used.saturating_add(n as u64);
    }

    /// Forgets everything consumed so far.
    pub fn reset(&mut self) {
        self.used = 0;
    }
}

/// Resolves a [`SeekFrom`] against a current position and a total length.
fn resolve_seek(pos: SeekFrom, current: u64, len: u64) -> io::Result<u64> {
    let target = match pos {
        SeekFrom::Start(n) => Some(n),
        SeekFrom::Current(delta) => current.checked_add_signed(delta),
        SeekFrom::End(delta) => len.checked_add_signed(delta),
    };
    target.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid seek to a negative or overflowing position",
        )
    })
}

/// A stream backed by an open file.
#[derive(Debug)]
pub struct FileStream {
    file: File,
    pos: u64,
    budget: ByteBudget,
}

impl FileStream {
    /// Opens `path` with no byte limit.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::new(File::open(path)?, 0)
    }

    /// Wraps an open file. `byte_limit` of `0` means unlimited.
    pub fn new(mut file: File, byte_limit: u64) -> io::Result<Self> {
        let pos = file.stream_position()?;
        Ok(Self {
            file,
            pos,
            budget: ByteBudget::new(byte_limit),
        })
    }

    /// Total bytes returned since the last rewind.
    pub fn bytes_read(&self) -> u64 {
        self.budget.used()
    }

    /// Configured byte limit (`0` when unlimited).
    pub fn byte_limit(&self) -> u64 {
        self.budget.limit()
    }

    /// Unwraps the underlying file.
    pub fn into_inner(self) -> File {
        self.file
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = self.budget.allow(buf.len());
        if want == 0 {
            return Ok(0);
        }
        let n = self.file.read(&mut buf[..want])?;
        self.pos += n as u64;
        self.budget.consume(n);
        Ok(n)
    }
}

impl Stream for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = Seek::seek(&mut self.file, pos)?;
        if new_pos == 0 {
            self.budget.reset();
        }
        self.pos = new_pos;
        Ok(new_pos)
    }

    fn tell(&self) -> io::Result<u64> {
        Ok(self.pos)
    }
}

/// A stream over an in-memory buffer.
///
/// A single pass can never return more than the buffer holds, so
/// [`MemoryStream::new`] sets no budget; [`MemoryStream::with_limit`]
/// caps the total across seeks.
#[derive(Debug, Clone)]
pub struct MemoryStream<T> {
    data: T,
    pos: u64,
    budget: ByteBudget,
}

impl<T: AsRef<[u8]>> MemoryStream<T> {
    /// Wraps `data` without a byte limit.
    pub fn new(data: T) -> Self {
        Self::with_limit(data, 0)
    }

    /// Wraps `data` with an explicit byte limit (`0` means unlimited).
    pub fn with_limit(data: T, byte_limit: u64) -> Self {
        Self {
            data,
            pos: 0,
            budget: ByteBudget::new(byte_limit),
        }
    }

    /// Borrows the underlying buffer.
    pub fn get_ref(&self) -> &T {
        &self.data
    }

    /// Unwraps the underlying buffer.
    pub fn into_inner(self) -> T {
        self.data
    }
}

impl<T: AsRef<[u8]>> Read for MemoryStream<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.as_ref();
        let start = usize::try_from(self.pos).unwrap_or(usize::MAX).min(data.len());
        let available = &data[start..];
        let n = self.budget.allow(buf.len()).min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n as u64;
        self.budget.consume(n);
        Ok(n)
    }
}

impl<T: AsRef<[u8]>> Stream for MemoryStream<T> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.data.as_ref().len() as u64;
        let new_pos = resolve_seek(pos, self.pos, len)?;
        if new_pos == 0 {
            self.budget.reset();
        }
        self.pos = new_pos;
        Ok(new_pos)
    }

    fn tell(&self) -> io::Result<u64> {
        Ok(self.pos)
    }
}

/// A window `[offset, offset + length)` over a parent stream.
///
/// Reads never leave the window. Before each read the parent is moved to
/// `offset + pos` unless it is already there, so sibling windows over one
/// parent can be read in any interleaving, and a window over a forward-only
/// parent works as long as it is read in order.
#[derive(Debug)]
pub struct SubStream<S> {
    parent: S,
    offset: u64,
    length: u64,
    pos: u64,
}

impl<S: Stream> SubStream<S> {
    /// Creates a window positioned at its start.
    pub fn new(parent: S, offset: u64, length: u64) -> Self {
        Self::resume(parent, offset, length, 0)
    }

    /// Creates a window positioned `pos` bytes in (clamped to the window).
    pub fn resume(parent: S, offset: u64, length: u64, pos: u64) -> Self {
        Self {
            parent,
            offset,
            length,
            pos: pos.min(length),
        }
    }

    /// Window start within the parent.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Window length.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Unwraps the parent stream.
    pub fn into_inner(self) -> S {
        self.parent
    }
}

impl<S: Stream> Read for SubStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.length.saturating_sub(self.pos);
        let want = buf
            .len()
            .min(usize::try_from(left).unwrap_or(usize::MAX));
        if want == 0 {
            return Ok(0);
        }

        let absolute = self.offset + self.pos;
        if self.parent.tell().ok() != Some(absolute) {
            self.parent.seek(SeekFrom::Start(absolute))?;
        }

        let n = self.parent.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<S: Stream> Stream for SubStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = resolve_seek(pos, self.pos, self.length)?;
        Ok(self.pos)
    }

    fn tell(&self) -> io::Result<u64> {
        Ok(self.pos)
    }
}

/// Reads until `buf` is full or the stream ends; returns the count read.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads and throws away exactly `n` bytes.
pub(crate) fn discard<R: Read + ?Sized>(reader: &mut R, n: u64) -> io::Result<()> {
    let copied = io::copy(&mut (&mut *reader).take(n), &mut io::sink())?;
    if copied < n {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream ended while skipping data",
        ));
    }
    Ok(())
}

/// Moves a stream forward to `target`, seeking when the stream allows it
/// and reading-and-discarding otherwise.
pub(crate) fn advance_to<S: Stream + ?Sized>(stream: &mut S, target: u64) -> io::Result<()> {
    let current = stream.tell()?;
    if current == target {
        return Ok(());
    }
    if current > target {
        stream.seek(SeekFrom::Start(target))?;
        return Ok(());
    }
    match stream.seek(SeekFrom::Start(target)) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::Unsupported => discard(stream, target - current),
        Err(e) => Err(e),
    }
}

/// Total length of a seekable stream. Leaves the position at the end.
pub(crate) fn stream_len<S: Stream + ?Sized>(stream: &mut S) -> io::Result<u64> {
    stream.seek(SeekFrom::End(0))
}
