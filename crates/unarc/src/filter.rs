//! Decompression filters.
//!
//! A [`Filter`] wraps any [`Read`] and is itself a [`Stream`]: it pulls
//! compressed input in 64 KiB chunks, feeds it to a [`Codec`], and hands
//! decompressed bytes to the caller, never more than its byte budget.
//!
//! # Invariants
//!
//! - The decoder is built on the first `read`, never before. Until then the
//!   filter holds only the codec configuration.
//! - Reaching the end of input without the codec signalling end of stream is
//!   a truncation error, surfaced no later than the next `read`.
//! - Filters never seek. `tell` reports decompressed bytes produced so far.
//! - A filter never builds another filter. Chains are assembled by the caller.
//!
//! Format detection reads through a throwaway filter and then rewinds the
//! underlying stream to offset 0; the real filter must be constructed
//! afterwards from scratch. See [`crate::detect`].

use crate::stream::{seek_unsupported, ByteBudget, Stream};
use crate::types::Compression;
use flate2::{Crc, Decompress, FlushDecompress};
use std::io::{self, Read, SeekFrom};
use liblzma::stream::{Action, Filters, LzmaOptions, Status as LzmaStatus, Stream as LzmaStream, CONCATENATED};

/// Size of each chunk pulled from the wrapped stream.
pub const INPUT_CHUNK: usize = 64 * 1024;

/// Progress made by one codec call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Step {
    /// Input bytes consumed
    pub consumed: usize,
    /// Output bytes produced
    pub produced: usize,
    /// The codec reached the logical end of its stream
    pub done: bool,
}

/// A streaming decompressor.
pub trait Codec: Sized {
    /// Parameters needed to build the decoder.
    type Config;

    /// Builds a decoder ready to accept the first input byte.
    fn init(config: &Self::Config) -> io::Result<Self>;

    /// Decodes as much of `input` into `output` as possible. `finish` is set
    /// once the wrapped stream has no more input.
    fn decode(&mut self, input: &[u8], output: &mut [u8], finish: bool) -> io::Result<Step>;
}

enum DecoderState<C: Codec> {
    Uninitialized(C::Config),
    Active(C),
}

impl<C: Codec> DecoderState<C> {
    fn active(&mut self) -> io::Result<&mut C> {
        if let DecoderState::Uninitialized(config) = self {
            let codec = C::init(config)?;
            *self = DecoderState::Active(codec);
        }
        match self {
            DecoderState::Active(codec) => Ok(codec),
            DecoderState::Uninitialized(_) => Err(io::Error::other("decoder failed to start")),
        }
    }
}

fn invalid_data<E>(err: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, err)
}

/// A decompressing stream over an underlying reader.
pub struct Filter<S, C: Codec> {
    inner: S,
    state: DecoderState<C>,
    input: Box<[u8]>,
    pos: usize,
    len: usize,
    input_eof: bool,
    finished: bool,
    consumed: u64,
    produced: u64,
    budget: ByteBudget,
    pending_error: Option<io::Error>,
}

impl<S: Read, C: Codec> Filter<S, C> {
    /// Wraps `inner`. At most `byte_limit` decompressed bytes are ever
    /// returned (`0` means unlimited).
    pub fn new(inner: S, config: C::Config, byte_limit: u64) -> Self {
        Self {
            inner,
            state: DecoderState::Uninitialized(config),
            input: vec![0u8; INPUT_CHUNK].into_boxed_slice(),
            pos: 0,
            len: 0,
            input_eof: false,
            finished: false,
            consumed: 0,
            produced: 0,
            budget: ByteBudget::new(byte_limit),
            pending_error: None,
        }
    }

    /// Borrows the wrapped stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutably borrows the wrapped stream. Reading from it directly
    /// desynchronizes the filter.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Unwraps the wrapped stream. Buffered input is lost.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Exact number of compressed bytes the codec has consumed. Input that
    /// was buffered but not yet decoded is not counted.
    pub fn compressed_consumed(&self) -> u64 {
        self.consumed
    }

    /// Decompressed bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.produced
    }

    /// Whether the codec has signalled the end of its stream.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the byte budget has been spent.
    pub fn limit_reached(&self) -> bool {
        self.budget.is_exhausted()
    }

    fn fill_input(&mut self) -> io::Result<()> {
        loop {
            match self.inner.read(&mut self.input) {
                Ok(n) => {
                    self.pos = 0;
                    self.len = n;
                    self.input_eof = n == 0;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<S: Read, C: Codec<Config = ()>> Filter<S, C> {
    /// Wraps `inner` for a codec that needs no configuration.
    pub fn with_limit(inner: S, byte_limit: u64) -> Self {
        Self::new(inner, (), byte_limit)
    }
}

impl<S: Read, C: Codec> Read for Filter<S, C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(err) = self.pending_error.take() {
            return Err(err);
        }
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        let want = self.budget.allow(buf.len());
        if want == 0 {
            return Ok(0);
        }

        let mut written = 0;
        while written < want {
            if self.pos == self.len && !self.input_eof {
                self.fill_input()?;
            }

            let finish = self.input_eof;
            let codec = self.state.active()?;
            let step = codec.decode(
                &self.input[self.pos..self.len],
                &mut buf[written..want],
                finish,
            )?;

            self.pos += step.consumed;
            self.consumed += step.consumed as u64;
            written += step.produced;

            if step.done {
                self.finished = true;
                break;
            }

            if step.consumed == 0 && step.produced == 0 {
                if finish {
                    let err = io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "compressed stream is truncated",
                    );
                    if written > 0 {
                        self.pending_error = Some(err);
                        break;
                    }
                    return Err(err);
                }
                if self.pos < self.len {
                    return Err(invalid_data("decoder stalled with input available"));
                }
            }
        }

        self.produced += written as u64;
        self.budget.consume(written);
        Ok(written)
    }
}

impl<S: Read, C: Codec> Stream for Filter<S, C> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.produced),
            SeekFrom::Start(n) if n == self.produced => Ok(n),
            _ => Err(seek_unsupported()),
        }
    }

    fn tell(&self) -> io::Result<u64> {
        Ok(self.produced)
    }
}

fn inflate_step(
    inflate: &mut Decompress,
    input: &[u8],
    output: &mut [u8],
    finish: bool,
) -> io::Result<Step> {
    let before_in = inflate.total_in();
    let before_out = inflate.total_out();
    let flush = if finish {
        FlushDecompress::Finish
    } else {
        FlushDecompress::None
    };
    let status = inflate
        .decompress(input, output, flush)
        .map_err(invalid_data)?;

    Ok(Step {
        consumed: (inflate.total_in() - before_in) as usize,
        produced: (inflate.total_out() - before_out) as usize,
        done: matches!(status, flate2::Status::StreamEnd),
    })
}

fn lzma_step(
    stream: &mut LzmaStream,
    input: &[u8],
    output: &mut [u8],
    finish: bool,
) -> io::Result<Step> {
    let before_in = stream.total_in();
    let before_out = stream.total_out();
    let action = if finish { Action::Finish } else { Action::Run };
    let status = stream
        .process(input, output, action)
        .map_err(|e| invalid_data(io::Error::from(e)))?;

    Ok(Step {
        consumed: (stream.total_in() - before_in) as usize,
        produced: (stream.total_out() - before_out) as usize,
        done: matches!(status, LzmaStatus::StreamEnd),
    })
}

/// Raw DEFLATE, as stored inside ZIP entries.
pub struct Inflate {
    inner: Decompress,
}

impl Codec for Inflate {
    type Config = ();

    fn init(_config: &()) -> io::Result<Self> {
        Ok(Self {
            inner: Decompress::new(false),
        })
    }

    fn decode(&mut self, input: &[u8], output: &mut [u8], finish: bool) -> io::Result<Step> {
        inflate_step(&mut self.inner, input, output, finish)
    }
}

const GZIP_FHCRC: u8 = 0x02;
const GZIP_FEXTRA: u8 = 0x04;
const GZIP_FNAME: u8 = 0x08;
const GZIP_FCOMMENT: u8 = 0x10;
const GZIP_RESERVED: u8 = 0xE0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderStage {
    Fixed,
    ExtraLen,
    Extra(usize),
    Name,
    Comment,
    HeaderCrc(usize),
    Done,
}

/// Incremental parser for the RFC 1952 member header.
#[derive(Debug)]
struct GzipHeader {
    stage: HeaderStage,
    buf: [u8; 10],
    have: usize,
    flags: u8,
}

impl GzipHeader {
    fn new() -> Self {
        Self {
            stage: HeaderStage::Fixed,
            buf: [0; 10],
            have: 0,
            flags: 0,
        }
    }

    /// First optional field present at or after `ordinal`
    /// (1 extra, 2 name, 3 comment, 4 header crc).
    fn stage_from(&self, ordinal: u8) -> HeaderStage {
        let flags = self.flags;
        if ordinal <= 1 && flags & GZIP_FEXTRA != 0 {
            HeaderStage::ExtraLen
        } else if ordinal <= 2 && flags & GZIP_FNAME != 0 {
            HeaderStage::Name
        } else if ordinal <= 3 && flags & GZIP_FCOMMENT != 0 {
            HeaderStage::Comment
        } else if ordinal <= 4 && flags & GZIP_FHCRC != 0 {
            HeaderStage::HeaderCrc(2)
        } else {
            HeaderStage::Done
        }
    }

    /// Consumes header bytes; returns how many were used.
    fn feed(&mut self, input: &[u8]) -> io::Result<usize> {
        let mut used = 0;
        loop {
            let rest = &input[used..];
            match self.stage {
                HeaderStage::Done => return Ok(used),
                _ if rest.is_empty() => return Ok(used),
                HeaderStage::Fixed => {
                    let take = (10 - self.have).min(rest.len());
                    self.buf[self.have..self.have + take].copy_from_slice(&rest[..take]);
                    self.have += take;
                    used += take;
                    if self.have < 10 {
                        continue;
                    }
                    if self.buf[0] != 0x1F || self.buf[1] != 0x8B {
                        return Err(invalid_data("not a gzip stream"));
                    }
                    if self.buf[2] != 8 {
                        return Err(invalid_data("unsupported gzip compression method"));
                    }
                    self.flags = self.buf[3];
                    if self.flags & GZIP_RESERVED != 0 {
                        return Err(invalid_data("reserved gzip header flags set"));
                    }
                    self.have = 0;
                    self.stage = self.stage_from(1);
                }
                HeaderStage::ExtraLen => {
                    let take = (2 - self.have).min(rest.len());
                    self.buf[self.have..self.have + take].copy_from_slice(&rest[..take]);
                    self.have += take;
                    used += take;
                    if self.have == 2 {
                        let len = u16::from_le_bytes([self.buf[0], self.buf[1]]) as usize;
                        self.stage = if len == 0 {
                            self.stage_from(2)
                        } else {
                            HeaderStage::Extra(len)
                        };
                    }
                }
                HeaderStage::Extra(left) => {
                    let take = left.min(rest.len());
                    used += take;
                    self.stage = if take == left {
                        self.stage_from(2)
                    } else {
                        HeaderStage::Extra(left - take)
                    };
                }
                HeaderStage::Name | HeaderStage::Comment => {
                    match rest.iter().position(|&b| b == 0) {
                        Some(nul) => {
                            used += nul + 1;
                            self.stage = if self.stage == HeaderStage::Name {
                                self.stage_from(3)
                            } else {
                                self.stage_from(4)
                            };
                        }
                        None => used += rest.len(),
                    }
                }
                HeaderStage::HeaderCrc(left) => {
                    let take = left.min(rest.len());
                    used += take;
                    self.stage = if take == left {
                        HeaderStage::Done
                    } else {
                        HeaderStage::HeaderCrc(left - take)
                    };
                }
            }
        }
    }

    fn is_done(&self) -> bool {
        self.stage == HeaderStage::Done
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GzipPhase {
    Header,
    Body,
    Trailer,
    Done,
}

/// gzip (RFC 1952): header, raw DEFLATE body, CRC-32 and size trailer.
///
/// Only the first member is decoded; data after it is ignored.
pub struct Gzip {
    phase: GzipPhase,
    header: GzipHeader,
    inflate: Decompress,
    crc: Crc,
    trailer: [u8; 8],
    trailer_len: usize,
}

impl Gzip {
    fn check_trailer(&self) -> io::Result<()> {
        let stored_crc = u32::from_le_bytes([
            self.trailer[0],
            self.trailer[1],
            self.trailer[2],
            self.trailer[3],
        ]);
        let stored_size = u32::from_le_bytes([
            self.trailer[4],
            self.trailer[5],
            self.trailer[6],
            self.trailer[7],
        ]);
        if stored_crc != self.crc.sum() {
            return Err(invalid_data("gzip CRC-32 mismatch"));
        }
        if stored_size != self.crc.amount() {
            return Err(invalid_data("gzip size trailer mismatch"));
        }
        Ok(())
    }
}

impl Codec for Gzip {
    type Config = ();

    fn init(_config: &()) -> io::Result<Self> {
        Ok(Self {
            phase: GzipPhase::Header,
            header: GzipHeader::new(),
            inflate: Decompress::new(false),
            crc: Crc::new(),
            trailer: [0; 8],
            trailer_len: 0,
        })
    }

    fn decode(&mut self, input: &[u8], output: &mut [u8], finish: bool) -> io::Result<Step> {
        let mut step = Step::default();
        loop {
            match self.phase {
                GzipPhase::Header => {
                    step.consumed += self.header.feed(&input[step.consumed..])?;
                    if !self.header.is_done() {
                        break;
                    }
                    self.phase = GzipPhase::Body;
                }
                GzipPhase::Body => {
                    let body = inflate_step(
                        &mut self.inflate,
                        &input[step.consumed..],
                        &mut output[step.produced..],
                        finish,
                    )?;
                    self.crc
                        .update(&output[step.produced..step.produced + body.produced]);
                    step.consumed += body.consumed;
                    step.produced += body.produced;
                    if !body.done {
                        break;
                    }
                    self.phase = GzipPhase::Trailer;
                }
                GzipPhase::Trailer => {
                    let rest = &input[step.consumed..];
                    let take = (8 - self.trailer_len).min(rest.len());
                    self.trailer[self.trailer_len..self.trailer_len + take]
                        .copy_from_slice(&rest[..take]);
                    self.trailer_len += take;
                    step.consumed += take;
                    if self.trailer_len < 8 {
                        break;
                    }
                    self.check_trailer()?;
                    self.phase = GzipPhase::Done;
                }
                GzipPhase::Done => {
                    step.done = true;
                    break;
                }
            }
        }
        Ok(step)
    }
}

/// bzip2.
pub struct Bzip2 {
    inner: bzip2::Decompress,
}

impl Codec for Bzip2 {
    type Config = ();

    fn init(_config: &()) -> io::Result<Self> {
        Ok(Self {
            inner: bzip2::Decompress::new(false),
        })
    }

    fn decode(&mut self, input: &[u8], output: &mut [u8], _finish: bool) -> io::Result<Step> {
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();
        let status = self
            .inner
            .decompress(input, output)
            .map_err(invalid_data)?;

        Ok(Step {
            consumed: (self.inner.total_in() - before_in) as usize,
            produced: (self.inner.total_out() - before_out) as usize,
            done: matches!(status, bzip2::Status::StreamEnd),
        })
    }
}

/// xz container (LZMA2 with block and index framing). Concatenated xz
/// streams decode back to back.
pub struct Xz {
    inner: LzmaStream,
}

impl Codec for Xz {
    type Config = ();

    fn init(_config: &()) -> io::Result<Self> {
        let inner = LzmaStream::new_stream_decoder(u64::MAX, CONCATENATED).map_err(io::Error::from)?;
        Ok(Self { inner })
    }

    fn decode(&mut self, input: &[u8], output: &mut [u8], finish: bool) -> io::Result<Step> {
        lzma_step(&mut self.inner, input, output, finish)
    }
}

/// Smallest dictionary the raw decoder accepts.
const LZMA_DICT_MIN: u32 = 4096;

/// Parameters for a raw (headerless) LZMA or LZMA2 stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LzmaConfig {
    /// LZMA1 with explicit literal/position parameters.
    Lzma {
        /// Literal context bits
        lc: u32,
        /// Literal position bits
        lp: u32,
        /// Position bits
        pb: u32,
        /// Dictionary size in bytes
        dict_size: u32,
    },
    /// LZMA2; only the dictionary size is needed.
    Lzma2 {
        /// Dictionary size in bytes
        dict_size: u32,
    },
}

impl LzmaConfig {
    /// Decodes the 5-byte LZMA properties blob (`lc/lp/pb` byte plus a
    /// little-endian dictionary size).
    pub fn from_lzma_props(props: &[u8]) -> io::Result<Self> {
        if props.len() < 5 {
            return Err(invalid_data("LZMA properties are shorter than 5 bytes"));
        }
        let mut d = u32::from(props[0]);
        if d >= 9 * 5 * 5 {
            return Err(invalid_data("invalid LZMA lc/lp/pb byte"));
        }
        let lc = d % 9;
        d /= 9;
        let lp = d % 5;
        let pb = d / 5;
        let dict_size = u32::from_le_bytes([props[1], props[2], props[3], props[4]]);
        Ok(LzmaConfig::Lzma {
            lc,
            lp,
            pb,
            dict_size,
        })
    }

    /// Decodes the single LZMA2 properties byte into a dictionary size.
    pub fn from_lzma2_props(props: &[u8]) -> io::Result<Self> {
        let p = *props
            .first()
            .ok_or_else(|| invalid_data("missing LZMA2 properties byte"))?;
        if p > 40 {
            return Err(invalid_data("invalid LZMA2 dictionary size"));
        }
        let dict_size = if p == 40 {
            u32::MAX
        } else {
            let base = 1u32 << (p / 2 + 11);
            if p % 2 == 1 {
                base + base / 2
            } else {
                base
            }
        };
        Ok(LzmaConfig::Lzma2 { dict_size })
    }

    /// Dictionary size in bytes.
    pub fn dict_size(&self) -> u32 {
        match *self {
            LzmaConfig::Lzma { dict_size, .. } | LzmaConfig::Lzma2 { dict_size } => dict_size,
        }
    }
}

/// Raw LZMA / LZMA2 without a container, as used by 7z coders.
///
/// Raw LZMA1 streams often carry no end marker; running out of input with
/// no further progress is treated as the end of data.
pub struct RawLzma {
    inner: LzmaStream,
}

impl Codec for RawLzma {
    type Config = LzmaConfig;

    fn init(config: &LzmaConfig) -> io::Result<Self> {
        let mut options = LzmaOptions::new_preset(6).map_err(io::Error::from)?;
        let mut filters = Filters::new();
        match *config {
            LzmaConfig::Lzma {
                lc,
                lp,
                pb,
                dict_size,
            } => {
                options
                    .dict_size(dict_size.max(LZMA_DICT_MIN))
                    .literal_context_bits(lc)
                    .literal_position_bits(lp)
                    .position_bits(pb);
                filters.lzma1(&options);
            }
            LzmaConfig::Lzma2 { dict_size } => {
                options.dict_size(dict_size.max(LZMA_DICT_MIN));
                filters.lzma2(&options);
            }
        }
        let inner = LzmaStream::new_raw_decoder(&filters).map_err(io::Error::from)?;
        Ok(Self { inner })
    }

    fn decode(&mut self, input: &[u8], output: &mut [u8], finish: bool) -> io::Result<Step> {
        let mut step = lzma_step(&mut self.inner, input, output, finish)?;
        if finish && step.consumed == 0 && step.produced == 0 {
            step.done = true;
        }
        Ok(step)
    }
}

/// gzip filter.
pub type GzipFilter<S> = Filter<S, Gzip>;
/// Raw DEFLATE filter.
pub type DeflateFilter<S> = Filter<S, Inflate>;
/// bzip2 filter.
pub type Bzip2Filter<S> = Filter<S, Bzip2>;
/// xz filter.
pub type XzFilter<S> = Filter<S, Xz>;
/// Raw LZMA / LZMA2 filter.
pub type LzmaFilter<S> = Filter<S, RawLzma>;

/// One of the stream compressions that can wrap a whole archive.
pub enum Decompressor<S> {
    /// gzip
    Gzip(GzipFilter<S>),
    /// bzip2
    Bzip2(Bzip2Filter<S>),
    /// xz
    Xz(XzFilter<S>),
}

impl<S: Read> Decompressor<S> {
    /// Builds a fresh decoder for `compression` over `inner`.
    pub fn new(compression: Compression, inner: S, byte_limit: u64) -> Self {
        match compression {
            Compression::Gzip => Decompressor::Gzip(Filter::with_limit(inner, byte_limit)),
            Compression::Bzip2 => Decompressor::Bzip2(Filter::with_limit(inner, byte_limit)),
            Compression::Xz => Decompressor::Xz(Filter::with_limit(inner, byte_limit)),
        }
    }

    /// Which compression this decoder handles.
    pub fn compression(&self) -> Compression {
        match self {
            Decompressor::Gzip(_) => Compression::Gzip,
            Decompressor::Bzip2(_) => Compression::Bzip2,
            Decompressor::Xz(_) => Compression::Xz,
        }
    }

    /// Unwraps the compressed stream.
    pub fn into_inner(self) -> S {
        match self {
            Decompressor::Gzip(f) => f.into_inner(),
            Decompressor::Bzip2(f) => f.into_inner(),
            Decompressor::Xz(f) => f.into_inner(),
        }
    }
}

impl<S: Read> Read for Decompressor<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decompressor::Gzip(f) => f.read(buf),
            Decompressor::Bzip2(f) => f.read(buf),
            Decompressor::Xz(f) => f.read(buf),
        }
    }
}

impl<S: Read> Stream for Decompressor<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Decompressor::Gzip(f) => f.seek(pos),
            Decompressor::Bzip2(f) => f.seek(pos),
            Decompressor::Xz(f) => f.seek(pos),
        }
    }

    fn tell(&self) -> io::Result<u64> {
        match self {
            Decompressor::Gzip(f) => f.tell(),
            Decompressor::Bzip2(f) => f.tell(),
            Decompressor::Xz(f) => f.tell(),
        }
    }
}
