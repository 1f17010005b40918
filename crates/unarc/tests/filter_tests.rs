use std::io::{self, Read, SeekFrom, Write};
use tempfile::NamedTempFile;
use unarc::filter::{Decompressor, DeflateFilter, GzipFilter};
use unarc::{Compression, FileStream, MemoryStream, Stream, SubStream};

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn test_gzip_byte_limit_truncates_silently() {
    let compressed = gzip(&vec![b'x'; 10_000]);
    let mut filter = GzipFilter::with_limit(MemoryStream::new(compressed), 100);

    let mut out = Vec::new();
    filter.read_to_end(&mut out).unwrap();
    assert_eq!(out.len(), 100);
    assert!(filter.limit_reached());
    assert_eq!(filter.tell().unwrap(), 100);
}

#[test]
fn test_substream_window() {
    let mut parent = MemoryStream::new(b"Hello, World!".to_vec());
    let mut window = SubStream::new(&mut parent, 7, 5);

    let mut out = String::new();
    window.read_to_string(&mut out).unwrap();
    assert_eq!(out, "World");

    // Seeking stays inside the window
    window.seek(SeekFrom::Start(1)).unwrap();
    let mut two = [0u8; 2];
    window.read_exact(&mut two).unwrap();
    assert_eq!(&two, b"or");
    assert_eq!(window.tell().unwrap(), 3);
}

#[test]
fn test_sibling_substreams_interleave() {
    let mut parent = MemoryStream::new(b"aaaabbbb".to_vec());
    let mut byte = [0u8; 1];

    let mut first = SubStream::new(&mut parent, 0, 4);
    first.read_exact(&mut byte).unwrap();
    assert_eq!(byte[0], b'a');
    drop(first);

    let mut second = SubStream::new(&mut parent, 4, 4);
    second.read_exact(&mut byte).unwrap();
    assert_eq!(byte[0], b'b');
}

#[test]
fn test_gzip_crc_mismatch_is_corruption() {
    let mut compressed = gzip(b"some payload that will fail its checksum");
    let crc_pos = compressed.len() - 8;
    compressed[crc_pos] ^= 0xFF;

    let mut filter = GzipFilter::with_limit(MemoryStream::new(compressed), 0);
    let err = filter.read_to_end(&mut Vec::new()).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn test_truncated_gzip_errors() {
    let compressed = gzip(&b"truncate me please ".repeat(500));
    let cut = compressed[..compressed.len() / 2].to_vec();

    let mut filter = GzipFilter::with_limit(MemoryStream::new(cut), 0);
    assert!(filter.read_to_end(&mut Vec::new()).is_err());
}

#[test]
fn test_filter_seek_unsupported() {
    let mut filter = GzipFilter::with_limit(MemoryStream::new(gzip(b"abc")), 0);
    let err = filter.seek(SeekFrom::Start(2)).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Unsupported);

    // Seeking to the current position is allowed
    assert_eq!(filter.seek(SeekFrom::Current(0)).unwrap(), 0);
}

#[test]
fn test_deflate_reports_consumed_input() {
    let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&b"deflate ".repeat(100)).unwrap();
    let raw = encoder.finish().unwrap();
    let raw_len = raw.len() as u64;

    let mut data = raw;
    data.extend_from_slice(b"trailing bytes after the deflate stream");

    let mut filter = DeflateFilter::with_limit(MemoryStream::new(data), 0);
    let mut out = Vec::new();
    filter.read_to_end(&mut out).unwrap();

    assert_eq!(out.len(), 800);
    assert!(filter.is_finished());
    assert_eq!(filter.compressed_consumed(), raw_len);
}

#[test]
fn test_decompressor_all_formats() {
    let plain = b"decompressor round trip ".repeat(64);

    let gz = gzip(&plain);

    let mut bz = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    bz.write_all(&plain).unwrap();
    let bz = bz.finish().unwrap();

    let mut xz = liblzma::write::XzEncoder::new(Vec::new(), 6);
    xz.write_all(&plain).unwrap();
    let xz = xz.finish().unwrap();

    for (data, compression) in [
        (gz, Compression::Gzip),
        (bz, Compression::Bzip2),
        (xz, Compression::Xz),
    ] {
        let mut decoder = Decompressor::new(compression, MemoryStream::new(data), 0);
        assert_eq!(decoder.compression(), compression);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, plain, "{}", compression);
    }
}

#[test]
fn test_file_stream_limit_resets_on_rewind() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"0123456789").unwrap();

    let mut stream = FileStream::new(std::fs::File::open(file.path()).unwrap(), 4).unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"0123");

    // Rewinding to 0 restores the budget
    stream.seek(SeekFrom::Start(0)).unwrap();
    let mut again = Vec::new();
    stream.read_to_end(&mut again).unwrap();
    assert_eq!(again, b"0123");
    assert_eq!(stream.bytes_read(), 4);
}

#[test]
fn test_memory_stream_with_limit() {
    let mut stream = MemoryStream::with_limit(b"abcdef".to_vec(), 3);
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, b"abc");

    stream.seek(SeekFrom::Start(4)).unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}
