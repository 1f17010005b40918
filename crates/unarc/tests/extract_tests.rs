use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use unarc::{
    extract, extract_to_path, extract_with_progress, ArchiveError, ArchiveReader, ExtractOptions,
    Limits,
};

/// Helper to create a test ZIP archive
fn create_test_zip(path: &Path) -> std::io::Result<()> {
    use zip::write::{SimpleFileOptions, ZipWriter};

    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);

    // Add a simple text file
    zip.start_file("test.txt", SimpleFileOptions::default())?;
    zip.write_all(b"Hello, World!")?;

    // Add a file in a subdirectory
    zip.start_file("subdir/nested.txt", SimpleFileOptions::default())?;
    zip.write_all(b"Nested content")?;

    // Add another file
    zip.start_file("data.json", SimpleFileOptions::default())?;
    zip.write_all(b"{\"key\": \"value\"}")?;

    zip.finish()?;
    Ok(())
}

/// Helper to create a test TAR.GZ archive
fn create_test_tar_gz(path: &Path) -> std::io::Result<()> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::Builder;

    let file = File::create(path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar = Builder::new(encoder);

    // Create temporary files to add to the archive
    let temp_dir = TempDir::new()?;
    let test_file = temp_dir.path().join("test.txt");
    fs::write(&test_file, b"Hello from TAR!")?;
    tar.append_path_with_name(&test_file, "test.txt")?;

    let nested_dir = temp_dir.path().join("subdir");
    fs::create_dir(&nested_dir)?;
    let nested_file = nested_dir.join("nested.txt");
    fs::write(&nested_file, b"Nested in TAR")?;
    tar.append_path_with_name(&nested_file, "subdir/nested.txt")?;

    tar.into_inner()?.finish()?;
    Ok(())
}

/// Appends an entry whose name is written raw, bypassing the tar crate's
/// own path checks
fn append_raw(builder: &mut tar::Builder<Vec<u8>>, kind: tar::EntryType, name: &str, link: Option<&str>, data: &[u8]) {
    let mut header = tar::Header::new_old();
    header.set_entry_type(kind);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    {
        let old = header.as_old_mut();
        old.name[..name.len()].copy_from_slice(name.as_bytes());
        if let Some(link) = link {
            old.linkname[..link.len()].copy_from_slice(link.as_bytes());
        }
    }
    header.set_cksum();
    builder.append(&header, data).unwrap();
}

#[test]
fn test_extract_zip_basic() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("test.zip");
    let output_dir = temp_dir.path().join("output");

    // Create test archive
    create_test_zip(&archive_path).unwrap();

    let stats = extract(&archive_path, &output_dir, Limits::default(), &ExtractOptions::default()).unwrap();

    // Verify extraction
    assert_eq!(stats.files_extracted, 3);
    assert_eq!(stats.bytes_written, 13 + 14 + 16);

    // Check files exist
    assert!(output_dir.join("test.txt").exists());
    assert!(output_dir.join("subdir/nested.txt").exists());
    assert!(output_dir.join("data.json").exists());

    // Verify content
    let content = fs::read_to_string(output_dir.join("test.txt")).unwrap();
    assert_eq!(content, "Hello, World!");

    // Nothing beyond the three files and their parent directory
    let on_disk: Vec<_> = walkdir::WalkDir::new(&output_dir)
        .min_depth(1)
        .into_iter()
        .map(|e| e.unwrap())
        .collect();
    assert_eq!(on_disk.len(), 4);
    assert_eq!(on_disk.iter().filter(|e| e.file_type().is_file()).count(), 3);
}

#[test]
fn test_extract_tar_gz_basic() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("test.tar.gz");
    let output_dir = temp_dir.path().join("output");

    // Create test archive
    create_test_tar_gz(&archive_path).unwrap();

    let stats = extract(&archive_path, &output_dir, Limits::default(), &ExtractOptions::default()).unwrap();

    assert_eq!(stats.files_extracted, 2);

    let content = fs::read_to_string(output_dir.join("test.txt")).unwrap();
    assert_eq!(content, "Hello from TAR!");
    let nested = fs::read_to_string(output_dir.join("subdir/nested.txt")).unwrap();
    assert_eq!(nested, "Nested in TAR");
}

#[test]
fn test_extract_with_strip_components() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("test.zip");
    let output_dir = temp_dir.path().join("output");

    create_test_zip(&archive_path).unwrap();

    let options = ExtractOptions {
        strip_components: 1,
        ..ExtractOptions::default()
    };
    let stats = extract(&archive_path, &output_dir, Limits::default(), &options).unwrap();

    // Files with only one component are skipped
    assert_eq!(stats.files_extracted, 1);
    assert_eq!(stats.entries_skipped, 2);
    assert!(output_dir.join("nested.txt").exists());
    assert!(!output_dir.join("test.txt").exists());
}

#[test]
fn test_extract_with_cancellation() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("test.zip");
    let output_dir = temp_dir.path().join("output");

    create_test_zip(&archive_path).unwrap();

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let cancel_flag_clone = cancel_flag.clone();

    let progress_cb = move |_file: &str, _bytes: u64, _total: Option<u64>| {
        // Cancel after first file
        cancel_flag_clone.store(true, Ordering::Relaxed);
        true
    };

    let mut reader = ArchiveReader::open_path(&archive_path, Limits::default()).unwrap();
    let result = extract_with_progress(
        &mut reader,
        &output_dir,
        &ExtractOptions::default(),
        &progress_cb,
        cancel_flag,
    );

    match result {
        Err(ArchiveError::Cancelled) => {}
        other => panic!("Expected Cancelled error, got: {:?}", other),
    }
    assert!(output_dir.join("test.txt").exists());
    assert!(!output_dir.join("data.json").exists());
}

#[test]
fn test_extract_nonexistent_archive() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("nonexistent.zip");
    let output_dir = temp_dir.path().join("output");

    let result = extract(&archive_path, &output_dir, Limits::default(), &ExtractOptions::default());

    match result {
        Err(ArchiveError::NotFound(path)) => assert_eq!(path, archive_path),
        other => panic!("Expected NotFound error, got: {:?}", other),
    }
}

#[test]
fn test_extract_progress_callback() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("test.zip");
    let output_dir = temp_dir.path().join("output");

    create_test_zip(&archive_path).unwrap();

    // Track progress calls
    let progress_calls = Arc::new(AtomicU64::new(0));
    let progress_calls_clone = progress_calls.clone();
    let last_total = Arc::new(AtomicU64::new(0));
    let last_total_clone = last_total.clone();

    let progress_cb = move |_file: &str, bytes: u64, _total: Option<u64>| {
        progress_calls_clone.fetch_add(1, Ordering::Relaxed);
        last_total_clone.store(bytes, Ordering::Relaxed);
        true
    };

    let mut reader = ArchiveReader::open_path(&archive_path, Limits::default()).unwrap();
    extract_with_progress(
        &mut reader,
        &output_dir,
        &ExtractOptions::default(),
        &progress_cb,
        Arc::new(AtomicBool::new(false)),
    )
    .unwrap();

    assert_eq!(progress_calls.load(Ordering::Relaxed), 3);
    assert_eq!(last_total.load(Ordering::Relaxed), 43);
}

#[test]
fn test_extract_with_path_traversal_protection() {
    let temp_dir = TempDir::new().unwrap();
    let output_dir = temp_dir.path().join("output");

    let mut builder = tar::Builder::new(Vec::new());
    append_raw(&mut builder, tar::EntryType::Regular, "../evil.txt", None, b"evil");
    append_raw(&mut builder, tar::EntryType::Regular, "/abs.txt", None, b"abs");
    append_raw(&mut builder, tar::EntryType::Regular, "good.txt", None, b"good");
    let data = builder.into_inner().unwrap();

    let mut reader = ArchiveReader::open_stream(unarc::MemoryStream::new(data), Limits::default()).unwrap();
    let result = extract_to_path(&mut reader, &output_dir, &ExtractOptions::default());

    // Bad entries fail individually; the rest still lands
    match result {
        Err(ArchiveError::ExtractionFailed { failed, total }) => {
            assert_eq!(failed, 2);
            assert_eq!(total, 3);
        }
        other => panic!("Expected ExtractionFailed error, got: {:?}", other),
    }
    assert!(output_dir.join("good.txt").exists());
    assert!(!temp_dir.path().join("evil.txt").exists());
    assert!(!Path::new("/abs.txt").exists());
}

#[cfg(unix)]
#[test]
fn test_extract_refuses_writing_through_symlink() {
    let temp_dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let output_dir = temp_dir.path().join("output");
    let outside_path = outside.path().to_str().unwrap().to_string();

    let mut builder = tar::Builder::new(Vec::new());
    append_raw(&mut builder, tar::EntryType::Symlink, "escape", Some(&outside_path), b"");
    append_raw(&mut builder, tar::EntryType::Regular, "escape/pwned.txt", None, b"gotcha");
    let data = builder.into_inner().unwrap();

    let mut reader = ArchiveReader::open_stream(unarc::MemoryStream::new(data), Limits::default()).unwrap();
    let result = extract_to_path(&mut reader, &output_dir, &ExtractOptions::default());

    assert!(matches!(
        result,
        Err(ArchiveError::ExtractionFailed { failed: 1, total: 2 })
    ));
    assert!(fs::symlink_metadata(output_dir.join("escape")).unwrap().file_type().is_symlink());
    assert!(!outside.path().join("pwned.txt").exists());
}

#[cfg(unix)]
#[test]
fn test_extract_symlink_replaces_existing_file() {
    let temp_dir = TempDir::new().unwrap();
    let output_dir = temp_dir.path().join("output");
    fs::create_dir_all(&output_dir).unwrap();
    fs::write(output_dir.join("link"), b"old").unwrap();

    let mut builder = tar::Builder::new(Vec::new());
    append_raw(&mut builder, tar::EntryType::Symlink, "link", Some("target.txt"), b"");
    let data = builder.into_inner().unwrap();

    let mut reader = ArchiveReader::open_stream(unarc::MemoryStream::new(data), Limits::default()).unwrap();
    let stats = extract_to_path(&mut reader, &output_dir, &ExtractOptions::default()).unwrap();

    assert_eq!(stats.symlinks_created, 1);
    assert_eq!(fs::read_link(output_dir.join("link")).unwrap(), Path::new("target.txt"));
}

#[test]
fn test_extract_depth_limit() {
    let temp_dir = TempDir::new().unwrap();
    let output_dir = temp_dir.path().join("output");

    let mut builder = tar::Builder::new(Vec::new());
    append_raw(&mut builder, tar::EntryType::Regular, "a/b/c/d/e.txt", None, b"deep");
    let data = builder.into_inner().unwrap();

    let limits = Limits {
        max_nested_depth: 3,
        ..Limits::unset()
    };
    let mut reader = ArchiveReader::open_stream(unarc::MemoryStream::new(data), limits).unwrap();
    let result = extract_to_path(&mut reader, &output_dir, &ExtractOptions::default());

    assert!(matches!(
        result,
        Err(ArchiveError::ExtractionFailed { failed: 1, total: 1 })
    ));
    assert!(!output_dir.join("a").exists());
}
