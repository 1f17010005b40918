//! Archive extraction implementation with security features.
//!
//! Entries are materialized under a destination directory. Every entry path
//! is validated before anything touches the filesystem, parent directories
//! are created one component at a time so that a planted symlink cannot
//! redirect a write outside the destination, and directory attributes are
//! restored last.

use crate::error::{ArchiveError, SecurityError};
use crate::reader::ArchiveReader;
use crate::safety::{strip_path_components, validate_entry_path};
use crate::types::{Entry, EntryType, ExtractOptions, ExtractStats, Limits};
use crate::ProgressCallback;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Size of the copy buffer used when writing file data.
const WRITE_CHUNK: usize = 64 * 1024;

/// Mode used for files when permissions are not preserved.
const DEFAULT_FILE_MODE: u32 = 0o644;

/// Extract every remaining entry of `reader` into `dest`.
///
/// Per-entry failures are logged and counted; extraction carries on with the
/// next entry. Errors from the reader itself (corruption, I/O) abort.
///
/// # Arguments
///
/// * `reader` - An open archive positioned before its first entry
/// * `dest` - Directory where entries will be extracted (created if missing)
/// * `options` - Extraction options
///
/// # Returns
///
/// Returns `ExtractStats` on success, or `ArchiveError::ExtractionFailed`
/// when at least one entry could not be extracted.
pub fn extract_to_path(
    reader: &mut ArchiveReader<'_>,
    dest: &Path,
    options: &ExtractOptions,
) -> Result<ExtractStats, ArchiveError> {
    extract_with_progress(
        reader,
        dest,
        options,
        &no_progress,
        Arc::new(AtomicBool::new(false)),
    )
}

/// Extract every remaining entry of `reader` into `dest`, reporting progress.
///
/// # Arguments
///
/// * `reader` - An open archive positioned before its first entry
/// * `dest` - Directory where entries will be extracted
/// * `options` - Extraction options
/// * `progress_cb` - Called after each file with its path, the running byte
///   total and the entry size; returning `false` cancels
/// * `cancel_flag` - Atomic flag to signal cancellation
///
/// # Returns
///
/// Returns `ExtractStats` with extraction statistics on success.
pub fn extract_with_progress(
    reader: &mut ArchiveReader<'_>,
    dest: &Path,
    options: &ExtractOptions,
    progress_cb: &ProgressCallback,
    cancel_flag: Arc<AtomicBool>,
) -> Result<ExtractStats, ArchiveError> {
    let start_time = Instant::now();
    fs::create_dir_all(dest)?;

    let mut job = Extraction::new(dest, options, *reader.limits(), progress_cb, &cancel_flag);
    let mut total = 0u64;
    let mut failed = 0u64;

    while let Some(entry) = reader.next_entry()? {
        // Check cancellation
        if cancel_flag.load(Ordering::Relaxed) {
            return Err(ArchiveError::Cancelled);
        }

        total += 1;
        match job.entry(reader, &entry) {
            Ok(()) => {}
            Err(ArchiveError::Cancelled) => return Err(ArchiveError::Cancelled),
            Err(e) => {
                failed += 1;
                warn!(path = %entry.path, error = %e, "failed to extract entry");
            }
        }
    }

    failed += job.finish_dirs();

    let mut stats = job.stats;
    stats.duration = start_time.elapsed();
    info!(
        files = stats.files_extracted,
        dirs = stats.dirs_created,
        symlinks = stats.symlinks_created,
        skipped = stats.entries_skipped,
        bytes = stats.bytes_written,
        failed,
        elapsed_ms = stats.duration.as_millis() as u64,
        "extraction finished"
    );

    if failed > 0 {
        return Err(ArchiveError::ExtractionFailed { failed, total });
    }
    Ok(stats)
}

/// Extract a single entry, the one most recently returned by
/// `reader.next_entry()`, into `dest`.
///
/// Unlike [`extract_to_path`], the first failure is returned as-is.
pub fn extract_entry(
    reader: &mut ArchiveReader<'_>,
    entry: &Entry,
    dest: &Path,
    options: &ExtractOptions,
) -> Result<ExtractStats, ArchiveError> {
    let start_time = Instant::now();
    fs::create_dir_all(dest)?;

    let cancel_flag = AtomicBool::new(false);
    let mut job = Extraction::new(dest, options, *reader.limits(), &no_progress, &cancel_flag);
    job.entry(reader, entry)?;
    for (path, entry) in std::mem::take(&mut job.pending_dirs) {
        job.restore_dir(&path, &entry)?;
    }

    let mut stats = job.stats;
    stats.duration = start_time.elapsed();
    Ok(stats)
}

fn no_progress(_file: &str, _bytes: u64, _total: Option<u64>) -> bool {
    true
}

/// State shared by all entries of one extraction run.
struct Extraction<'a> {
    dest: &'a Path,
    options: &'a ExtractOptions,
    limits: Limits,
    progress_cb: &'a ProgressCallback,
    cancel_flag: &'a AtomicBool,
    stats: ExtractStats,
    /// Directories whose mode and mtime are restored after all entries.
    pending_dirs: Vec<(PathBuf, Entry)>,
}

impl<'a> Extraction<'a> {
    fn new(
        dest: &'a Path,
        options: &'a ExtractOptions,
        limits: Limits,
        progress_cb: &'a ProgressCallback,
        cancel_flag: &'a AtomicBool,
    ) -> Self {
        Self {
            dest,
            options,
            limits,
            progress_cb,
            cancel_flag,
            stats: ExtractStats::default(),
            pending_dirs: Vec::new(),
        }
    }

    fn entry(&mut self, reader: &mut ArchiveReader<'_>, entry: &Entry) -> Result<(), ArchiveError> {
        let validated = validate_entry_path(Path::new(&entry.path), &self.limits)?;
        let relative = strip_path_components(&validated, self.options.strip_components);

        // Skip if path becomes empty after stripping
        if relative.as_os_str().is_empty() {
            self.stats.entries_skipped += 1;
            return Ok(());
        }

        create_parent_dirs(self.dest, &relative)?;
        let target = self.dest.join(&relative);
        let display = relative.to_string_lossy().into_owned();

        match entry.entry_type {
            EntryType::Directory => {
                create_dir_checked(&target)?;
                self.stats.dirs_created += 1;
                self.pending_dirs.push((target, entry.clone()));
            }
            EntryType::File => {
                self.write_file(reader, entry, &target)?;
                self.report(&display, entry.size)?;
            }
            EntryType::Symlink => {
                let link_target = entry.link_target.as_deref().ok_or_else(|| {
                    ArchiveError::corrupted(format!("symlink without target: {}", entry.path))
                })?;
                replace_with_symlink(link_target, &target)?;
                self.stats.symlinks_created += 1;
            }
            EntryType::Hardlink => {
                if entry.size > 0 {
                    self.write_file(reader, entry, &target)?;
                } else if let Some(source) = self.hardlink_source(entry)? {
                    refuse_symlink(&target)?;
                    let copied = fs::copy(&source, &target)?;
                    self.stats.files_extracted += 1;
                    self.stats.bytes_written += copied;
                } else {
                    debug!(path = %entry.path, "skipping hardlink with nothing to copy");
                    self.stats.entries_skipped += 1;
                    return Ok(());
                }
                self.report(&display, entry.size)?;
            }
            EntryType::Other => {
                debug!(path = %entry.path, "skipping special file");
                self.stats.entries_skipped += 1;
            }
        }
        Ok(())
    }

    fn write_file(
        &mut self,
        reader: &mut ArchiveReader<'_>,
        entry: &Entry,
        target: &Path,
    ) -> Result<(), ArchiveError> {
        refuse_symlink(target)?;

        let mode = if self.options.preserve_permissions {
            entry.mode & 0o7777
        } else {
            DEFAULT_FILE_MODE
        };

        let mut file = create_file(target, mode)?;
        let mut data = reader.open_data()?;
        let mut buf = vec![0u8; WRITE_CHUNK];
        let mut written = 0u64;

        loop {
            if self.cancel_flag.load(Ordering::Relaxed) {
                return Err(ArchiveError::Cancelled);
            }
            let n = match data.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            file.write_all(&buf[..n])?;
            written += n as u64;
        }
        drop(data);

        if self.options.preserve_permissions {
            // Creation mode is filtered through the umask
            set_mode(target, mode)?;
        }
        if self.options.preserve_timestamps {
            file.set_modified(system_time(entry.mtime))?;
        }

        self.stats.files_extracted += 1;
        self.stats.bytes_written += written;
        Ok(())
    }

    /// Resolves an empty hardlink to a file already extracted in this run.
    fn hardlink_source(&self, entry: &Entry) -> Result<Option<PathBuf>, ArchiveError> {
        let Some(link_target) = entry.link_target.as_deref() else {
            return Ok(None);
        };
        let validated = validate_entry_path(Path::new(link_target), &self.limits)?;
        let relative = strip_path_components(&validated, self.options.strip_components);
        if relative.as_os_str().is_empty() {
            return Ok(None);
        }

        refuse_symlinks_along(self.dest, &relative)?;
        let source = self.dest.join(relative);
        match fs::symlink_metadata(&source) {
            Ok(meta) if meta.file_type().is_file() => Ok(Some(source)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn report(&self, display: &str, size: u64) -> Result<(), ArchiveError> {
        let continue_extraction = (self.progress_cb)(display, self.stats.bytes_written, Some(size));
        if !continue_extraction {
            return Err(ArchiveError::Cancelled);
        }
        Ok(())
    }

    /// Applies directory attributes deepest first, so restoring a parent's
    /// mtime is not undone by touching its children. Returns the number of
    /// directories that failed.
    fn finish_dirs(&mut self) -> u64 {
        let mut pending = std::mem::take(&mut self.pending_dirs);
        pending.sort_by_key(|(path, _)| std::cmp::Reverse(path.components().count()));

        let mut failed = 0;
        for (path, entry) in pending {
            if let Err(e) = self.restore_dir(&path, &entry) {
                failed += 1;
                warn!(path = %entry.path, error = %e, "failed to restore directory attributes");
            }
        }
        failed
    }

    fn restore_dir(&self, path: &Path, entry: &Entry) -> Result<(), ArchiveError> {
        if self.options.preserve_timestamps {
            File::open(path)?.set_modified(system_time(entry.mtime))?;
        }
        if self.options.preserve_permissions {
            set_mode(path, entry.mode & 0o7777)?;
        }
        Ok(())
    }
}

/// Creates every parent of `relative` under `dest`, one component at a time.
///
/// A component that already exists as a symlink is refused, as is one that
/// exists as something other than a directory.
fn create_parent_dirs(dest: &Path, relative: &Path) -> Result<(), ArchiveError> {
    let Some(parent) = relative.parent() else {
        return Ok(());
    };

    let mut current = dest.to_path_buf();
    for component in parent.components() {
        let Component::Normal(part) = component else {
            continue;
        };
        current.push(part);
        create_dir_checked(&current)?;
    }
    Ok(())
}

/// `mkdir` that tolerates an existing directory but never a symlink.
fn create_dir_checked(path: &Path) -> Result<(), ArchiveError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            Err(SecurityError::SymlinkInPath(path.to_path_buf()).into())
        }
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ArchiveError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a directory", path.display()),
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => match fs::create_dir(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into()),
        },
        Err(e) => Err(e.into()),
    }
}

/// Checks every existing component of `relative` under `dest`, the last
/// one included, and refuses any that is a symlink. Stops at the first
/// component that does not exist.
fn refuse_symlinks_along(dest: &Path, relative: &Path) -> Result<(), ArchiveError> {
    let mut current = dest.to_path_buf();
    for component in relative.components() {
        let Component::Normal(part) = component else {
            continue;
        };
        current.push(part);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(SecurityError::SymlinkInPath(current).into());
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn refuse_symlink(path: &Path) -> Result<(), ArchiveError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            Err(SecurityError::SymlinkInPath(path.to_path_buf()).into())
        }
        _ => Ok(()),
    }
}

/// Removes whatever sits at `path` and puts a symlink to `target` there.
fn replace_with_symlink(target: &str, path: &Path) -> Result<(), ArchiveError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir(path)?,
        Ok(_) => fs::remove_file(path)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    make_symlink(target, path)
}

#[cfg(unix)]
fn make_symlink(target: &str, path: &Path) -> Result<(), ArchiveError> {
    std::os::unix::fs::symlink(target, path)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_symlink(target: &str, path: &Path) -> Result<(), ArchiveError> {
    Err(ArchiveError::unsupported(format!(
        "symlinks are not supported on this platform: {} -> {}",
        path.display(),
        target
    )))
}

#[cfg(unix)]
fn create_file(path: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
}

#[cfg(not(unix))]
fn create_file(path: &Path, _mode: u32) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Converts unix seconds (possibly negative) to a `SystemTime`.
fn system_time(mtime: i64) -> SystemTime {
    let offset = Duration::from_secs(mtime.unsigned_abs());
    let time = if mtime >= 0 {
        UNIX_EPOCH.checked_add(offset)
    } else {
        UNIX_EPOCH.checked_sub(offset)
    };
    time.unwrap_or(UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;
    use tempfile::TempDir;

    fn tar_archive(build: impl FnOnce(&mut ::tar::Builder<Vec<u8>>)) -> Vec<u8> {
        let mut builder = ::tar::Builder::new(Vec::new());
        build(&mut builder);
        builder.into_inner().unwrap()
    }

    fn append(builder: &mut ::tar::Builder<Vec<u8>>, kind: ::tar::EntryType, path: &str, link: Option<&str>, data: &[u8]) {
        let mut header = ::tar::Header::new_gnu();
        header.set_entry_type(kind);
        header.set_size(data.len() as u64);
        header.set_mode(0o640);
        header.set_mtime(1_600_000_000);
        if let Some(link) = link {
            header.set_link_name(link).unwrap();
        }
        header.set_path(path).unwrap();
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }

    fn reader(data: Vec<u8>) -> ArchiveReader<'static> {
        ArchiveReader::open_stream(MemoryStream::new(data), Limits::default()).unwrap()
    }

    #[test]
    fn test_system_time() {
        assert_eq!(system_time(0), UNIX_EPOCH);
        assert_eq!(system_time(10), UNIX_EPOCH + Duration::from_secs(10));
        assert_eq!(system_time(-10), UNIX_EPOCH - Duration::from_secs(10));
    }

    #[test]
    fn test_create_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        create_parent_dirs(temp_dir.path(), Path::new("a/b/c/file.txt")).unwrap();
        assert!(temp_dir.path().join("a/b/c").is_dir());
        assert!(!temp_dir.path().join("a/b/c/file.txt").exists());

        // Existing directories are fine
        create_parent_dirs(temp_dir.path(), Path::new("a/b/other.txt")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_create_parent_dirs_refuses_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("link")).unwrap();

        let err = create_parent_dirs(temp_dir.path(), Path::new("link/file.txt")).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::Security(SecurityError::SymlinkInPath(_))
        ));
    }

    #[test]
    fn test_parent_that_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a"), b"x").unwrap();
        assert!(create_parent_dirs(temp_dir.path(), Path::new("a/b")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_modes_and_times() {
        use std::os::unix::fs::PermissionsExt;

        let data = tar_archive(|b| {
            append(b, ::tar::EntryType::Directory, "d/", None, b"");
            append(b, ::tar::EntryType::Regular, "d/f.txt", None, b"hello");
        });
        let temp_dir = TempDir::new().unwrap();
        let stats = extract_to_path(&mut reader(data), temp_dir.path(), &ExtractOptions::default()).unwrap();

        assert_eq!(stats.files_extracted, 1);
        assert_eq!(stats.dirs_created, 1);
        assert_eq!(stats.bytes_written, 5);

        let file = temp_dir.path().join("d/f.txt");
        let meta = fs::metadata(&file).unwrap();
        assert_eq!(meta.permissions().mode() & 0o7777, 0o640);
        assert_eq!(meta.modified().unwrap(), system_time(1_600_000_000));

        // Directory mtime survives writing its child
        let dir_meta = fs::metadata(temp_dir.path().join("d")).unwrap();
        assert_eq!(dir_meta.modified().unwrap(), system_time(1_600_000_000));
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_without_preserving() {
        use std::os::unix::fs::PermissionsExt;

        let data = tar_archive(|b| append(b, ::tar::EntryType::Regular, "f", None, b"x"));
        let temp_dir = TempDir::new().unwrap();
        let options = ExtractOptions {
            preserve_permissions: false,
            preserve_timestamps: false,
            strip_components: 0,
        };
        extract_to_path(&mut reader(data), temp_dir.path(), &options).unwrap();

        let meta = fs::metadata(temp_dir.path().join("f")).unwrap();
        // 0644 filtered through the umask
        assert_eq!(meta.permissions().mode() & 0o133, 0);
        assert_ne!(meta.modified().unwrap(), system_time(1_600_000_000));
    }

    #[cfg(unix)]
    #[test]
    fn test_hardlink_copies_target() {
        let data = tar_archive(|b| {
            append(b, ::tar::EntryType::Regular, "orig.txt", None, b"shared");
            append(b, ::tar::EntryType::Link, "copy.txt", Some("orig.txt"), b"");
            append(b, ::tar::EntryType::Link, "dangling.txt", Some("missing.txt"), b"");
        });
        let temp_dir = TempDir::new().unwrap();
        let stats = extract_to_path(&mut reader(data), temp_dir.path(), &ExtractOptions::default()).unwrap();

        assert_eq!(fs::read(temp_dir.path().join("copy.txt")).unwrap(), b"shared");
        assert!(!temp_dir.path().join("dangling.txt").exists());
        assert_eq!(stats.files_extracted, 2);
        assert_eq!(stats.entries_skipped, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_hardlink_through_symlinked_directory_is_refused() {
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret"), b"TOP SECRET").unwrap();
        let outside_path = outside.path().to_str().unwrap().to_string();

        let data = tar_archive(|b| {
            append(b, ::tar::EntryType::Regular, "orig.txt", None, b"shared");
            append(b, ::tar::EntryType::Symlink, "evil", Some(&outside_path), b"");
            // Source reached through the planted symlink
            append(b, ::tar::EntryType::Link, "copy.txt", Some("evil/secret"), b"");
            // Target placed through the planted symlink
            append(b, ::tar::EntryType::Link, "evil/planted.txt", Some("orig.txt"), b"");
        });
        let temp_dir = TempDir::new().unwrap();
        let result = extract_to_path(&mut reader(data), temp_dir.path(), &ExtractOptions::default());

        assert!(matches!(
            result,
            Err(ArchiveError::ExtractionFailed { failed: 2, total: 4 })
        ));
        assert!(!temp_dir.path().join("copy.txt").exists());
        assert!(!outside.path().join("planted.txt").exists());
        assert_eq!(fs::read(outside.path().join("secret")).unwrap(), b"TOP SECRET");
    }

    #[cfg(unix)]
    #[test]
    fn test_refuse_symlinks_along() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("real/link")).unwrap();

        assert!(refuse_symlinks_along(temp_dir.path(), Path::new("real/file")).is_ok());
        assert!(refuse_symlinks_along(temp_dir.path(), Path::new("missing/file")).is_ok());
        let err = refuse_symlinks_along(temp_dir.path(), Path::new("real/link/file")).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::Security(SecurityError::SymlinkInPath(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_special_files_are_skipped() {
        let data = tar_archive(|b| {
            append(b, ::tar::EntryType::Fifo, "pipe", None, b"");
            append(b, ::tar::EntryType::Regular, "f", None, b"1");
        });
        let temp_dir = TempDir::new().unwrap();
        let stats = extract_to_path(&mut reader(data), temp_dir.path(), &ExtractOptions::default()).unwrap();

        assert_eq!(stats.entries_skipped, 1);
        assert!(!temp_dir.path().join("pipe").exists());
        assert!(temp_dir.path().join("f").exists());
    }

    #[test]
    fn test_extract_single_entry() {
        let data = tar_archive(|b| {
            append(b, ::tar::EntryType::Regular, "skip.txt", None, b"no");
            append(b, ::tar::EntryType::Regular, "want.txt", None, b"yes");
        });
        let temp_dir = TempDir::new().unwrap();
        let mut reader = reader(data);

        while let Some(entry) = reader.next_entry().unwrap() {
            if entry.path == "want.txt" {
                let stats =
                    extract_entry(&mut reader, &entry, temp_dir.path(), &ExtractOptions::default()).unwrap();
                assert_eq!(stats.bytes_written, 3);
            }
        }

        assert_eq!(fs::read(temp_dir.path().join("want.txt")).unwrap(), b"yes");
        assert!(!temp_dir.path().join("skip.txt").exists());
    }

    #[test]
    fn test_progress_callback_cancels() {
        let data = tar_archive(|b| {
            append(b, ::tar::EntryType::Regular, "a", None, b"1");
            append(b, ::tar::EntryType::Regular, "b", None, b"2");
        });
        let temp_dir = TempDir::new().unwrap();
        let stop = |_: &str, _: u64, _: Option<u64>| false;

        let result = extract_with_progress(
            &mut reader(data),
            temp_dir.path(),
            &ExtractOptions::default(),
            &stop,
            Arc::new(AtomicBool::new(false)),
        );
        assert!(matches!(result, Err(ArchiveError::Cancelled)));
        assert!(temp_dir.path().join("a").exists());
        assert!(!temp_dir.path().join("b").exists());
    }

    #[test]
    fn test_cancel_flag() {
        let data = tar_archive(|b| append(b, ::tar::EntryType::Regular, "a", None, b"1"));
        let temp_dir = TempDir::new().unwrap();

        let result = extract_with_progress(
            &mut reader(data),
            temp_dir.path(),
            &ExtractOptions::default(),
            &no_progress,
            Arc::new(AtomicBool::new(true)),
        );
        assert!(matches!(result, Err(ArchiveError::Cancelled)));
        assert!(!temp_dir.path().join("a").exists());
    }
}
