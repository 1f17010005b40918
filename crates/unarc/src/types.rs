//! Type definitions shared by the readers and the extractor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Hard link
    Hardlink,
    /// Other special file types (device, fifo, ...)
    Other,
}

impl EntryType {
    /// Single-character tag used by listings (`-`, `d`, `l`, `h`, `?`).
    pub fn tag(self) -> char {
        match self {
            EntryType::File => '-',
            EntryType::Directory => 'd',
            EntryType::Symlink => 'l',
            EntryType::Hardlink => 'h',
            EntryType::Other => '?',
        }
    }
}

/// Metadata of a single archive entry, produced fresh by every `next_entry` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Normalized path: no leading `./`, no empty or `.` segments, no trailing `/`
    pub path: String,

    /// Uncompressed size in bytes
    pub size: u64,

    /// Permission bits
    pub mode: u32,

    /// Modification time in unix seconds
    pub mtime: i64,

    /// Kind of entry
    pub entry_type: EntryType,

    /// Link target for symlinks and hardlinks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,

    /// Owner user id
    pub uid: u32,

    /// Owner group id
    pub gid: u32,
}

impl Entry {
    pub(crate) fn new(path: String, entry_type: EntryType) -> Self {
        let mode = match entry_type {
            EntryType::Directory => 0o755,
            _ => 0o644,
        };
        Self {
            path,
            size: 0,
            mode,
            mtime: 0,
            entry_type,
            link_target: None,
            uid: 0,
            gid: 0,
        }
    }

    /// Whether this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory
    }
}

/// Resource limits applied while opening and reading an archive.
///
/// A field set to `0` means "use the built-in default"; call
/// [`Limits::resolved`] to get the effective values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum number of entries in one archive
    pub max_entries: u64,

    /// Maximum entry name length in bytes
    pub max_name: u64,

    /// Maximum length of ZIP extra fields and comments
    pub max_extra: u64,

    /// Maximum number of decompressed bytes any single stream may produce
    pub max_uncompressed_bytes: u64,

    /// Maximum number of path components in an entry name
    pub max_nested_depth: u64,
}

impl Limits {
    /// Built-in default for `max_entries`.
    pub const DEFAULT_MAX_ENTRIES: u64 = 1_000_000;
    /// Built-in default for `max_name`.
    pub const DEFAULT_MAX_NAME: u64 = 4096;
    /// Built-in default for `max_extra`.
    pub const DEFAULT_MAX_EXTRA: u64 = 65_534;
    /// Built-in default for `max_uncompressed_bytes` (1 GiB).
    pub const DEFAULT_MAX_UNCOMPRESSED_BYTES: u64 = 1024 * 1024 * 1024;
    /// Built-in default for `max_nested_depth`.
    pub const DEFAULT_MAX_NESTED_DEPTH: u64 = 64;

    /// All fields zero: every limit takes its default once resolved.
    pub const fn unset() -> Self {
        Self {
            max_entries: 0,
            max_name: 0,
            max_extra: 0,
            max_uncompressed_bytes: 0,
            max_nested_depth: 0,
        }
    }

    /// Returns a copy with every zero field replaced by its default.
    pub fn resolved(&self) -> Self {
        fn or(value: u64, default: u64) -> u64 {
            if value == 0 {
                default
            } else {
                value
            }
        }

        Self {
            max_entries: or(self.max_entries, Self::DEFAULT_MAX_ENTRIES),
            max_name: or(self.max_name, Self::DEFAULT_MAX_NAME),
            max_extra: or(self.max_extra, Self::DEFAULT_MAX_EXTRA),
            max_uncompressed_bytes: or(
                self.max_uncompressed_bytes,
                Self::DEFAULT_MAX_UNCOMPRESSED_BYTES,
            ),
            max_nested_depth: or(self.max_nested_depth, Self::DEFAULT_MAX_NESTED_DEPTH),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::unset().resolved()
    }
}

/// Container format of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// POSIX / GNU tar
    Tar,
    /// PKZIP, including ZIP64
    Zip,
    /// 7-Zip, single folder and single file only
    SevenZ,
    /// A single compressed file without a container
    Compressed,
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveFormat::Tar => "TAR",
            ArchiveFormat::Zip => "ZIP",
            ArchiveFormat::SevenZ => "7Z",
            ArchiveFormat::Compressed => "COMPRESSED",
        };
        f.write_str(name)
    }
}

/// Stream compression wrapped around a container (or around a bare file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// gzip (RFC 1952)
    Gzip,
    /// bzip2
    Bzip2,
    /// xz container around LZMA2
    Xz,
}

impl Compression {
    /// Conventional file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Compression::Gzip => "gz",
            Compression::Bzip2 => "bz2",
            Compression::Xz => "xz",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Compression::Gzip => "GZ",
            Compression::Bzip2 => "BZ2",
            Compression::Xz => "XZ",
        })
    }
}

/// Metadata information about an archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Container format
    pub format: ArchiveFormat,

    /// Outer compression, if any
    pub compression: Option<Compression>,

    /// Number of entries in the archive
    pub entries: u64,

    /// Size of the archive file in bytes
    pub compressed_bytes: Option<u64>,

    /// Sum of declared entry sizes (if any entries)
    pub uncompressed_estimate: Option<u64>,

    /// List of all entries in the archive
    pub entry_list: Vec<Entry>,
}

/// Options for extracting an archive.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Apply entry permission bits instead of 0644
    pub preserve_permissions: bool,

    /// Restore entry modification times
    pub preserve_timestamps: bool,

    /// Number of leading path components to strip from extracted entries
    pub strip_components: u32,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            preserve_permissions: true,
            preserve_timestamps: true,
            strip_components: 0,
        }
    }
}

/// Statistics about a completed extraction operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractStats {
    /// Number of regular files (and hardlink copies) written
    pub files_extracted: u64,

    /// Number of directories created
    pub dirs_created: u64,

    /// Number of symlinks created
    pub symlinks_created: u64,

    /// Number of entries skipped (special files, stripped-away paths)
    pub entries_skipped: u64,

    /// Total bytes written to disk
    pub bytes_written: u64,

    /// Duration of the extraction operation (in seconds)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
