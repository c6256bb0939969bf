//! Archive entry snapshots
//!
//! An [`ArchiveEntry`] is an immutable copy of the central-directory metadata of
//! one item in the archive. The traversal engine works on these snapshots only
//! and goes back to the [`EntrySource`](crate::source::EntrySource) when it needs
//! the entry's content.

use std::fmt;

/// File type mask of a POSIX mode
pub const S_IFMT: u32 = 0o170000;
/// Directory type bits
pub const S_IFDIR: u32 = 0o040000;
/// Regular file type bits
pub const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;
const S_IFIFO: u32 = 0o010000;
const S_IFCHR: u32 = 0o020000;
const S_IFBLK: u32 = 0o060000;
const S_IFSOCK: u32 = 0o140000;

/// Mode used for directories when the archive records none
pub const DEFAULT_DIR_MODE: u32 = S_IFDIR | 0o755;
/// Mode used for files when the archive records none
pub const DEFAULT_FILE_MODE: u32 = S_IFREG | 0o644;

/// Compression method tag of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Store,
    Deflate,
    Bzip2,
    Zstd,
    /// Any other method, by its lowercase name
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Store => "store",
            Method::Deflate => "deflate",
            Method::Bzip2 => "bzip2",
            Method::Zstd => "zstd",
            Method::Other(name) => name,
        }
    }
}

impl From<zip::CompressionMethod> for Method {
    fn from(method: zip::CompressionMethod) -> Self {
        match method {
            zip::CompressionMethod::Stored => Method::Store,
            zip::CompressionMethod::Deflated => Method::Deflate,
            zip::CompressionMethod::Bzip2 => Method::Bzip2,
            zip::CompressionMethod::Zstd => Method::Zstd,
            other => Method::Other(format!("{:?}", other).to_lowercase()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calendar timestamp as recorded in the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl From<zip::DateTime> for Timestamp {
    fn from(dt: zip::DateTime) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// One item of the archive's central directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Position in the central directory, used to reopen the content
    pub index: usize,
    /// Slash-separated, archive-internal path
    pub name: String,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
    pub method: Method,
    /// POSIX type and permission bits
    pub mode: u32,
    pub modified: Option<Timestamp>,
    pub is_dir: bool,
}

impl ArchiveEntry {
    /// Build an entry, deriving the directory flag from the trailing separator
    /// or from the mode's type bits and filling in a default mode when the
    /// archive does not carry one.
    pub fn new(index: usize, name: impl Into<String>, mode: Option<u32>) -> Self {
        let name = name.into();
        let is_dir = name.ends_with('/') || mode.is_some_and(|m| m & S_IFMT == S_IFDIR);
        let mode = match mode {
            Some(m) if m & S_IFMT != 0 => m,
            Some(m) if is_dir => S_IFDIR | (m & 0o7777),
            Some(m) => S_IFREG | (m & 0o7777),
            None if is_dir => DEFAULT_DIR_MODE,
            None => DEFAULT_FILE_MODE,
        };
        Self {
            index,
            name,
            uncompressed_size: 0,
            compressed_size: 0,
            method: Method::Store,
            mode,
            modified: None,
            is_dir,
        }
    }

    pub fn with_sizes(mut self, uncompressed: u64, compressed: u64) -> Self {
        self.uncompressed_size = uncompressed;
        self.compressed_size = compressed;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_modified(mut self, modified: Option<Timestamp>) -> Self {
        self.modified = modified;
        self
    }

    /// Permission bits only (setuid, setgid, sticky and rwx)
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Fraction of space saved by compression, as a percentage
    pub fn compression_ratio(&self) -> f64 {
        if self.uncompressed_size == 0 {
            return 0.0;
        }
        (1.0 - self.compressed_size as f64 / self.uncompressed_size as f64) * 100.0
    }
}

/// Render a mode the way `ls -l` does, e.g. `drwxr-xr-x`
pub fn format_mode(mode: u32) -> String {
    let file_type = match mode & S_IFMT {
        S_IFDIR => 'd',
        S_IFLNK => 'l',
        S_IFIFO => 'p',
        S_IFCHR => 'c',
        S_IFBLK => 'b',
        S_IFSOCK => 's',
        _ => '-',
    };

    let bit = |mask: u32, c: char| if mode & mask != 0 { c } else { '-' };
    let exec = |x: u32, special: u32, set: char| match (mode & x != 0, mode & special != 0) {
        (true, true) => set,
        (false, true) => set.to_ascii_uppercase(),
        (true, false) => 'x',
        (false, false) => '-',
    };

    [
        file_type,
        bit(0o400, 'r'),
        bit(0o200, 'w'),
        exec(0o100, 0o4000, 's'),
        bit(0o040, 'r'),
        bit(0o020, 'w'),
        exec(0o010, 0o2000, 's'),
        bit(0o004, 'r'),
        bit(0o002, 'w'),
        exec(0o001, 0o1000, 't'),
    ]
    .iter()
    .collect()
}
