//! Archive extraction functionality
//!
//! This module materializes one archive entry at a time onto the filesystem:
//! - Directory creation (with the archive's recorded mode)
//! - File creation and content copy with a byte-count check
//! - Restoration of modification times and Unix permissions
//! - "Explode" mode, which drops the archive's directory hierarchy
//!
//! Every failure is returned as an [`ExtractError`]. Only
//! [`ExtractError::RestoreMode`] is recoverable; the caller decides what to do
//! with the rest.
//!
//! # Examples
//!
//! ```no_run
//! use std::fs::File;
//! use zip::ZipArchive;
//! use zipar::extract::Extractor;
//! use zipar::source::{EntrySource, ZipSource};
//!
//! let archive = ZipArchive::new(File::open("archive.zip")?)?;
//! let mut source = ZipSource::new(archive);
//! let extractor = Extractor::new("out", false);
//! while let Some(entry) = source.next_entry()? {
//!     extractor.extract(&entry, &mut source)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::{self, DirBuilder, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::entry::ArchiveEntry;
use crate::linux::{fadvise_dontneed, preallocate_file};
use crate::source::{EntrySource, SourceError};
use crate::utils::timestamp_to_filetime;

/// Buffer size for file I/O (256KB for better throughput)
const BUFFER_SIZE: usize = 256 * 1024;

/// Mode of directories created implicitly as parents of an entry
pub const PARENT_DIR_MODE: u32 = 0o755;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("refusing to extract {name}: path escapes the destination")]
    UnsafePath { name: String },

    #[error("failed to create {}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to create {}", .path.display())]
    CreateFile { path: PathBuf, source: io::Error },

    #[error("failed to open {name} from archive")]
    OpenEntry { name: String, source: SourceError },

    #[error("failed to write {}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error(
        "failed to write {expected} bytes to {}; wrote just {written}{}",
        .path.display(),
        cause_suffix(.cause)
    )]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        written: u64,
        cause: Option<io::Error>,
    },

    #[error("failed to restore permissions {mode:04o} for file {}", .path.display())]
    RestoreMode {
        path: PathBuf,
        mode: u32,
        source: io::Error,
    },
}

fn cause_suffix(cause: &Option<io::Error>) -> String {
    cause.as_ref().map(|e| format!(": {}", e)).unwrap_or_default()
}

impl ExtractError {
    /// Whether the run may continue past this error.
    ///
    /// The entry's content is already on disk when the mode cannot be
    /// restored, so that failure alone is recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ExtractError::RestoreMode { .. })
    }
}

/// What extracting one entry did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Directory(PathBuf),
    File { path: PathBuf, bytes: u64 },
    /// Directory entry dropped because the hierarchy is exploded
    Skipped,
}

/// Writes entries below a destination root
#[derive(Debug, Clone)]
pub struct Extractor {
    dest_root: PathBuf,
    explode: bool,
}

impl Extractor {
    pub fn new(dest_root: impl Into<PathBuf>, explode: bool) -> Self {
        Self {
            dest_root: dest_root.into(),
            explode,
        }
    }

    /// Compute where an entry lands on disk.
    ///
    /// Names that are absolute or climb out with `..` are refused.
    pub fn target_path(&self, entry: &ArchiveEntry) -> Result<PathBuf, ExtractError> {
        let unsafe_path = || ExtractError::UnsafePath {
            name: entry.name.clone(),
        };
        let name = Path::new(&entry.name);
        if name
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(unsafe_path());
        }

        if self.explode {
            let base = name.file_name().ok_or_else(unsafe_path)?;
            Ok(self.dest_root.join(base))
        } else {
            Ok(self.dest_root.join(name))
        }
    }

    /// Extract one entry, opening its content from `source` when needed.
    pub fn extract<S: EntrySource + ?Sized>(
        &self,
        entry: &ArchiveEntry,
        source: &mut S,
    ) -> Result<Extraction, ExtractError> {
        if entry.is_dir && self.explode {
            // Flattening leaves nothing for a directory entry to create.
            return Ok(Extraction::Skipped);
        }

        let path = self.target_path(entry)?;

        if entry.is_dir {
            create_dirs(&path, entry.permissions())?;
            return Ok(Extraction::Directory(path));
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.is_dir()
        {
            create_dirs(parent, PARENT_DIR_MODE)?;
        }

        let bytes = self.write_file(entry, source, &path)?;
        restore_metadata(entry, &path)?;

        Ok(Extraction::File { path, bytes })
    }

    fn write_file<S: EntrySource + ?Sized>(
        &self,
        entry: &ArchiveEntry,
        source: &mut S,
        path: &Path,
    ) -> Result<u64, ExtractError> {
        let outfile = create_file(path)?;

        // Linux optimization: pre-allocate disk space to avoid fragmentation
        if entry.uncompressed_size > 0 {
            preallocate_file(&outfile, entry.uncompressed_size).ok();
        }

        let mut content = source
            .open(entry)
            .map_err(|source| ExtractError::OpenEntry {
                name: entry.name.clone(),
                source,
            })?;

        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, outfile);
        let (written, cause) = copy_counted(&mut content, &mut writer, path)?;
        let outfile = writer.into_inner().map_err(|e| ExtractError::Write {
            path: path.to_path_buf(),
            source: e.into_error(),
        })?;

        if written != entry.uncompressed_size || cause.is_some() {
            return Err(ExtractError::SizeMismatch {
                path: path.to_path_buf(),
                expected: entry.uncompressed_size,
                written,
                cause,
            });
        }

        // Linux optimization: tell kernel we're done with this file's cache
        fadvise_dontneed(&outfile, 0, written);

        Ok(written)
    }
}

/// Copy until end of stream, returning the number of bytes written and the
/// read error that cut the stream short, if any. Write errors are fatal.
fn copy_counted<R: Read + ?Sized, W: Write>(
    reader: &mut R,
    writer: &mut W,
    path: &Path,
) -> Result<(u64, Option<io::Error>), ExtractError> {
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut written = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => return Ok((written, None)),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Ok((written, Some(e))),
        };
        writer
            .write_all(&buffer[..n])
            .map_err(|source| ExtractError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        written += n as u64;
    }
}

/// Create or truncate the destination, replacing a read-only file left by an
/// earlier extraction.
fn create_file(path: &Path) -> Result<File, ExtractError> {
    match File::create(path) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied && path.is_file() => {
            log::debug!("replacing read-only {}", path.display());
            fs::remove_file(path).and_then(|()| File::create(path))
        },
        other => other,
    }
    .map_err(|source| ExtractError::CreateFile {
        path: path.to_path_buf(),
        source,
    })
}

fn create_dirs(path: &Path, mode: u32) -> Result<(), ExtractError> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    {
        let _ = mode;
    }
    builder
        .create(path)
        .map_err(|source| ExtractError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

/// Set modification time (best effort) and then the permission bits.
fn restore_metadata(entry: &ArchiveEntry, path: &Path) -> Result<(), ExtractError> {
    if let Some(ts) = entry.modified
        && let Err(e) = filetime::set_file_mtime(path, timestamp_to_filetime(ts))
    {
        log::debug!("could not set mtime of {}: {}", path.display(), e);
    }

    set_mode(path, entry.permissions()).map_err(|source| ExtractError::RestoreMode {
        path: path.to_path_buf(),
        mode: entry.permissions(),
        source,
    })
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
}
