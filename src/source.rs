//! Entry sources
//!
//! The traversal engine consumes an archive through the [`EntrySource`] trait:
//! a forward-only cursor over the entries, an independent query for the
//! largest uncompressed size, and a way to open an entry's content. The zip
//! backed implementation is [`ZipSource`].

use std::io::{Read, Seek};
use thiserror::Error;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::entry::{ArchiveEntry, Method, Timestamp};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Zip(#[from] ZipError),
    #[error("no entry named {0} in archive")]
    NotFound(String),
}

/// Sequential access to the entries of an opened archive
pub trait EntrySource {
    /// Yield the next entry, or `None` once the sequence is exhausted.
    fn next_entry(&mut self) -> Result<Option<ArchiveEntry>, SourceError>;

    /// Largest uncompressed size across every entry of the archive.
    ///
    /// Computed over the whole entry table, independently of the
    /// [`next_entry`](Self::next_entry) cursor, and constant once known.
    fn largest_uncompressed_size(&mut self) -> Result<u64, SourceError>;

    /// Open the uncompressed content of an entry previously yielded.
    fn open(&mut self, entry: &ArchiveEntry) -> Result<Box<dyn Read + '_>, SourceError>;
}

/// [`EntrySource`] over a [`ZipArchive`]
pub struct ZipSource<R> {
    archive: ZipArchive<R>,
    cursor: usize,
    largest: Option<u64>,
}

impl<R: Read + Seek> ZipSource<R> {
    pub fn new(archive: ZipArchive<R>) -> Self {
        Self {
            archive,
            cursor: 0,
            largest: None,
        }
    }

    /// Number of entries in the central directory
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    fn entry_at(&mut self, index: usize) -> Result<ArchiveEntry, SourceError> {
        // Raw access reads the header without setting up a decompressor.
        let file = self.archive.by_index_raw(index)?;
        let modified = file.last_modified().map(Timestamp::from);
        Ok(ArchiveEntry::new(index, file.name(), file.unix_mode())
            .with_sizes(file.size(), file.compressed_size())
            .with_method(Method::from(file.compression()))
            .with_modified(modified))
    }
}

impl<R: Read + Seek> EntrySource for ZipSource<R> {
    fn next_entry(&mut self) -> Result<Option<ArchiveEntry>, SourceError> {
        if self.cursor >= self.archive.len() {
            return Ok(None);
        }
        let entry = self.entry_at(self.cursor)?;
        self.cursor += 1;
        Ok(Some(entry))
    }

    fn largest_uncompressed_size(&mut self) -> Result<u64, SourceError> {
        if let Some(largest) = self.largest {
            return Ok(largest);
        }
        let mut largest = 0;
        for i in 0..self.archive.len() {
            largest = largest.max(self.archive.by_index_raw(i)?.size());
        }
        self.largest = Some(largest);
        Ok(largest)
    }

    fn open(&mut self, entry: &ArchiveEntry) -> Result<Box<dyn Read + '_>, SourceError> {
        if entry.index >= self.archive.len() {
            return Err(SourceError::NotFound(entry.name.clone()));
        }
        let file = self.archive.by_index(entry.index)?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory archives shared by the unit tests

    use std::io::{Cursor, Write};
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use super::*;

    pub(crate) fn create_test_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        create_test_zip_with(files, zip::CompressionMethod::Stored)
    }

    pub(crate) fn create_test_zip_with(
        files: &[(&str, &[u8])],
        method: zip::CompressionMethod,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buf));
            let options = SimpleFileOptions::default()
                .compression_method(method)
                .unix_permissions(0o644);

            for (name, content) in files {
                if name.ends_with('/') {
                    zip.add_directory(*name, options.unix_permissions(0o755))
                        .unwrap();
                } else {
                    zip.start_file(*name, options).unwrap();
                    zip.write_all(content).unwrap();
                }
            }
            zip.finish().unwrap();
        }
        buf
    }

    pub(crate) fn zip_source(files: &[(&str, &[u8])]) -> ZipSource<Cursor<Vec<u8>>> {
        let archive = ZipArchive::new(Cursor::new(create_test_zip(files))).unwrap();
        ZipSource::new(archive)
    }

    /// Source whose declared sizes need not match the content it hands out
    pub(crate) struct FakeSource {
        pub(crate) entries: Vec<(ArchiveEntry, Vec<u8>)>,
        pub(crate) cursor: usize,
    }

    impl FakeSource {
        pub(crate) fn new(entries: Vec<(ArchiveEntry, Vec<u8>)>) -> Self {
            Self { entries, cursor: 0 }
        }
    }

    impl EntrySource for FakeSource {
        fn next_entry(&mut self) -> Result<Option<ArchiveEntry>, SourceError> {
            let entry = self.entries.get(self.cursor).map(|(e, _)| e.clone());
            self.cursor += 1;
            Ok(entry)
        }

        fn largest_uncompressed_size(&mut self) -> Result<u64, SourceError> {
            Ok(self
                .entries
                .iter()
                .map(|(e, _)| e.uncompressed_size)
                .max()
                .unwrap_or(0))
        }

        fn open(&mut self, entry: &ArchiveEntry) -> Result<Box<dyn Read + '_>, SourceError> {
            let (_, data) = self
                .entries
                .get(entry.index)
                .ok_or_else(|| SourceError::NotFound(entry.name.clone()))?;
            Ok(Box::new(data.as_slice()))
        }
    }
}
