//! One pass over an archive
//!
//! A [`Session`] is the explicit context of an invocation: the operation, the
//! rendering style, the destination and the selection prefixes. [`Session::run`]
//! walks the [`EntrySource`] once, filters every entry, and hands accepted
//! entries to the listing renderer or the extraction engine.
//!
//! Fatal errors end the pass and are returned with context. Recoverable ones
//! (a mode that could not be restored, a record that could not be serialized)
//! are logged and counted in the [`Summary`].

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::args::{Args, Mode};
use crate::entry::ArchiveEntry;
use crate::extract::{Extraction, Extractor, PARENT_DIR_MODE};
use crate::list::{JsonArray, OutputRecord, Style, column_width, render, render_extracted};
use crate::source::EntrySource;
use crate::utils::{PrefixFilter, format_size};

const PROGRESS_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {pos} {wide_msg}";

/// Counters for a finished pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// Entries accepted by the selection filter
    pub selected: usize,
    /// Entries rejected by the selection filter
    pub filtered: usize,
    /// Files and directories written
    pub extracted: usize,
    /// Directory entries dropped by explode mode
    pub skipped: usize,
    /// Bytes of file content written
    pub bytes: u64,
    /// Recoverable problems that were logged
    pub warnings: usize,
}

/// Explicit configuration for one invocation
#[derive(Debug, Clone)]
pub struct Session {
    pub mode: Mode,
    pub style: Style,
    pub explode: bool,
    pub dest_root: PathBuf,
    pub filter: PrefixFilter,
    /// Draw a progress bar on stderr during plain extraction
    pub progress: bool,
}

impl Session {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            style: Style::Plain,
            explode: false,
            dest_root: PathBuf::from("."),
            filter: PrefixFilter::default(),
            progress: false,
        }
    }

    pub fn from_args(args: &Args) -> Result<Self> {
        Ok(Self {
            mode: args.mode()?,
            style: Style::new(args.verbose, args.json),
            explode: args.explode,
            dest_root: args.chdir.clone(),
            filter: PrefixFilter::new(&args.prefixes),
            progress: true,
        })
    }

    /// Walk `source` once, writing listings and annotations to `out`.
    pub fn run<S, W>(&self, source: &mut S, out: &mut W) -> Result<Summary>
    where
        S: EntrySource + ?Sized,
        W: Write,
    {
        let mut sink = match self.style {
            Style::Json => Sink::Json(JsonArray::begin(out)?),
            _ => Sink::Text(out),
        };

        let summary = match self.mode {
            Mode::List => self.list(source, &mut sink)?,
            Mode::Extract => self.extract(source, &mut sink)?,
        };

        sink.finish()?;
        Ok(summary)
    }

    fn list<S, W>(&self, source: &mut S, sink: &mut Sink<W>) -> Result<Summary>
    where
        S: EntrySource + ?Sized,
        W: Write,
    {
        let mut summary = Summary::default();
        // Fixed for the whole listing, from every entry of the archive
        let width = column_width(
            source
                .largest_uncompressed_size()
                .context("Failed to scan archive entries")?,
        );

        while let Some(entry) = next(source)? {
            if !self.filter.accepts(&entry) {
                summary.filtered += 1;
                continue;
            }
            summary.selected += 1;

            match render(&entry, self.style, width) {
                Ok(record) => sink.emit(record)?,
                Err(e) => {
                    log::error!("failed to serialize {}: {}", entry.name, e);
                    summary.warnings += 1;
                },
            }
        }

        Ok(summary)
    }

    fn extract<S, W>(&self, source: &mut S, sink: &mut Sink<W>) -> Result<Summary>
    where
        S: EntrySource + ?Sized,
        W: Write,
    {
        let mut summary = Summary::default();
        let extractor = Extractor::new(&self.dest_root, self.explode);

        if !self.dest_root.is_dir() {
            create_dest_root(&self.dest_root)?;
        }

        let progress = self.progress_bar();

        while let Some(entry) = next(source)? {
            if !self.filter.accepts(&entry) {
                summary.filtered += 1;
                continue;
            }
            summary.selected += 1;
            progress.set_message(entry.name.clone());

            let extraction = match extractor.extract(&entry, source) {
                Ok(extraction) => Some(extraction),
                Err(e) if e.is_recoverable() => {
                    progress.suspend(|| log::warn!("{}", e));
                    summary.warnings += 1;
                    None
                },
                Err(e) => {
                    progress.abandon();
                    return Err(e).with_context(|| format!("Failed to extract {}", entry.name));
                },
            };

            match extraction {
                Some(Extraction::Skipped) => {
                    summary.skipped += 1;
                    log::debug!("skipping directory {} in explode mode", entry.name);
                    progress.inc(1);
                    continue;
                },
                Some(Extraction::File { bytes, .. }) => {
                    summary.extracted += 1;
                    summary.bytes += bytes;
                },
                Some(Extraction::Directory(_)) => summary.extracted += 1,
                // Mode restore failed after the content was written
                None => {
                    summary.extracted += 1;
                    summary.bytes += entry.uncompressed_size;
                },
            }

            self.annotate(&entry, sink, &mut summary)?;
            progress.inc(1);
        }

        progress.finish_and_clear();
        log::info!(
            "extracted {} entries ({}) to {}",
            summary.extracted,
            format_size(summary.bytes),
            self.dest_root.display()
        );

        Ok(summary)
    }

    fn annotate<W: Write>(
        &self,
        entry: &ArchiveEntry,
        sink: &mut Sink<W>,
        summary: &mut Summary,
    ) -> Result<()> {
        match render_extracted(entry, self.style) {
            Ok(Some(record)) => sink.emit(record)?,
            Ok(None) => {},
            Err(e) => {
                log::error!("failed to serialize {}: {}", entry.name, e);
                summary.warnings += 1;
            },
        }
        Ok(())
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.progress || self.style != Style::Plain {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template(PROGRESS_TEMPLATE) {
            pb.set_style(style);
        }
        pb
    }
}

fn next<S: EntrySource + ?Sized>(source: &mut S) -> Result<Option<ArchiveEntry>> {
    source
        .next_entry()
        .context("Failed to read next archive entry")
}

fn create_dest_root(path: &std::path::Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(PARENT_DIR_MODE);
    }
    builder
        .create(path)
        .with_context(|| format!("Failed to create {}", path.display()))
}

/// Where rendered records go: text lines, or elements of a JSON array
enum Sink<'a, W: Write> {
    Text(&'a mut W),
    Json(JsonArray<&'a mut W>),
}

impl<W: Write> Sink<'_, W> {
    fn emit(&mut self, record: OutputRecord) -> Result<()> {
        match (self, record) {
            (Sink::Text(out), OutputRecord::Line(line) | OutputRecord::Json(line)) => {
                writeln!(out, "{}", line)?
            },
            (Sink::Json(array), OutputRecord::Json(obj)) => array.push(&obj)?,
            (Sink::Json(_), OutputRecord::Line(line)) => {
                log::debug!("dropping text record in JSON output: {}", line)
            },
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        match self {
            Sink::Text(out) => out.flush()?,
            Sink::Json(array) => {
                array.finish()?;
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::S_IFREG;
    use crate::source::SourceError;
    use crate::source::testing::{FakeSource, zip_source};

    fn run(session: &Session, source: &mut impl EntrySource) -> (Result<Summary>, String) {
        let mut out = Vec::new();
        let result = session.run(source, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    fn extract_session(dest: &std::path::Path) -> Session {
        Session {
            dest_root: dest.to_path_buf(),
            ..Session::new(Mode::Extract)
        }
    }

    #[test]
    fn test_plain_listing() {
        let mut source = zip_source(&[("a.txt", b"a"), ("dir/", b""), ("dir/b.txt", b"bb")]);
        let (summary, out) = run(&Session::new(Mode::List), &mut source);

        assert_eq!(out, "a.txt\ndir/\ndir/b.txt\n");
        assert_eq!(summary.unwrap().selected, 3);
    }

    #[test]
    fn test_listing_with_prefixes() {
        let mut source = zip_source(&[("foo/x", b""), ("foobar/x", b""), ("bar/foo", b"")]);
        let session = Session {
            filter: PrefixFilter::new(&["foo".to_string()]),
            ..Session::new(Mode::List)
        };
        let (summary, out) = run(&session, &mut source);

        assert_eq!(out, "foo/x\nfoobar/x\n");
        let summary = summary.unwrap();
        assert_eq!(summary.selected, 2);
        assert_eq!(summary.filtered, 1);
    }

    #[test]
    fn test_verbose_width_comes_from_whole_archive() {
        let mut source = zip_source(&[
            ("ten", &[1u8; 10]),
            ("big", &[1u8; 200]),
            ("three", &[1u8; 3]),
        ]);
        let session = Session {
            style: Style::Verbose,
            // The largest entry is filtered out but still sets the width
            filter: PrefixFilter::new(&["t".to_string()]),
            ..Session::new(Mode::List)
        };
        let (_, out) = run(&session, &mut source);

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(" 10 store:0% -rw-r--r-- "), "{}", lines[0]);
        assert!(lines[1].starts_with("  3 store:0% -rw-r--r-- "), "{}", lines[1]);
        assert!(lines[0].ends_with(" ten"));
    }

    #[test]
    fn test_json_listing_is_one_array() {
        let mut source = zip_source(&[("one.txt", b"1"), ("two.txt", b"22")]);
        let session = Session {
            style: Style::Json,
            ..Session::new(Mode::List)
        };
        let (_, out) = run(&session, &mut source);

        assert!(out.starts_with("[\n"));
        assert!(out.trim_end().ends_with(']'));
        assert_eq!(out.matches("},\n").count(), 1);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["name"], "one.txt");
        assert_eq!(items[1]["size"], 2);
    }

    #[test]
    fn test_json_listing_of_empty_archive() {
        let mut source = zip_source(&[]);
        let session = Session {
            style: Style::Json,
            ..Session::new(Mode::List)
        };
        let (_, out) = run(&session, &mut source);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value, serde_json::json!([]));
    }

    #[test]
    fn test_extract_with_prefix_filter() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut source = zip_source(&[
            ("src/main.rs", b"fn main() {}"),
            ("docs/a.md", b"# a"),
            ("README", b"readme"),
        ]);
        let session = Session {
            filter: PrefixFilter::new(&["src/".to_string(), "README".to_string()]),
            ..extract_session(temp_dir.path())
        };
        let (summary, out) = run(&session, &mut source);

        let summary = summary.unwrap();
        assert_eq!(out, "");
        assert_eq!(summary.extracted, 2);
        assert_eq!(summary.filtered, 1);
        assert!(temp_dir.path().join("src/main.rs").exists());
        assert!(temp_dir.path().join("README").exists());
        assert!(!temp_dir.path().join("docs").exists());
    }

    #[test]
    fn test_extract_verbose_annotations() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut source = zip_source(&[("d/", b""), ("d/f.txt", b"hello")]);
        let session = Session {
            style: Style::Verbose,
            ..extract_session(temp_dir.path())
        };
        let (summary, out) = run(&session, &mut source);

        assert_eq!(out, "x d/ directory\nx d/f.txt 5 bytes\n");
        assert_eq!(summary.unwrap().bytes, 5);
    }

    #[test]
    fn test_extract_explode_skips_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut source = zip_source(&[("a/", b""), ("a/b/c.txt", b"c")]);
        let session = Session {
            style: Style::Verbose,
            explode: true,
            ..extract_session(temp_dir.path())
        };
        let (summary, out) = run(&session, &mut source);

        let summary = summary.unwrap();
        assert_eq!(out, "x a/b/c.txt 1 bytes\n");
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.extracted, 1);
        assert!(temp_dir.path().join("c.txt").is_file());
    }

    #[test]
    fn test_extract_json() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut source = zip_source(&[("x.txt", b"x"), ("y.txt", b"yy")]);
        let session = Session {
            style: Style::Json,
            ..extract_session(temp_dir.path())
        };
        let (_, out) = run(&session, &mut source);

        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[1]["name"], "y.txt");
    }

    #[test]
    fn test_extract_creates_dest_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dest = temp_dir.path().join("not/yet/there");
        let mut source = zip_source(&[("f", b"f")]);
        let (summary, _) = run(&extract_session(&dest), &mut source);

        summary.unwrap();
        assert!(dest.join("f").is_file());
    }

    /// Deletes the destination of one entry as soon as its content has been
    /// read, so restoring that file's mode fails after a complete write.
    struct UnlinkingSource {
        inner: FakeSource,
        name: &'static str,
        victim: PathBuf,
    }

    struct UnlinkOnEof<R> {
        reader: R,
        path: PathBuf,
    }

    impl<R: std::io::Read> std::io::Read for UnlinkOnEof<R> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.reader.read(buf)?;
            if n == 0 {
                let _ = fs::remove_file(&self.path);
            }
            Ok(n)
        }
    }

    impl EntrySource for UnlinkingSource {
        fn next_entry(&mut self) -> Result<Option<ArchiveEntry>, SourceError> {
            self.inner.next_entry()
        }

        fn largest_uncompressed_size(&mut self) -> Result<u64, SourceError> {
            self.inner.largest_uncompressed_size()
        }

        fn open(
            &mut self,
            entry: &ArchiveEntry,
        ) -> Result<Box<dyn std::io::Read + '_>, SourceError> {
            let unlink = entry.name == self.name;
            let path = self.victim.clone();
            let reader = self.inner.open(entry)?;
            if unlink {
                Ok(Box::new(UnlinkOnEof { reader, path }))
            } else {
                Ok(reader)
            }
        }
    }

    #[test]
    fn test_mode_restore_failure_is_logged_and_pass_continues() {
        let temp_dir = tempfile::tempdir().unwrap();
        let first = ArchiveEntry::new(0, "first", Some(S_IFREG | 0o600)).with_sizes(3, 3);
        let second = ArchiveEntry::new(1, "second", Some(S_IFREG | 0o644)).with_sizes(2, 2);
        let mut source = UnlinkingSource {
            inner: FakeSource::new(vec![(first, b"abc".to_vec()), (second, b"de".to_vec())]),
            name: "first",
            victim: temp_dir.path().join("first"),
        };
        let session = Session {
            style: Style::Verbose,
            ..extract_session(temp_dir.path())
        };

        let (summary, out) = run(&session, &mut source);

        let summary = summary.unwrap();
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.extracted, 2);
        assert_eq!(summary.bytes, 5);
        assert_eq!(out, "x first 3 bytes\nx second 2 bytes\n");
        assert_eq!(fs::read(temp_dir.path().join("second")).unwrap(), b"de");
    }

    #[test]
    fn test_size_mismatch_stops_the_pass() {
        let temp_dir = tempfile::tempdir().unwrap();
        let short = ArchiveEntry::new(0, "short", Some(S_IFREG | 0o644)).with_sizes(100, 100);
        let after = ArchiveEntry::new(1, "after", Some(S_IFREG | 0o644)).with_sizes(1, 1);
        let mut source = FakeSource::new(vec![(short, vec![0u8; 50]), (after, vec![1u8])]);

        let (result, _) = run(&extract_session(temp_dir.path()), &mut source);

        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("short"), "{message}");
        assert!(message.contains("100") && message.contains("50"), "{message}");
        assert!(!temp_dir.path().join("after").exists());
    }
}
