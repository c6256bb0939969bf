//! Listing output
//!
//! Renders one [`ArchiveEntry`] at a time as a plain name, a verbose
//! column-aligned line, or a pretty-printed JSON object. JSON objects are framed
//! into a single array by [`JsonArray`].

use serde::Serialize;
use std::io::{self, Write};

use crate::entry::{ArchiveEntry, format_mode};

/// Width of a blank timestamp column
const BLANK_TIMESTAMP: &str = "                   ";

/// How entries are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Plain,
    Verbose,
    Json,
}

impl Style {
    /// JSON takes precedence over verbose output.
    pub fn new(verbose: bool, json: bool) -> Self {
        match (verbose, json) {
            (_, true) => Style::Json,
            (true, false) => Style::Verbose,
            (false, false) => Style::Plain,
        }
    }
}

/// One rendered entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRecord {
    /// A text line, without its trailing newline
    Line(String),
    /// A pretty-printed JSON object
    Json(String),
}

/// JSON projection of an entry
#[derive(Debug, Serialize)]
struct EntryRecord<'a> {
    name: &'a str,
    size: u64,
    compressed_size: u64,
    method: &'a str,
    mode: String,
    permissions: String,
    modified: Option<String>,
    directory: bool,
}

impl<'a> From<&'a ArchiveEntry> for EntryRecord<'a> {
    fn from(entry: &'a ArchiveEntry) -> Self {
        Self {
            name: &entry.name,
            size: entry.uncompressed_size,
            compressed_size: entry.compressed_size,
            method: entry.method.as_str(),
            mode: format!("{:04o}", entry.permissions()),
            permissions: format_mode(entry.mode),
            modified: entry.modified.map(|ts| ts.to_string()),
            directory: entry.is_dir,
        }
    }
}

/// Column width for sizes: the number of digits of the largest size
pub fn column_width(largest: u64) -> usize {
    largest.to_string().len()
}

/// Render an entry for a listing.
///
/// `column_width` is only used by [`Style::Verbose`]; it is fixed for the whole
/// listing so every size lines up regardless of the entry's own size.
pub fn render(
    entry: &ArchiveEntry,
    style: Style,
    column_width: usize,
) -> Result<OutputRecord, serde_json::Error> {
    match style {
        Style::Plain => Ok(OutputRecord::Line(entry.name.clone())),
        Style::Verbose => Ok(OutputRecord::Line(format!(
            "{} {}",
            verbose_prefix(entry, column_width),
            entry.name
        ))),
        Style::Json => to_json(entry),
    }
}

/// Render the per-entry annotation printed while extracting.
///
/// Plain extraction is silent.
pub fn render_extracted(
    entry: &ArchiveEntry,
    style: Style,
) -> Result<Option<OutputRecord>, serde_json::Error> {
    match style {
        Style::Plain => Ok(None),
        Style::Verbose if entry.is_dir => {
            Ok(Some(OutputRecord::Line(format!("x {} directory", entry.name))))
        },
        Style::Verbose => Ok(Some(OutputRecord::Line(format!(
            "x {} {} bytes",
            entry.name, entry.uncompressed_size
        )))),
        Style::Json => to_json(entry).map(Some),
    }
}

fn to_json(entry: &ArchiveEntry) -> Result<OutputRecord, serde_json::Error> {
    serde_json::to_string_pretty(&EntryRecord::from(entry)).map(OutputRecord::Json)
}

fn verbose_prefix(entry: &ArchiveEntry, width: usize) -> String {
    // Normalise so near-zero negatives do not print as "-0"
    let ratio = entry.compression_ratio().round();
    let ratio = if ratio == 0.0 { 0.0 } else { ratio };
    let modified = entry
        .modified
        .map(|ts| ts.to_string())
        .unwrap_or_else(|| BLANK_TIMESTAMP.to_string());

    format!(
        "{:>width$} {}:{:.0}% {:>10} {}",
        entry.uncompressed_size,
        entry.method,
        ratio,
        format_mode(entry.mode),
        modified,
        width = width
    )
}

/// Streams JSON objects as the elements of one array
pub struct JsonArray<W: Write> {
    out: W,
    count: usize,
}

impl<W: Write> JsonArray<W> {
    /// Write the opening bracket.
    pub fn begin(mut out: W) -> io::Result<Self> {
        writeln!(out, "[")?;
        Ok(Self { out, count: 0 })
    }

    /// Write one object, separated from the previous one by a comma.
    pub fn push(&mut self, object: &str) -> io::Result<()> {
        if self.count > 0 {
            writeln!(self.out, ",")?;
        }
        write!(self.out, "{}", object)?;
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Write the closing bracket and hand back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.count > 0 {
            writeln!(self.out)?;
        }
        writeln!(self.out, "]")?;
        self.out.flush()?;
        Ok(self.out)
    }
}
