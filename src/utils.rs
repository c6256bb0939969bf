//! Selection filtering and small formatting helpers
//!
//! Provides shared helper functions used across the zipar codebase:
//! - Prefix-based entry selection
//! - Human-readable size formatting
//! - Timestamp conversion from archive to filesystem times
//!
//! # Selection
//!
//! Entries are selected by literal name prefix. There is no glob syntax and no
//! awareness of path segments: the prefix `foo` selects `foo/bar.txt` and also
//! `foobar/x`. An empty prefix list selects every entry.
//!
//! # Examples
//!
//! ```
//! use zipar::{accepts, format_size};
//! use zipar::entry::ArchiveEntry;
//!
//! assert_eq!(format_size(1024), "1.0K");
//!
//! let entry = ArchiveEntry::new(0, "docs/readme.txt", None);
//! assert!(accepts(&entry, &[]));
//! assert!(accepts(&entry, &["docs/".to_string()]));
//! assert!(!accepts(&entry, &["src/".to_string()]));
//! ```

use filetime::FileTime;

use crate::entry::{ArchiveEntry, Timestamp};

/// Format a byte size as a human-readable string with appropriate units.
///
/// # Examples
///
/// ```
/// use zipar::format_size;
///
/// assert_eq!(format_size(512), "512B");
/// assert_eq!(format_size(1536 * 1024), "1.5M");
/// ```
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.1}G", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.1}M", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.1}K", size as f64 / KB as f64)
    } else {
        format!("{}B", size)
    }
}

/// Decide whether an entry is selected by the given name prefixes.
///
/// Returns `true` when `criteria` is empty, otherwise `true` iff the entry's
/// name starts with at least one of the prefixes.
pub fn accepts(entry: &ArchiveEntry, criteria: &[String]) -> bool {
    PrefixFilter::new(criteria).accepts(entry)
}

/// Reusable prefix selection over an ordered list of criteria
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefixFilter {
    prefixes: Vec<String>,
}

impl PrefixFilter {
    pub fn new(prefixes: &[String]) -> Self {
        Self {
            prefixes: prefixes.to_vec(),
        }
    }

    /// True when the filter selects every entry
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn accepts(&self, entry: &ArchiveEntry) -> bool {
        self.accepts_name(&entry.name)
    }

    pub fn accepts_name(&self, name: &str) -> bool {
        self.is_empty() || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// Convert an archive timestamp to a [`FileTime`] for `filetime::set_file_mtime`.
///
/// Archive times carry no zone; they are taken as UTC.
pub fn timestamp_to_filetime(ts: Timestamp) -> FileTime {
    let days = days_from_date(ts.year as i32, ts.month as i32, ts.day as i32);
    let secs =
        days * 86400 + (ts.hour as i64) * 3600 + (ts.minute as i64) * 60 + (ts.second as i64);

    FileTime::from_unix_time(secs, 0)
}

/// Calculate days from date using Howard Hinnant's algorithm
fn days_from_date(year: i32, month: i32, day: i32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u32;
    let doy =
        (153 * (if month > 2 { month - 3 } else { month + 9 }) as u32 + 2) / 5 + day as u32 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    (era as i64) * 146097 + (doe as i64) - 719468
}
