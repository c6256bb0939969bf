//! Command-line argument parsing
//!
//! Defines the tar(1)-style CLI of zipar using clap: one operation (`-t` to list,
//! `-x` to extract), the archive named with `-f`, and optional name prefixes
//! restricting which entries are processed.
//!
//! # Examples
//!
//! ```
//! use zipar::Args;
//! use zipar::args::Mode;
//! use clap::Parser;
//!
//! let args = Args::parse_from(["zipar", "-x", "-f", "site.zip", "-C", "/srv", "assets/"]);
//! assert_eq!(args.mode().unwrap(), Mode::Extract);
//! assert_eq!(args.prefixes, ["assets/"]);
//! ```

use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;

/// A tar(1)-esque lister and extractor for Zip files
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Examples:
  zipar -tf archive.zip                List the contents of archive.zip
  zipar -tvf archive.zip               List with sizes, modes and dates
  zipar -t -j -f archive.zip           List as a JSON array
  zipar -xf archive.zip                Extract into the current directory
  zipar -xf archive.zip -C /tmp/out    Extract into /tmp/out
  zipar -xef archive.zip               Extract without directory structure
  zipar -xf archive.zip src/ docs/     Extract entries starting with src/ or docs/")]
pub struct Args {
    /// List the contents of the archive
    #[arg(short = 't', long = "toc", conflicts_with = "extract")]
    pub toc: bool,

    /// Extract entries from the archive
    #[arg(short = 'x', long = "extract")]
    pub extract: bool,

    /// Archive to operate on
    #[arg(short = 'f', long = "file", value_name = "ARCHIVE", required = true)]
    pub file: PathBuf,

    /// Directory to place extracted entries into
    #[arg(short = 'C', long = "chdir", value_name = "DIR", default_value = ".")]
    pub chdir: PathBuf,

    /// Verbose listing and extraction
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Drop the archive's directory hierarchy when extracting
    #[arg(short = 'e', long = "explode")]
    pub explode: bool,

    /// Emit a JSON array instead of text
    #[arg(short = 'j', long = "json")]
    pub json: bool,

    /// Only process entries whose names start with one of these prefixes
    #[arg(value_name = "PREFIX")]
    pub prefixes: Vec<String>,
}

/// Top-level operation of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    List,
    Extract,
}

impl Args {
    /// The selected operation. There is no default: one of `-t` or `-x` is
    /// required.
    pub fn mode(&self) -> Result<Mode> {
        match (self.toc, self.extract) {
            (true, false) => Ok(Mode::List),
            (false, true) => Ok(Mode::Extract),
            (true, true) => bail!("-t and -x are mutually exclusive"),
            (false, false) => bail!("no operation specified; use -t to list or -x to extract"),
        }
    }
}
