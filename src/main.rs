//! zipar - a tar(1)-esque program for Zip files
//!
//! # Overview
//!
//! `zipar -t` lists the entries of an archive and `zipar -x` extracts them,
//! optionally restricted to names starting with the given prefixes. Output is
//! plain, verbose (`-v`) or a JSON array (`-j`).
//!
//! # Architecture
//!
//! The main entry point handles:
//! 1. CLI argument parsing and logger setup
//! 2. Opening the archive, memory-mapping it when it is larger than 1MB
//! 3. Running one [`Session`] pass over the archive's entries
//!
//! Every fatal error is reported as a single line on stderr and the process
//! exits with status 1.

use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek};
use std::process::ExitCode;
use zip::ZipArchive;

use zipar::args::Args;
use zipar::linux::{advise_archive, madvise_sequential};
use zipar::session::Session;
use zipar::source::ZipSource;

/// Archives above this size are memory-mapped
const MMAP_THRESHOLD: u64 = 1024 * 1024;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("zipar: {:#}", err);
            ExitCode::FAILURE
        },
    }
}

fn run(args: &Args) -> Result<()> {
    // Resolve the mode before touching the archive
    let session = Session::from_args(args)?;

    let file = File::open(&args.file)
        .with_context(|| format!("failed to open {}", args.file.display()))?;
    let file_size = advise_archive(&file)?;

    if file_size > MMAP_THRESHOLD {
        // SAFETY: the mapping is read-only and lives for the whole pass
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("failed to map {}", args.file.display()))?;
        madvise_sequential(mmap.as_ptr(), mmap.len());
        run_pass(&session, Cursor::new(&mmap[..]), args)
    } else {
        run_pass(&session, file, args)
    }
}

fn run_pass<R: Read + Seek>(session: &Session, reader: R, args: &Args) -> Result<()> {
    let archive = ZipArchive::new(reader)
        .with_context(|| format!("failed to open {}", args.file.display()))?;
    let mut source = ZipSource::new(archive);
    log::debug!("{}: {} entries", args.file.display(), source.len());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = session.run(&mut source, &mut out)?;
    log::debug!("{:?}", summary);
    Ok(())
}
