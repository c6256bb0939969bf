//! A tar(1)-esque lister and extractor for Zip files

pub mod args;
pub mod entry;
pub mod extract;
pub mod linux;
pub mod list;
pub mod session;
pub mod source;
pub mod utils;

pub use args::Args;
pub use extract::Extractor;
pub use session::{Session, Summary};
pub use source::{EntrySource, ZipSource};
pub use utils::{accepts, format_size};
