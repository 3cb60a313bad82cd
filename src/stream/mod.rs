//! Sequential tar reader with transparent GNU and PAX extension handling.
//!
//! [`TarStreamParser`] walks an archive forward, one header at a time, and
//! yields only "actual" entries. Extension markers are folded into the entry
//! that follows them:
//!
//! - **GNU long name (type 'L')**: replaces the next entry's name
//! - **GNU long link (type 'K')**: replaces the next entry's link target
//! - **PAX extended headers (type 'x')**: key-value overrides for one entry
//! - **PAX global headers (type 'g')**: defaults for all later entries
//!
//! Each [`Entry`] carries its resolved [`EntryMeta`] and a [`PayloadView`]
//! bounded to the entry's data. Unread payload is skipped automatically on
//! the next call to [`TarStreamParser::next_entry`].
//!
//! # Security
//!
//! Sizes and counts taken from headers are capped by [`Limits`]:
//!
//! - Maximum path length
//! - Maximum PAX extension size
//! - Maximum GNU long name/link size
//! - Maximum consecutive metadata entries
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::BufReader;
//! use iter_tar::stream::{ParseOptions, TarStreamParser};
//!
//! let file = BufReader::new(File::open("archive.tar")?);
//! let mut parser = TarStreamParser::with_options(file, ParseOptions::new());
//!
//! while let Some(mut entry) = parser.next_entry()? {
//!     if entry.meta().is_file() {
//!         let data = entry.read_to_vec()?;
//!         println!("{}: {} bytes", entry.path_lossy(), data.len());
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod block;
mod entry;
mod error;
mod options;
mod parser;
mod pending;

pub use entry::{Entry, EntryMeta, PayloadView};
pub use error::{Result, StreamError};
pub use options::{Limits, ParseOptions};
pub use parser::{ArchiveEnd, TarStreamParser};
