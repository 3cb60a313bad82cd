//! Forward-only, read-only decoding of tar archives.
//!
//! The crate reads POSIX ustar, GNU and pre-POSIX (v7) archives from any
//! [`std::io::Read`] source without seeking. GNU long names and links, PAX
//! extended and global headers are merged into the entries they describe.
//!
//! - [`header`]: zerocopy views of the 512-byte header block and field
//!   decoding.
//! - [`pax`]: PAX extended header records.
//! - [`stream`]: the entry iterator built on top of both.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//!
//! // An empty archive: just the end-of-archive sentinel.
//! let archive = vec![0u8; 1024];
//! let mut entries = iter_tar::iter_tar(Cursor::new(archive));
//! assert!(entries.next_entry()?.is_none());
//! assert_eq!(entries.archive_end(), Some(iter_tar::ArchiveEnd::Sentinel));
//! # Ok::<(), iter_tar::StreamError>(())
//! ```

use std::io::Read;

pub mod header;
pub mod pax;
pub mod stream;

pub use header::{EntryType, HeaderFormat};
pub use stream::{
    ArchiveEnd, Entry, EntryMeta, Limits, ParseOptions, PayloadView, StreamError,
    TarStreamParser,
};

/// Start iterating over the archive in `reader` with default options.
pub fn iter_tar<R: Read>(reader: R) -> TarStreamParser<R> {
    TarStreamParser::new(reader)
}
