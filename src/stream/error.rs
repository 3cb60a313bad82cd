//! Error types for tar stream parsing.

use std::io;

use thiserror::Error;

use crate::header::HeaderError;
use crate::pax::PaxError;

/// Errors that stop iteration over an archive.
///
/// Every variant is fatal: once one is returned the parser is poisoned and
/// later calls yield [`StreamError::Poisoned`]. Header offsets depend on all
/// bytes consumed so far, so nothing after a bad header can be trusted.
#[derive(Debug, Error)]
pub enum StreamError {
    /// I/O error from the underlying reader.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream ended inside a block, inside a payload, or (when the end
    /// marker is required) without the two-zero-block sentinel.
    #[error("truncated archive at offset {pos}")]
    TruncatedArchive {
        /// Stream offset where data ran out.
        pos: u64,
    },

    /// Header checksum does not match either the signed or unsigned sum.
    #[error("checksum mismatch in header at offset {pos} ({path:?}): stored {stored}, computed {computed}")]
    ChecksumMismatch {
        /// Offset of the header block.
        pos: u64,
        /// Name field of the offending header, lossily decoded.
        path: String,
        /// Checksum stored in the header.
        stored: u64,
        /// Unsigned checksum computed from the block.
        computed: u64,
    },

    /// A numeric header field holds bytes that are neither octal digits
    /// nor padding.
    #[error("malformed field `{field}` in header at offset {pos}: {bytes:?}")]
    MalformedField {
        /// Offset of the header block.
        pos: u64,
        /// Field name.
        field: &'static str,
        /// Raw field contents.
        bytes: Vec<u8>,
    },

    /// A PAX value cannot be read as the type its key requires.
    #[error("unsupported encoding for PAX key `{key}`: {value:?}")]
    UnsupportedEncoding {
        /// The PAX key.
        key: String,
        /// The value, lossily decoded.
        value: String,
    },

    /// A PAX payload is not a sequence of well-formed records.
    #[error("malformed PAX header at offset {pos}: {source}")]
    Pax {
        /// Offset of the PAX marker header.
        pos: u64,
        #[source]
        source: PaxError,
    },

    /// Path exceeds configured maximum length.
    #[error("path exceeds limit: {len} bytes > {limit} bytes")]
    PathTooLong {
        /// Actual path length.
        len: usize,
        /// Configured limit.
        limit: usize,
    },

    /// PAX extended header exceeds configured maximum size.
    #[error("PAX header exceeds limit: {size} bytes > {limit} bytes")]
    PaxTooLarge {
        /// Actual PAX header size.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// GNU long name/link exceeds configured maximum size.
    #[error("GNU long name/link exceeds limit: {size} bytes > {limit} bytes")]
    GnuLongTooLarge {
        /// Actual GNU long name/link size.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Too many consecutive metadata entries before a real entry.
    #[error("too many pending metadata entries: {count} > {limit}")]
    TooManyPendingEntries {
        /// Number of pending metadata entries.
        count: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Entry size cannot be padded to a block boundary without overflow.
    #[error("invalid entry size: {0}")]
    InvalidSize(u64),

    /// Metadata entries (GNU long name, PAX) with no entry after them.
    #[error("metadata entries without a following actual entry")]
    OrphanedMetadata,

    /// A previous call already failed.
    #[error("tar stream already failed")]
    Poisoned,
}

impl StreamError {
    /// Attach the header offset to a decoder error.
    pub(crate) fn from_header(err: HeaderError, pos: u64) -> Self {
        match err {
            HeaderError::InsufficientData(_) => StreamError::TruncatedArchive { pos },
            HeaderError::InvalidNumeric { field, bytes } => {
                StreamError::MalformedField { pos, field, bytes }
            }
        }
    }

    pub(crate) fn unsupported(key: &str, value: &[u8]) -> Self {
        StreamError::UnsupportedEncoding {
            key: key.to_owned(),
            value: String::from_utf8_lossy(value).into_owned(),
        }
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Io(e) => e,
            e @ StreamError::TruncatedArchive { .. } => {
                io::Error::new(io::ErrorKind::UnexpectedEof, e)
            }
            e => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

/// Result type for stream parsing operations.
pub type Result<T> = std::result::Result<T, StreamError>;
