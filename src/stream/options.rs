//! Parser configuration.

/// Resource limits for metadata read into memory.
///
/// Extension payloads (GNU long names, PAX records) are buffered whole before
/// the entry they describe is yielded, so an untrusted archive could
/// otherwise claim gigabytes of "name".
///
/// ```
/// use iter_tar::stream::Limits;
///
/// let limits = Limits {
///     max_path_len: 1024,
///     ..Default::default()
/// };
/// assert_eq!(limits.max_pending_entries, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum resolved name or link target length. Default 4096.
    pub max_path_len: usize,

    /// Maximum size of one PAX payload. Default 1 MiB.
    pub max_pax_size: u64,

    /// Maximum size of one GNU long name/link payload. Default 4096.
    pub max_gnu_long_size: u64,

    /// Maximum number of extension markers before one real entry. Default 16.
    pub max_pending_entries: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_path_len: 4096,
            max_pax_size: 1024 * 1024,
            max_gnu_long_size: 4096,
            max_pending_entries: 16,
        }
    }
}

impl Limits {
    /// Limits that effectively disable the checks, for trusted input.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            max_path_len: usize::MAX,
            max_pax_size: u64::MAX,
            max_gnu_long_size: u64::MAX,
            max_pending_entries: usize::MAX,
        }
    }

    /// Conservative limits for untrusted input.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_path_len: 1024,
            max_pax_size: 64 * 1024,
            max_gnu_long_size: 1024,
            max_pending_entries: 8,
        }
    }
}

/// Options for [`TarStreamParser`](super::TarStreamParser).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    pub limits: Limits,

    /// Fail with `ChecksumMismatch` on a bad header checksum. When disabled,
    /// the entry is yielded with `checksum_valid == false` and bad extension
    /// markers are skipped. Default `true`.
    pub verify_checksums: bool,

    /// Report a stream that ends on a block boundary without the
    /// end-of-archive sentinel as `TruncatedArchive`. Default `false`.
    pub require_end_marker: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            verify_checksums: true,
            require_end_marker: false,
        }
    }
}

impl ParseOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    #[must_use]
    pub fn require_end_marker(mut self, require: bool) -> Self {
        self.require_end_marker = require;
        self
    }
}
