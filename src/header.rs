//! Zerocopy views of the 512-byte tar header block.
//!
//! A header block is decoded in place: [`Header`] is a transparent wrapper
//! around the raw bytes, and the historical layouts ([`OldHeader`],
//! [`UstarHeader`], [`GnuHeader`]) are reinterpretations of the same bytes.
//! [`decode`] turns one block into either [`Decoded::Zero`] (half of the
//! end-of-archive sentinel) or an owned [`HeaderRecord`].
//!
//! # Header Field Layout
//!
//! | Offset | Size | Field     | Encoding                                 |
//! |--------|------|-----------|------------------------------------------|
//! | 0      | 100  | name      | NUL-terminated unless exactly 100 bytes  |
//! | 100    | 8    | mode      | octal ASCII                              |
//! | 108    | 8    | uid       | octal ASCII                              |
//! | 116    | 8    | gid       | octal ASCII                              |
//! | 124    | 12   | size      | octal ASCII or GNU base-256              |
//! | 136    | 12   | mtime     | octal ASCII or GNU base-256              |
//! | 148    | 8    | checksum  | octal ASCII, spaces while computing      |
//! | 156    | 1    | typeflag  | see [`EntryType`]                        |
//! | 157    | 100  | linkname  | NUL-terminated unless exactly 100 bytes  |
//! | 257    | 6    | magic     | `"ustar\0"` or GNU `"ustar "`            |
//! | 263    | 2    | version   | `"00"` or GNU `" \0"`                    |
//! | 265    | 32   | uname     | NUL-terminated                           |
//! | 297    | 32   | gname     | NUL-terminated                           |
//! | 329    | 8    | devmajor  | octal ASCII                              |
//! | 337    | 8    | devminor  | octal ASCII                              |
//! | 345    | 155  | prefix    | ustar only: leading path components      |
//!
//! GNU headers reuse the prefix area for atime/ctime and sparse maps.
//!
//! # Example
//!
//! ```
//! use iter_tar::header::{decode, Decoded};
//!
//! let block = [0u8; 512];
//! assert!(matches!(decode(&block), Ok(Decoded::Zero)));
//! ```

use std::fmt;

use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Size of a tar block in bytes.
pub const HEADER_SIZE: usize = 512;

/// Magic string for ustar headers.
pub const USTAR_MAGIC: &[u8; 6] = b"ustar\0";

/// Version field for ustar headers.
pub const USTAR_VERSION: &[u8; 2] = b"00";

/// Magic string for GNU tar headers.
pub const GNU_MAGIC: &[u8; 6] = b"ustar ";

/// Version field for GNU tar headers.
pub const GNU_VERSION: &[u8; 2] = b" \0";

/// Byte range of the checksum field.
const CHECKSUM_RANGE: std::ops::Range<usize> = 148..156;

/// Errors produced while decoding a single header block.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// Fewer than 512 bytes were supplied.
    #[error("insufficient data: expected {HEADER_SIZE} bytes, got {0}")]
    InsufficientData(usize),

    /// A numeric field holds something other than octal digits and padding.
    #[error("invalid numeric field `{field}`: {bytes:?}")]
    InvalidNumeric {
        /// Name of the offending field.
        field: &'static str,
        /// Raw field contents.
        bytes: Vec<u8>,
    },
}

/// Result type for header decoding.
pub type Result<T> = std::result::Result<T, HeaderError>;

// ============================================================================
// Layout views
// ============================================================================

/// Pre-POSIX (v7) header. Bytes after `linkname` are undefined.
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct OldHeader {
    pub name: [u8; 100],
    pub mode: [u8; 8],
    pub uid: [u8; 8],
    pub gid: [u8; 8],
    pub size: [u8; 12],
    pub mtime: [u8; 12],
    pub checksum: [u8; 8],
    pub typeflag: u8,
    pub linkname: [u8; 100],
    pub pad: [u8; 255],
}

/// POSIX ustar header.
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct UstarHeader {
    pub name: [u8; 100],
    pub mode: [u8; 8],
    pub uid: [u8; 8],
    pub gid: [u8; 8],
    pub size: [u8; 12],
    pub mtime: [u8; 12],
    pub checksum: [u8; 8],
    pub typeflag: u8,
    pub linkname: [u8; 100],
    pub magic: [u8; 6],
    pub version: [u8; 2],
    pub uname: [u8; 32],
    pub gname: [u8; 32],
    pub devmajor: [u8; 8],
    pub devminor: [u8; 8],
    pub prefix: [u8; 155],
    pub pad: [u8; 12],
}

/// One GNU sparse map descriptor.
#[derive(Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct GnuSparseHeader {
    pub offset: [u8; 12],
    pub numbytes: [u8; 12],
}

/// GNU tar header. The ustar prefix area carries times and a sparse map.
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct GnuHeader {
    pub name: [u8; 100],
    pub mode: [u8; 8],
    pub uid: [u8; 8],
    pub gid: [u8; 8],
    pub size: [u8; 12],
    pub mtime: [u8; 12],
    pub checksum: [u8; 8],
    pub typeflag: u8,
    pub linkname: [u8; 100],
    pub magic: [u8; 6],
    pub version: [u8; 2],
    pub uname: [u8; 32],
    pub gname: [u8; 32],
    pub devmajor: [u8; 8],
    pub devminor: [u8; 8],
    pub atime: [u8; 12],
    pub ctime: [u8; 12],
    pub offset: [u8; 12],
    pub longnames: [u8; 4],
    pub unused: u8,
    pub sparse: [GnuSparseHeader; 4],
    pub isextended: u8,
    /// Logical size of a sparse file.
    pub realsize: [u8; 12],
    pub pad: [u8; 17],
}

/// Continuation block of a GNU sparse map, present while the previous
/// block's `isextended` is set.
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct GnuExtSparseHeader {
    pub sparse: [GnuSparseHeader; 21],
    pub isextended: u8,
    pub pad: [u8; 7],
}

impl GnuExtSparseHeader {
    #[must_use]
    pub fn from_block(block: &[u8; HEADER_SIZE]) -> &GnuExtSparseHeader {
        zerocopy::transmute_ref!(block)
    }
}

// ============================================================================
// Entry type and format
// ============================================================================

/// Classification of the typeflag byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// `'0'`, or NUL in pre-POSIX archives.
    Regular,
    /// `'1'`
    Link,
    /// `'2'`
    Symlink,
    /// `'3'`
    Char,
    /// `'4'`
    Block,
    /// `'5'`
    Directory,
    /// `'6'`
    Fifo,
    /// `'7'`, read as a regular file.
    Continuous,
    /// `'L'`: payload is the next entry's name.
    GnuLongName,
    /// `'K'`: payload is the next entry's link target.
    GnuLongLink,
    /// `'S'`
    GnuSparse,
    /// `'x'` (or Solaris `'X'`): PAX records for the next entry.
    XHeader,
    /// `'g'`: PAX records for every following entry.
    XGlobalHeader,
    /// Anything else. Still yielded as an entry.
    Other(u8),
}

impl EntryType {
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'0' | b'\0' => EntryType::Regular,
            b'1' => EntryType::Link,
            b'2' => EntryType::Symlink,
            b'3' => EntryType::Char,
            b'4' => EntryType::Block,
            b'5' => EntryType::Directory,
            b'6' => EntryType::Fifo,
            b'7' => EntryType::Continuous,
            b'L' => EntryType::GnuLongName,
            b'K' => EntryType::GnuLongLink,
            b'S' => EntryType::GnuSparse,
            b'x' | b'X' => EntryType::XHeader,
            b'g' => EntryType::XGlobalHeader,
            other => EntryType::Other(other),
        }
    }

    #[must_use]
    pub fn is_file(self) -> bool {
        matches!(self, EntryType::Regular | EntryType::Continuous)
    }

    #[must_use]
    pub fn is_dir(self) -> bool {
        self == EntryType::Directory
    }

    #[must_use]
    pub fn is_symlink(self) -> bool {
        self == EntryType::Symlink
    }

    #[must_use]
    pub fn is_hard_link(self) -> bool {
        self == EntryType::Link
    }

    /// Returns true for marker types whose payload describes the next entry
    /// rather than being an archive member.
    #[must_use]
    pub fn is_extension(self) -> bool {
        matches!(
            self,
            EntryType::GnuLongName
                | EntryType::GnuLongLink
                | EntryType::XHeader
                | EntryType::XGlobalHeader
        )
    }

    /// Returns true if the header's linkname field is meaningful.
    #[must_use]
    pub fn has_link_target(self) -> bool {
        matches!(self, EntryType::Link | EntryType::Symlink)
    }
}

impl From<u8> for EntryType {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

/// Which historical layout a header uses, detected from its magic field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeaderFormat {
    /// No recognizable magic; only the v7 fields are defined.
    Old,
    /// POSIX ustar (`"ustar\0"`).
    Ustar,
    /// GNU tar (`"ustar "` + `" \0"`).
    Gnu,
}

impl HeaderFormat {
    /// Returns true if uname/gname/devmajor/devminor are present.
    #[must_use]
    pub fn has_owner_names(self) -> bool {
        self != HeaderFormat::Old
    }
}

// ============================================================================
// Header wrapper
// ============================================================================

/// One raw header block with typed accessors.
#[derive(Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(transparent)]
pub struct Header {
    bytes: [u8; HEADER_SIZE],
}

impl Header {
    /// View a block as a header.
    #[must_use]
    pub fn from_block(block: &[u8; HEADER_SIZE]) -> &Header {
        zerocopy::transmute_ref!(block)
    }

    /// View the first 512 bytes of a slice as a header.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::InsufficientData`] if the slice is too short.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Header> {
        Header::ref_from_prefix(bytes)
            .map(|(header, _)| header)
            .map_err(|_| HeaderError::InsufficientData(bytes.len()))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; HEADER_SIZE] {
        &self.bytes
    }

    #[must_use]
    pub fn as_old(&self) -> &OldHeader {
        zerocopy::transmute_ref!(&self.bytes)
    }

    #[must_use]
    pub fn as_ustar(&self) -> &UstarHeader {
        zerocopy::transmute_ref!(&self.bytes)
    }

    #[must_use]
    pub fn as_gnu(&self) -> &GnuHeader {
        zerocopy::transmute_ref!(&self.bytes)
    }

    /// Two consecutive all-zero blocks end the archive.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    #[must_use]
    pub fn format(&self) -> HeaderFormat {
        let ustar = self.as_ustar();
        if ustar.magic == *USTAR_MAGIC {
            // Some writers leave the version field blank; the magic is enough.
            HeaderFormat::Ustar
        } else if ustar.magic == *GNU_MAGIC && ustar.version == *GNU_VERSION {
            HeaderFormat::Gnu
        } else {
            HeaderFormat::Old
        }
    }

    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        EntryType::from_byte(self.as_old().typeflag)
    }

    pub fn mode(&self) -> Result<u32> {
        numeric_u32("mode", &self.as_old().mode)
    }

    pub fn uid(&self) -> Result<u64> {
        numeric("uid", &self.as_old().uid)
    }

    pub fn gid(&self) -> Result<u64> {
        numeric("gid", &self.as_old().gid)
    }

    pub fn entry_size(&self) -> Result<u64> {
        numeric("size", &self.as_old().size)
    }

    /// Seconds since the epoch.
    pub fn mtime(&self) -> Result<i64> {
        let field = &self.as_old().mtime;
        numeric("mtime", field).and_then(|v| {
            i64::try_from(v).map_err(|_| HeaderError::InvalidNumeric {
                field: "mtime",
                bytes: field.to_vec(),
            })
        })
    }

    /// The checksum as written in the header.
    pub fn stored_checksum(&self) -> Result<u64> {
        parse_octal(&self.as_old().checksum).ok_or_else(|| HeaderError::InvalidNumeric {
            field: "checksum",
            bytes: self.as_old().checksum.to_vec(),
        })
    }

    /// Unsigned byte sum with the checksum field read as eight spaces.
    #[must_use]
    pub fn compute_checksum(&self) -> u64 {
        let (head, rest) = self.bytes.split_at(CHECKSUM_RANGE.start);
        let tail = &rest[CHECKSUM_RANGE.len()..];
        head.iter()
            .chain(tail)
            .map(|&b| u64::from(b))
            .sum::<u64>()
            + 8 * u64::from(b' ')
    }

    /// Signed byte sum, as produced by some historical writers.
    #[must_use]
    pub fn compute_signed_checksum(&self) -> i64 {
        let (head, rest) = self.bytes.split_at(CHECKSUM_RANGE.start);
        let tail = &rest[CHECKSUM_RANGE.len()..];
        head.iter()
            .chain(tail)
            .map(|&b| i64::from(b as i8))
            .sum::<i64>()
            + 8 * i64::from(b' ')
    }

    /// Compare the stored checksum against both sum interpretations.
    ///
    /// Returns the stored value and whether it matched.
    pub fn checksum_matches(&self) -> Result<(u64, bool)> {
        let stored = self.stored_checksum()?;
        let matched = stored == self.compute_checksum()
            || i64::try_from(stored).is_ok_and(|s| s == self.compute_signed_checksum());
        Ok((stored, matched))
    }

    /// The 100-byte name field only; see [`Header::full_name`].
    #[must_use]
    pub fn name_bytes(&self) -> &[u8] {
        truncate_null(&self.as_old().name)
    }

    #[must_use]
    pub fn link_name_bytes(&self) -> &[u8] {
        truncate_null(&self.as_old().linkname)
    }

    /// The ustar prefix, if this is a ustar header with a non-empty prefix.
    #[must_use]
    pub fn prefix(&self) -> Option<&[u8]> {
        if self.format() != HeaderFormat::Ustar {
            return None;
        }
        Some(truncate_null(&self.as_ustar().prefix)).filter(|p| !p.is_empty())
    }

    /// Name with the ustar prefix joined in front.
    #[must_use]
    pub fn full_name(&self) -> Vec<u8> {
        match self.prefix() {
            Some(prefix) => {
                let mut name = prefix.to_vec();
                name.push(b'/');
                name.extend_from_slice(self.name_bytes());
                name
            }
            None => self.name_bytes().to_vec(),
        }
    }

    #[must_use]
    pub fn username(&self) -> Option<&[u8]> {
        self.format()
            .has_owner_names()
            .then(|| truncate_null(&self.as_ustar().uname))
    }

    #[must_use]
    pub fn groupname(&self) -> Option<&[u8]> {
        self.format()
            .has_owner_names()
            .then(|| truncate_null(&self.as_ustar().gname))
    }

    pub fn device_major(&self) -> Result<Option<u32>> {
        if !self.format().has_owner_names() {
            return Ok(None);
        }
        numeric_u32("devmajor", &self.as_ustar().devmajor).map(Some)
    }

    pub fn device_minor(&self) -> Result<Option<u32>> {
        if !self.format().has_owner_names() {
            return Ok(None);
        }
        numeric_u32("devminor", &self.as_ustar().devminor).map(Some)
    }

    /// Logical size of an old-style GNU sparse file (`'S'` entries only).
    pub fn gnu_real_size(&self) -> Result<Option<u64>> {
        if self.format() != HeaderFormat::Gnu || self.entry_type() != EntryType::GnuSparse {
            return Ok(None);
        }
        numeric("realsize", &self.as_gnu().realsize).map(Some)
    }

    /// True if GNU sparse-map continuation blocks follow this header.
    #[must_use]
    pub fn has_sparse_extension(&self) -> bool {
        self.format() == HeaderFormat::Gnu
            && self.entry_type() == EntryType::GnuSparse
            && self.as_gnu().isextended != 0
    }

    /// Decode every field into an owned record.
    ///
    /// A checksum mismatch is not an error here; it is reported through
    /// [`HeaderRecord::checksum_valid`] so the caller can pick a policy.
    pub fn record(&self) -> Result<HeaderRecord> {
        let (stored_checksum, checksum_valid) = self.checksum_matches()?;
        Ok(HeaderRecord {
            format: self.format(),
            entry_type: self.entry_type(),
            name: self.full_name(),
            link_name: self.link_name_bytes().to_vec(),
            mode: self.mode()?,
            uid: self.uid()?,
            gid: self.gid()?,
            size: self.entry_size()?,
            mtime: self.mtime()?,
            stored_checksum,
            computed_checksum: self.compute_checksum(),
            checksum_valid,
            uname: self.username().map(<[u8]>::to_vec),
            gname: self.groupname().map(<[u8]>::to_vec),
            dev_major: self.device_major()?,
            dev_minor: self.device_minor()?,
            gnu_real_size: self.gnu_real_size()?,
            sparse_extended: self.has_sparse_extension(),
        })
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("name", &String::from_utf8_lossy(self.name_bytes()))
            .field("entry_type", &self.entry_type())
            .field("size", &self.entry_size().ok())
            .field("mode", &self.mode().ok().map(|m| format!("{m:04o}")))
            .field("format", &self.format())
            .finish()
    }
}

/// Fully decoded header fields, before any extension overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    pub format: HeaderFormat,
    pub entry_type: EntryType,
    /// Name with the ustar prefix applied.
    pub name: Vec<u8>,
    pub link_name: Vec<u8>,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub size: u64,
    pub mtime: i64,
    pub stored_checksum: u64,
    pub computed_checksum: u64,
    pub checksum_valid: bool,
    pub uname: Option<Vec<u8>>,
    pub gname: Option<Vec<u8>>,
    pub dev_major: Option<u32>,
    pub dev_minor: Option<u32>,
    pub gnu_real_size: Option<u64>,
    /// GNU sparse-map continuation blocks sit between this header and the
    /// payload.
    pub sparse_extended: bool,
}

/// Outcome of decoding one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// An all-zero block.
    Zero,
    Header(HeaderRecord),
}

/// Decode one 512-byte block.
///
/// # Errors
///
/// Returns [`HeaderError::InvalidNumeric`] if any numeric field, including
/// the stored checksum, is malformed.
pub fn decode(block: &[u8; HEADER_SIZE]) -> Result<Decoded> {
    let header = Header::from_block(block);
    if header.is_zero() {
        return Ok(Decoded::Zero);
    }
    header.record().map(Decoded::Header)
}

// ============================================================================
// Field helpers
// ============================================================================

/// Parse an octal ASCII field.
///
/// Leading spaces are skipped and the digits end at the first space or NUL.
/// An empty field is zero. Returns `None` on any other byte or on overflow.
#[must_use]
pub fn parse_octal(bytes: &[u8]) -> Option<u64> {
    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    let digits = &bytes[start..];
    let end = digits
        .iter()
        .position(|&b| b == b' ' || b == b'\0')
        .unwrap_or(digits.len());

    digits[..end].iter().try_fold(0u64, |acc, &b| {
        if !(b'0'..=b'7').contains(&b) {
            return None;
        }
        acc.checked_mul(8)?.checked_add(u64::from(b - b'0'))
    })
}

/// Parse a numeric field that may be octal or GNU base-256.
///
/// Base-256 is flagged by the high bit of the first byte; the remaining
/// bits form a big-endian integer.
#[must_use]
pub fn parse_numeric(bytes: &[u8]) -> Option<u64> {
    match bytes.first() {
        Some(&first) if first & 0x80 != 0 => {
            // 0xff marks a negative value, which no field here accepts.
            if first == 0xff {
                return None;
            }
            bytes[1..].iter().try_fold(u64::from(first & 0x7f), |acc, &b| {
                acc.checked_mul(256)?.checked_add(u64::from(b))
            })
        }
        _ => parse_octal(bytes),
    }
}

fn numeric(field: &'static str, bytes: &[u8]) -> Result<u64> {
    parse_numeric(bytes).ok_or_else(|| HeaderError::InvalidNumeric {
        field,
        bytes: bytes.to_vec(),
    })
}

fn numeric_u32(field: &'static str, bytes: &[u8]) -> Result<u32> {
    numeric(field, bytes).and_then(|v| {
        u32::try_from(v).map_err(|_| HeaderError::InvalidNumeric {
            field,
            bytes: bytes.to_vec(),
        })
    })
}

/// Cut a fixed-width string field at its first NUL.
#[must_use]
pub fn truncate_null(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(pos) => &bytes[..pos],
        None => bytes,
    }
}
