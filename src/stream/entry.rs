//! Resolved entries and their bounded payload views.

use std::borrow::Cow;
use std::io::{self, Read, Seek, SeekFrom};

use crate::header::{EntryType, HeaderFormat, HEADER_SIZE};
use crate::pax::PaxMap;

use super::block::BlockReader;
use super::error::StreamError;

/// Metadata of one archive member, with every extension applied.
///
/// The name comes from PAX `GNU.sparse.name` if present, otherwise from
/// whichever of GNU long name and PAX `path` arrived last, otherwise from a
/// global `path`, otherwise from ustar `prefix/name`. The link target is
/// resolved the same way from GNU long link and PAX `linkpath`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// Full path as stored in the archive.
    pub name: Vec<u8>,

    /// Payload length in bytes, without block padding.
    pub size: u64,

    /// Permission bits as written in the header.
    pub mode: u32,

    pub uid: u64,
    pub gid: u64,

    /// Modification time, whole seconds since the epoch. Negative values
    /// come only from PAX `mtime` records.
    pub mtime: i64,

    /// Sub-second part of a PAX `mtime`, always counted forward from
    /// `mtime`; zero otherwise.
    pub mtime_nsec: u32,

    pub entry_type: EntryType,

    /// Present only for hard and symbolic links.
    pub link_target: Option<Vec<u8>>,

    /// Owner name; `None` for pre-POSIX headers without a PAX override.
    pub uname: Option<Vec<u8>>,

    /// Group name; `None` for pre-POSIX headers without a PAX override.
    pub gname: Option<Vec<u8>>,

    pub dev_major: Option<u32>,
    pub dev_minor: Option<u32>,

    pub format: HeaderFormat,

    /// Whether the header's stored checksum matched. Always true unless
    /// checksum verification was disabled.
    pub checksum_valid: bool,

    /// Stream offset of this entry's header block.
    pub header_offset: u64,

    /// Stream offset of the first payload byte.
    pub data_offset: u64,

    /// Every PAX record that applied to this entry, globals included.
    pub pax: PaxMap,

    /// Logical size of a sparse file, from a GNU `'S'` header or PAX
    /// `GNU.sparse.realsize`/`GNU.sparse.size`.
    pub sparse_real_size: Option<u64>,
}

impl EntryMeta {
    #[must_use]
    pub fn path_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    #[must_use]
    pub fn link_target_lossy(&self) -> Option<Cow<'_, str>> {
        self.link_target
            .as_ref()
            .map(|t| String::from_utf8_lossy(t))
    }

    /// Raw value of a PAX record that applied to this entry.
    #[must_use]
    pub fn pax_value(&self, key: &str) -> Option<&[u8]> {
        self.pax.get(key).map(Vec::as_slice)
    }

    /// Payload size rounded up to the block size, as laid out on the wire.
    #[must_use]
    pub fn padded_size(&self) -> u64 {
        self.size.next_multiple_of(HEADER_SIZE as u64)
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.entry_type.is_file()
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.entry_type.is_dir()
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.entry_type.is_symlink()
    }

    #[must_use]
    pub fn is_hard_link(&self) -> bool {
        self.entry_type.is_hard_link()
    }

    #[must_use]
    pub fn is_char_device(&self) -> bool {
        self.entry_type == EntryType::Char
    }

    #[must_use]
    pub fn is_block_device(&self) -> bool {
        self.entry_type == EntryType::Block
    }

    #[must_use]
    pub fn is_fifo(&self) -> bool {
        self.entry_type == EntryType::Fifo
    }

    #[must_use]
    pub fn is_sparse(&self) -> bool {
        self.entry_type == EntryType::GnuSparse || self.sparse_real_size.is_some()
    }
}

/// A read-only cursor over one entry's payload.
///
/// Reads never go past `size` bytes from the payload start. Padding is left
/// for the parser, which also skips whatever the caller did not read.
#[derive(Debug)]
pub struct PayloadView<'a, R> {
    reader: &'a mut BlockReader<R>,
    remaining: &'a mut u64,
    size: u64,
}

impl<'a, R: Read> PayloadView<'a, R> {
    pub(crate) fn new(reader: &'a mut BlockReader<R>, remaining: &'a mut u64) -> Self {
        let size = *remaining;
        Self {
            reader,
            remaining,
            size,
        }
    }

    /// Total payload length.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        *self.remaining
    }

    /// Bytes already read, relative to the payload start.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.size - *self.remaining
    }

    /// Read the rest of the payload into a new buffer.
    pub fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        // Cap the up-front reservation; size comes from an untrusted header.
        let mut buf = Vec::with_capacity(self.remaining().min(1 << 20) as usize);
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read> Read for PayloadView<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if *self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = (*self.remaining).min(buf.len() as u64) as usize;
        let n = self.reader.read_some(&mut buf[..max])?;
        if n == 0 {
            return Err(StreamError::TruncatedArchive {
                pos: self.reader.position(),
            }
            .into());
        }
        *self.remaining -= n as u64;
        Ok(n)
    }
}

/// Forward-only seeking within the payload. Targets past the end stop at
/// the end; targets before the current position fail with `InvalidInput`.
impl<R: Read> Seek for PayloadView<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let current = self.position();
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => current.checked_add_signed(delta),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
        };
        let target = match target {
            Some(target) if target >= current => target.min(self.size),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "cannot seek backwards in a tar stream",
                ))
            }
        };
        let skip = target - current;
        self.reader.skip(skip)?;
        *self.remaining -= skip;
        Ok(target)
    }
}

/// One archive member: resolved metadata plus a view of its payload.
///
/// The entry mutably borrows the parser, so it must be dropped before the
/// next call to [`TarStreamParser::next_entry`]; the borrow checker enforces
/// that a payload view is never read after the stream moved on.
///
/// ```compile_fail
/// use std::io::{Cursor, Read};
///
/// let mut parser = iter_tar::iter_tar(Cursor::new(vec![0u8; 1024]));
/// let mut first = parser.next_entry().unwrap().unwrap();
/// let _second = parser.next_entry();
/// first.read(&mut [0u8; 1]).unwrap();
/// ```
///
/// [`TarStreamParser::next_entry`]: super::TarStreamParser::next_entry
#[derive(Debug)]
pub struct Entry<'a, R> {
    meta: EntryMeta,
    payload: PayloadView<'a, R>,
}

impl<'a, R: Read> Entry<'a, R> {
    pub(crate) fn new(meta: EntryMeta, payload: PayloadView<'a, R>) -> Self {
        Self { meta, payload }
    }

    #[must_use]
    pub fn meta(&self) -> &EntryMeta {
        &self.meta
    }

    /// Take the metadata, dropping the payload view.
    #[must_use]
    pub fn into_meta(self) -> EntryMeta {
        self.meta
    }

    pub fn payload(&mut self) -> &mut PayloadView<'a, R> {
        &mut self.payload
    }

    /// Split into owned metadata and the payload view.
    pub fn into_parts(self) -> (EntryMeta, PayloadView<'a, R>) {
        (self.meta, self.payload)
    }

    #[must_use]
    pub fn path_lossy(&self) -> Cow<'_, str> {
        self.meta.path_lossy()
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.meta.size
    }

    pub fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        self.payload.read_to_vec()
    }
}

impl<R: Read> Read for Entry<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.payload.read(buf)
    }
}

impl<R: Read> Seek for Entry<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.payload.seek(pos)
    }
}
