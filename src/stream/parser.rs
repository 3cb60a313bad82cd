//! Streaming tar parser with GNU and PAX extension support.

use std::io::Read;

use log::{debug, trace, warn};

use crate::header::{
    self, Decoded, EntryType, GnuExtSparseHeader, Header, HeaderRecord, HEADER_SIZE,
};
use crate::pax::{self, PaxMap};

use super::block::{BlockRead, BlockReader};
use super::entry::{Entry, EntryMeta, PayloadView};
use super::error::{Result, StreamError};
use super::options::ParseOptions;
use super::pending::PendingExtensions;

/// How the archive ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveEnd {
    /// Two consecutive all-zero blocks.
    Sentinel,
    /// The stream ran out on a block boundary with no sentinel.
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Positioned on a header boundary.
    Seeking,
    /// An entry was yielded; its unread payload and padding are still in
    /// the stream.
    PayloadPending,
    Terminal(ArchiveEnd),
    Poisoned,
}

/// Forward-only tar decoder producing one [`Entry`] per call.
///
/// Extension markers (GNU `'L'`/`'K'`, PAX `'x'`/`'g'`) are consumed
/// internally and merged into the entry that follows them. Each yielded
/// entry borrows the parser; when the next entry is requested, whatever the
/// caller left unread of the previous payload is skipped, along with its
/// padding, so the stream is back on a header boundary.
///
/// # Example
///
/// ```
/// use std::io::{Cursor, Read};
/// use iter_tar::stream::TarStreamParser;
///
/// # let archive = vec![0u8; 1024];
/// let mut parser = TarStreamParser::new(Cursor::new(archive));
/// while let Some(mut entry) = parser.next_entry()? {
///     let mut contents = Vec::new();
///     entry.read_to_end(&mut contents)?;
///     println!("{} ({} bytes)", entry.path_lossy(), contents.len());
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct TarStreamParser<R> {
    reader: BlockReader<R>,
    options: ParseOptions,
    pending: PendingExtensions,
    /// Records from PAX global headers, applied beneath every later entry.
    globals: PaxMap,
    header_buf: [u8; HEADER_SIZE],
    state: State,
    /// Unread payload bytes of the last yielded entry.
    remaining: u64,
    /// Zero padding after that payload.
    padding: u64,
}

impl<R: Read> TarStreamParser<R> {
    /// Create a parser with default options.
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ParseOptions::default())
    }

    pub fn with_options(reader: R, options: ParseOptions) -> Self {
        Self {
            reader: BlockReader::new(reader),
            options,
            pending: PendingExtensions::default(),
            globals: PaxMap::new(),
            header_buf: [0u8; HEADER_SIZE],
            state: State::Seeking,
            remaining: 0,
            padding: 0,
        }
    }

    /// Advance to the next real entry.
    ///
    /// Returns `Ok(None)` at end of archive, and keeps doing so on later
    /// calls. Any error is fatal; later calls return
    /// [`StreamError::Poisoned`].
    pub fn next_entry(&mut self) -> Result<Option<Entry<'_, R>>> {
        match self.state {
            State::Terminal(_) => return Ok(None),
            State::Poisoned => return Err(StreamError::Poisoned),
            State::Seeking | State::PayloadPending => {}
        }

        match self.advance() {
            Ok(Some(meta)) => {
                let payload = PayloadView::new(&mut self.reader, &mut self.remaining);
                Ok(Some(Entry::new(meta, payload)))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                debug!("tar stream failed at offset {}: {e}", self.reader.position());
                self.state = State::Poisoned;
                Err(e)
            }
        }
    }

    /// Bytes consumed from the underlying stream so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// How the archive ended, once it has.
    #[must_use]
    pub fn archive_end(&self) -> Option<ArchiveEnd> {
        match self.state {
            State::Terminal(end) => Some(end),
            _ => None,
        }
    }

    #[must_use]
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Records from PAX global headers seen so far.
    #[must_use]
    pub fn global_extensions(&self) -> &PaxMap {
        &self.globals
    }

    pub fn get_ref(&self) -> &R {
        self.reader.get_ref()
    }

    /// Consume the parser and return the underlying reader, positioned
    /// wherever parsing stopped.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    fn advance(&mut self) -> Result<Option<EntryMeta>> {
        if self.state == State::PayloadPending {
            self.reader.skip(self.remaining + self.padding)?;
            self.remaining = 0;
            self.padding = 0;
            self.state = State::Seeking;
        }

        let mut zero_seen = false;
        loop {
            let header_offset = self.reader.position();
            if self.reader.read_block(&mut self.header_buf)? == BlockRead::EndOfStream {
                return self.end_of_stream();
            }

            if self.options.verify_checksums {
                self.verify_checksum(header_offset)?;
            }
            let record = match header::decode(&self.header_buf)
                .map_err(|e| StreamError::from_header(e, header_offset))?
            {
                Decoded::Zero if zero_seen => return self.finish(ArchiveEnd::Sentinel),
                Decoded::Zero => {
                    trace!("zero block at offset {header_offset}");
                    zero_seen = true;
                    continue;
                }
                Decoded::Header(record) => record,
            };
            zero_seen = false;
            trace!(
                "header at offset {header_offset}: {:?} {:?} size {}",
                String::from_utf8_lossy(&record.name),
                record.entry_type,
                record.size
            );

            if !record.checksum_valid {
                warn!(
                    "ignoring checksum mismatch in header at offset {header_offset} ({:?})",
                    String::from_utf8_lossy(&record.name)
                );
            }

            if record.entry_type.is_extension() {
                self.absorb(&record, header_offset)?;
                continue;
            }

            return self.yield_entry(record, header_offset).map(Some);
        }
    }

    /// Check the stored checksum before any other field is decoded.
    fn verify_checksum(&self, pos: u64) -> Result<()> {
        let header = Header::from_block(&self.header_buf);
        if header.is_zero() {
            return Ok(());
        }
        let (stored, matched) = header
            .checksum_matches()
            .map_err(|e| StreamError::from_header(e, pos))?;
        if matched {
            return Ok(());
        }
        Err(StreamError::ChecksumMismatch {
            pos,
            path: String::from_utf8_lossy(&header.full_name()).into_owned(),
            stored,
            computed: header.compute_checksum(),
        })
    }

    /// Consume an extension marker's payload into the pending or global
    /// state.
    fn absorb(&mut self, record: &HeaderRecord, header_offset: u64) -> Result<()> {
        let size = record.size;
        let padded = padded(size)?;
        let limits = &self.options.limits;

        let max = match record.entry_type {
            EntryType::GnuLongName | EntryType::GnuLongLink => limits.max_gnu_long_size,
            _ => limits.max_pax_size,
        };
        if size > max {
            return Err(match record.entry_type {
                EntryType::GnuLongName | EntryType::GnuLongLink => {
                    StreamError::GnuLongTooLarge { size, limit: max }
                }
                _ => StreamError::PaxTooLarge { size, limit: max },
            });
        }

        let len = usize::try_from(size).map_err(|_| StreamError::InvalidSize(size))?;
        let data = self.reader.read_vec(len)?;
        self.reader.skip(padded - size)?;

        if !record.checksum_valid {
            debug!("skipping {:?} marker with bad checksum", record.entry_type);
            return Ok(());
        }

        let pax_error = |source| StreamError::Pax {
            pos: header_offset,
            source,
        };
        match record.entry_type {
            EntryType::GnuLongName => self.pending.absorb_long_name(&data),
            EntryType::GnuLongLink => self.pending.absorb_long_link(&data),
            EntryType::XHeader => self.pending.absorb_pax(&data).map_err(pax_error)?,
            EntryType::XGlobalHeader => {
                pax::merge_into(&mut self.globals, &data, true).map_err(pax_error)?;
                debug!("global PAX header: {} keys in effect", self.globals.len());
                return Ok(());
            }
            _ => unreachable!("not an extension type"),
        }
        debug!(
            "absorbed {:?} marker ({size} bytes) at offset {header_offset}",
            record.entry_type
        );

        let limit = self.options.limits.max_pending_entries;
        if self.pending.count() > limit {
            return Err(StreamError::TooManyPendingEntries {
                count: self.pending.count(),
                limit,
            });
        }
        Ok(())
    }

    fn yield_entry(&mut self, record: HeaderRecord, header_offset: u64) -> Result<EntryMeta> {
        if record.sparse_extended {
            self.skip_sparse_map()?;
        }
        let pending = self.pending.take();
        let mut meta = pending.resolve(record, &self.globals, &self.options.limits)?;
        meta.header_offset = header_offset;
        meta.data_offset = self.reader.position();

        self.remaining = meta.size;
        self.padding = padded(meta.size)? - meta.size;
        self.state = State::PayloadPending;
        Ok(meta)
    }

    /// Step over GNU sparse-map continuation blocks; the payload follows
    /// the last one.
    fn skip_sparse_map(&mut self) -> Result<()> {
        loop {
            if self.reader.read_block(&mut self.header_buf)? == BlockRead::EndOfStream {
                return Err(StreamError::TruncatedArchive {
                    pos: self.reader.position(),
                });
            }
            if GnuExtSparseHeader::from_block(&self.header_buf).isextended == 0 {
                return Ok(());
            }
        }
    }

    fn end_of_stream(&mut self) -> Result<Option<EntryMeta>> {
        if self.options.require_end_marker {
            return Err(StreamError::TruncatedArchive {
                pos: self.reader.position(),
            });
        }
        self.finish(ArchiveEnd::EndOfStream)
    }

    fn finish(&mut self, end: ArchiveEnd) -> Result<Option<EntryMeta>> {
        if !self.pending.is_empty() {
            return Err(StreamError::OrphanedMetadata);
        }
        debug!("end of archive ({end:?}) at offset {}", self.reader.position());
        self.state = State::Terminal(end);
        Ok(None)
    }
}

fn padded(size: u64) -> Result<u64> {
    size.checked_next_multiple_of(HEADER_SIZE as u64)
        .ok_or(StreamError::InvalidSize(size))
}
