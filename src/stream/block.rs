//! Fixed-size block reads over a forward-only stream.

use std::io::{self, Read};

use log::trace;

use crate::header::HEADER_SIZE;

use super::error::{Result, StreamError};

/// Outcome of asking for the next block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockRead {
    /// A full block was read.
    Block,
    /// The stream ended exactly on a block boundary.
    EndOfStream,
}

/// Reads 512-byte blocks and payload bytes, counting everything consumed.
///
/// The position is the only source of truth for where headers lie; the
/// underlying reader is never seeked.
#[derive(Debug)]
pub(crate) struct BlockReader<R> {
    inner: R,
    pos: u64,
}

impl<R: Read> BlockReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }

    /// Read one block. Zero bytes available is `EndOfStream`; a partial
    /// block is `TruncatedArchive`.
    pub(crate) fn read_block(&mut self, buf: &mut [u8; HEADER_SIZE]) -> Result<BlockRead> {
        let mut total = 0;
        while total < buf.len() {
            match self.inner.read(&mut buf[total..]) {
                Ok(0) if total == 0 => return Ok(BlockRead::EndOfStream),
                Ok(0) => {
                    return Err(StreamError::TruncatedArchive {
                        pos: self.pos + total as u64,
                    })
                }
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.pos += HEADER_SIZE as u64;
        Ok(BlockRead::Block)
    }

    /// Fill `buf` completely or fail with `TruncatedArchive`.
    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut total = 0;
        while total < buf.len() {
            let n = self.read_some(&mut buf[total..])?;
            if n == 0 {
                return Err(StreamError::TruncatedArchive { pos: self.pos });
            }
            total += n;
        }
        Ok(())
    }

    pub(crate) fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// A single read from the underlying stream, retrying on `Interrupted`.
    pub(crate) fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.inner.read(buf) {
                Ok(n) => {
                    self.pos += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Read and discard `len` bytes.
    pub(crate) fn skip(&mut self, len: u64) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        trace!("skipping {len} bytes at offset {}", self.pos);
        let mut remaining = len;
        let mut buf = [0u8; 8192];
        while remaining > 0 {
            let to_read = remaining.min(buf.len() as u64) as usize;
            let n = self.read_some(&mut buf[..to_read])?;
            if n == 0 {
                return Err(StreamError::TruncatedArchive { pos: self.pos });
            }
            remaining -= n as u64;
        }
        Ok(())
    }

    /// Bytes consumed since the start of the archive.
    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    pub(crate) fn get_ref(&self) -> &R {
        &self.inner
    }

    pub(crate) fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Hands out at most `chunk` bytes per read.
    struct Trickle<R> {
        inner: R,
        chunk: usize,
    }

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.inner.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_full_block_then_end() {
        let mut reader = BlockReader::new(Cursor::new(vec![7u8; HEADER_SIZE]));
        let mut buf = [0u8; HEADER_SIZE];
        assert_eq!(reader.read_block(&mut buf).unwrap(), BlockRead::Block);
        assert_eq!(buf[511], 7);
        assert_eq!(reader.position(), 512);
        assert_eq!(reader.read_block(&mut buf).unwrap(), BlockRead::EndOfStream);
        assert_eq!(reader.position(), 512);
    }

    #[test]
    fn test_short_block() {
        let mut reader = BlockReader::new(Cursor::new(vec![1u8; 700]));
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_block(&mut buf).unwrap();
        let err = reader.read_block(&mut buf).unwrap_err();
        assert!(matches!(err, StreamError::TruncatedArchive { pos: 700 }));
    }

    #[test]
    fn test_block_assembled_from_small_reads() {
        let data = Trickle {
            inner: Cursor::new(vec![3u8; HEADER_SIZE * 2]),
            chunk: 100,
        };
        let mut reader = BlockReader::new(data);
        let mut buf = [0u8; HEADER_SIZE];
        assert_eq!(reader.read_block(&mut buf).unwrap(), BlockRead::Block);
        assert_eq!(reader.read_block(&mut buf).unwrap(), BlockRead::Block);
        assert_eq!(reader.position(), 1024);
    }

    #[test]
    fn test_skip_past_end() {
        let mut reader = BlockReader::new(Cursor::new(vec![0u8; 100]));
        reader.skip(60).unwrap();
        assert_eq!(reader.position(), 60);
        let err = reader.skip(60).unwrap_err();
        assert!(matches!(err, StreamError::TruncatedArchive { pos: 100 }));
    }

    #[test]
    fn test_read_vec_truncated() {
        let mut reader = BlockReader::new(Cursor::new(b"abc".to_vec()));
        assert!(matches!(
            reader.read_vec(4),
            Err(StreamError::TruncatedArchive { pos: 3 })
        ));
    }
}
