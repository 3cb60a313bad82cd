//! PAX extended header records.
//!
//! A PAX payload is a sequence of `"<length> <key>=<value>\n"` records where
//! `<length>` counts the whole record, its own digits included. Values are
//! kept as raw bytes; `hdrcharset=BINARY` archives may store non-UTF-8 names.

use std::collections::BTreeMap;

use thiserror::Error;

pub const PAX_PATH: &str = "path";
pub const PAX_LINKPATH: &str = "linkpath";
pub const PAX_SIZE: &str = "size";
pub const PAX_UID: &str = "uid";
pub const PAX_GID: &str = "gid";
pub const PAX_UNAME: &str = "uname";
pub const PAX_GNAME: &str = "gname";
pub const PAX_MTIME: &str = "mtime";
pub const PAX_GNU_SPARSE_NAME: &str = "GNU.sparse.name";
pub const PAX_GNU_SPARSE_SIZE: &str = "GNU.sparse.size";
pub const PAX_GNU_SPARSE_REALSIZE: &str = "GNU.sparse.realsize";

/// Merged PAX key/value pairs.
pub type PaxMap = BTreeMap<String, Vec<u8>>;

/// Error parsing a PAX record.
#[derive(Debug, Error)]
pub enum PaxError {
    /// Bad length prefix, missing `=`, or missing trailing newline.
    #[error("malformed PAX record at byte {offset}")]
    Malformed {
        /// Offset of the record within the PAX payload.
        offset: usize,
    },

    /// The key is not valid UTF-8.
    #[error("PAX key is not valid UTF-8: {0}")]
    InvalidKey(#[from] std::str::Utf8Error),
}

/// A single PAX record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaxExtension<'a> {
    key: &'a str,
    value: &'a [u8],
}

impl<'a> PaxExtension<'a> {
    #[must_use]
    pub fn key(&self) -> &'a str {
        self.key
    }

    #[must_use]
    pub fn value_bytes(&self) -> &'a [u8] {
        self.value
    }

    /// The value as a string, if it is valid UTF-8.
    #[must_use]
    pub fn value(&self) -> Option<&'a str> {
        std::str::from_utf8(self.value).ok()
    }
}

/// Iterator over the records of one PAX payload.
///
/// Stops after the first error. Trailing NUL padding is ignored.
///
/// ```
/// use iter_tar::pax::PaxExtensions;
///
/// let mut records = PaxExtensions::new(b"14 uid=424242\n");
/// let uid = records.next().unwrap().unwrap();
/// assert_eq!(uid.key(), "uid");
/// assert_eq!(uid.value(), Some("424242"));
/// assert!(records.next().is_none());
/// ```
#[derive(Debug)]
pub struct PaxExtensions<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PaxExtensions<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn parse_record(&self) -> Result<(PaxExtension<'a>, usize), PaxError> {
        let malformed = || PaxError::Malformed {
            offset: self.offset,
        };
        let data = self.data;

        let space = data.iter().position(|&b| b == b' ').ok_or_else(malformed)?;
        let len: usize = std::str::from_utf8(&data[..space])
            .ok()
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(malformed)?;

        // Trust the length prefix when it lands on a newline. Some writers
        // miscount it, so otherwise the record ends at the next newline.
        let end = if len >= space + 3 && len <= data.len() && data[len - 1] == b'\n' {
            len
        } else {
            space + 1 + data[space + 1..]
                .iter()
                .position(|&b| b == b'\n')
                .ok_or_else(malformed)?
                + 1
        };

        let kv = &data[space + 1..end - 1];
        let eq = kv.iter().position(|&b| b == b'=').ok_or_else(malformed)?;
        if eq == 0 {
            return Err(malformed());
        }
        let key = std::str::from_utf8(&kv[..eq])?;
        Ok((
            PaxExtension {
                key,
                value: &kv[eq + 1..],
            },
            end,
        ))
    }
}

impl<'a> Iterator for PaxExtensions<'a> {
    type Item = Result<PaxExtension<'a>, PaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.iter().all(|&b| b == 0) {
            return None;
        }
        match self.parse_record() {
            Ok((ext, len)) => {
                self.data = &self.data[len..];
                self.offset += len;
                Some(Ok(ext))
            }
            Err(e) => {
                self.data = &[];
                Some(Err(e))
            }
        }
    }
}

/// Parse a whole payload into `map`, later records replacing earlier ones.
///
/// With `delete_empty`, a record with an empty value removes the key, as
/// global headers do. Otherwise the empty value is stored so it can mask a
/// global default.
pub fn merge_into(map: &mut PaxMap, data: &[u8], delete_empty: bool) -> Result<(), PaxError> {
    for ext in PaxExtensions::new(data) {
        let ext = ext?;
        if delete_empty && ext.value_bytes().is_empty() {
            map.remove(ext.key());
        } else {
            map.insert(ext.key().to_owned(), ext.value_bytes().to_vec());
        }
    }
    Ok(())
}
