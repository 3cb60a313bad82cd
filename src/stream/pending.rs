//! Accumulation of GNU and PAX extension data ahead of a real header.

use std::mem;

use crate::header::{truncate_null, HeaderRecord};
use crate::pax::{
    PaxError, PaxExtensions, PaxMap, PAX_GID, PAX_GNAME, PAX_GNU_SPARSE_NAME, PAX_GNU_SPARSE_REALSIZE,
    PAX_GNU_SPARSE_SIZE, PAX_LINKPATH, PAX_MTIME, PAX_PATH, PAX_SIZE, PAX_UID, PAX_UNAME,
};

use super::entry::EntryMeta;
use super::error::{Result, StreamError};
use super::options::Limits;

/// Extension data waiting for the next real header.
///
/// Several markers may precede one entry; they all merge here, the latest
/// value winning for each field. GNU long names and PAX `path` records fill
/// the same name slot in arrival order, as do long links and `linkpath`.
/// The state is taken (and so cleared) when the entry is built.
#[derive(Debug, Default)]
pub(crate) struct PendingExtensions {
    name: Option<Vec<u8>>,
    link: Option<Vec<u8>>,
    pax: PaxMap,
    count: usize,
}

impl PendingExtensions {
    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn absorb_long_name(&mut self, data: &[u8]) {
        self.name = Some(truncate_null(data).to_vec());
        self.count += 1;
    }

    pub(crate) fn absorb_long_link(&mut self, data: &[u8]) {
        self.link = Some(truncate_null(data).to_vec());
        self.count += 1;
    }

    pub(crate) fn absorb_pax(&mut self, data: &[u8]) -> std::result::Result<(), PaxError> {
        for ext in PaxExtensions::new(data) {
            let ext = ext?;
            // An empty value clears the slot back to the header field.
            let value = Some(ext.value_bytes()).filter(|v| !v.is_empty());
            match ext.key() {
                PAX_PATH => self.name = value.map(<[u8]>::to_vec),
                PAX_LINKPATH => self.link = value.map(<[u8]>::to_vec),
                _ => {}
            }
            self.pax
                .insert(ext.key().to_owned(), ext.value_bytes().to_vec());
        }
        self.count += 1;
        Ok(())
    }

    pub(crate) fn take(&mut self) -> Self {
        mem::take(self)
    }

    /// Build the entry for `record`, layering global PAX defaults, then the
    /// header, then this pending state.
    pub(crate) fn resolve(
        self,
        record: HeaderRecord,
        globals: &PaxMap,
        limits: &Limits,
    ) -> Result<EntryMeta> {
        // A global default applies unless this entry's own records mention
        // the key, even with an empty value.
        let inherited = |key: &str| {
            globals
                .get(key)
                .filter(|v| !v.is_empty() && !self.pax.contains_key(key))
                .cloned()
        };

        let mut name = self
            .name
            .or_else(|| inherited(PAX_PATH))
            .unwrap_or(record.name);

        let link_target = if record.entry_type.has_link_target() {
            let target = self
                .link
                .or_else(|| inherited(PAX_LINKPATH))
                .unwrap_or(record.link_name);
            check_path(&target, limits)?;
            Some(target)
        } else {
            None
        };

        let mut merged = globals.clone();
        merged.extend(self.pax);
        // An empty value masks the global default and keeps the header field.
        let value = |key: &str| merged.get(key).filter(|v| !v.is_empty());

        if let Some(sparse_name) = value(PAX_GNU_SPARSE_NAME) {
            name.clone_from(sparse_name);
        }
        check_path(&name, limits)?;

        let size = value(PAX_SIZE)
            .map(|v| decimal(PAX_SIZE, v))
            .transpose()?
            .unwrap_or(record.size);
        let uid = value(PAX_UID)
            .map(|v| decimal(PAX_UID, v))
            .transpose()?
            .unwrap_or(record.uid);
        let gid = value(PAX_GID)
            .map(|v| decimal(PAX_GID, v))
            .transpose()?
            .unwrap_or(record.gid);
        let (mtime, mtime_nsec) = value(PAX_MTIME)
            .map(|v| timestamp(PAX_MTIME, v))
            .transpose()?
            .unwrap_or((record.mtime, 0));

        let uname = value(PAX_UNAME).cloned().or(record.uname);
        let gname = value(PAX_GNAME).cloned().or(record.gname);

        let sparse_real_size = match value(PAX_GNU_SPARSE_REALSIZE).or(value(PAX_GNU_SPARSE_SIZE)) {
            Some(v) => Some(decimal(PAX_GNU_SPARSE_REALSIZE, v)?),
            None => record.gnu_real_size,
        };

        Ok(EntryMeta {
            name,
            size,
            mode: record.mode,
            uid,
            gid,
            mtime,
            mtime_nsec,
            entry_type: record.entry_type,
            link_target,
            uname,
            gname,
            dev_major: record.dev_major,
            dev_minor: record.dev_minor,
            format: record.format,
            checksum_valid: record.checksum_valid,
            header_offset: 0,
            data_offset: 0,
            pax: merged,
            sparse_real_size,
        })
    }
}

fn check_path(path: &[u8], limits: &Limits) -> Result<()> {
    if path.len() > limits.max_path_len {
        return Err(StreamError::PathTooLong {
            len: path.len(),
            limit: limits.max_path_len,
        });
    }
    Ok(())
}

fn digits(value: &[u8]) -> Option<&str> {
    Some(value)
        .filter(|v| !v.is_empty() && v.iter().all(u8::is_ascii_digit))
        .and_then(|v| std::str::from_utf8(v).ok())
}

/// A non-negative decimal integer.
fn decimal(key: &str, value: &[u8]) -> Result<u64> {
    digits(value)
        .and_then(|d| d.parse().ok())
        .ok_or_else(|| StreamError::unsupported(key, value))
}

/// Seconds with an optional sign and fraction, e.g. `1629988096.956` or
/// `-1.25`. Digits past nanosecond precision are dropped. A negative time
/// is normalized so the nanoseconds count forward: `-1.25` is `(-2, 750ms)`.
fn timestamp(key: &str, value: &[u8]) -> Result<(i64, u32)> {
    let unsupported = || StreamError::unsupported(key, value);
    let (negative, unsigned) = match value.strip_prefix(b"-") {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let (secs, frac) = match unsigned.iter().position(|&b| b == b'.') {
        Some(dot) => (&unsigned[..dot], &unsigned[dot + 1..]),
        None => (unsigned, &b""[..]),
    };
    let secs = decimal(key, secs)
        .ok()
        .and_then(|s| i64::try_from(s).ok())
        .ok_or_else(unsupported)?;
    let nanos = if frac.is_empty() {
        0
    } else {
        digits(frac)
            .ok_or_else(unsupported)?
            .bytes()
            .chain(std::iter::repeat(b'0'))
            .take(9)
            .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'))
    };
    match (negative, nanos) {
        (false, _) => Ok((secs, nanos)),
        (true, 0) => Ok((-secs, 0)),
        (true, _) => Ok((-secs - 1, 1_000_000_000 - nanos)),
    }
}
