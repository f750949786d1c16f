//! Length-prefixed framing for envelope parts and fields.
//!
//! A field is a big-endian `u32` length followed by that many bytes. A part
//! is a field whose bytes are themselves a sequence of fields. No byte value
//! is reserved, so signatures, ciphertext and wrapped keys can contain
//! anything without confusing the parser.

use crate::error::{ErrorCategory, ErrorKind, PgpError, Result};

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Accumulates fields into one buffer.
#[derive(Debug, Default)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn field(&mut self, bytes: &[u8]) -> Result<&mut Self> {
        let len = u32::try_from(bytes.len()).map_err(|_| {
            PgpError::with_kind(
                ErrorCategory::User,
                ErrorKind::PayloadTooLarge,
                format!("field of {} bytes exceeds the 4 GiB frame limit", bytes.len()),
            )
        })?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(bytes);
        Ok(self)
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Frame `fields` in order.
pub fn join(fields: &[&[u8]]) -> Result<Vec<u8>> {
    let total = fields.iter().map(|f| f.len() + LENGTH_PREFIX_LEN).sum();
    let mut writer = FieldWriter::with_capacity(total);
    for field in fields {
        writer.field(field)?;
    }
    Ok(writer.finish())
}

/// Reads fields off the front of a buffer.
#[derive(Debug)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Next field; `what` names it in error messages.
    pub fn next_field(&mut self, what: &str) -> Result<&'a [u8]> {
        let buf: &'a [u8] = self.buf;
        let rest = &buf[self.pos..];
        let Some((prefix, rest)) = rest.split_at_checked(LENGTH_PREFIX_LEN) else {
            return Err(PgpError::corrupt(format!(
                "envelope truncated while reading length of {what}"
            )));
        };
        let mut len_bytes = [0u8; LENGTH_PREFIX_LEN];
        len_bytes.copy_from_slice(prefix);
        let len = u32::from_be_bytes(len_bytes) as usize;

        if len > rest.len() {
            return Err(PgpError::corrupt(format!(
                "truncated or corrupt envelope; {what} claims {len} bytes but {} remain",
                rest.len()
            )));
        }
        self.pos += LENGTH_PREFIX_LEN + len;
        Ok(&rest[..len])
    }

    /// Fails if anything is left unread.
    pub fn finish(self, what: &str) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(PgpError::corrupt(format!(
                "unexpected {} bytes after {what}",
                self.buf.len() - self.pos
            )))
        }
    }
}

/// Split `buf` into exactly `N` fields named by `names`.
pub fn split_exact<'a, const N: usize>(buf: &'a [u8], names: [&str; N]) -> Result<[&'a [u8]; N]> {
    let mut reader = FieldReader::new(buf);
    let mut out: [&[u8]; N] = [&[]; N];
    for (slot, name) in out.iter_mut().zip(names) {
        *slot = reader.next_field(name)?;
    }
    reader.finish(names.last().copied().unwrap_or("empty part"))?;
    Ok(out)
}

/// Split `buf` into however many fields it holds.
pub fn split_all<'a>(buf: &'a [u8], what: &str) -> Result<Vec<&'a [u8]>> {
    let mut reader = FieldReader::new(buf);
    let mut out = Vec::new();
    while !reader.is_empty() {
        out.push(reader.next_field(what)?);
    }
    Ok(out)
}
