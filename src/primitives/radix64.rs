//! Radix-64 (standard base64) text encoding of arbitrary bytes.
//!
//! Output uses the standard alphabet with `=` padding and no line breaks.
//! Decoding skips ASCII whitespace, so armor that a mail client wrapped at
//! 76 columns still decodes.

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::{ErrorCategory, ErrorKind, PgpError, Result};

pub fn encode(data: &[u8]) -> Vec<u8> {
    STANDARD.encode(data).into_bytes()
}

pub fn decode(ascii: &[u8]) -> Result<Vec<u8>> {
    let compact: Vec<u8> = ascii
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(&compact).map_err(|e| {
        PgpError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::CorruptEnvelope,
            format!("radix64 decoding failed: {}", e),
            e,
        )
    })
}
