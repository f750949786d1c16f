//! Pipeline option sets.
//!
//! Envelopes do not record which stages produced them; the decoder must be
//! handed the same set the encoder used.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::{ErrorCategory, PgpError};
use crate::primitives::symmetric::SymmetricAlgorithm;

bitflags! {
    /// Optional stages of the encode pipeline.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Options: u8 {
        const SIGN = 1 << 0;
        const COMPRESS = 1 << 1;
        const AES_ENCRYPT = 1 << 2;
        const TDES_ENCRYPT = 1 << 3;
        const RADIX64 = 1 << 4;
    }
}

/// Canonical names, in stage order.
const NAMES: [(Options, &str); 5] = [
    (Options::SIGN, "sign"),
    (Options::COMPRESS, "compress"),
    (Options::AES_ENCRYPT, "aes_encrypt"),
    (Options::TDES_ENCRYPT, "3des_encrypt"),
    (Options::RADIX64, "radix64"),
];

impl Options {
    /// Active symmetric layers in encryption order (AES first).
    pub fn symmetric_layers(self) -> Vec<SymmetricAlgorithm> {
        let mut layers = Vec::with_capacity(2);
        if self.contains(Self::AES_ENCRYPT) {
            layers.push(SymmetricAlgorithm::Aes128);
        }
        if self.contains(Self::TDES_ENCRYPT) {
            layers.push(SymmetricAlgorithm::TripleDes);
        }
        layers
    }

    pub fn encrypts(self) -> bool {
        self.intersects(Self::AES_ENCRYPT | Self::TDES_ENCRYPT)
    }

    /// Every combination of options, starting with the empty set.
    pub fn powerset() -> impl Iterator<Item = Self> {
        (0..=Self::all().bits()).filter_map(Self::from_bits)
    }

    /// Parse one option name. Accepts the canonical names plus the short
    /// forms `compression`, `aes`, `3des`, `tdes` and `base64`.
    pub fn parse_name(name: &str) -> Option<Self> {
        let flag = match name.trim().to_ascii_lowercase().as_str() {
            "sign" => Self::SIGN,
            "compress" | "compression" => Self::COMPRESS,
            "aes_encrypt" | "aes" | "aes128" => Self::AES_ENCRYPT,
            "3des_encrypt" | "3des" | "tdes" => Self::TDES_ENCRYPT,
            "radix64" | "base64" => Self::RADIX64,
            _ => return None,
        };
        Some(flag)
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(","))
        }
    }
}

impl FromStr for Options {
    type Err = PgpError;

    /// Comma-separated option names; empty or `none` is the empty set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("none") {
            return Ok(Self::empty());
        }
        s.split(',').try_fold(Self::empty(), |acc, name| {
            Self::parse_name(name).map(|flag| acc | flag).ok_or_else(|| {
                PgpError::new(
                    ErrorCategory::User,
                    format!(
                        "unknown option '{}' (expected one of: sign, compress, aes_encrypt, 3des_encrypt, radix64)",
                        name.trim()
                    ),
                )
            })
        })
    }
}
