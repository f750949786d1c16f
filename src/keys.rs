//! Key identifiers and the key resolution contract.
//!
//! The codec never owns a key store. Callers hand it something that
//! implements [`KeyResolver`], and every lookup goes through that trait.

use std::fmt;
use std::str::FromStr;

use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ErrorCategory, ErrorKind, PgpError};

/// Short fingerprint of a public key: the low 64 bits of its modulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(pub u64);

impl KeyId {
    pub const LEN: usize = 8;

    pub fn of(key: &RsaPublicKey) -> Self {
        let modulus = key.n().to_bytes_be();
        let low = &modulus[modulus.len().saturating_sub(Self::LEN)..];
        Self(low.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        self.0.to_be_bytes()
    }

    /// Parse the 8-byte big-endian form used inside envelopes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; Self::LEN] = bytes.try_into().ok()?;
        Some(Self(u64::from_be_bytes(arr)))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl FromStr for KeyId {
    type Err = std::num::ParseIntError;

    /// Accepts the 16-digit hex form produced by `Display`, with or without
    /// a `0x` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        u64::from_str_radix(digits, 16).map(Self)
    }
}

/// How a caller names a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyRef {
    Id(KeyId),
    Name(String),
}

impl KeyRef {
    /// Interprets a command-line style reference: 16 hex digits (optionally
    /// `0x`-prefixed) is an id, anything else a name.
    pub fn parse(s: &str) -> Self {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() == 16 {
            if let Ok(id) = s.parse() {
                return Self::Id(id);
            }
        }
        Self::Name(s.to_string())
    }
}

impl From<KeyId> for KeyRef {
    fn from(id: KeyId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for KeyRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl fmt::Display for KeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "key {}", id),
            Self::Name(name) => write!(f, "key '{}'", name),
        }
    }
}

/// Why a lookup produced no key. Absence and a bad password are always
/// distinct variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyLookupError {
    #[error("{0} not found")]
    NotFound(KeyRef),
    #[error("wrong password for {0}")]
    WrongPassword(KeyRef),
    #[error("stored material for {0} is unreadable")]
    Corrupt(KeyRef),
}

impl From<KeyLookupError> for PgpError {
    fn from(err: KeyLookupError) -> Self {
        let (category, kind) = match &err {
            KeyLookupError::NotFound(_) => (ErrorCategory::User, ErrorKind::KeyNotFound),
            KeyLookupError::WrongPassword(_) => (ErrorCategory::User, ErrorKind::WrongPassword),
            KeyLookupError::Corrupt(_) => (ErrorCategory::Internal, ErrorKind::KeyFormat),
        };
        PgpError::with_kind_and_source(category, kind, err.to_string(), err)
    }
}

/// Narrow access to a key store.
///
/// Private key lookups may be slow (password hashing, external storage);
/// they block and have no internal timeout.
pub trait KeyResolver: Send + Sync {
    fn resolve_public_key(&self, key: &KeyRef) -> Result<RsaPublicKey, KeyLookupError>;

    fn resolve_private_key(
        &self,
        key: &KeyRef,
        password: &[u8],
    ) -> Result<RsaPrivateKey, KeyLookupError>;
}
