//! # minipgp
//!
//! OpenPGP-style message envelopes built from small, well-known primitives.
//!
//! A message goes through a fixed pipeline of optional stages:
//! - **sign**: RSA-PSS signature over the literal data
//! - **compress**: zlib
//! - **aes_encrypt** / **3des_encrypt**: CFB with a fresh session key per
//!   message, wrapped for the receiver with RSA-OAEP
//! - **radix64**: base64 armor for text transports
//!
//! Keys are looked up through the [`KeyResolver`] trait; [`KeyRing`] is an
//! in-memory implementation that keeps private keys sealed under a password.
//!
//! The option set is not recorded in the envelope. Decoding needs the same
//! [`Options`] the sender used.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod file_ops;
pub mod framing;
pub mod keyring;
pub mod keys;
pub mod keyseal;
pub mod options;
pub mod password;
pub mod primitives;

#[cfg(test)]
mod proptests;

pub use codec::{DecodedMessage, EncodeRequest, Sender, decode_message, encode_message};
pub use error::{ErrorCategory, ErrorKind, PgpError, Result};
pub use keyring::{KeyRing, KeyRingEntry};
pub use keys::{KeyId, KeyLookupError, KeyRef, KeyResolver};
pub use options::Options;
