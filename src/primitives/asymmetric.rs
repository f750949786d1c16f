//! RSA wrapping and signing.
//!
//! - Session keys and IVs are wrapped with RSA-OAEP (SHA-256).
//! - Signatures are RSA-PSS over the SHA-256 digest of the signed bytes,
//!   with a random salt, so signing the same input twice yields different
//!   signatures that both verify.

use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::{ErrorCategory, ErrorKind, PgpError, Result};

/// Key size used when the caller does not ask for one
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Smallest key that can still wrap a 3DES key under OAEP-SHA256
pub const MIN_KEY_BITS: usize = 1024;

pub const MAX_KEY_BITS: usize = 8192;

/// OAEP overhead in bytes: two SHA-256 outputs plus two framing bytes
const OAEP_OVERHEAD: usize = 2 * 32 + 2;

pub fn generate_key_pair(bits: usize) -> Result<RsaPrivateKey> {
    if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&bits) {
        return Err(PgpError::with_kind(
            ErrorCategory::User,
            ErrorKind::KeyFormat,
            format!("key size must be between {MIN_KEY_BITS} and {MAX_KEY_BITS} bits, got {bits}"),
        ));
    }
    RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| {
        PgpError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "RSA key generation failed",
            e,
        )
    })
}

/// Largest payload [`encrypt`] accepts for this key.
pub fn max_wrap_len(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(OAEP_OVERHEAD)
}

/// Wrap a short payload (a session key or IV) under `key`.
pub fn encrypt(data: &[u8], key: &RsaPublicKey) -> Result<Vec<u8>> {
    let limit = max_wrap_len(key);
    if data.len() > limit {
        return Err(PgpError::with_kind(
            ErrorCategory::User,
            ErrorKind::PayloadTooLarge,
            format!(
                "{} bytes do not fit in a {}-bit RSA-OAEP block (limit {limit})",
                data.len(),
                key.size() * 8
            ),
        ));
    }
    key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), data)
        .map_err(|e| {
            PgpError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "RSA-OAEP encryption failed",
                e,
            )
        })
}

pub fn decrypt(data: &[u8], key: &RsaPrivateKey) -> Result<Vec<u8>> {
    key.decrypt(Oaep::new::<Sha256>(), data).map_err(|e| {
        PgpError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::DecryptionFailure,
            "could not unwrap session material; wrong key or tampered envelope",
            e,
        )
    })
}

pub fn sign(data: &[u8], key: &RsaPrivateKey) -> Result<Vec<u8>> {
    let digest = Sha256::digest(data);
    key.sign_with_rng(&mut OsRng, Pss::new::<Sha256>(), &digest)
        .map_err(|e| {
            PgpError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "RSA-PSS signing failed",
                e,
            )
        })
}

/// Check `signature` over `data`.
///
/// Any mismatch, including a signature of the wrong length, is reported as
/// [`ErrorKind::InvalidSignature`].
pub fn verify(data: &[u8], signature: &[u8], key: &RsaPublicKey) -> Result<()> {
    let digest = Sha256::digest(data);
    key.verify(Pss::new::<Sha256>(), &digest, signature)
        .map_err(|e| {
            PgpError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::InvalidSignature,
                "signature verification failed",
                e,
            )
        })
}
