//! Session-key encryption in CFB mode.
//!
//! CFB turns the block cipher into a self-synchronising stream cipher, so
//! ciphertext is exactly as long as plaintext and no padding is involved.
//!
//! Parameter sizes:
//! - AES-128: 16-byte key, 16-byte IV
//! - 3DES (EDE3): 24-byte key, 8-byte IV
//!
//! The IV is always one cipher block.

use std::fmt;

use aes::Aes128;
use cfb_mode::cipher::{AsyncStreamCipher, InvalidLength, KeyIvInit};
use des::TdesEde3;
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, PgpError, Result};

type Aes128CfbEnc = cfb_mode::Encryptor<Aes128>;
type Aes128CfbDec = cfb_mode::Decryptor<Aes128>;
type TdesCfbEnc = cfb_mode::Encryptor<TdesEde3>;
type TdesCfbDec = cfb_mode::Decryptor<TdesEde3>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymmetricAlgorithm {
    Aes128,
    TripleDes,
}

impl SymmetricAlgorithm {
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::TripleDes => 24,
        }
    }

    /// IV length, equal to the cipher block size.
    pub const fn iv_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::TripleDes => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Aes128 => "aes128-cfb",
            Self::TripleDes => "3des-cfb",
        }
    }
}

impl fmt::Display for SymmetricAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key and IV for one symmetric layer of one message.
///
/// Both buffers are wiped on drop.
#[derive(Clone)]
pub struct SessionParams {
    pub algorithm: SymmetricAlgorithm,
    pub key: Zeroizing<Vec<u8>>,
    pub iv: Zeroizing<Vec<u8>>,
}

impl SessionParams {
    /// Fresh random key and IV.
    pub fn generate(algorithm: SymmetricAlgorithm) -> Self {
        Self {
            algorithm,
            key: generate_session_key(algorithm),
            iv: generate_iv(algorithm),
        }
    }

    /// Wraps caller-supplied key material. Lengths are checked when the
    /// parameters are used, not here.
    pub fn from_parts(algorithm: SymmetricAlgorithm, key: &[u8], iv: &[u8]) -> Self {
        Self {
            algorithm,
            key: Zeroizing::new(key.to_vec()),
            iv: Zeroizing::new(iv.to_vec()),
        }
    }
}

impl fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParams")
            .field("algorithm", &self.algorithm)
            .field("key", &format_args!("<{} bytes>", self.key.len()))
            .field("iv", &format_args!("<{} bytes>", self.iv.len()))
            .finish()
    }
}

pub fn generate_session_key(algorithm: SymmetricAlgorithm) -> Zeroizing<Vec<u8>> {
    random_bytes(algorithm.key_len())
}

pub fn generate_iv(algorithm: SymmetricAlgorithm) -> Zeroizing<Vec<u8>> {
    random_bytes(algorithm.iv_len())
}

fn random_bytes(len: usize) -> Zeroizing<Vec<u8>> {
    let mut buf = Zeroizing::new(vec![0u8; len]);
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Encrypt `data`, generating whichever of key and IV is not supplied.
///
/// Returns the ciphertext together with the parameters needed to reverse it.
pub fn encrypt(
    data: &[u8],
    algorithm: SymmetricAlgorithm,
    key: Option<&[u8]>,
    iv: Option<&[u8]>,
) -> Result<(Vec<u8>, SessionParams)> {
    let params = SessionParams {
        algorithm,
        key: key.map_or_else(
            || generate_session_key(algorithm),
            |k| Zeroizing::new(k.to_vec()),
        ),
        iv: iv.map_or_else(|| generate_iv(algorithm), |v| Zeroizing::new(v.to_vec())),
    };
    let ciphertext = encrypt_with(data, &params)?;
    Ok((ciphertext, params))
}

/// Encrypt `data` under existing session parameters.
pub fn encrypt_with(data: &[u8], params: &SessionParams) -> Result<Vec<u8>> {
    let mut buf = data.to_vec();
    apply(&mut buf, params, true).map_err(|_| {
        PgpError::with_kind(
            ErrorCategory::User,
            ErrorKind::KeyFormat,
            length_message(params),
        )
    })?;
    Ok(buf)
}

/// Exact inverse of [`encrypt_with`].
pub fn decrypt(data: &[u8], params: &SessionParams) -> Result<Vec<u8>> {
    let mut buf = data.to_vec();
    apply(&mut buf, params, false).map_err(|_| {
        PgpError::with_kind(
            ErrorCategory::User,
            ErrorKind::DecryptionFailure,
            length_message(params),
        )
    })?;
    Ok(buf)
}

fn apply(
    buf: &mut [u8],
    params: &SessionParams,
    encrypt: bool,
) -> std::result::Result<(), InvalidLength> {
    let (key, iv) = (params.key.as_slice(), params.iv.as_slice());
    match (params.algorithm, encrypt) {
        (SymmetricAlgorithm::Aes128, true) => Aes128CfbEnc::new_from_slices(key, iv)?.encrypt(buf),
        (SymmetricAlgorithm::Aes128, false) => {
            Aes128CfbDec::new_from_slices(key, iv)?.decrypt(buf)
        }
        (SymmetricAlgorithm::TripleDes, true) => TdesCfbEnc::new_from_slices(key, iv)?.encrypt(buf),
        (SymmetricAlgorithm::TripleDes, false) => {
            TdesCfbDec::new_from_slices(key, iv)?.decrypt(buf)
        }
    }
    Ok(())
}

fn length_message(params: &SessionParams) -> String {
    format!(
        "{} needs a {}-byte key and {}-byte IV, got {} and {}",
        params.algorithm,
        params.algorithm.key_len(),
        params.algorithm.iv_len(),
        params.key.len(),
        params.iv.len()
    )
}
