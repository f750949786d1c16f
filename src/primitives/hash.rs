//! SHA-1 digests for file integrity checks.
//!
//! Not used for signatures; those hash with SHA-256 inside
//! [`super::asymmetric::sign`].

use sha1::{Digest, Sha1};

/// Length of a SHA-1 digest in bytes
pub const SHA1_LEN: usize = 20;

pub fn sha1(data: &[u8]) -> [u8; SHA1_LEN] {
    Sha1::digest(data).into()
}

/// Lowercase hex SHA-1, as printed by `sha1sum`.
pub fn hex_digest(data: &[u8]) -> String {
    hex::encode(sha1(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        let digest = sha1(b"message for testing sha1 message digest");
        assert_eq!(
            digest,
            [
                0xfd, 0xfe, 0x36, 0xe5, 0xb7, 0xa1, 0xc2, 0x4f, 0xbc, 0x87, 0xe6, 0xf2, 0x75,
                0xb6, 0xee, 0x7e, 0xd7, 0x3a, 0xfc, 0x94,
            ]
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            hex_digest(b""),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn test_deterministic() {
        let data = vec![0xA5u8; 4096];
        assert_eq!(sha1(&data), sha1(&data));
        assert_ne!(sha1(&data), sha1(&data[1..]));
    }
}
