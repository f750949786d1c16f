//! In-memory zlib compression.
//!
//! Archives never touch the filesystem, so concurrent callers cannot collide
//! on staging files.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use crate::error::{ErrorCategory, ErrorKind, PgpError, Result};

pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data).map_err(compress_error)?;
    encoder.finish().map_err(compress_error)
}

/// Default ceiling on inflated output, in bytes.
pub const MAX_DECOMPRESSED_LEN: usize = 32 * 1024 * 1024;

/// Inflate a zlib stream of at most `max_len` output bytes.
///
/// The stream must end exactly at the end of the input: truncated archives
/// and trailing bytes are both rejected. The archive must also be exactly
/// what [`compress`] produces for the inflated data, so unused padding bits
/// in the final deflate byte cannot be altered unnoticed.
pub fn decompress(archive: &[u8], max_len: usize) -> Result<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let limit = max_len.saturating_add(1);
    let mut data = Vec::with_capacity(archive.len().saturating_mul(4).max(64).min(limit));

    loop {
        let (in_before, out_before) = (inflater.total_in(), inflater.total_out());
        let consumed = (in_before as usize).min(archive.len());
        let status = inflater
            .decompress_vec(&archive[consumed..], &mut data, FlushDecompress::None)
            .map_err(|e| {
                PgpError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::CorruptEnvelope,
                    "compressed payload is corrupt",
                    e,
                )
            })?;
        if data.len() > max_len {
            return Err(PgpError::corrupt(format!(
                "compressed payload inflates past the {} byte limit",
                max_len
            )));
        }
        if status == Status::StreamEnd {
            break;
        }
        if data.len() == data.capacity() {
            data.reserve_exact(data.len().max(64).min(limit - data.len()));
            continue;
        }
        if inflater.total_in() == in_before && inflater.total_out() == out_before {
            return Err(PgpError::corrupt("compressed payload is truncated"));
        }
    }

    if inflater.total_in() != archive.len() as u64 {
        return Err(PgpError::corrupt(format!(
            "unexpected data after compressed payload ({} of {} bytes consumed)",
            inflater.total_in(),
            archive.len()
        )));
    }
    if compress(&data)? != archive {
        return Err(PgpError::corrupt("compressed payload is not in canonical form"));
    }
    Ok(data)
}

fn compress_error(e: std::io::Error) -> PgpError {
    PgpError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::InternalInvariant,
        "compression failed",
        e,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let data = b"Data to test zip\\unzip \"in memory\" idempotence".repeat(200);
        let archive = compress(&data).unwrap();
        assert!(archive.len() < data.len());
        assert_eq!(decompress(&archive, MAX_DECOMPRESSED_LEN).unwrap(), data);
    }

    #[test]
    fn test_empty() {
        let archive = compress(b"").unwrap();
        assert!(!archive.is_empty());
        assert!(decompress(&archive, MAX_DECOMPRESSED_LEN).unwrap().is_empty());
    }

    #[test]
    fn test_all_byte_values() {
        let data: Vec<u8> = (0..=255).collect();
        assert_eq!(decompress(&compress(&data).unwrap(), MAX_DECOMPRESSED_LEN).unwrap(), data);
    }

    #[test]
    fn test_garbage_input() {
        let err = decompress(b"definitely not zlib", MAX_DECOMPRESSED_LEN).expect_err("expected corrupt stream");
        assert_eq!(err.kind, Some(ErrorKind::CorruptEnvelope));
    }

    #[test]
    fn test_truncated_archive() {
        let archive = compress(&b"abcdefgh".repeat(111)).unwrap();
        let err = decompress(&archive[..archive.len() - 4], MAX_DECOMPRESSED_LEN).expect_err("expected truncation");
        assert_eq!(err.kind, Some(ErrorKind::CorruptEnvelope));
    }

    #[test]
    fn test_trailing_data() {
        let mut archive = compress(b"hello").unwrap();
        archive.extend_from_slice(b"junk");
        let err = decompress(&archive, MAX_DECOMPRESSED_LEN).expect_err("expected trailing data error");
        assert_eq!(err.kind, Some(ErrorKind::CorruptEnvelope));
    }

    #[test]
    fn test_output_limit() {
        let data = vec![0u8; 100_000];
        let archive = compress(&data).unwrap();
        assert!(archive.len() < 1_000);
        assert_eq!(decompress(&archive, data.len()).unwrap(), data);

        let err = decompress(&archive, data.len() - 1).expect_err("expected limit error");
        assert_eq!(err.kind, Some(ErrorKind::CorruptEnvelope));
        assert!(err.to_string().contains("99999 byte limit"));
    }

    #[test]
    fn test_zero_limit() {
        assert!(decompress(&compress(b"").unwrap(), 0).unwrap().is_empty());
        assert!(decompress(&compress(b"x").unwrap(), 0).is_err());
    }

    #[test]
    fn test_padding_bits_are_checked() {
        let archive = compress(&b"abcdefgh".repeat(111)).unwrap();
        // The byte before the adler32 trailer ends the deflate stream and
        // usually carries unused padding bits.
        let last = archive.len() - 5;
        for bit in 0..8 {
            let mut altered = archive.clone();
            altered[last] ^= 1 << bit;
            assert!(
                decompress(&altered, MAX_DECOMPRESSED_LEN).is_err(),
                "bit {bit} of the final deflate byte went unnoticed"
            );
        }
    }
}
