//! Property-based tests for the primitives and framing.
//!
//! - CFB encryption preserves length and inverts exactly
//! - compression and radix64 are lossless for any input
//! - framing splits back into the fields that were joined

use proptest::prelude::*;

use crate::framing;
use crate::options::Options;
use crate::primitives::symmetric::{self, SessionParams, SymmetricAlgorithm};
use crate::primitives::{compression, radix64};

fn algorithm() -> impl Strategy<Value = SymmetricAlgorithm> {
    prop_oneof![
        Just(SymmetricAlgorithm::Aes128),
        Just(SymmetricAlgorithm::TripleDes),
    ]
}

proptest! {
    #[test]
    fn cfb_roundtrip_preserves_length(
        alg in algorithm(),
        data in prop::collection::vec(any::<u8>(), 0..2048),
    ) {
        let (ciphertext, params) = symmetric::encrypt(&data, alg, None, None).unwrap();
        prop_assert_eq!(ciphertext.len(), data.len());
        prop_assert_eq!(symmetric::decrypt(&ciphertext, &params).unwrap(), data);
    }

    #[test]
    fn cfb_is_deterministic_for_fixed_params(
        data in prop::collection::vec(any::<u8>(), 1..512),
        key in prop::array::uniform16(any::<u8>()),
        iv in prop::array::uniform16(any::<u8>()),
    ) {
        let params = SessionParams::from_parts(SymmetricAlgorithm::Aes128, &key, &iv);
        let a = symmetric::encrypt_with(&data, &params).unwrap();
        let b = symmetric::encrypt_with(&data, &params).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn compression_roundtrip(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        let packed = compression::compress(&data).unwrap();
        prop_assert_eq!(compression::decompress(&packed, compression::MAX_DECOMPRESSED_LEN).unwrap(), data);
    }

    #[test]
    fn radix64_roundtrip(data in prop::collection::vec(any::<u8>(), 0..1024)) {
        let ascii = radix64::encode(&data);
        prop_assert!(ascii.iter().all(u8::is_ascii));
        prop_assert_eq!(radix64::decode(&ascii).unwrap(), data);
    }

    #[test]
    fn framing_roundtrip(fields in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8)) {
        let slices: Vec<&[u8]> = fields.iter().map(Vec::as_slice).collect();
        let framed = framing::join(&slices).unwrap();
        let split = framing::split_all(&framed, "field").unwrap();
        prop_assert_eq!(split, slices);
    }

    #[test]
    fn truncated_frames_never_panic(
        fields in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 1..4),
        cut in any::<prop::sample::Index>(),
    ) {
        let slices: Vec<&[u8]> = fields.iter().map(Vec::as_slice).collect();
        let framed = framing::join(&slices).unwrap();
        let end = cut.index(framed.len());
        // Either an error or a shorter, valid field list; never a panic.
        let _ = framing::split_all(&framed[..end], "field");
    }

    #[test]
    fn options_display_parse(bits in 0u8..32) {
        let options = Options::from_bits(bits).unwrap();
        prop_assert_eq!(options.to_string().parse::<Options>().unwrap(), options);
    }
}
