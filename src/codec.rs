//! Envelope encoding and decoding.
//!
//! Encoding runs these stages in a fixed order, each only when its option
//! is set:
//!
//! 1. literal part: `[message, timestamp, destination name]`
//! 2. `SIGN`: signature part `[signature, signature[0..2], signer id, timestamp]`
//! 3. `COMPRESS`: zlib over everything so far
//! 4. `AES_ENCRYPT`, then `TDES_ENCRYPT`: CFB encryption under fresh
//!    session parameters, each key and IV wrapped under the receiver key
//! 5. envelope: `[payload, wrapped key/IV pairs (AES first), receiver id]`
//! 6. `RADIX64`: base64 over the whole envelope
//!
//! Decoding undoes the stages in exactly the reverse order. Nothing is
//! returned unless every stage succeeds.

use chrono::{Local, SecondsFormat};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::{ErrorCategory, ErrorKind, PgpError, Result};
use crate::framing::{self, FieldWriter};
use crate::keys::{KeyId, KeyRef, KeyResolver};
use crate::options::Options;
use crate::primitives::symmetric::{self, SessionParams};
use crate::primitives::{asymmetric, compression, radix64};

/// Number of leading signature bytes repeated as a quick corruption check
pub const SIGNATURE_PREFIX_LEN: usize = 2;

/// Who signs an outgoing message.
pub struct Sender {
    pub key: KeyRef,
    pub password: Zeroizing<Vec<u8>>,
}

impl Sender {
    pub fn new(key: impl Into<KeyRef>, password: &[u8]) -> Self {
        Self {
            key: key.into(),
            password: Zeroizing::new(password.to_vec()),
        }
    }
}

/// Everything [`encode_message_with_sessions`] needs besides the key resolver.
pub struct EncodeRequest<'a> {
    pub message: &'a [u8],
    pub destination_name: &'a str,
    pub options: Options,
    /// Required when `options` contains [`Options::SIGN`].
    pub sender: Option<&'a Sender>,
    pub receiver: &'a KeyRef,
}

/// A fully decoded and, if requested, verified message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub message: Vec<u8>,
    /// Destination name recorded by the sender.
    pub filename: String,
    /// When the message was encoded (RFC 3339).
    pub timestamp: String,
    /// Signer key id, present when the envelope was signed and verified.
    pub signer: Option<KeyId>,
    /// When the signature was made (RFC 3339).
    pub signed_at: Option<String>,
}

fn now() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Encode `message` with fresh session parameters for every symmetric layer.
pub fn encode_message(
    resolver: &dyn KeyResolver,
    message: &[u8],
    destination_name: &str,
    options: Options,
    sender: Option<&Sender>,
    receiver: &KeyRef,
) -> Result<Vec<u8>> {
    let request = EncodeRequest {
        message,
        destination_name,
        options,
        sender,
        receiver,
    };
    let sessions = options
        .symmetric_layers()
        .into_iter()
        .map(SessionParams::generate)
        .collect();
    encode_message_with_sessions(resolver, &request, sessions)
}

/// Encode with caller-supplied session parameters, one per active symmetric
/// layer in encryption order (AES first).
///
/// Meant for tests that need deterministic ciphertext; [`encode_message`]
/// should be used otherwise.
pub fn encode_message_with_sessions(
    resolver: &dyn KeyResolver,
    request: &EncodeRequest<'_>,
    sessions: Vec<SessionParams>,
) -> Result<Vec<u8>> {
    let options = request.options;
    let layers = options.symmetric_layers();
    if sessions.iter().map(|s| s.algorithm).ne(layers.iter().copied()) {
        return Err(PgpError::new(
            ErrorCategory::User,
            format!(
                "session parameters do not match the symmetric layers of options '{}'",
                options
            ),
        ));
    }

    // Resolve the receiver up front so a bad reference fails before any
    // private key is unlocked.
    let receiver_key = resolver.resolve_public_key(request.receiver)?;
    let receiver_id = KeyId::of(&receiver_key);

    let timestamp = now();
    let literal = framing::join(&[
        request.message,
        timestamp.as_bytes(),
        request.destination_name.as_bytes(),
    ])?;

    let mut payload = FieldWriter::with_capacity(literal.len() + 512);
    payload.field(&literal)?;

    if options.contains(Options::SIGN) {
        let sender = request.sender.ok_or_else(|| {
            PgpError::with_kind(
                ErrorCategory::User,
                ErrorKind::KeyNotFound,
                "signing requested but no sender key given",
            )
        })?;
        let signing_key = resolver.resolve_private_key(&sender.key, &sender.password)?;
        let signature = asymmetric::sign(&literal, &signing_key)?;
        let signer_id = KeyId::of(&signing_key.to_public_key());
        let prefix = &signature[..SIGNATURE_PREFIX_LEN.min(signature.len())];
        let signature_part = framing::join(&[
            &signature,
            prefix,
            &signer_id.to_bytes(),
            now().as_bytes(),
        ])?;
        payload.field(&signature_part)?;
        debug!(signer = %signer_id, signature_len = signature.len(), "signed literal part");
    }

    let mut buffer = payload.finish();

    if options.contains(Options::COMPRESS) {
        let before = buffer.len();
        buffer = compression::compress(&buffer)?;
        debug!(before, after = buffer.len(), "compressed payload");
    }

    let mut wrapped = FieldWriter::new();
    for params in &sessions {
        buffer = symmetric::encrypt_with(&buffer, params)?;
        wrapped
            .field(&asymmetric::encrypt(&params.key, &receiver_key)?)?
            .field(&asymmetric::encrypt(&params.iv, &receiver_key)?)?;
        debug!(algorithm = %params.algorithm, "encrypted payload");
    }
    drop(sessions);

    let envelope = framing::join(&[&buffer, &wrapped.finish(), &receiver_id.to_bytes()])?;
    debug!(receiver = %receiver_id, %options, len = envelope.len(), "assembled envelope");

    if options.contains(Options::RADIX64) {
        Ok(radix64::encode(&envelope))
    } else {
        Ok(envelope)
    }
}

/// Decode an envelope produced by [`encode_message`] with the same `options`.
///
/// `password` unlocks the receiver's private key; it is only consulted when
/// an encryption option is set.
pub fn decode_message(
    resolver: &dyn KeyResolver,
    envelope: &[u8],
    options: Options,
    receiver: &KeyRef,
    password: &[u8],
) -> Result<DecodedMessage> {
    let unarmored;
    let raw: &[u8] = if options.contains(Options::RADIX64) {
        unarmored = radix64::decode(envelope)?;
        &unarmored
    } else {
        envelope
    };

    let [payload, key_part, receiver_part] =
        framing::split_exact(raw, ["payload part", "session key part", "receiver part"])?;

    let addressed_to = KeyId::from_bytes(receiver_part)
        .ok_or_else(|| PgpError::corrupt("receiver key id must be 8 bytes"))?;
    let receiver_key = resolver.resolve_public_key(receiver)?;
    let receiver_id = KeyId::of(&receiver_key);
    if addressed_to != receiver_id {
        return Err(PgpError::with_kind(
            ErrorCategory::User,
            ErrorKind::RecipientMismatch,
            format!("envelope is addressed to key {addressed_to}, not {receiver_id}"),
        ));
    }

    let layers = options.symmetric_layers();
    let wrapped = framing::split_all(key_part, "wrapped session key")?;
    if wrapped.len() != layers.len() * 2 {
        return Err(PgpError::corrupt(format!(
            "options '{}' expect {} wrapped session values, envelope has {}",
            options,
            layers.len() * 2,
            wrapped.len()
        )));
    }

    let mut buffer = payload.to_vec();
    if !layers.is_empty() {
        let private_key = resolver.resolve_private_key(receiver, password)?;
        let sessions = layers
            .iter()
            .zip(wrapped.chunks_exact(2))
            .map(|(&algorithm, pair)| {
                Ok(SessionParams {
                    algorithm,
                    key: Zeroizing::new(asymmetric::decrypt(pair[0], &private_key)?),
                    iv: Zeroizing::new(asymmetric::decrypt(pair[1], &private_key)?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for params in sessions.iter().rev() {
            buffer = symmetric::decrypt(&buffer, params)?;
            debug!(algorithm = %params.algorithm, "decrypted payload");
        }
    }

    open_payload(resolver, buffer, options).map_err(|e| {
        // Once a cipher layer is removed, garbage from a wrong key and
        // garbage from tampering look the same.
        if options.encrypts() && e.is(ErrorKind::CorruptEnvelope) {
            e.reclassify(
                ErrorKind::DecryptionFailure,
                "payload did not decrypt cleanly; wrong key or tampered ciphertext",
            )
        } else {
            e
        }
    })
}

/// Decompress, split and verify a decrypted payload.
fn open_payload(
    resolver: &dyn KeyResolver,
    buffer: Vec<u8>,
    options: Options,
) -> Result<DecodedMessage> {
    let buffer = if options.contains(Options::COMPRESS) {
        compression::decompress(&buffer, compression::MAX_DECOMPRESSED_LEN)?
    } else {
        buffer
    };

    let (literal, signature_part) = if options.contains(Options::SIGN) {
        let [literal, signature] = framing::split_exact(&buffer, ["literal part", "signature part"])?;
        (literal, Some(signature))
    } else {
        let [literal] = framing::split_exact(&buffer, ["literal part"])?;
        (literal, None)
    };

    let [message, timestamp, filename] =
        framing::split_exact(literal, ["message", "timestamp", "filename"])?;
    let timestamp = utf8_field(timestamp, "timestamp")?;
    let filename = utf8_field(filename, "filename")?;

    let mut decoded = DecodedMessage {
        message: message.to_vec(),
        filename,
        timestamp,
        signer: None,
        signed_at: None,
    };

    if let Some(signature_part) = signature_part {
        // Rebuild the exact bytes that were signed from the parsed fields.
        let signed = framing::join(&[
            message,
            decoded.timestamp.as_bytes(),
            decoded.filename.as_bytes(),
        ])?;
        let (signer, signed_at) = verify_signature(resolver, &signed, signature_part)?;
        decoded.signer = Some(signer);
        decoded.signed_at = Some(signed_at);
    }

    Ok(decoded)
}

fn verify_signature(
    resolver: &dyn KeyResolver,
    signed: &[u8],
    signature_part: &[u8],
) -> Result<(KeyId, String)> {
    let [signature, prefix, signer, signed_at] = framing::split_exact(
        signature_part,
        ["signature", "signature prefix", "signer key id", "signature timestamp"],
    )?;

    if prefix != &signature[..SIGNATURE_PREFIX_LEN.min(signature.len())] {
        warn!("signature prefix check failed");
        return Err(PgpError::with_kind(
            ErrorCategory::User,
            ErrorKind::SignaturePrefixMismatch,
            "signature prefix does not match; envelope corrupted",
        ));
    }

    let signer = KeyId::from_bytes(signer)
        .ok_or_else(|| PgpError::corrupt("signer key id must be 8 bytes"))?;
    let signed_at = utf8_field(signed_at, "signature timestamp")?;
    let public_key = resolver
        .resolve_public_key(&KeyRef::Id(signer))
        .map_err(|e| PgpError::from(e).with_context(format!("cannot verify signature by {signer}")))?;

    asymmetric::verify(signed, signature, &public_key).inspect_err(|_| {
        warn!(%signer, "signature verification failed");
    })?;
    debug!(%signer, "signature verified");
    Ok((signer, signed_at))
}

fn utf8_field(bytes: &[u8], what: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| {
        PgpError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::CorruptEnvelope,
            format!("{what} is not valid UTF-8"),
            e,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::KeyRing;
    use crate::primitives::asymmetric::MIN_KEY_BITS;
    use crate::primitives::symmetric::SymmetricAlgorithm;
    use std::sync::LazyLock;

    static RING: LazyLock<KeyRing> = LazyLock::new(|| {
        let mut ring = KeyRing::new();
        ring.generate_key_pair("alice", "alice@example.org", b"alice pw", MIN_KEY_BITS)
            .unwrap();
        ring.generate_key_pair("bob", "bob@example.org", b"bob pw", MIN_KEY_BITS)
            .unwrap();
        ring
    });

    fn alice() -> Sender {
        Sender::new("alice", b"alice pw")
    }

    fn bob() -> KeyRef {
        KeyRef::from("bob")
    }

    fn encode(message: &[u8], options: Options) -> Vec<u8> {
        encode_message(&*RING, message, "note.txt", options, Some(&alice()), &bob()).unwrap()
    }

    fn decode(envelope: &[u8], options: Options) -> Result<DecodedMessage> {
        decode_message(&*RING, envelope, options, &bob(), b"bob pw")
    }

    /// Rebuild a `SIGN`-only envelope after letting `edit` change the
    /// literal fields or the signature part fields.
    fn rewrite_signed(envelope: &[u8], edit: impl FnOnce(&mut Vec<Vec<u8>>, &mut Vec<Vec<u8>>)) -> Vec<u8> {
        let [payload, keys, receiver] = framing::split_exact(envelope, ["p", "k", "r"]).unwrap();
        let [literal, signature] = framing::split_exact(payload, ["l", "s"]).unwrap();
        let mut literal: Vec<Vec<u8>> = framing::split_all(literal, "l")
            .unwrap()
            .into_iter()
            .map(<[u8]>::to_vec)
            .collect();
        let mut signature: Vec<Vec<u8>> = framing::split_all(signature, "s")
            .unwrap()
            .into_iter()
            .map(<[u8]>::to_vec)
            .collect();
        edit(&mut literal, &mut signature);

        let as_slices = |fields: &Vec<Vec<u8>>| framing::join(&fields.iter().map(Vec::as_slice).collect::<Vec<_>>()).unwrap();
        let payload = framing::join(&[&as_slices(&literal), &as_slices(&signature)]).unwrap();
        framing::join(&[&payload, keys, receiver]).unwrap()
    }

    #[test]
    fn test_plain_roundtrip() {
        let envelope = encode(b"hello", Options::empty());
        let decoded = decode(&envelope, Options::empty()).unwrap();
        assert_eq!(decoded.message, b"hello");
        assert_eq!(decoded.filename, "note.txt");
        assert_eq!(decoded.signer, None);
        assert!(chrono::DateTime::parse_from_rfc3339(&decoded.timestamp).is_ok());
    }

    #[test]
    fn test_plain_envelope_carries_message_verbatim() {
        let envelope = encode(b"visible text", Options::empty());
        assert!(envelope.windows(12).any(|w| w == b"visible text"));

        let envelope = encode(b"visible text", Options::AES_ENCRYPT);
        assert!(!envelope.windows(12).any(|w| w == b"visible text"));
    }

    #[test]
    fn test_signed_roundtrip_reports_signer() {
        let options = Options::SIGN | Options::COMPRESS | Options::TDES_ENCRYPT;
        let envelope = encode(b"signed and sealed", options);
        let decoded = decode(&envelope, options).unwrap();
        let alice_id = RING.entry(&KeyRef::from("alice")).unwrap().key_id;
        assert_eq!(decoded.message, b"signed and sealed");
        assert_eq!(decoded.signer, Some(alice_id));
        assert!(decoded.signed_at.is_some());
    }

    #[test]
    fn test_pinned_sessions() {
        let options = Options::AES_ENCRYPT | Options::TDES_ENCRYPT;
        let sessions = vec![
            SessionParams::from_parts(SymmetricAlgorithm::Aes128, &[1; 16], &[2; 16]),
            SessionParams::from_parts(SymmetricAlgorithm::TripleDes, &[3; 24], &[4; 8]),
        ];
        let request = EncodeRequest {
            message: b"pinned",
            destination_name: "p.bin",
            options,
            sender: None,
            receiver: &bob(),
        };
        let envelope = encode_message_with_sessions(&*RING, &request, sessions).unwrap();
        assert_eq!(decode(&envelope, options).unwrap().message, b"pinned");
    }

    #[test]
    fn test_sessions_must_match_options() {
        let request = EncodeRequest {
            message: b"x",
            destination_name: "x",
            options: Options::AES_ENCRYPT,
            sender: None,
            receiver: &bob(),
        };
        let sessions = vec![SessionParams::generate(SymmetricAlgorithm::TripleDes)];
        assert!(encode_message_with_sessions(&*RING, &request, sessions).is_err());
    }

    #[test]
    fn test_sign_without_sender() {
        let err = encode_message(&*RING, b"x", "x", Options::SIGN, None, &bob())
            .expect_err("signing needs a sender");
        assert_eq!(err.kind, Some(ErrorKind::KeyNotFound));
    }

    #[test]
    fn test_unknown_receiver() {
        let err = encode_message(&*RING, b"x", "x", Options::empty(), None, &KeyRef::from("carol"))
            .expect_err("carol is not in the ring");
        assert_eq!(err.kind, Some(ErrorKind::KeyNotFound));
    }

    #[test]
    fn test_recipient_mismatch() {
        let envelope = encode(b"for bob", Options::AES_ENCRYPT);
        let err = decode_message(&*RING, &envelope, Options::AES_ENCRYPT, &KeyRef::from("alice"), b"alice pw")
            .expect_err("alice is not the receiver");
        assert_eq!(err.kind, Some(ErrorKind::RecipientMismatch));
    }

    #[test]
    fn test_wrapped_key_count_mismatch() {
        let envelope = encode(b"one layer", Options::AES_ENCRYPT);
        let err = decode(&envelope, Options::AES_ENCRYPT | Options::TDES_ENCRYPT)
            .expect_err("two layers expected");
        assert_eq!(err.kind, Some(ErrorKind::CorruptEnvelope));
    }

    #[test]
    fn test_missing_radix64_on_decode() {
        let envelope = encode(b"armored", Options::RADIX64);
        let err = decode(&envelope, Options::empty()).expect_err("armor left on");
        assert_eq!(err.kind, Some(ErrorKind::CorruptEnvelope));
    }

    #[test]
    fn test_signature_prefix_mismatch() {
        let envelope = encode(b"signed", Options::SIGN);
        let tampered = rewrite_signed(&envelope, |_, signature| signature[1][0] ^= 0xFF);
        let err = decode(&tampered, Options::SIGN).expect_err("prefix altered");
        assert_eq!(err.kind, Some(ErrorKind::SignaturePrefixMismatch));
    }

    #[test]
    fn test_altered_message_fails_verification() {
        let envelope = encode(b"pay 10", Options::SIGN);
        let tampered = rewrite_signed(&envelope, |literal, _| literal[0] = b"pay 99".to_vec());
        let err = decode(&tampered, Options::SIGN).expect_err("message altered");
        assert_eq!(err.kind, Some(ErrorKind::InvalidSignature));
    }

    #[test]
    fn test_altered_signature_fails_verification() {
        let envelope = encode(b"pay 10", Options::SIGN);
        let tampered = rewrite_signed(&envelope, |_, signature| {
            let last = signature[0].len() - 1;
            signature[0][last] ^= 0x01;
        });
        let err = decode(&tampered, Options::SIGN).expect_err("signature altered");
        assert_eq!(err.kind, Some(ErrorKind::InvalidSignature));
    }

    #[test]
    fn test_unknown_signer() {
        let envelope = encode(b"from alice", Options::SIGN);

        let mut ring = KeyRing::new();
        let bob_pem = RING.export_public_pem(&bob()).unwrap();
        ring.import_public_pem("bob", "", &bob_pem).unwrap();
        let err = decode_message(&ring, &envelope, Options::SIGN, &bob(), b"")
            .expect_err("alice's key is unknown here");
        assert_eq!(err.kind, Some(ErrorKind::KeyNotFound));
    }

    #[test]
    fn test_oversized_compressed_payload() {
        let message = vec![0u8; compression::MAX_DECOMPRESSED_LEN + 1];
        let envelope =
            encode_message(&*RING, &message, "zeros", Options::COMPRESS, None, &bob()).unwrap();
        assert!(envelope.len() < message.len() / 500);
        let err = decode(&envelope, Options::COMPRESS).expect_err("inflates past the limit");
        assert_eq!(err.kind, Some(ErrorKind::CorruptEnvelope));
    }

    #[test]
    fn test_decode_without_encryption_needs_no_password() {
        let options = Options::SIGN | Options::COMPRESS | Options::RADIX64;
        let envelope = encode(b"open letter", options);
        let decoded = decode_message(&*RING, &envelope, options, &bob(), b"").unwrap();
        assert_eq!(decoded.message, b"open letter");
    }
}
