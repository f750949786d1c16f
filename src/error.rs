use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    Internal,

    /// The caller supplied bad input: a corrupt envelope, a wrong password,
    /// an unknown key, or an option set that does not match the envelope.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// No key matched the requested id or name.
    KeyNotFound,
    /// A private key exists but the password does not unlock it.
    WrongPassword,
    /// Full signature verification failed.
    InvalidSignature,
    /// The two-byte signature prefix check failed before full verification.
    SignaturePrefixMismatch,
    /// Framing, part counts, radix64 or compressed data are malformed.
    CorruptEnvelope,
    /// Session key unwrapping or symmetric decryption failed, including
    /// ciphertext that decrypted to garbage.
    DecryptionFailure,
    /// Input to RSA-OAEP wrapping is larger than the key can carry.
    PayloadTooLarge,
    /// The envelope is addressed to a different receiver key.
    RecipientMismatch,
    /// Key material could not be parsed or serialized.
    KeyFormat,
    /// No password could be read, or the two entries did not match.
    PasswordUnavailable,
    /// Unexpected state reached within minipgp logic.
    InternalInvariant,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct PgpError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag. Consumers MUST handle the absence
    /// of a kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl PgpError {
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error tagged with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Shorthand for a user-category corrupt-envelope error.
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorCategory::User, ErrorKind::CorruptEnvelope, msg)
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving
    /// the original as source. Category and kind carry over.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }

    /// Re-tags the error with a different kind, keeping the original as source.
    pub(crate) fn reclassify(self, kind: ErrorKind, msg: impl Into<String>) -> Self {
        let category = self.category;
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }

    /// True if this error carries the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == Some(kind)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, PgpError>;
