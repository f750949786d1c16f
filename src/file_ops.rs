//! Reading and writing envelopes on disk
//!
//! The codec works on byte buffers. This module is the thin layer that puts
//! those buffers into files and takes them back out, plus the glue for the
//! common "encode this file for that key" flow.

use crate::codec::{self, DecodedMessage, Sender};
use crate::error::{ErrorCategory, ErrorKind, PgpError, Result};
use crate::keys::{KeyRef, KeyResolver};
use crate::options::Options;
use crate::password::PasswordSource;
use crate::primitives::hash;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Extension given to envelope files
pub const ENVELOPE_EXTENSION: &str = "pgp";

/// `path` with `.pgp` appended, unless it already ends in `.pgp`.
pub fn envelope_path(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == ENVELOPE_EXTENSION) {
        return path.to_path_buf();
    }
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(ENVELOPE_EXTENSION);
    PathBuf::from(name)
}

/// Write an envelope next to `path`, returning the path actually written.
///
/// The `.pgp` extension is added if missing. The write is atomic (tempfile +
/// fsync + rename) and the file gets mode 0o600 on Unix systems.
pub fn write_envelope(path: &Path, envelope: &[u8]) -> Result<PathBuf> {
    let target = envelope_path(path);
    write_atomic(&target, envelope)
        .map_err(|e| e.with_context(format!("failed to write envelope to {}", target.display())))?;
    info!(
        path = %target.display(),
        len = envelope.len(),
        sha1 = %hash::hex_digest(envelope),
        "wrote envelope"
    );
    Ok(target)
}

pub fn read_envelope(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| read_error(path, e))
}

/// Encode the contents of `input` and write the envelope to `output`.
///
/// The file name of `input` is recorded in the envelope as the destination
/// name.
pub fn encode_file(
    resolver: &dyn KeyResolver,
    input: &Path,
    output: &Path,
    options: Options,
    sender: Option<&Sender>,
    receiver: &KeyRef,
) -> Result<PathBuf> {
    let message = fs::read(input).map_err(|e| read_error(input, e))?;
    let destination_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let envelope = codec::encode_message(
        resolver,
        &message,
        &destination_name,
        options,
        sender,
        receiver,
    )
    .map_err(|e| e.with_context(format!("failed to encode {}", input.display())))?;
    write_envelope(output, &envelope)
}

/// Decode the envelope at `input` and write the recovered message into
/// `output_dir` under the file name recorded by the sender.
///
/// The password is only requested when `options` includes encryption.
pub fn decode_file(
    resolver: &dyn KeyResolver,
    input: &Path,
    output_dir: &Path,
    options: Options,
    receiver: &KeyRef,
    password_source: &mut dyn PasswordSource,
) -> Result<(PathBuf, DecodedMessage)> {
    let envelope = read_envelope(input)?;
    let password = if options.encrypts() {
        password_source.read_password()?
    } else {
        Default::default()
    };
    let decoded = codec::decode_message(resolver, &envelope, options, receiver, &password)
        .map_err(|e| e.with_context(format!("failed to decode {}", input.display())))?;

    let target = output_dir.join(safe_file_name(&decoded.filename)?);
    write_atomic(&target, &decoded.message)
        .map_err(|e| e.with_context(format!("failed to write to {}", target.display())))?;
    info!(
        path = %target.display(),
        len = decoded.message.len(),
        sha1 = %hash::hex_digest(&decoded.message),
        "wrote decoded message"
    );
    Ok((target, decoded))
}

/// Reduce a sender-supplied file name to its final component, so an envelope
/// can never direct a write outside the output directory.
pub fn safe_file_name(name: &str) -> Result<&str> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            PgpError::new(
                ErrorCategory::User,
                format!("envelope names no usable output file (got {:?})", name),
            )
        })
}

/// Atomically replace `path` with `contents`, mode 0o600 on Unix.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        PgpError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to create tempfile in {}", dir.display()),
            e,
        )
    })?;

    temp_file.write_all(contents).map_err(|e| {
        PgpError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write to tempfile",
            e,
        )
    })?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file.flush().map_err(|e| {
        PgpError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to flush tempfile",
            e,
        )
    })?;
    temp_file.as_file().sync_all().map_err(|e| {
        PgpError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| {
                PgpError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to set tempfile permissions",
                    e,
                )
            })?;
    }

    temp_file.persist(path).map_err(|e| {
        PgpError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}

pub(crate) fn read_error(path: &Path, err: io::Error) -> PgpError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    PgpError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
