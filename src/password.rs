//! Where key passwords come from.
//!
//! A password unlocks a sealed private key for decoding or signing, and seals
//! a new one at keygen or import. The CLI reads it either from a pipe or
//! from the terminal; library callers usually hand one over directly.

use crate::error::{ErrorCategory, ErrorKind, PgpError, Result};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// A source of one key password per call.
///
/// Passwords are bytes, not text: a password piped in need not be UTF-8.
pub trait PasswordSource {
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// The same password every time.
pub struct FixedPassword {
    password: Zeroizing<Vec<u8>>,
}

impl FixedPassword {
    pub fn new(password: impl Into<Vec<u8>>) -> Self {
        Self {
            password: Zeroizing::new(password.into()),
        }
    }
}

impl PasswordSource for FixedPassword {
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(self.password.clone())
    }
}

/// Everything a reader yields up to EOF, minus one trailing `\n` or `\r\n`,
/// so `echo secret | minipgp --password-stdin ...` unlocks a key whose
/// password is `secret`.
pub struct PipedPassword {
    reader: Box<dyn Read>,
}

impl PipedPassword {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PasswordSource for PipedPassword {
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            PgpError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to read key password from input",
                e,
            )
        })?;
        if data.last() == Some(&b'\n') {
            data.pop();
            if data.last() == Some(&b'\r') {
                data.pop();
            }
        }
        Ok(data)
    }
}

/// Prompts on stderr and reads from the terminal without echo.
///
/// Terminal input is UTF-8 only; keys with other passwords need
/// `--password-stdin`.
pub struct TerminalPassword {
    prompt: String,
    confirm: bool,
}

impl TerminalPassword {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            confirm: false,
        }
    }

    /// Ask twice and fail unless both entries match. Used when a new key is
    /// sealed, where a typo would lock the key away for good.
    pub fn confirming(prompt: impl Into<String>) -> Self {
        Self {
            confirm: true,
            ..Self::new(prompt)
        }
    }

    fn prompt_once(prompt: &str) -> Result<Zeroizing<Vec<u8>>> {
        let mut stderr = io::stderr();
        stderr
            .write_all(prompt.as_bytes())
            .and_then(|()| stderr.flush())
            .map_err(|e| {
                PgpError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to write password prompt",
                    e,
                )
            })?;

        let typed = rpassword::read_password().map_err(|e| {
            PgpError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PasswordUnavailable,
                "failed to read key password from terminal",
                e,
            )
        })?;
        Ok(Zeroizing::new(typed.into_bytes()))
    }
}

impl PasswordSource for TerminalPassword {
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        if !io::stdin().is_terminal() {
            return Err(PgpError::with_kind(
                ErrorCategory::User,
                ErrorKind::PasswordUnavailable,
                "stdin is not a terminal; pass --password-stdin to pipe the key password",
            ));
        }

        let password = Self::prompt_once(&self.prompt)?;
        if self.confirm {
            let again = Self::prompt_once("Repeat password: ")?;
            if again != password {
                return Err(PgpError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::PasswordUnavailable,
                    "passwords do not match",
                ));
            }
        }
        Ok(password)
    }
}
