//! minipgp CLI - sign, compress, encrypt and armor files for a key holder
//!
//! Keys live in one directory (`--key-dir` or `MINIPGP_KEY_DIR`) as
//! `NAME.pub.pem`, `NAME.sec` and `NAME.json`. Private keys leave and enter
//! that directory as password-encrypted PKCS#8 PEM. Passwords are read from the
//! terminal unless `--password-stdin` is given.

use clap::{Parser, Subcommand};
use std::error::Error as StdError;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use minipgp::codec::Sender;
use minipgp::error::{ErrorCategory, ErrorKind, PgpError, Result};
use minipgp::file_ops::{self, read_envelope};
use minipgp::password::{PasswordSource, PipedPassword, TerminalPassword};
use minipgp::primitives::{asymmetric, hash};
use minipgp::{KeyRef, KeyRing, Options};

#[derive(Parser)]
#[command(name = "minipgp")]
#[command(version)]
#[command(about = "OpenPGP-style message envelopes.", long_about = None)]
struct Cli {
    /// Read the key password from stdin instead of from terminal
    #[arg(long, global = true)]
    password_stdin: bool,

    /// Directory holding the key ring
    #[arg(long, global = true, env = "MINIPGP_KEY_DIR", default_value = ".minipgp")]
    key_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key pair and store it in the key directory
    Keygen {
        /// Short name used to refer to the key
        #[arg(short, long)]
        name: String,

        /// Free-form owner description, e.g. "Alice <alice@example.org>"
        #[arg(short, long, default_value = "")]
        user_id: String,

        /// RSA modulus size
        #[arg(long, default_value_t = asymmetric::DEFAULT_KEY_BITS)]
        bits: usize,
    },

    /// List the keys in the key directory as JSON
    #[command(alias = "ls")]
    ListKeys {
        /// Only keys with exactly this user id
        #[arg(short, long)]
        user_id: Option<String>,
    },

    /// Print a key's public PEM, or its password-encrypted private PEM
    ExportKey {
        /// Key name or 16-digit hex key id
        key: String,

        /// Export the private key, encrypted under its password
        #[arg(long)]
        private: bool,
    },

    /// Add a PEM key to the key directory
    ImportKey {
        #[arg(short, long)]
        name: String,

        #[arg(short, long, default_value = "")]
        user_id: String,

        /// The file holds a PKCS#8 private key; it is stored sealed under the
        /// password read
        #[arg(long)]
        private: bool,

        /// PEM file to import
        #[arg(value_name = "FILE")]
        pem: PathBuf,
    },

    /// Encode a file into an envelope
    #[command(alias = "e")]
    Encode {
        /// File whose contents is to be encoded
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Envelope path; `.pgp` is appended if missing
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Receiver key name or id
        #[arg(long)]
        to: String,

        /// Sender key name or id (needed with `sign`)
        #[arg(long)]
        from: Option<String>,

        /// Comma-separated stages: sign, compress, aes_encrypt, 3des_encrypt, radix64
        #[arg(long, default_value = "none")]
        options: Options,
    },

    /// Decode an envelope, writing the message under its recorded file name
    #[command(alias = "d")]
    Decode {
        /// Envelope to decode
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Directory to write the recovered file into
        #[arg(long, value_name = "DIR", default_value = ".")]
        out_dir: PathBuf,

        /// Receiver key name or id (your key)
        #[arg(long = "as")]
        receiver: String,

        /// The same stages the sender used
        #[arg(long, default_value = "none")]
        options: Options,
    },

    /// Print the SHA-1 digest of a file
    Digest {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("Error: {}", error_chain(&e));
        process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("MINIPGP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Keygen {
            name,
            user_id,
            bits,
        } => {
            let mut ring = KeyRing::load_dir(&cli.key_dir)?;
            let mut source: Box<dyn PasswordSource> = if cli.password_stdin {
                Box::new(PipedPassword::new(Box::new(io::stdin())))
            } else {
                Box::new(TerminalPassword::confirming("New key password: "))
            };
            let password = source.read_password()?;
            let key_id = ring.generate_key_pair(&name, &user_id, &password, bits)?;
            ring.save_key_files(&cli.key_dir, &KeyRef::Id(key_id))?;
            print_line(&key_id.to_string())
        }
        Commands::ListKeys { user_id } => {
            let ring = KeyRing::load_dir(&cli.key_dir)?;
            let entries = match user_id {
                Some(user_id) => ring.entries_for_user(&user_id),
                None => ring.entries(),
            };
            let json = serde_json::to_string_pretty(&entries).map_err(|e| {
                PgpError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::InternalInvariant,
                    "failed to serialize key list",
                    e,
                )
            })?;
            print_line(&json)
        }
        Commands::ExportKey { key, private } => {
            let ring = KeyRing::load_dir(&cli.key_dir)?;
            let key = KeyRef::parse(&key);
            if private {
                let password = password_source(cli.password_stdin, "Key password: ")
                    .read_password()?;
                let pem = ring.export_private_pem(&key, &password)?;
                print_line(pem.trim_end())
            } else {
                print_line(ring.export_public_pem(&key)?.trim_end())
            }
        }
        Commands::ImportKey {
            name,
            user_id,
            private,
            pem,
        } => {
            let mut ring = KeyRing::load_dir(&cli.key_dir)?;
            let text = fs::read_to_string(&pem).map_err(|e| {
                PgpError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::Io,
                    format!("failed to read from {}", pem.display()),
                    e,
                )
            })?;
            let text = Zeroizing::new(text);
            let key_id = if private {
                let password = password_source(cli.password_stdin, "Key password: ")
                    .read_password()?;
                ring.import_private_pem(&name, &user_id, &text, &password)?
            } else {
                ring.import_public_pem(&name, &user_id, &text)?
            };
            ring.save_key_files(&cli.key_dir, &KeyRef::Id(key_id))?;
            print_line(&key_id.to_string())
        }
        Commands::Encode {
            input,
            output,
            to,
            from,
            options,
        } => {
            let ring = KeyRing::load_dir(&cli.key_dir)?;
            let sender = match from {
                Some(from) if options.contains(Options::SIGN) => {
                    let password = password_source(cli.password_stdin, "Signing key password: ")
                        .read_password()?;
                    Some(Sender::new(KeyRef::parse(&from), &password))
                }
                _ => None,
            };
            let written = file_ops::encode_file(
                &ring,
                &input,
                &output,
                options,
                sender.as_ref(),
                &KeyRef::parse(&to),
            )?;
            print_line(&written.display().to_string())
        }
        Commands::Decode {
            input,
            out_dir,
            receiver,
            options,
        } => {
            let ring = KeyRing::load_dir(&cli.key_dir)?;
            let mut source = password_source(cli.password_stdin, "Key password: ");
            let (written, decoded) = file_ops::decode_file(
                &ring,
                &input,
                &out_dir,
                options,
                &KeyRef::parse(&receiver),
                &mut *source,
            )?;
            if let Some(signer) = decoded.signer {
                let name = ring
                    .entry(&KeyRef::Id(signer))
                    .map(|entry| entry.name)
                    .unwrap_or_default();
                eprintln!("Good signature from {} ({})", signer, name);
            }
            print_line(&written.display().to_string())
        }
        Commands::Digest { file } => {
            let contents = read_envelope(&file)?;
            print_line(&format!("{}  {}", hash::hex_digest(&contents), file.display()))
        }
    }
}

fn password_source(use_stdin: bool, prompt: &str) -> Box<dyn PasswordSource> {
    if use_stdin {
        Box::new(PipedPassword::new(Box::new(io::stdin())))
    } else {
        Box::new(TerminalPassword::new(prompt))
    }
}

fn print_line(line: &str) -> Result<()> {
    writeln!(io::stdout(), "{}", line).map_err(|e| {
        PgpError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write to stdout",
            e,
        )
    })
}

/// `msg: source: source ...`, skipping sources whose text repeats the
/// message above them.
fn error_chain(err: &PgpError) -> String {
    let mut out = err.to_string();
    let mut source = StdError::source(err);
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.ends_with(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
