//! Single-purpose cryptographic transforms.
//!
//! Every function here consumes a byte buffer plus explicit parameters and
//! returns a new buffer (and, for symmetric encryption, the session
//! parameters that were used). None of them keep state between calls; the
//! only impurity is drawing session keys, IVs, OAEP seeds and PSS salts from
//! the operating system RNG.
//!
//! The envelope codec in [`crate::codec`] decides which of these run and in
//! what order.

pub mod asymmetric;
pub mod compression;
pub mod hash;
pub mod radix64;
pub mod symmetric;
