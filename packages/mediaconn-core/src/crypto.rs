//! Content hashing used for device and server fingerprints.
//!
//! The [`CryptoProvider`] trait keeps hashing swappable (platform keystores,
//! FFI hosts); [`RustCryptoProvider`] is the default pure-Rust backend.

use md5::Md5;
use sha1::{Digest, Sha1};

/// Pure, stateless hash functions.
pub trait CryptoProvider: Send + Sync {
    /// Returns the 20-byte SHA1 digest of `value`.
    fn sha1(&self, value: &[u8]) -> Vec<u8>;

    /// Returns the 16-byte MD5 digest of `value`.
    fn md5(&self, value: &[u8]) -> Vec<u8>;
}

/// [`CryptoProvider`] backed by the RustCrypto `sha1` and `md-5` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCryptoProvider;

impl CryptoProvider for RustCryptoProvider {
    fn sha1(&self, value: &[u8]) -> Vec<u8> {
        Sha1::digest(value).to_vec()
    }

    fn md5(&self, value: &[u8]) -> Vec<u8> {
        Md5::digest(value).to_vec()
    }
}

/// Lowercase hex SHA1 of `parts` joined with `|`.
///
/// Used to derive a stable device id from client and machine names.
#[must_use]
pub fn device_fingerprint(crypto: &dyn CryptoProvider, parts: &[&str]) -> String {
    hex::encode(crypto.sha1(parts.join("|").as_bytes()))
}
