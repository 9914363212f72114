// src/hash.rs

//! SHA-256 hashing for purge codes
//!
//! A purge code authorizes a device-initiated factory reset. It is the
//! SHA-256 of the device id immediately followed by the install secret, so a
//! device can prove it was provisioned by this install without ever seeing
//! the secret.

use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 digest rendered as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest256(String);

impl Digest256 {
    /// Hex string of the digest
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Digest256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental SHA-256 over several byte slices
#[derive(Default)]
pub struct Hasher {
    state: Sha256,
}

impl Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.state.update(data);
        self
    }

    pub fn finalize(self) -> Digest256 {
        Digest256(hex::encode(self.state.finalize()))
    }
}

/// SHA-256 of a byte slice
pub fn sha256(data: &[u8]) -> Digest256 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Purge code for `dev_id` under the install `secret`
pub fn purge_code(dev_id: &str, secret: &[u8]) -> Digest256 {
    let mut hasher = Hasher::new();
    hasher.update(dev_id.as_bytes()).update(secret);
    hasher.finalize()
}
