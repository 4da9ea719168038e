//! Deterministic digests for integrity fingerprints
//!
//! Identical input and algorithm always yield identical output; this is for
//! change detection and cache keys, never for passwords.

use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

/// Compute a hex-encoded digest of `data`
pub fn generate_hash(data: &[u8], algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        HashAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
        HashAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
    }
}

/// Compare a freshly computed fingerprint against `expected_hex` in
/// constant time
pub fn verify_hash(data: &[u8], algorithm: HashAlgorithm, expected_hex: &str) -> bool {
    let actual = generate_hash(data, algorithm);
    if actual.len() != expected_hex.len() {
        return false;
    }
    actual.as_bytes().ct_eq(expected_hex.as_bytes()).into()
}
