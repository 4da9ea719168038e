//! Cryptographic foundations for the security core
//!
//! Provides high-level encryption/decryption interfaces using
//! cryptographically secure implementations.
//!
//! SECURITY: Uses OsRng for all random number generation; all symmetric
//! encryption is authenticated (ChaCha20Poly1305) so tampering is detected,
//! never silently decrypted.

pub mod encryption;
pub mod hashing;
pub mod password;

pub use encryption::{EncryptionService, PaymentCard, DEFAULT_VISIBLE_SUFFIX};
pub use hashing::{generate_hash, verify_hash, HashAlgorithm};
