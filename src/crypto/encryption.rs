//! Field-level encryption for sensitive data at rest
//!
//! Business code calls [`EncryptionService`] before persisting sensitive
//! fields and after reading them back. Each call produces a self-contained
//! envelope: `base64(nonce || auth_tag || ciphertext)` under
//! ChaCha20Poly1305 with a fixed associated-data context, so any bit-flip
//! fails authentication instead of yielding garbage plaintext.

use crate::config::SecurityConfig;
use crate::crypto::hashing::{self, HashAlgorithm};
use crate::crypto::password;
use crate::error::{Error, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Associated authenticated data bound to every envelope. Changing this
/// string invalidates all previously encrypted fields.
const FIELD_CONTEXT: &[u8] = b"MEALDESK_FIELD_V1";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Default number of trailing characters left visible by masking
pub const DEFAULT_VISIBLE_SUFFIX: usize = 4;

/// Cipher key material, wiped on drop
#[derive(Zeroize, ZeroizeOnDrop)]
struct FieldKey([u8; 32]);

/// Sensitive subset of a payment method, the only part that is ever
/// encrypted. Debug output is masked so the PAN and CVV cannot leak through
/// logging.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCard {
    pub card_number: String,
    pub cvv: String,
    pub expiry_date: String,
}

impl std::fmt::Debug for PaymentCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentCard")
            .field(
                "card_number",
                &mask_sensitive_data(&self.card_number, DEFAULT_VISIBLE_SUFFIX),
            )
            .field("cvv", &mask_sensitive_data(&self.cvv, 0))
            .field("expiry_date", &self.expiry_date)
            .finish()
    }
}

/// Symmetric authenticated encryption service for data-at-rest protection
///
/// Constructed once at process start from [`SecurityConfig`] and passed to
/// callers; there is no global accessor.
pub struct EncryptionService {
    key: FieldKey,
    argon: Argon2<'static>,
}

impl EncryptionService {
    /// Build the service from validated configuration
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        if config.encryption_key.is_empty() {
            return Err(Error::Config("encryption key is empty".into()));
        }
        let params = Params::new(
            config.password.memory_kib,
            config.password.iterations,
            config.password.parallelism,
            None,
        )
        .map_err(|e| Error::Config(format!("argon2 parameters: {}", e)))?;

        Ok(Self {
            key: FieldKey(derive_key(config.encryption_key.as_bytes())),
            argon: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Encrypt a byte payload into a base64 envelope
    ///
    /// Non-deterministic: a fresh nonce is drawn per call, so two identical
    /// plaintexts yield different envelopes. Empty plaintext is valid;
    /// optional business fields may legitimately be empty.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key.0));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: FIELD_CONTEXT,
                },
            )
            .map_err(|_| Error::Crypto("encryption failed".into()))?;

        // sealed = ciphertext || tag; envelope layout is nonce || tag || ciphertext
        let split = sealed.len() - TAG_LEN;
        let mut envelope = Vec::with_capacity(NONCE_LEN + sealed.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&sealed[split..]);
        envelope.extend_from_slice(&sealed[..split]);
        Ok(BASE64.encode(envelope))
    }

    /// Decrypt an envelope produced by [`encrypt`](Self::encrypt)
    ///
    /// Any malformed envelope, tampered byte, or wrong key yields the same
    /// opaque [`Error::Decryption`]; the cause is never distinguishable.
    pub fn decrypt(&self, envelope: &str) -> Result<Vec<u8>> {
        if envelope.is_empty() {
            return Err(Error::InvalidInput("empty envelope".into()));
        }
        let raw = BASE64.decode(envelope).map_err(|_| Error::Decryption)?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::Decryption);
        }

        let nonce = Nonce::from_slice(&raw[..NONCE_LEN]);
        let tag = &raw[NONCE_LEN..NONCE_LEN + TAG_LEN];
        let ciphertext = &raw[NONCE_LEN + TAG_LEN..];

        let mut sealed = Vec::with_capacity(raw.len() - NONCE_LEN);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key.0));
        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &sealed,
                    aad: FIELD_CONTEXT,
                },
            )
            .map_err(|_| Error::Decryption)
    }

    /// Encrypt a UTF-8 field
    pub fn encrypt_str(&self, plaintext: &str) -> Result<String> {
        self.encrypt(plaintext.as_bytes())
    }

    /// Decrypt an envelope holding a UTF-8 field
    pub fn decrypt_str(&self, envelope: &str) -> Result<String> {
        let plaintext = self.decrypt(envelope)?;
        String::from_utf8(plaintext).map_err(|_| Error::Decryption)
    }

    /// Encrypt only the sensitive subset of a payment method
    pub fn encrypt_payment_data(&self, card: &PaymentCard) -> Result<String> {
        let plaintext = serde_json::to_vec(card)?;
        self.encrypt(&plaintext)
    }

    /// Reconstruct payment data from its envelope
    pub fn decrypt_payment_data(&self, envelope: &str) -> Result<PaymentCard> {
        let plaintext = self.decrypt(envelope)?;
        serde_json::from_slice(&plaintext).map_err(|_| Error::Decryption)
    }

    /// Hash a password with Argon2id using the configured cost
    pub fn hash_password(&self, password: &str) -> Result<String> {
        password::hash_password(&self.argon, password)
    }

    /// Verify a password against a stored hash, constant-time with respect
    /// to correctness
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        password::verify_password(password, hash)
    }

    /// Generate `length_bytes` of cryptographically secure randomness as hex
    pub fn generate_secure_key(&self, length_bytes: usize) -> Result<String> {
        if length_bytes == 0 {
            return Err(Error::InvalidInput("key length must be non-zero".into()));
        }
        let mut bytes = vec![0u8; length_bytes];
        OsRng.fill_bytes(&mut bytes);
        Ok(hex::encode(bytes))
    }

    /// Deterministic integrity fingerprint. Not for passwords.
    pub fn generate_hash(&self, data: &[u8], algorithm: HashAlgorithm) -> String {
        hashing::generate_hash(data, algorithm)
    }

    /// Constant-time comparison of a fingerprint against `expected_hex`
    pub fn verify_hash(&self, data: &[u8], algorithm: HashAlgorithm, expected_hex: &str) -> bool {
        hashing::verify_hash(data, algorithm, expected_hex)
    }

    /// Display-safe masking of a sensitive value
    pub fn mask_sensitive_data(&self, value: &str, visible_suffix_len: usize) -> String {
        mask_sensitive_data(value, visible_suffix_len)
    }
}

/// Derive the 32-byte cipher key. Material that is already exactly the key
/// length is used as-is; anything else is digested with SHA-256 rather than
/// rejected.
fn derive_key(material: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    if material.len() == 32 {
        key.copy_from_slice(material);
    } else {
        key.copy_from_slice(&Sha256::digest(material));
    }
    key
}

/// Replace every character with `*` except the last `visible_suffix_len`.
/// Values no longer than the visible suffix are fully masked.
pub fn mask_sensitive_data(value: &str, visible_suffix_len: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= visible_suffix_len {
        return "*".repeat(chars.len());
    }
    let masked = chars.len() - visible_suffix_len;
    let mut out = "*".repeat(masked);
    out.extend(&chars[masked..]);
    out
}
