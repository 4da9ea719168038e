//! Error types for the MealDesk security core.
//!
//! A single crate-level error enum keeps the propagation policy visible in
//! one place: crypto failures always reach the caller, audit persistence
//! failures are absorbed into [`crate::audit::LogOutcome`] at the logger
//! boundary, and detector failures are handled fail-open inside the monitor.

use thiserror::Error;

/// Result type alias for security core operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Empty or otherwise unusable input to a crypto operation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Envelope could not be decrypted. Deliberately opaque: a tampered
    /// envelope and a wrong key must be indistinguishable to the caller.
    #[error("decryption failed")]
    Decryption,

    /// Unexpected failure inside a cryptographic primitive
    #[error("cryptographic error: {0}")]
    Crypto(String),

    /// Password hashing or verification could not run
    #[error("password hashing error: {0}")]
    PasswordHash(String),

    /// Audit or alert store unavailable, rejected a write, or timed out
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Alert lifecycle change that the state machine forbids
    #[error("illegal alert transition: {0}")]
    IllegalTransition(String),

    /// Referenced alert does not exist
    #[error("alert not found: {0}")]
    AlertNotFound(uuid::Uuid),

    /// Invalid or missing configuration detected at startup
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
