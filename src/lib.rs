//! Security and trust services for the MealDesk ordering platform
//!
//! Three cooperating services cover the platform's security surface:
//!
//! - [`EncryptionService`] — field-level encryption for payment data and
//!   other sensitive strings (ChaCha20-Poly1305 envelopes), Argon2id
//!   password hashing, content digests, and display masking
//! - [`AuditLogger`] — an append-only trail of security-relevant actions
//!   with typed queries, sanitized details, and fail-open writes
//! - [`SecurityMonitor`] — sliding-window threat detectors over the audit
//!   trail plus an in-process rate tracker, feeding an alert lifecycle
//!
//! Storage sits behind the [`audit::AuditStore`] and
//! [`monitor::AlertStore`] traits; in-memory implementations are provided
//! and a relational backend can be dropped in without touching the
//! services. Wiring starts from [`SecurityConfig`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use mealdesk_security::{
//!     AuditLogger, EncryptionService, MemoryAuditStore, SecurityConfig, SecurityMonitor,
//! };
//! use mealdesk_security::monitor::{LogNotifier, MemoryAlertStore};
//!
//! # fn main() -> mealdesk_security::Result<()> {
//! let config = SecurityConfig::load()?;
//! let encryption = EncryptionService::new(&config)?;
//! let audit = Arc::new(AuditLogger::new(
//!     Arc::new(MemoryAuditStore::new()),
//!     config.detectors.store_timeout,
//! ));
//! let monitor = SecurityMonitor::new(
//!     audit,
//!     Arc::new(MemoryAlertStore::new()),
//!     config.detectors.clone(),
//!     config.rate.clone(),
//! )
//! .with_notifier(Arc::new(LogNotifier));
//! let _sweeper = monitor.start_rate_sweeper();
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod crypto;
pub mod error;
pub mod monitor;

pub use audit::{
    AuditAction, AuditLogger, AuditQuery, AuditRecord, AuditStats, AuditStore, LogOutcome,
    MemoryAuditStore, NewAuditRecord,
};
pub use config::SecurityConfig;
pub use crypto::{EncryptionService, HashAlgorithm, PaymentCard};
pub use error::{Error, Result};
pub use monitor::{
    AlertSeverity, AlertStatus, AlertType, SecurityAlert, SecurityMonitor, SecurityStatus, Verdict,
};
