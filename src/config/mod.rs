//! Configuration for the security core
//!
//! Centralized configuration with:
//! - Sensible production defaults for every detector threshold and window
//! - Optional TOML file loading
//! - Environment overrides for secrets (`MEALDESK_ENCRYPTION_KEY`)
//! - Runtime validation before any component is constructed

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the field-encryption key material
pub const ENCRYPTION_KEY_ENV: &str = "MEALDESK_ENCRYPTION_KEY";

/// Environment variable pointing at an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "MEALDESK_SECURITY_CONFIG";

/// Top-level configuration for the security core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Key material for field encryption. At least 32 bytes of entropy is
    /// expected; material that is not exactly 32 bytes is digested down to
    /// the cipher key length rather than rejected.
    pub encryption_key: String,
    pub password: PasswordConfig,
    pub detectors: DetectorConfig,
    pub rate: RateConfig,
}

/// Argon2id cost parameters for password hashing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of iterations
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

/// Per-detector thresholds and window sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    #[serde(with = "humantime_serde")]
    pub failed_login_window: Duration,
    /// Failed logins per user or IP within the window before blocking
    pub failed_login_threshold: u64,

    #[serde(with = "humantime_serde")]
    pub distinct_ip_window: Duration,
    /// Distinct IPs for one user within the window before flagging
    pub distinct_ip_threshold: u64,

    /// Requests per (IP, endpoint) within the rate window before blocking
    pub rapid_request_threshold: u64,

    #[serde(with = "humantime_serde")]
    pub sensitive_access_window: Duration,
    /// Sensitive-data events for one user within the window before flagging
    pub sensitive_access_threshold: u64,

    #[serde(with = "humantime_serde")]
    pub anomaly_window: Duration,
    /// An hour is anomalous when its count exceeds this multiple of the mean
    pub anomaly_multiplier: f64,
    /// Minimum records in the window before the anomaly detector evaluates
    pub anomaly_min_events: u64,

    /// Upper bound on any single audit/alert store call; on expiry the
    /// detector fails open toward "not blocked"
    #[serde(with = "humantime_serde")]
    pub store_timeout: Duration,
}

/// In-process request-rate counter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateConfig {
    /// Sliding window over which requests are counted
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Entries idle longer than this are dropped by the sweeper
    #[serde(with = "humantime_serde")]
    pub max_entry_age: Duration,
    /// How often the background sweeper runs
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_key: String::new(),
            password: PasswordConfig::default(),
            detectors: DetectorConfig::default(),
            rate: RateConfig::default(),
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        // Argon2id defaults per the argon2 crate (OWASP-aligned)
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            failed_login_window: Duration::from_secs(15 * 60),
            failed_login_threshold: 5,
            distinct_ip_window: Duration::from_secs(60 * 60),
            distinct_ip_threshold: 3,
            rapid_request_threshold: 100,
            sensitive_access_window: Duration::from_secs(60 * 60),
            sensitive_access_threshold: 20,
            anomaly_window: Duration::from_secs(24 * 60 * 60),
            anomaly_multiplier: 3.0,
            anomaly_min_events: 24,
            store_timeout: Duration::from_secs(2),
        }
    }
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_entry_age: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl SecurityConfig {
    /// Create a configuration with default thresholds and the given key
    pub fn new(encryption_key: impl Into<String>) -> Self {
        Self {
            encryption_key: encryption_key.into(),
            ..Self::default()
        }
    }

    /// Load configuration from the file named by `MEALDESK_SECURITY_CONFIG`
    /// (defaults if unset), then apply environment overrides and validate.
    pub fn load() -> Result<Self> {
        let mut config = match env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = env::var(ENCRYPTION_KEY_ENV) {
            self.encryption_key = key;
        }
    }

    /// Validate the configuration before constructing components
    pub fn validate(&self) -> Result<()> {
        if self.encryption_key.is_empty() {
            return Err(Error::Config(format!(
                "encryption key is required (set {})",
                ENCRYPTION_KEY_ENV
            )));
        }
        if self.detectors.failed_login_threshold == 0
            || self.detectors.distinct_ip_threshold == 0
            || self.detectors.rapid_request_threshold == 0
            || self.detectors.sensitive_access_threshold == 0
        {
            return Err(Error::Config(
                "detector thresholds must be greater than zero".into(),
            ));
        }
        if self.detectors.anomaly_multiplier <= 1.0 {
            return Err(Error::Config(
                "anomaly multiplier must be greater than 1.0".into(),
            ));
        }
        if self.detectors.store_timeout.is_zero() {
            return Err(Error::Config("store timeout must be non-zero".into()));
        }
        if self.rate.window.is_zero() || self.rate.sweep_interval.is_zero() {
            return Err(Error::Config(
                "rate window and sweep interval must be non-zero".into(),
            ));
        }
        if self.password.memory_kib < 8 || self.password.iterations == 0 {
            return Err(Error::Config("password cost parameters too weak".into()));
        }
        Ok(())
    }
}
