//! Renewal manager, escalation and per-certificate configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::ConfigError;

// ============================================================================
// Manager Configuration
// ============================================================================

/// Certificate manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Days before expiry at which renewal starts
    #[serde(default = "default_pre_renewal_days")]
    pub default_pre_renewal_days: u32,

    /// Days before expiry at which renewal becomes urgent
    #[serde(default = "default_escalation_days")]
    pub default_escalation_days: u32,

    /// Failed attempts before the escalation hook fires
    #[serde(default = "default_max_renewal_attempts")]
    pub default_max_renewal_attempts: u32,

    /// Seconds between background renewal scans
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Seconds a single renewal may take before it is abandoned
    #[serde(default = "default_renewal_timeout_secs")]
    pub renewal_timeout_secs: u64,

    /// Run the background renewal scan
    #[serde(default = "default_true")]
    pub enable_auto_renewal: bool,

    /// Required substring of the issuer of renewed certificates
    #[serde(default)]
    pub expected_issuer: Option<String>,
}

impl ManagerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn renewal_timeout(&self) -> Duration {
        Duration::from_secs(self.renewal_timeout_secs)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "manager check-interval-secs must be greater than zero".to_string(),
            ));
        }
        if self.check_interval_secs > MAX_CHECK_INTERVAL_SECS {
            return Err(ConfigError::Invalid(format!(
                "manager check-interval-secs must be at most {} (one year)",
                MAX_CHECK_INTERVAL_SECS
            )));
        }
        if self.renewal_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "manager renewal-timeout-secs must be greater than zero".to_string(),
            ));
        }
        if self.default_max_renewal_attempts == 0 {
            return Err(ConfigError::Invalid(
                "manager default-max-renewal-attempts must be greater than zero".to_string(),
            ));
        }
        check_windows(
            "manager",
            self.default_pre_renewal_days,
            self.default_escalation_days,
        )
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_pre_renewal_days: default_pre_renewal_days(),
            default_escalation_days: default_escalation_days(),
            default_max_renewal_attempts: default_max_renewal_attempts(),
            check_interval_secs: default_check_interval_secs(),
            renewal_timeout_secs: default_renewal_timeout_secs(),
            enable_auto_renewal: true,
            expected_issuer: None,
        }
    }
}

// ============================================================================
// Escalation Configuration
// ============================================================================

/// Escalation manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Failures inside the window before an escalation activates
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Sliding failure-counting window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Days remaining at or below which a certificate escalates as expiring
    #[serde(default = "default_expiring_soon_days")]
    pub expiring_soon_days: i64,

    /// Substring identifying CA rate-limit errors
    #[serde(default = "default_rate_limit_marker")]
    pub rate_limit_marker: String,

    /// Minimum seconds between notifications for the same escalation
    #[serde(default = "default_notification_cooldown_secs")]
    pub notification_cooldown_secs: u64,

    /// Seconds a single notification channel may take
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
}

impl EscalationConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn notification_cooldown(&self) -> Duration {
        Duration::from_secs(self.notification_cooldown_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "escalation failure-threshold must be greater than zero".to_string(),
            ));
        }
        if self.window_secs == 0 {
            return Err(ConfigError::Invalid(
                "escalation window-secs must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit_marker.is_empty() {
            return Err(ConfigError::Invalid(
                "escalation rate-limit-marker must not be empty".to_string(),
            ));
        }
        if self.expiring_soon_days < 0 {
            return Err(ConfigError::Invalid(
                "escalation expiring-soon-days must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_secs: default_window_secs(),
            expiring_soon_days: default_expiring_soon_days(),
            rate_limit_marker: default_rate_limit_marker(),
            notification_cooldown_secs: default_notification_cooldown_secs(),
            notify_timeout_secs: default_notify_timeout_secs(),
        }
    }
}

// ============================================================================
// Storage and Certificates
// ============================================================================

/// Certificate storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory for stored certificates
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// A tracked certificate with optional per-domain overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateEntry {
    pub domain: String,

    #[serde(default)]
    pub pre_renewal_days: Option<u32>,

    #[serde(default)]
    pub escalation_days: Option<u32>,

    #[serde(default)]
    pub max_renewal_attempts: Option<u32>,

    /// Free-form labels copied onto the certificate record
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CertificateEntry {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            pre_renewal_days: None,
            escalation_days: None,
            max_renewal_attempts: None,
            metadata: HashMap::new(),
        }
    }

    pub(crate) fn validate(&self, defaults: &ManagerConfig) -> Result<(), ConfigError> {
        if self.domain.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "certificate domain must not be empty".to_string(),
            ));
        }
        if self.max_renewal_attempts == Some(0) {
            return Err(ConfigError::Invalid(format!(
                "certificate '{}' max-renewal-attempts must be greater than zero",
                self.domain
            )));
        }
        check_windows(
            &format!("certificate '{}'", self.domain),
            self.pre_renewal_days
                .unwrap_or(defaults.default_pre_renewal_days),
            self.escalation_days
                .unwrap_or(defaults.default_escalation_days),
        )
    }
}

fn check_windows(scope: &str, pre_renewal_days: u32, escalation_days: u32) -> Result<(), ConfigError> {
    if pre_renewal_days > MAX_WINDOW_DAYS {
        return Err(ConfigError::Invalid(format!(
            "{} pre-renewal window ({} days) exceeds {} days",
            scope, pre_renewal_days, MAX_WINDOW_DAYS
        )));
    }
    if escalation_days > pre_renewal_days {
        return Err(ConfigError::Invalid(format!(
            "{} escalation window ({} days) is wider than its pre-renewal window ({} days)",
            scope, escalation_days, pre_renewal_days
        )));
    }
    Ok(())
}

// ============================================================================
// Defaults
// ============================================================================

/// Longest accepted renewal or escalation window
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Longest accepted interval between renewal scans
pub const MAX_CHECK_INTERVAL_SECS: u64 = 365 * 24 * 3600;

pub(crate) fn default_pre_renewal_days() -> u32 {
    30
}

pub(crate) fn default_escalation_days() -> u32 {
    7
}

pub(crate) fn default_max_renewal_attempts() -> u32 {
    3
}

pub(crate) fn default_check_interval_secs() -> u64 {
    24 * 3600
}

pub(crate) fn default_renewal_timeout_secs() -> u64 {
    10 * 60
}

pub(crate) fn default_failure_threshold() -> u32 {
    3
}

pub(crate) fn default_window_secs() -> u64 {
    5 * 60
}

pub(crate) fn default_expiring_soon_days() -> i64 {
    7
}

pub(crate) fn default_rate_limit_marker() -> String {
    "rateLimited".to_string()
}

pub(crate) fn default_notification_cooldown_secs() -> u64 {
    15 * 60
}

pub(crate) fn default_notify_timeout_secs() -> u64 {
    10
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("/var/lib/certwarden")
}

fn default_true() -> bool {
    true
}
