//! Certificate and escalation enums shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned when parsing one of the enums below from an unknown string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// ============================================================================
// Certificate Status
// ============================================================================

/// Lifecycle status of a tracked certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    /// Valid and outside every renewal window
    Active,
    /// Inside the pre-renewal or escalation window
    Expiring,
    /// Past its not-after date
    Expired,
    /// A renewal is currently running
    Renewing,
    /// The last renewal attempt failed
    Failed,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Active => "active",
            CertificateStatus::Expiring => "expiring",
            CertificateStatus::Expired => "expired",
            CertificateStatus::Renewing => "renewing",
            CertificateStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Escalation Type and Severity
// ============================================================================

/// Reason an escalation was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationType {
    /// Failure threshold reached inside the counting window
    RetryExhausted,
    /// Certificate is close to its expiry date
    ExpiringSoon,
    /// Renewal timed out or the issued certificate failed validation
    ValidationFailed,
    /// The certificate authority rate limited us
    RateLimited,
    /// Any other error reported by the certificate authority
    AcmeError,
}

impl EscalationType {
    /// All escalation types, in declaration order.
    pub const ALL: [EscalationType; 5] = [
        EscalationType::RetryExhausted,
        EscalationType::ExpiringSoon,
        EscalationType::ValidationFailed,
        EscalationType::RateLimited,
        EscalationType::AcmeError,
    ];

    /// Fixed severity for this escalation type.
    pub fn severity(&self) -> Severity {
        match self {
            EscalationType::RetryExhausted => Severity::Critical,
            EscalationType::ValidationFailed => Severity::High,
            EscalationType::AcmeError => Severity::High,
            EscalationType::RateLimited => Severity::Medium,
            EscalationType::ExpiringSoon => Severity::Warning,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationType::RetryExhausted => "retry_exhausted",
            EscalationType::ExpiringSoon => "expiring_soon",
            EscalationType::ValidationFailed => "validation_failed",
            EscalationType::RateLimited => "rate_limited",
            EscalationType::AcmeError => "acme_error",
        }
    }
}

impl fmt::Display for EscalationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscalationType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EscalationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "escalation type",
                value: s.to_string(),
            })
    }
}

/// Operator-facing severity, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
