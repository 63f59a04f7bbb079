//! Certificate records and the in-memory registry that owns them.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace};

use certwarden_common::CertificateStatus;
use certwarden_config::{CertificateEntry, ManagerConfig};

use super::error::{CertError, ValidationError};
use super::validate::parse_certificate;

/// PEM-encoded certificate chain and private key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMaterial {
    pub cert_pem: String,
    pub key_pem: String,
}

impl CertificateMaterial {
    pub fn new(cert_pem: impl Into<String>, key_pem: impl Into<String>) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        }
    }
}

impl fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("cert_pem_len", &self.cert_pem.len())
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// Per-domain certificate bookkeeping.
#[derive(Debug, Clone)]
pub struct CertificateRecord {
    pub domain: String,
    pub material: CertificateMaterial,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_renewed_at: Option<DateTime<Utc>>,
    pub renewal_attempts: u32,
    pub status: CertificateStatus,
    pub pre_renewal_days: u32,
    pub escalation_days: u32,
    pub max_renewal_attempts: u32,
    pub metadata: HashMap<String, String>,
}

impl CertificateRecord {
    /// Whole days until expiry, negative once expired
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days()
    }

    /// Point-in-time snapshot for events and reporting
    pub fn info(&self, now: DateTime<Utc>) -> CertificateInfo {
        CertificateInfo {
            domain: self.domain.clone(),
            status: self.status,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            days_remaining: self.days_remaining(now),
            renewal_attempts: self.renewal_attempts,
            last_renewed_at: self.last_renewed_at,
        }
    }
}

/// Read-only snapshot of a certificate record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub domain: String,
    pub status: CertificateStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub days_remaining: i64,
    pub renewal_attempts: u32,
    pub last_renewed_at: Option<DateTime<Utc>>,
}

/// Per-domain overrides of the manager's renewal defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewalPolicy {
    pub pre_renewal_days: Option<u32>,
    pub escalation_days: Option<u32>,
    pub max_renewal_attempts: Option<u32>,
    pub metadata: HashMap<String, String>,
}

impl From<&CertificateEntry> for RenewalPolicy {
    fn from(entry: &CertificateEntry) -> Self {
        Self {
            pre_renewal_days: entry.pre_renewal_days,
            escalation_days: entry.escalation_days,
            max_renewal_attempts: entry.max_renewal_attempts,
            metadata: entry.metadata.clone(),
        }
    }
}

/// Everything needed to start tracking a certificate.
#[derive(Debug, Clone)]
pub struct Registration {
    pub material: CertificateMaterial,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub policy: RenewalPolicy,
}

impl Registration {
    pub fn new(
        material: CertificateMaterial,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            material,
            issued_at,
            expires_at,
            policy: RenewalPolicy::default(),
        }
    }

    /// Build a registration, reading validity dates from the certificate itself
    pub fn from_material(material: CertificateMaterial) -> Result<Self, ValidationError> {
        let parsed = parse_certificate(&material)?;
        Ok(Self::new(material, parsed.not_before, parsed.not_after))
    }

    pub fn with_policy(mut self, policy: RenewalPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_pre_renewal_days(mut self, days: u32) -> Self {
        self.policy.pre_renewal_days = Some(days);
        self
    }

    pub fn with_escalation_days(mut self, days: u32) -> Self {
        self.policy.escalation_days = Some(days);
        self
    }

    pub fn with_max_renewal_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_renewal_attempts = Some(attempts);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.policy.metadata.insert(key.into(), value.into());
        self
    }

    pub(crate) fn into_record(self, domain: &str, defaults: &ManagerConfig) -> CertificateRecord {
        CertificateRecord {
            domain: domain.to_string(),
            material: self.material,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            last_renewed_at: None,
            renewal_attempts: 0,
            status: CertificateStatus::Active,
            pre_renewal_days: self
                .policy
                .pre_renewal_days
                .unwrap_or(defaults.default_pre_renewal_days),
            escalation_days: self
                .policy
                .escalation_days
                .unwrap_or(defaults.default_escalation_days),
            max_renewal_attempts: self
                .policy
                .max_renewal_attempts
                .unwrap_or(defaults.default_max_renewal_attempts),
            metadata: self.policy.metadata,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Owned, shareable map of domain to certificate record.
///
/// Constructed once and handed to both managers. Only the certificate
/// manager writes to it; everyone else reads snapshots.
#[derive(Debug, Default)]
pub struct CertificateRegistry {
    records: RwLock<HashMap<String, CertificateRecord>>,
}

impl CertificateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record for a domain not yet tracked
    pub(crate) fn insert_new(&self, record: CertificateRecord) -> Result<(), CertError> {
        let mut records = self.records.write();
        if records.contains_key(&record.domain) {
            return Err(CertError::DuplicateRegistration(record.domain));
        }
        debug!(
            domain = %record.domain,
            expires_at = %record.expires_at,
            "Registered certificate"
        );
        records.insert(record.domain.clone(), record);
        Ok(())
    }

    /// Apply `f` to a record under the write lock
    pub(crate) fn update<R>(
        &self,
        domain: &str,
        f: impl FnOnce(&mut CertificateRecord) -> R,
    ) -> Option<R> {
        let mut records = self.records.write();
        let result = records.get_mut(domain).map(f);
        trace!(domain = %domain, found = result.is_some(), "Updated certificate record");
        result
    }

    /// Clone of the record for a domain
    pub fn get(&self, domain: &str) -> Option<CertificateRecord> {
        self.records.read().get(domain).cloned()
    }

    /// Snapshot of a record as seen at `now`
    pub fn info(&self, domain: &str, now: DateTime<Utc>) -> Option<CertificateInfo> {
        self.records.read().get(domain).map(|r| r.info(now))
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.records.read().contains_key(domain)
    }

    /// Tracked domains in sorted order
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.records.read().keys().cloned().collect();
        domains.sort();
        domains
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
