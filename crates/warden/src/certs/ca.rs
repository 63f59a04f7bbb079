//! Certificate authority client boundary
//!
//! The renewal pipeline only needs two operations from a CA: obtain fresh
//! material for a domain and revoke material it issued earlier. ACME, an
//! internal PKI or the bundled [`SelfSignedCa`] all fit behind [`CaClient`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use certwarden_common::{Clock, SystemClock};

use super::error::CaError;
use super::record::CertificateMaterial;

/// Client for a certificate authority
#[async_trait]
pub trait CaClient: Send + Sync {
    /// Obtain a new certificate and private key for `domain`
    async fn obtain_certificate(&self, domain: &str) -> Result<CertificateMaterial, CaError>;

    /// Revoke previously issued material
    async fn revoke_certificate(&self, material: &CertificateMaterial) -> Result<(), CaError>;
}

/// Local issuer producing self-signed certificates.
///
/// Useful for development, air-gapped test environments, and as a stand-in
/// CA in tests. Validity dates follow the injected clock.
#[derive(Debug)]
pub struct SelfSignedCa {
    clock: Arc<dyn Clock>,
    validity: Duration,
    issued: AtomicU64,
    revoked: AtomicU64,
}

impl SelfSignedCa {
    /// Organization name placed in the subject (and therefore issuer) of every certificate
    pub const ISSUER_NAME: &'static str = "Certwarden Local CA";

    /// Default validity, matching common public CA lifetimes
    const DEFAULT_VALIDITY_DAYS: i64 = 90;

    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            validity: Duration::days(Self::DEFAULT_VALIDITY_DAYS),
            issued: AtomicU64::new(0),
            revoked: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Number of certificates issued so far
    pub fn issued_count(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    /// Number of revocations accepted so far
    pub fn revoked_count(&self) -> u64 {
        self.revoked.load(Ordering::Relaxed)
    }

    /// Issue a self-signed certificate covering `domains` for the given window
    pub fn issue(
        domains: &[String],
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> Result<CertificateMaterial, CaError> {
        let primary = domains
            .first()
            .ok_or_else(|| CaError::Issuance("no domains requested".to_string()))?;

        let mut params = CertificateParams::new(domains.to_vec())
            .map_err(|e| CaError::Issuance(e.to_string()))?;

        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, primary.as_str());
        name.push(DnType::OrganizationName, Self::ISSUER_NAME);
        params.distinguished_name = name;
        params.not_before = to_offset(not_before)?;
        params.not_after = to_offset(not_after)?;

        let key_pair = KeyPair::generate().map_err(|e| CaError::Issuance(e.to_string()))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CaError::Issuance(e.to_string()))?;

        Ok(CertificateMaterial::new(cert.pem(), key_pair.serialize_pem()))
    }
}

impl Default for SelfSignedCa {
    fn default() -> Self {
        Self::new()
    }
}

fn to_offset(at: DateTime<Utc>) -> Result<time::OffsetDateTime, CaError> {
    time::OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| CaError::Issuance(format!("invalid validity date {}: {}", at, e)))
}

#[async_trait]
impl CaClient for SelfSignedCa {
    async fn obtain_certificate(&self, domain: &str) -> Result<CertificateMaterial, CaError> {
        let now = self.clock.now();
        // Backdate slightly so the certificate is valid on receipt
        let not_before = now - Duration::minutes(1);
        let not_after = now + self.validity;

        let material = Self::issue(&[domain.to_string()], not_before, not_after)?;
        let count = self.issued.fetch_add(1, Ordering::Relaxed) + 1;

        info!(
            domain = %domain,
            not_after = %not_after,
            issued_total = count,
            "Issued self-signed certificate"
        );

        Ok(material)
    }

    async fn revoke_certificate(&self, material: &CertificateMaterial) -> Result<(), CaError> {
        if material.cert_pem.is_empty() {
            return Err(CaError::Revocation("empty certificate".to_string()));
        }
        self.revoked.fetch_add(1, Ordering::Relaxed);
        debug!("Recorded revocation of self-signed certificate");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::validate::parse_certificate;
    use certwarden_common::ManualClock;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_obtain_follows_clock() {
        let start = Utc.with_ymd_and_hms(2031, 3, 1, 0, 0, 0).unwrap();
        let ca = SelfSignedCa::new()
            .with_clock(Arc::new(ManualClock::new(start)))
            .with_validity(Duration::days(30));

        let material = ca.obtain_certificate("example.com").await.unwrap();
        let parsed = parse_certificate(&material).unwrap();

        assert_eq!(parsed.not_after, start + Duration::days(30));
        assert_eq!(parsed.not_before, start - Duration::minutes(1));
        assert_eq!(ca.issued_count(), 1);
    }

    #[tokio::test]
    async fn test_revoke_counts() {
        let ca = SelfSignedCa::new();
        let material = ca.obtain_certificate("example.com").await.unwrap();

        ca.revoke_certificate(&material).await.unwrap();
        assert_eq!(ca.revoked_count(), 1);

        let empty = CertificateMaterial::new("", "");
        assert!(ca.revoke_certificate(&empty).await.is_err());
    }

    #[test]
    fn test_issue_requires_domain() {
        let now = Utc::now();
        let err = SelfSignedCa::issue(&[], now, now + Duration::days(1)).unwrap_err();
        assert!(matches!(err, CaError::Issuance(_)));
    }
}
