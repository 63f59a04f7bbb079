//! Validation of freshly issued certificate material
//!
//! A renewed certificate is only committed once it parses as X.509, covers
//! the domain it was requested for, comes from the expected issuer, is
//! currently inside its validity window, and ships with a PEM private key.

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, trace};
use x509_parser::extensions::GeneralName;
use x509_parser::time::ASN1Time;

use super::error::ValidationError;
use super::record::CertificateMaterial;

/// Fields extracted from the leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    /// Common name and DNS subject alternative names
    pub names: Vec<String>,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Parse the first certificate of a PEM chain
pub fn parse_certificate(material: &CertificateMaterial) -> Result<ParsedCertificate, ValidationError> {
    let blocks = pem::parse_many(material.cert_pem.as_bytes())
        .map_err(|e| ValidationError::Parse(e.to_string()))?;

    let leaf = blocks
        .iter()
        .find(|block| block.tag() == "CERTIFICATE")
        .ok_or_else(|| ValidationError::Parse("no CERTIFICATE block found".to_string()))?;

    let (_, cert) = x509_parser::parse_x509_certificate(leaf.contents())
        .map_err(|e| ValidationError::Parse(e.to_string()))?;

    let mut names = Vec::new();

    if let Some(cn) = cert.subject().iter_common_name().next() {
        if let Ok(cn) = cn.as_str() {
            names.push(cn.to_string());
        }
    }

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                names.push(dns.to_string());
            }
        }
    }

    names.sort();
    names.dedup();

    let parsed = ParsedCertificate {
        names,
        issuer: cert.issuer().to_string(),
        not_before: asn1_to_utc(&cert.validity().not_before)?,
        not_after: asn1_to_utc(&cert.validity().not_after)?,
    };

    trace!(
        names = ?parsed.names,
        issuer = %parsed.issuer,
        not_after = %parsed.not_after,
        "Parsed certificate"
    );

    Ok(parsed)
}

fn asn1_to_utc(time: &ASN1Time) -> Result<DateTime<Utc>, ValidationError> {
    Utc.timestamp_opt(time.timestamp(), 0)
        .single()
        .ok_or_else(|| ValidationError::Parse("unrepresentable validity timestamp".to_string()))
}

/// Whether a certificate name covers `domain`, honouring single-label wildcards
pub fn name_matches(pattern: &str, domain: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();

    if let Some(suffix) = pattern.strip_prefix("*.") {
        return match domain.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix,
            None => false,
        };
    }

    pattern == domain
}

/// Post-issuance checks applied before a renewal is committed
#[derive(Debug, Clone, Default)]
pub struct CertificateValidator {
    expected_issuer: Option<String>,
}

impl CertificateValidator {
    pub fn new(expected_issuer: Option<String>) -> Self {
        Self { expected_issuer }
    }

    /// Validate material issued for `domain` as of `now`
    pub fn validate(
        &self,
        domain: &str,
        material: &CertificateMaterial,
        now: DateTime<Utc>,
    ) -> Result<ParsedCertificate, ValidationError> {
        let parsed = parse_certificate(material)?;

        if !parsed.names.iter().any(|name| name_matches(name, domain)) {
            return Err(ValidationError::DomainMismatch {
                domain: domain.to_string(),
                names: parsed.names,
            });
        }

        if let Some(expected) = &self.expected_issuer {
            if !parsed.issuer.contains(expected.as_str()) {
                return Err(ValidationError::IssuerMismatch {
                    expected: expected.clone(),
                    actual: parsed.issuer,
                });
            }
        }

        if parsed.not_after <= parsed.not_before {
            return Err(ValidationError::InvertedValidity);
        }
        if now < parsed.not_before {
            return Err(ValidationError::NotYetValid(parsed.not_before));
        }
        if now >= parsed.not_after {
            return Err(ValidationError::Expired(parsed.not_after));
        }

        validate_key(material)?;

        debug!(
            domain = %domain,
            issuer = %parsed.issuer,
            not_after = %parsed.not_after,
            "Certificate passed validation"
        );

        Ok(parsed)
    }
}

fn validate_key(material: &CertificateMaterial) -> Result<(), ValidationError> {
    let key = pem::parse(material.key_pem.as_bytes())
        .map_err(|e| ValidationError::InvalidKey(e.to_string()))?;

    if !key.tag().ends_with("PRIVATE KEY") {
        return Err(ValidationError::InvalidKey(format!(
            "unexpected PEM block '{}'",
            key.tag()
        )));
    }
    if key.contents().is_empty() {
        return Err(ValidationError::InvalidKey("empty key".to_string()));
    }

    Ok(())
}
