//! Stored certificate validation
//!
//! Validates that certificates referenced by the configuration exist in the
//! storage directory, parse as X.509, and are not already inside their
//! renewal window.

use super::{ErrorCategory, ValidationError, ValidationResult, ValidationWarning};
use crate::Config;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::path::Path;

/// Validate the stored certificate of every configured domain
pub fn validate_stored_certificates(config: &Config, now: DateTime<Utc>) -> ValidationResult {
    let mut result = ValidationResult::new();
    let domains_dir = config.storage.path.join("domains");

    for entry in &config.certificates {
        let cert_path = domains_dir.join(&entry.domain).join("cert.pem");
        let key_path = domains_dir.join(&entry.domain).join("key.pem");

        if !cert_path.exists() {
            result.add_warning(ValidationWarning::new(format!(
                "No stored certificate for '{}', it will be issued on first run",
                entry.domain
            )));
            continue;
        }

        if !key_path.exists() {
            result.add_error(ValidationError::new(
                ErrorCategory::Certificate,
                format!("Private key not found: {:?}", key_path),
            ));
            continue;
        }

        let pre_renewal_days = entry
            .pre_renewal_days
            .unwrap_or(config.manager.default_pre_renewal_days);

        match load_and_check_expiry(&cert_path, &entry.domain, pre_renewal_days, now) {
            Ok(Some(warning)) => result.add_warning(warning),
            Ok(None) => {}
            Err(e) => result.add_error(e),
        }
    }

    result
}

/// Load a certificate and check its expiry
fn load_and_check_expiry(
    cert_path: &Path,
    domain: &str,
    pre_renewal_days: u32,
    now: DateTime<Utc>,
) -> Result<Option<ValidationWarning>, ValidationError> {
    let cert_pem = std::fs::read(cert_path).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Failed to read certificate {:?}: {}", cert_path, e),
        )
    })?;

    let pem = pem::parse(&cert_pem).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Failed to parse certificate {:?}: {}", cert_path, e),
        )
    })?;

    let (_, cert) = x509_parser::parse_x509_certificate(pem.contents()).map_err(|e| {
        ValidationError::new(
            ErrorCategory::Certificate,
            format!("Invalid X509 certificate {:?}: {}", cert_path, e),
        )
    })?;

    let not_after = Utc
        .timestamp_opt(cert.validity().not_after.timestamp(), 0)
        .single()
        .ok_or_else(|| {
            ValidationError::new(
                ErrorCategory::Certificate,
                format!("Certificate {:?} has an unrepresentable expiry", cert_path),
            )
        })?;

    if not_after <= now {
        return Ok(Some(ValidationWarning::new(format!(
            "Certificate for '{}' expired at {}, it will be renewed on the next scan",
            domain, not_after
        ))));
    }

    if not_after - now <= Duration::days(i64::from(pre_renewal_days)) {
        return Ok(Some(ValidationWarning::new(format!(
            "Certificate for '{}' expires soon ({}), renewal is due",
            domain, not_after
        ))));
    }

    Ok(None)
}
