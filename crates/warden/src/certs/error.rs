//! Certificate lifecycle error types

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`CertificateManager`](super::CertificateManager) operations
#[derive(Debug, Error)]
pub enum CertError {
    /// Domain is not tracked by the registry
    #[error("no certificate registered for domain '{0}'")]
    NotFound(String),

    /// Domain is already tracked by the registry
    #[error("certificate for domain '{0}' is already registered")]
    DuplicateRegistration(String),

    /// Another renewal for this domain is running
    #[error("renewal already in progress for domain '{0}'")]
    RenewalInProgress(String),

    /// The renewal pipeline failed; the previous certificate is untouched
    #[error("renewal failed for domain '{domain}': {source}")]
    RenewalFailed {
        domain: String,
        #[source]
        source: RenewalError,
    },

    /// Certificate material could not be accepted
    #[error("invalid certificate for domain '{domain}': {source}")]
    InvalidCertificate {
        domain: String,
        #[source]
        source: ValidationError,
    },

    /// Certificate authority rejected a non-renewal request (e.g. revocation)
    #[error("certificate authority error: {0}")]
    Ca(#[from] CaError),

    /// Certificate store failed outside of a renewal
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// A failed step of the obtain, validate, persist pipeline
#[derive(Debug, Error)]
pub enum RenewalError {
    #[error("certificate authority error: {0}")]
    Ca(#[from] CaError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("renewal timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors reported by a certificate authority client
#[derive(Debug, Clone, Error)]
pub enum CaError {
    /// Protocol-level error, carrying the CA's own message
    #[error("{0}")]
    Protocol(String),

    /// Issuing the certificate failed locally
    #[error("certificate issuance failed: {0}")]
    Issuance(String),

    /// Revocation was rejected
    #[error("certificate revocation failed: {0}")]
    Revocation(String),
}

/// Reasons certificate material is rejected
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("failed to parse certificate: {0}")]
    Parse(String),

    #[error("certificate names {names:?} do not cover '{domain}'")]
    DomainMismatch { domain: String, names: Vec<String> },

    #[error("issuer '{actual}' does not match expected '{expected}'")]
    IssuerMismatch { expected: String, actual: String },

    #[error("certificate is not valid before {0}")]
    NotYetValid(chrono::DateTime<chrono::Utc>),

    #[error("certificate expired at {0}")]
    Expired(chrono::DateTime<chrono::Utc>),

    #[error("certificate validity window is inverted")]
    InvertedValidity,

    #[error("invalid private key: {0}")]
    InvalidKey(String),
}

/// Errors specific to certificate storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to serialize/deserialize metadata
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Domain name cannot be used as a storage key
    #[error("Invalid domain for storage: {0}")]
    InvalidDomain(String),

    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
