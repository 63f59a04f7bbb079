//! Certificate persistence
//!
//! # Directory Structure
//!
//! ```text
//! storage/
//! └── domains/
//!     └── example.com/
//!         ├── cert.pem      # Certificate chain
//!         ├── key.pem       # Private key (0600 on unix)
//!         └── meta.json     # Validity dates and storage time
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::error::StoreError;
use super::record::CertificateMaterial;
use super::validate::parse_certificate;

/// Persistence boundary for certificate material.
///
/// Calls are short and synchronous; the manager never holds a lock while
/// calling into a store.
pub trait CertificateStore: Send + Sync {
    /// Persist material for a domain, replacing any previous material
    fn store_certificate(&self, domain: &str, material: &CertificateMaterial) -> Result<(), StoreError>;

    /// Load material for a domain, `None` if nothing is stored
    fn load_certificate(&self, domain: &str) -> Result<Option<CertificateMaterial>, StoreError>;

    /// Remove stored material for a domain. Deleting a missing domain is not an error.
    fn delete_certificate(&self, domain: &str) -> Result<(), StoreError>;
}

/// Certificate metadata stored alongside the certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCertificateMeta {
    /// When the material was written
    pub stored_at: DateTime<Utc>,
    /// Certificate notBefore, if the certificate could be parsed
    #[serde(default)]
    pub issued: Option<DateTime<Utc>>,
    /// Certificate notAfter, if the certificate could be parsed
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    /// Names covered by the certificate
    #[serde(default)]
    pub names: Vec<String>,
}

impl StoredCertificateMeta {
    fn describe(material: &CertificateMaterial) -> Self {
        let parsed = parse_certificate(material).ok();
        Self {
            stored_at: Utc::now(),
            issued: parsed.as_ref().map(|p| p.not_before),
            expires: parsed.as_ref().map(|p| p.not_after),
            names: parsed.map(|p| p.names).unwrap_or_default(),
        }
    }
}

/// Reject domains that would escape the storage directory
fn check_domain(domain: &str) -> Result<(), StoreError> {
    let invalid = domain.is_empty()
        || domain.starts_with('.')
        || domain.contains(['/', '\\', '\0'])
        || domain.contains("..");

    if invalid {
        return Err(StoreError::InvalidDomain(domain.to_string()));
    }
    Ok(())
}

// ============================================================================
// File store
// ============================================================================

/// Filesystem-backed store with restrictive permissions
#[derive(Debug)]
pub struct FileCertificateStore {
    base_path: PathBuf,
}

impl FileCertificateStore {
    /// Open (creating if needed) a store rooted at `base_path`
    ///
    /// Directories are created with 0700 permissions on Unix.
    pub fn new(base_path: &Path) -> Result<Self, StoreError> {
        let domains_path = base_path.join("domains");
        fs::create_dir_all(&domains_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o700);
            fs::set_permissions(base_path, perms.clone())?;
            fs::set_permissions(&domains_path, perms)?;
        }

        info!(
            storage_path = %base_path.display(),
            "Initialized certificate storage"
        );

        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn domain_path(&self, domain: &str) -> Result<PathBuf, StoreError> {
        check_domain(domain)?;
        Ok(self.base_path.join("domains").join(domain))
    }

    /// Load the metadata written with a domain's certificate
    pub fn load_meta(&self, domain: &str) -> Result<Option<StoredCertificateMeta>, StoreError> {
        let meta_path = self.domain_path(domain)?.join("meta.json");
        if !meta_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&meta_path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// List all stored domains in sorted order
    pub fn list_domains(&self) -> Result<Vec<String>, StoreError> {
        let domains_path = self.base_path.join("domains");

        if !domains_path.exists() {
            return Ok(Vec::new());
        }

        let mut domains = Vec::new();
        for entry in fs::read_dir(&domains_path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    domains.push(name.to_string());
                }
            }
        }
        domains.sort();

        Ok(domains)
    }
}

impl CertificateStore for FileCertificateStore {
    fn store_certificate(&self, domain: &str, material: &CertificateMaterial) -> Result<(), StoreError> {
        let domain_path = self.domain_path(domain)?;
        fs::create_dir_all(&domain_path)?;

        let key_path = domain_path.join("key.pem");
        fs::write(&key_path, &material.key_pem)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::write(domain_path.join("cert.pem"), &material.cert_pem)?;

        let meta = StoredCertificateMeta::describe(material);
        fs::write(
            domain_path.join("meta.json"),
            serde_json::to_string_pretty(&meta)?,
        )?;

        info!(
            domain = %domain,
            expires = ?meta.expires,
            "Saved certificate to storage"
        );
        Ok(())
    }

    fn load_certificate(&self, domain: &str) -> Result<Option<CertificateMaterial>, StoreError> {
        let domain_path = self.domain_path(domain)?;
        let cert_path = domain_path.join("cert.pem");

        if !cert_path.exists() {
            trace!(domain = %domain, "No stored certificate found");
            return Ok(None);
        }

        let cert_pem = fs::read_to_string(&cert_path)?;
        let key_pem = fs::read_to_string(domain_path.join("key.pem"))?;

        debug!(domain = %domain, "Loaded stored certificate");
        Ok(Some(CertificateMaterial::new(cert_pem, key_pem)))
    }

    fn delete_certificate(&self, domain: &str) -> Result<(), StoreError> {
        let domain_path = self.domain_path(domain)?;

        if domain_path.exists() {
            fs::remove_dir_all(&domain_path)?;
            info!(domain = %domain, "Deleted stored certificate");
        } else {
            warn!(domain = %domain, "Certificate to delete not found");
        }

        Ok(())
    }
}

// ============================================================================
// Memory store
// ============================================================================

/// In-process store, for tests and ephemeral deployments
#[derive(Debug, Default)]
pub struct MemoryCertificateStore {
    entries: RwLock<HashMap<String, CertificateMaterial>>,
}

impl MemoryCertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CertificateStore for MemoryCertificateStore {
    fn store_certificate(&self, domain: &str, material: &CertificateMaterial) -> Result<(), StoreError> {
        check_domain(domain)?;
        self.entries
            .write()
            .insert(domain.to_string(), material.clone());
        Ok(())
    }

    fn load_certificate(&self, domain: &str) -> Result<Option<CertificateMaterial>, StoreError> {
        check_domain(domain)?;
        Ok(self.entries.read().get(domain).cloned())
    }

    fn delete_certificate(&self, domain: &str) -> Result<(), StoreError> {
        check_domain(domain)?;
        self.entries.write().remove(domain);
        Ok(())
    }
}
