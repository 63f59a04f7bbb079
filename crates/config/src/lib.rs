//! Configuration for the certwarden certificate lifecycle manager
//!
//! # Module Organization
//!
//! - [`lifecycle`]: Renewal manager, escalation and per-certificate settings
//! - [`notifications`]: Notification channel configuration
//! - [`validate`]: Validation of stored certificates referenced by the config
//! - `kdl`: KDL format parsing
//!
//! # Example
//!
//! ```kdl
//! manager {
//!     check-interval-secs 86400
//!     renewal-timeout-secs 600
//!     default-pre-renewal-days 30
//! }
//!
//! escalation {
//!     failure-threshold 3
//!     window-secs 300
//!     notification-cooldown-secs 900
//! }
//!
//! storage {
//!     path "/var/lib/certwarden"
//! }
//!
//! notifications {
//!     log
//!     webhook "ops" {
//!         url "https://hooks.example.com/certs"
//!     }
//! }
//!
//! certificate "example.com" {
//!     pre-renewal-days 21
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, trace};

// ============================================================================
// Module Declarations
// ============================================================================

mod kdl;
pub mod lifecycle;
pub mod notifications;
#[cfg(feature = "validation")]
pub mod validate;

// ============================================================================
// Re-exports
// ============================================================================

pub use lifecycle::{CertificateEntry, EscalationConfig, ManagerConfig, StorageConfig};
pub use notifications::{ChannelConfig, NotificationConfig};

/// Configuration errors surfaced by [`Config::validate`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is out of range or inconsistent with another value
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A provider or channel kind this build does not know about
    #[error("unsupported {kind} '{value}'")]
    Unsupported { kind: &'static str, value: String },

    /// The same certificate domain is configured twice
    #[error("certificate '{0}' is configured more than once")]
    DuplicateCertificate(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub manager: ManagerConfig,

    #[serde(default)]
    pub escalation: EscalationConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Certificates to track
    #[serde(default)]
    pub certificates: Vec<CertificateEntry>,
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("kdl");

        debug!(path = %path.display(), format = extension, "Loading configuration");

        match extension {
            "kdl" => Self::from_kdl(&content),
            "json" => Self::from_json(&content),
            _ => Err(anyhow::anyhow!("Unsupported config format: {}", extension)),
        }
    }

    /// Parse configuration from KDL format
    pub fn from_kdl(content: &str) -> Result<Self> {
        let doc: ::kdl::KdlDocument = content.parse().map_err(|e: ::kdl::KdlError| {
            use miette::Diagnostic;

            let mut error_msg = String::from("KDL configuration parse error:\n\n");
            let mut found_details = false;

            if let Some(related) = e.related() {
                for diagnostic in related {
                    error_msg.push_str(&format!("  {}\n", diagnostic));
                    found_details = true;

                    if let Some(labels) = diagnostic.labels() {
                        for label in labels {
                            let (line, col) = kdl::offset_to_line_col(content, label.offset());
                            error_msg.push_str(&format!("  --> at line {}, column {}\n", line, col));
                        }
                    }
                }
            }

            if !found_details {
                error_msg.push_str(&format!("  {}\n", e));
            }

            anyhow::anyhow!("{}", error_msg)
        })?;

        kdl::parse_kdl_document(doc)
    }

    /// Parse configuration from JSON format
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse JSON configuration")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.manager.validate()?;
        self.escalation.validate()?;
        self.notifications.validate()?;

        let mut seen = std::collections::HashSet::new();
        for entry in &self.certificates {
            if !seen.insert(entry.domain.as_str()) {
                return Err(ConfigError::DuplicateCertificate(entry.domain.clone()));
            }
            entry.validate(&self.manager)?;
        }

        trace!(
            certificates = self.certificates.len(),
            channels = self.notifications.channels.len(),
            "Configuration validated"
        );

        Ok(())
    }
}
