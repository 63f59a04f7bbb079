//! Certwarden Library
//!
//! Certificate lifecycle management with single-flight renewal and failure
//! escalation:
//!
//! - **Certificates**: renewal decisions, one renewal per domain at a time,
//!   copy-on-success commits, periodic cancellable scans
//! - **Escalation**: sliding-window failure counting, cooldown-throttled and
//!   acknowledgeable notifications, recovery tracking
//! - **Events**: a closed set of escalation and recovery events behind a
//!   publisher trait
//! - **Notifications**: log and webhook channels
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use certwarden::{
//!     CertificateManager, CertificateRegistry, EscalationManager, MemoryCertificateStore,
//!     SelfSignedCa,
//! };
//! use certwarden_config::{EscalationConfig, ManagerConfig};
//!
//! let registry = Arc::new(CertificateRegistry::new());
//! let escalation = Arc::new(
//!     EscalationManager::new(EscalationConfig::default()).with_registry(registry.clone()),
//! );
//! let manager = Arc::new(
//!     CertificateManager::new(
//!         ManagerConfig::default(),
//!         registry,
//!         Arc::new(SelfSignedCa::new()),
//!         Arc::new(MemoryCertificateStore::new()),
//!     )
//!     .with_escalation_hook(escalation),
//! );
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod certs;
pub mod escalation;
pub mod events;
pub mod metrics;
pub mod notify;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Certificate lifecycle
pub use certs::{
    CaClient, CertError, CertificateInfo, CertificateManager, CertificateMaterial,
    CertificateRegistry, CertificateStore, EscalationHook, FileCertificateStore,
    MemoryCertificateStore, Registration, RenewalError, RenewalPolicy, RenewalScheduler,
    SelfSignedCa,
};

// Escalation
pub use escalation::{EscalationError, EscalationManager, EscalationStats};

// Events
pub use events::{
    BroadcastPublisher, EscalationEvent, Event, EventPublisher, EventRecord, RecoveryEvent,
    TracingPublisher,
};

// Notifications
pub use notify::{build_channels, LogChannel, NotificationChannel, NotifyError, WebhookChannel};

// Metrics
pub use metrics::WardenMetrics;

// Shared vocabulary
pub use certwarden_common::{
    CertificateStatus, Clock, EscalationId, EscalationType, ManualClock, Severity, SystemClock,
};
