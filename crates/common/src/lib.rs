//! Shared vocabulary for certwarden crates.
//!
//! - [`types`] - certificate status, escalation types and severities
//! - [`ids`] - type-safe escalation identifiers
//! - [`clock`] - injectable time source for deterministic scheduling

pub mod clock;
pub mod ids;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{EscalationId, EscalationIdGenerator};
pub use types::{CertificateStatus, EscalationType, Severity, UnknownVariant};
