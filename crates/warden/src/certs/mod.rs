//! Certificate lifecycle: records, renewal decisions and single-flight renewal
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐     ┌──────────────────────┐
//! │  RenewalScheduler   │────▶│  CertificateManager  │
//! │  (interval + token) │     │  (single-flight)     │
//! └─────────────────────┘     └──────────┬───────────┘
//!                                        │
//!              ┌─────────────────┬───────┴───────┬────────────────┐
//!              ▼                 ▼               ▼                ▼
//!      ┌──────────────┐  ┌──────────────┐ ┌─────────────┐ ┌───────────────┐
//!      │   CaClient   │  │  Validator   │ │ Certificate │ │ EscalationHook│
//!      │ (obtain/rev) │  │ (x509-parser)│ │    Store    │ │               │
//!      └──────────────┘  └──────────────┘ └─────────────┘ └───────────────┘
//! ```
//!
//! Records live in a [`CertificateRegistry`] shared by `Arc`. Only the
//! manager writes to it.

mod ca;
mod error;
mod hook;
mod manager;
mod record;
mod scheduler;
mod storage;
mod validate;

pub use ca::{CaClient, SelfSignedCa};
pub use error::{CaError, CertError, RenewalError, StoreError, ValidationError};
pub use hook::EscalationHook;
pub use manager::{assess_expiry, CertificateManager, RenewalTask};
pub use record::{
    CertificateInfo, CertificateMaterial, CertificateRecord, CertificateRegistry, Registration,
    RenewalPolicy,
};
pub use scheduler::RenewalScheduler;
pub use storage::{CertificateStore, FileCertificateStore, MemoryCertificateStore, StoredCertificateMeta};
pub use validate::{name_matches, parse_certificate, CertificateValidator, ParsedCertificate};
