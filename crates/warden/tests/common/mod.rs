//! Shared test utilities for integration tests
//!
//! Scripted CA clients, recording notification channels and manager
//! builders used across the integration test files.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use certwarden::certs::CaError;
use certwarden::{
    CaClient, CertificateManager, CertificateMaterial, CertificateRegistry, EscalationEvent,
    MemoryCertificateStore, NotificationChannel, NotifyError, Registration, SelfSignedCa,
};
use certwarden_config::{EscalationConfig, ManagerConfig};

// ============================================================================
// CA clients
// ============================================================================

/// Issues real self-signed certificates and counts calls
#[derive(Debug, Default)]
pub struct CountingCa {
    inner: SelfSignedCa,
    calls: AtomicU32,
}

impl CountingCa {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaClient for CountingCa {
    async fn obtain_certificate(&self, domain: &str) -> Result<CertificateMaterial, CaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.obtain_certificate(domain).await
    }

    async fn revoke_certificate(&self, material: &CertificateMaterial) -> Result<(), CaError> {
        self.inner.revoke_certificate(material).await
    }
}

/// Blocks every obtain call until released
#[derive(Debug, Default)]
pub struct GatedCa {
    inner: SelfSignedCa,
    calls: AtomicU32,
    gate: Notify,
}

impl GatedCa {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Let one waiting (or the next) obtain call proceed
    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// Yield until at least `n` obtain calls have started
    pub async fn wait_for_calls(&self, n: u32) {
        while self.calls() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl CaClient for GatedCa {
    async fn obtain_certificate(&self, domain: &str) -> Result<CertificateMaterial, CaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        self.inner.obtain_certificate(domain).await
    }

    async fn revoke_certificate(&self, material: &CertificateMaterial) -> Result<(), CaError> {
        self.inner.revoke_certificate(material).await
    }
}

/// Never answers
#[derive(Debug, Default)]
pub struct HangingCa;

#[async_trait]
impl CaClient for HangingCa {
    async fn obtain_certificate(&self, _domain: &str) -> Result<CertificateMaterial, CaError> {
        std::future::pending().await
    }

    async fn revoke_certificate(&self, _material: &CertificateMaterial) -> Result<(), CaError> {
        std::future::pending().await
    }
}

/// Never answers for the stalled domains, issues for every other one
#[derive(Debug)]
pub struct StallingCa {
    inner: SelfSignedCa,
    stalled: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl StallingCa {
    pub fn new(stalled: &[&str]) -> Self {
        Self {
            inner: SelfSignedCa::new(),
            stalled: stalled.iter().map(|d| d.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls_for(&self, domain: &str) -> usize {
        self.calls.lock().iter().filter(|d| *d == domain).count()
    }
}

#[async_trait]
impl CaClient for StallingCa {
    async fn obtain_certificate(&self, domain: &str) -> Result<CertificateMaterial, CaError> {
        self.calls.lock().push(domain.to_string());
        if self.stalled.iter().any(|d| d == domain) {
            return std::future::pending().await;
        }
        self.inner.obtain_certificate(domain).await
    }

    async fn revoke_certificate(&self, material: &CertificateMaterial) -> Result<(), CaError> {
        self.inner.revoke_certificate(material).await
    }
}

/// Fails with a protocol error while `failing` is set, issues otherwise
#[derive(Debug)]
pub struct SwitchableCa {
    inner: SelfSignedCa,
    failing: AtomicBool,
    message: String,
    calls: AtomicU32,
}

impl SwitchableCa {
    pub fn failing(message: &str) -> Self {
        Self {
            inner: SelfSignedCa::new(),
            failing: AtomicBool::new(true),
            message: message.to_string(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaClient for SwitchableCa {
    async fn obtain_certificate(&self, domain: &str) -> Result<CertificateMaterial, CaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CaError::Protocol(self.message.clone()));
        }
        self.inner.obtain_certificate(domain).await
    }

    async fn revoke_certificate(&self, material: &CertificateMaterial) -> Result<(), CaError> {
        self.inner.revoke_certificate(material).await
    }
}

// ============================================================================
// Notification channels
// ============================================================================

/// Records every event it is asked to deliver
#[derive(Debug, Default)]
pub struct RecordingChannel {
    name: String,
    events: Mutex<Vec<EscalationEvent>>,
}

impl RecordingChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn events(&self) -> Vec<EscalationEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, event: &EscalationEvent) -> Result<(), NotifyError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Always fails
#[derive(Debug, Default)]
pub struct BrokenChannel;

#[async_trait]
impl NotificationChannel for BrokenChannel {
    fn name(&self) -> &str {
        "broken"
    }

    async fn notify(&self, _event: &EscalationEvent) -> Result<(), NotifyError> {
        Err(NotifyError::Request("connection refused".to_string()))
    }
}

/// Takes far longer than any notify timeout
#[derive(Debug, Default)]
pub struct StuckChannel;

#[async_trait]
impl NotificationChannel for StuckChannel {
    fn name(&self) -> &str {
        "stuck"
    }

    async fn notify(&self, _event: &EscalationEvent) -> Result<(), NotifyError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Escalation settings matching the documented defaults, with a 10 minute cooldown
pub fn escalation_config() -> EscalationConfig {
    EscalationConfig {
        failure_threshold: 3,
        window_secs: 300,
        notification_cooldown_secs: 600,
        ..Default::default()
    }
}

pub fn manager(ca: Arc<dyn CaClient>) -> CertificateManager {
    CertificateManager::new(
        ManagerConfig::default(),
        Arc::new(CertificateRegistry::new()),
        ca,
        Arc::new(MemoryCertificateStore::new()),
    )
}

/// Registration for placeholder material expiring `days` from `now`
pub fn expiring_in(now: DateTime<Utc>, days: i64) -> Registration {
    Registration::new(
        CertificateMaterial::new("placeholder-cert", "placeholder-key"),
        now - chrono::Duration::days(90 - days),
        now + chrono::Duration::days(days),
    )
}
