//! Certificate manager
//!
//! Owns the per-domain renewal bookkeeping: deciding when a certificate is
//! due, running at most one renewal per domain, and reporting exhausted
//! renewal streaks to the escalation hook.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use certwarden_common::{CertificateStatus, Clock, SystemClock};
use certwarden_config::ManagerConfig;

use super::ca::CaClient;
use super::error::{CertError, RenewalError};
use super::hook::EscalationHook;
use super::record::{CertificateInfo, CertificateMaterial, CertificateRegistry, Registration, RenewalPolicy};
use super::scheduler::RenewalScheduler;
use super::storage::CertificateStore;
use super::validate::{CertificateValidator, ParsedCertificate};
use crate::metrics::{RenewalOutcome, WardenMetrics};

/// Where a certificate sits relative to its renewal thresholds.
///
/// Returns `(needed, status)`:
/// - `now >= expires_at` is `Expired`
/// - `now >= expires_at - escalation_days` or `now >= expires_at - pre_renewal_days` is `Expiring`
/// - anything earlier is `Active` and not needed
pub fn assess_expiry(
    expires_at: DateTime<Utc>,
    pre_renewal_days: u32,
    escalation_days: u32,
    now: DateTime<Utc>,
) -> (bool, CertificateStatus) {
    if now >= expires_at {
        return (true, CertificateStatus::Expired);
    }
    if within_days_of(expires_at, escalation_days, now) {
        return (true, CertificateStatus::Expiring);
    }
    if within_days_of(expires_at, pre_renewal_days, now) {
        return (true, CertificateStatus::Expiring);
    }
    (false, CertificateStatus::Active)
}

/// `now >= expires_at - days`. A threshold before the representable range
/// has always been reached.
fn within_days_of(expires_at: DateTime<Utc>, days: u32, now: DateTime<Utc>) -> bool {
    chrono::Duration::try_days(i64::from(days))
        .and_then(|window| expires_at.checked_sub_signed(window))
        .is_none_or(|threshold| now >= threshold)
}

/// A renewal launched by a scan pass
#[derive(Debug)]
pub struct RenewalTask {
    pub domain: String,
    pub handle: JoinHandle<()>,
}

/// Marks a domain as in flight until dropped.
///
/// A renewal guard dropped without [`finish`](Self::finish) (timeout
/// unwinding, caller dropping the future) leaves a `Renewing` record as
/// `Failed`.
struct InFlightGuard<'a> {
    manager: &'a CertificateManager,
    domain: String,
    renewing: bool,
    finished: bool,
}

impl InFlightGuard<'_> {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.manager.in_flight.lock().remove(&self.domain);

        if !self.renewing {
            return;
        }
        if let Some(metrics) = &self.manager.metrics {
            metrics.renewal_finished();
        }
        if !self.finished {
            let abandoned = self.manager.registry.update(&self.domain, |record| {
                if record.status == CertificateStatus::Renewing {
                    record.status = CertificateStatus::Failed;
                    true
                } else {
                    false
                }
            });
            if abandoned == Some(true) {
                warn!(domain = %self.domain, "Renewal abandoned before completion");
            }
        }
    }
}

/// Tracks certificates and renews them through a CA client
pub struct CertificateManager {
    config: ManagerConfig,
    registry: Arc<CertificateRegistry>,
    /// Domains with a renewal or revocation running. Never held with the registry lock.
    in_flight: Mutex<HashSet<String>>,
    ca: Arc<dyn CaClient>,
    store: Arc<dyn CertificateStore>,
    validator: CertificateValidator,
    clock: Arc<dyn Clock>,
    hook: Option<Arc<dyn EscalationHook>>,
    metrics: Option<Arc<WardenMetrics>>,
}

impl CertificateManager {
    pub fn new(
        config: ManagerConfig,
        registry: Arc<CertificateRegistry>,
        ca: Arc<dyn CaClient>,
        store: Arc<dyn CertificateStore>,
    ) -> Self {
        let validator = CertificateValidator::new(config.expected_issuer.clone());
        Self {
            config,
            registry,
            in_flight: Mutex::new(HashSet::new()),
            ca,
            store,
            validator,
            clock: Arc::new(SystemClock),
            hook: None,
            metrics: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_escalation_hook(mut self, hook: Arc<dyn EscalationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<WardenMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CertificateRegistry> {
        &self.registry
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Start tracking a certificate
    pub fn register_certificate(&self, domain: &str, registration: Registration) -> Result<(), CertError> {
        let record = registration.into_record(domain, &self.config);
        info!(
            domain = %domain,
            expires_at = %record.expires_at,
            pre_renewal_days = record.pre_renewal_days,
            escalation_days = record.escalation_days,
            "Tracking certificate"
        );
        self.registry.insert_new(record)
    }

    /// Register a domain from the material already in the certificate store
    pub fn load_from_store(&self, domain: &str, policy: RenewalPolicy) -> Result<CertificateInfo, CertError> {
        let material = self
            .store
            .load_certificate(domain)?
            .ok_or_else(|| CertError::NotFound(domain.to_string()))?;

        let registration = Registration::from_material(material)
            .map_err(|source| CertError::InvalidCertificate {
                domain: domain.to_string(),
                source,
            })?
            .with_policy(policy);

        self.register_certificate(domain, registration)?;
        self.certificate_info(domain)
            .ok_or_else(|| CertError::NotFound(domain.to_string()))
    }

    /// Obtain, validate, store and register a certificate for an untracked domain
    pub async fn issue_certificate(&self, domain: &str, policy: RenewalPolicy) -> Result<CertificateInfo, CertError> {
        if self.registry.contains(domain) {
            return Err(CertError::DuplicateRegistration(domain.to_string()));
        }
        let guard = self.acquire(domain)?;

        let material = self.ca.obtain_certificate(domain).await?;
        let parsed = self
            .validator
            .validate(domain, &material, self.clock.now())
            .map_err(|source| CertError::InvalidCertificate {
                domain: domain.to_string(),
                source,
            })?;
        self.store.store_certificate(domain, &material)?;

        let registration =
            Registration::new(material, parsed.not_before, parsed.not_after).with_policy(policy);
        self.register_certificate(domain, registration)?;
        guard.finish();

        info!(domain = %domain, expires_at = %parsed.not_after, "Issued initial certificate");
        self.certificate_info(domain)
            .ok_or_else(|| CertError::NotFound(domain.to_string()))
    }

    // =========================================================================
    // Renewal decision
    // =========================================================================

    /// Decide whether a domain needs renewal, recording the computed status.
    ///
    /// A `Renewing` record keeps its status. A `Failed` record keeps it while
    /// renewal is still needed, and returns to `Active` once it is not.
    pub fn check_renewal_needed(&self, domain: &str) -> Result<(bool, CertificateStatus), CertError> {
        let now = self.clock.now();

        let (needed, status, urgent) = self
            .registry
            .update(domain, |record| {
                let (needed, status) = assess_expiry(
                    record.expires_at,
                    record.pre_renewal_days,
                    record.escalation_days,
                    now,
                );
                let urgent = status == CertificateStatus::Expiring
                    && within_days_of(record.expires_at, record.escalation_days, now);

                let keep = match record.status {
                    CertificateStatus::Renewing => true,
                    CertificateStatus::Failed => needed,
                    _ => false,
                };
                if !keep {
                    record.status = status;
                }
                (needed, status, urgent)
            })
            .ok_or_else(|| CertError::NotFound(domain.to_string()))?;

        match status {
            CertificateStatus::Expired => {
                warn!(domain = %domain, "Certificate has expired");
            }
            CertificateStatus::Expiring if urgent => {
                warn!(domain = %domain, "Certificate is inside its escalation window");
            }
            _ => {
                trace!(domain = %domain, status = %status, needed, "Checked renewal need");
            }
        }

        Ok((needed, status))
    }

    // =========================================================================
    // Renewal
    // =========================================================================

    fn acquire(&self, domain: &str) -> Result<InFlightGuard<'_>, CertError> {
        if !self.in_flight.lock().insert(domain.to_string()) {
            return Err(CertError::RenewalInProgress(domain.to_string()));
        }
        Ok(InFlightGuard {
            manager: self,
            domain: domain.to_string(),
            renewing: false,
            finished: false,
        })
    }

    /// Whether a renewal or revocation is running for the domain
    pub fn is_renewing(&self, domain: &str) -> bool {
        self.in_flight.lock().contains(domain)
    }

    /// Renew with the configured renewal timeout
    pub async fn renew_certificate(&self, domain: &str) -> Result<(), CertError> {
        self.renew_certificate_within(domain, self.config.renewal_timeout())
            .await
    }

    /// Renew a certificate, giving up after `timeout`.
    ///
    /// The record is only overwritten once the new material has been
    /// obtained, validated and stored. Any failure leaves the previous
    /// material in place with status `Failed`.
    pub async fn renew_certificate_within(&self, domain: &str, timeout: Duration) -> Result<(), CertError> {
        if !self.registry.contains(domain) {
            return Err(CertError::NotFound(domain.to_string()));
        }
        let mut guard = self.acquire(domain)?;

        let (attempts, max_attempts) = self
            .registry
            .update(domain, |record| {
                record.status = CertificateStatus::Renewing;
                record.renewal_attempts += 1;
                (record.renewal_attempts, record.max_renewal_attempts)
            })
            .ok_or_else(|| CertError::NotFound(domain.to_string()))?;
        guard.renewing = true;

        if let Some(metrics) = &self.metrics {
            metrics.renewal_started();
            metrics.record_renewal(domain, RenewalOutcome::Started);
        }
        info!(domain = %domain, attempt = attempts, max_attempts, "Renewing certificate");

        let started = tokio::time::Instant::now();
        let result = match tokio::time::timeout(timeout, self.run_pipeline(domain)).await {
            Ok(result) => result,
            Err(_) => Err(RenewalError::Timeout(timeout)),
        };

        match result {
            Ok((material, parsed)) => {
                let now = self.clock.now();
                self.registry.update(domain, |record| {
                    record.material = material;
                    record.issued_at = parsed.not_before;
                    record.expires_at = parsed.not_after;
                    record.renewal_attempts = 0;
                    record.status = CertificateStatus::Active;
                    record.last_renewed_at = Some(now);
                });
                guard.finish();

                if let Some(metrics) = &self.metrics {
                    metrics.record_renewal(domain, RenewalOutcome::Succeeded);
                }
                info!(
                    domain = %domain,
                    expires_at = %parsed.not_after,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Certificate renewed"
                );

                if let Some(hook) = &self.hook {
                    hook.renewal_recovered(domain).await;
                }
                Ok(())
            }
            Err(err) => {
                self.registry.update(domain, |record| {
                    record.status = CertificateStatus::Failed;
                });
                guard.finish();

                if let Some(metrics) = &self.metrics {
                    let outcome = match err {
                        RenewalError::Timeout(_) => RenewalOutcome::TimedOut,
                        _ => RenewalOutcome::Failed,
                    };
                    metrics.record_renewal(domain, outcome);
                }
                error!(
                    domain = %domain,
                    attempt = attempts,
                    max_attempts,
                    error = %err,
                    "Certificate renewal failed"
                );

                if attempts >= max_attempts {
                    if let Some(hook) = &self.hook {
                        hook.renewal_exhausted(domain, attempts, &err).await;
                    }
                }
                Err(CertError::RenewalFailed {
                    domain: domain.to_string(),
                    source: err,
                })
            }
        }
    }

    async fn run_pipeline(&self, domain: &str) -> Result<(CertificateMaterial, ParsedCertificate), RenewalError> {
        let material = self.ca.obtain_certificate(domain).await?;
        trace!(domain = %domain, "Obtained certificate material");

        let parsed = self.validator.validate(domain, &material, self.clock.now())?;
        self.store.store_certificate(domain, &material)?;

        Ok((material, parsed))
    }

    /// Revoke the current certificate and mark the record expired so the next scan reissues it
    pub async fn revoke_certificate(&self, domain: &str) -> Result<(), CertError> {
        let record = self
            .registry
            .get(domain)
            .ok_or_else(|| CertError::NotFound(domain.to_string()))?;
        let guard = self.acquire(domain)?;

        self.ca.revoke_certificate(&record.material).await?;
        self.store.delete_certificate(domain)?;

        let now = self.clock.now();
        self.registry.update(domain, |record| {
            record.expires_at = now;
            record.status = CertificateStatus::Expired;
            record
                .metadata
                .insert("revoked_at".to_string(), now.to_rfc3339());
        });
        guard.finish();

        info!(domain = %domain, "Certificate revoked");
        Ok(())
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    /// Check every tracked domain once and launch a renewal task for each that needs one.
    ///
    /// Returns without waiting on the launched renewals. Tasks stop early if
    /// `token` is cancelled.
    pub fn scan_once(self: &Arc<Self>, token: &CancellationToken) -> Vec<RenewalTask> {
        let domains = self.registry.domains();
        debug!(domain_count = domains.len(), "Checking certificates for renewal");

        let mut tasks = Vec::new();
        for domain in domains {
            if self.is_renewing(&domain) {
                debug!(domain = %domain, "Renewal already running, skipping");
                continue;
            }

            match self.check_renewal_needed(&domain) {
                Ok((true, status)) => {
                    info!(domain = %domain, status = %status, "Certificate needs renewal");

                    let manager = Arc::clone(self);
                    let cancel = token.child_token();
                    let task_domain = domain.clone();
                    let handle = tokio::spawn(async move {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                debug!(domain = %task_domain, "Renewal cancelled");
                            }
                            result = manager.renew_certificate(&task_domain) => {
                                if let Err(e) = result {
                                    debug!(domain = %task_domain, error = %e, "Scheduled renewal did not complete");
                                }
                            }
                        }
                    });
                    tasks.push(RenewalTask { domain, handle });
                }
                Ok((false, _)) => {
                    trace!(domain = %domain, "Certificate is still valid");
                }
                Err(e) => {
                    warn!(
                        domain = %domain,
                        error = %e,
                        "Failed to check certificate renewal status"
                    );
                }
            }
        }

        tasks
    }

    /// Start the periodic renewal scan, or `None` when auto renewal is disabled
    pub fn start_auto_renewal(self: &Arc<Self>, token: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.config.enable_auto_renewal {
            info!("Automatic renewal disabled");
            return None;
        }

        let scheduler =
            RenewalScheduler::new(Arc::clone(self)).with_interval(self.config.check_interval());
        Some(scheduler.spawn(token))
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn certificate_info(&self, domain: &str) -> Option<CertificateInfo> {
        self.registry.info(domain, self.clock.now())
    }

    pub fn domains(&self) -> Vec<String> {
        self.registry.domains()
    }
}

impl std::fmt::Debug for CertificateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateManager")
            .field("domains", &self.registry.len())
            .field("in_flight", &self.in_flight.lock().len())
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::ca::SelfSignedCa;
    use crate::certs::error::{CaError, StoreError};
    use crate::certs::storage::MemoryCertificateStore;
    use async_trait::async_trait;
    use certwarden_common::ManualClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    /// CA that always fails with a fixed message
    struct FailingCa(&'static str);

    #[async_trait]
    impl CaClient for FailingCa {
        async fn obtain_certificate(&self, _domain: &str) -> Result<CertificateMaterial, CaError> {
            Err(CaError::Protocol(self.0.to_string()))
        }

        async fn revoke_certificate(&self, _material: &CertificateMaterial) -> Result<(), CaError> {
            Ok(())
        }
    }

    /// Store that refuses writes
    struct ReadOnlyStore;

    impl CertificateStore for ReadOnlyStore {
        fn store_certificate(&self, _domain: &str, _material: &CertificateMaterial) -> Result<(), StoreError> {
            Err(StoreError::Backend("read-only".to_string()))
        }

        fn load_certificate(&self, _domain: &str) -> Result<Option<CertificateMaterial>, StoreError> {
            Ok(None)
        }

        fn delete_certificate(&self, _domain: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingHook {
        exhausted: AtomicU32,
        recovered: AtomicU32,
    }

    #[async_trait]
    impl EscalationHook for CountingHook {
        async fn renewal_exhausted(&self, _domain: &str, _attempts: u32, _error: &RenewalError) {
            self.exhausted.fetch_add(1, Ordering::SeqCst);
        }

        async fn renewal_recovered(&self, _domain: &str) {
            self.recovered.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager_with(ca: Arc<dyn CaClient>, store: Arc<dyn CertificateStore>, clock: Arc<ManualClock>) -> CertificateManager {
        CertificateManager::new(
            ManagerConfig::default(),
            Arc::new(CertificateRegistry::new()),
            ca,
            store,
        )
        .with_clock(clock)
    }

    fn registration(expires_in_days: i64) -> Registration {
        let now = start();
        Registration::new(
            CertificateMaterial::new("old-cert", "old-key"),
            now - chrono::Duration::days(60),
            now + chrono::Duration::days(expires_in_days),
        )
    }

    #[test]
    fn test_assess_expiry_thresholds() {
        let now = start();
        let at = |days: i64| now + chrono::Duration::days(days);

        assert_eq!(assess_expiry(at(60), 30, 7, now), (false, CertificateStatus::Active));
        assert_eq!(assess_expiry(at(30), 30, 7, now), (true, CertificateStatus::Expiring));
        assert_eq!(assess_expiry(at(10), 30, 7, now), (true, CertificateStatus::Expiring));
        assert_eq!(assess_expiry(at(3), 30, 7, now), (true, CertificateStatus::Expiring));
        assert_eq!(assess_expiry(now, 30, 7, now), (true, CertificateStatus::Expired));
        assert_eq!(assess_expiry(at(-1), 30, 7, now), (true, CertificateStatus::Expired));
    }

    #[test]
    fn test_register_and_duplicate() {
        let clock = Arc::new(ManualClock::new(start()));
        let manager = manager_with(Arc::new(SelfSignedCa::new()), Arc::new(MemoryCertificateStore::new()), clock);

        manager.register_certificate("example.com", registration(60)).unwrap();
        let err = manager
            .register_certificate("example.com", registration(60))
            .unwrap_err();
        assert!(matches!(err, CertError::DuplicateRegistration(_)));
    }

    #[test]
    fn test_check_unknown_domain() {
        let clock = Arc::new(ManualClock::new(start()));
        let manager = manager_with(Arc::new(SelfSignedCa::new()), Arc::new(MemoryCertificateStore::new()), clock);

        assert!(matches!(
            manager.check_renewal_needed("missing.com"),
            Err(CertError::NotFound(_))
        ));
    }

    #[test]
    fn test_check_writes_status_back() {
        let clock = Arc::new(ManualClock::new(start()));
        let manager = manager_with(
            Arc::new(SelfSignedCa::new()),
            Arc::new(MemoryCertificateStore::new()),
            clock.clone(),
        );
        manager.register_certificate("example.com", registration(40)).unwrap();

        assert_eq!(
            manager.check_renewal_needed("example.com").unwrap(),
            (false, CertificateStatus::Active)
        );

        clock.advance(chrono::Duration::days(15));
        assert_eq!(
            manager.check_renewal_needed("example.com").unwrap(),
            (true, CertificateStatus::Expiring)
        );
        assert_eq!(
            manager.certificate_info("example.com").unwrap().status,
            CertificateStatus::Expiring
        );
    }

    #[tokio::test]
    async fn test_renewal_success_commits_new_material() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ca = Arc::new(SelfSignedCa::new().with_clock(clock.clone()));
        let store = Arc::new(MemoryCertificateStore::new());
        let hook = Arc::new(CountingHook::default());
        let manager = manager_with(ca, store.clone(), clock.clone()).with_escalation_hook(hook.clone());

        let now = clock.now();
        manager
            .register_certificate(
                "example.com",
                Registration::new(
                    CertificateMaterial::new("old-cert", "old-key"),
                    now - chrono::Duration::days(80),
                    now + chrono::Duration::days(10),
                ),
            )
            .unwrap();

        manager.renew_certificate("example.com").await.unwrap();

        let record = manager.registry().get("example.com").unwrap();
        assert_eq!(record.status, CertificateStatus::Active);
        assert_eq!(record.renewal_attempts, 0);
        assert_eq!(record.last_renewed_at, Some(now));
        assert_ne!(record.material.cert_pem, "old-cert");
        assert!(record.expires_at > now + chrono::Duration::days(80));
        assert!(store.load_certificate("example.com").unwrap().is_some());
        assert_eq!(hook.recovered.load(Ordering::SeqCst), 1);
        assert!(!manager.is_renewing("example.com"));
    }

    #[tokio::test]
    async fn test_renewal_failure_keeps_previous_material() {
        let clock = Arc::new(ManualClock::new(start()));
        let hook = Arc::new(CountingHook::default());
        let manager = manager_with(
            Arc::new(FailingCa("urn:ietf:params:acme:error:serverInternal")),
            Arc::new(MemoryCertificateStore::new()),
            clock,
        )
        .with_escalation_hook(hook.clone());
        manager.register_certificate("example.com", registration(5)).unwrap();

        for attempt in 1..=3 {
            let err = manager.renew_certificate("example.com").await.unwrap_err();
            assert!(matches!(
                err,
                CertError::RenewalFailed { source: RenewalError::Ca(_), .. }
            ));

            let record = manager.registry().get("example.com").unwrap();
            assert_eq!(record.status, CertificateStatus::Failed);
            assert_eq!(record.renewal_attempts, attempt);
            assert_eq!(record.material.cert_pem, "old-cert");
        }

        // Only the third failure reaches the attempt budget
        assert_eq!(hook.exhausted.load(Ordering::SeqCst), 1);
        assert!(!manager.is_renewing("example.com"));
    }

    #[tokio::test]
    async fn test_store_failure_is_renewal_failure() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = manager_with(
            Arc::new(SelfSignedCa::new().with_clock(clock.clone())),
            Arc::new(ReadOnlyStore),
            clock,
        );
        manager.register_certificate("example.com", registration(5)).unwrap();

        let err = manager.renew_certificate("example.com").await.unwrap_err();
        assert!(matches!(
            err,
            CertError::RenewalFailed { source: RenewalError::Store(_), .. }
        ));
        assert_eq!(
            manager.registry().get("example.com").unwrap().material.cert_pem,
            "old-cert"
        );
    }

    #[tokio::test]
    async fn test_failed_status_survives_check() {
        let clock = Arc::new(ManualClock::new(start()));
        let manager = manager_with(
            Arc::new(FailingCa("boom")),
            Arc::new(MemoryCertificateStore::new()),
            clock,
        );
        manager.register_certificate("example.com", registration(5)).unwrap();
        let _ = manager.renew_certificate("example.com").await;

        let (needed, status) = manager.check_renewal_needed("example.com").unwrap();
        assert!(needed);
        assert_eq!(status, CertificateStatus::Expiring);
        assert_eq!(
            manager.certificate_info("example.com").unwrap().status,
            CertificateStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_failed_status_clears_when_not_due() {
        let clock = Arc::new(ManualClock::new(start()));
        let manager = manager_with(
            Arc::new(FailingCa("boom")),
            Arc::new(MemoryCertificateStore::new()),
            clock,
        );
        manager.register_certificate("example.com", registration(60)).unwrap();

        // Manual renewal of a certificate that is not yet due
        manager.renew_certificate("example.com").await.unwrap_err();
        assert_eq!(
            manager.certificate_info("example.com").unwrap().status,
            CertificateStatus::Failed
        );

        assert_eq!(
            manager.check_renewal_needed("example.com").unwrap(),
            (false, CertificateStatus::Active)
        );
        let info = manager.certificate_info("example.com").unwrap();
        assert_eq!(info.status, CertificateStatus::Active);
        assert_eq!(info.renewal_attempts, 1);
    }

    #[test]
    fn test_huge_windows_do_not_overflow() {
        let now = start();
        let expires_at = now + chrono::Duration::days(400);

        assert_eq!(
            assess_expiry(expires_at, u32::MAX, 7, now),
            (true, CertificateStatus::Expiring)
        );
        assert_eq!(
            assess_expiry(expires_at, u32::MAX, u32::MAX, now),
            (true, CertificateStatus::Expiring)
        );
        assert_eq!(
            assess_expiry(DateTime::<Utc>::MIN_UTC, u32::MAX, u32::MAX, DateTime::<Utc>::MIN_UTC),
            (true, CertificateStatus::Expired)
        );

        let clock = Arc::new(ManualClock::new(now));
        let manager = manager_with(
            Arc::new(SelfSignedCa::new()),
            Arc::new(MemoryCertificateStore::new()),
            clock,
        );
        manager
            .register_certificate(
                "example.com",
                registration(400)
                    .with_pre_renewal_days(u32::MAX)
                    .with_escalation_days(u32::MAX),
            )
            .unwrap();
        assert_eq!(
            manager.check_renewal_needed("example.com").unwrap(),
            (true, CertificateStatus::Expiring)
        );
    }

    #[tokio::test]
    async fn test_issue_and_load_from_store() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryCertificateStore::new());
        let manager = manager_with(
            Arc::new(SelfSignedCa::new().with_clock(clock.clone())),
            store.clone(),
            clock.clone(),
        );

        let info = manager
            .issue_certificate("example.com", RenewalPolicy::default())
            .await
            .unwrap();
        assert_eq!(info.status, CertificateStatus::Active);
        assert!(info.days_remaining >= 89);

        // A fresh manager over the same store rebuilds the record
        let restarted = manager_with(Arc::new(SelfSignedCa::new()), store, clock);
        let loaded = restarted
            .load_from_store("example.com", RenewalPolicy::default())
            .unwrap();
        assert_eq!(loaded.expires_at, info.expires_at);

        assert!(matches!(
            restarted.load_from_store("missing.com", RenewalPolicy::default()),
            Err(CertError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_marks_expired() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryCertificateStore::new());
        let manager = manager_with(
            Arc::new(SelfSignedCa::new().with_clock(clock.clone())),
            store.clone(),
            clock.clone(),
        );
        manager
            .issue_certificate("example.com", RenewalPolicy::default())
            .await
            .unwrap();

        manager.revoke_certificate("example.com").await.unwrap();

        let record = manager.registry().get("example.com").unwrap();
        assert_eq!(record.status, CertificateStatus::Expired);
        assert_eq!(record.expires_at, clock.now());
        assert!(record.metadata.contains_key("revoked_at"));
        assert!(store.is_empty());
        assert_eq!(
            manager.check_renewal_needed("example.com").unwrap(),
            (true, CertificateStatus::Expired)
        );
    }
}
