//! Escalation manager
//!
//! Escalation is keyed by domain. A signal of a different type arriving
//! while a domain is escalated replaces the escalation type (and severity)
//! but keeps the escalation id, and goes through the same cooldown and
//! acknowledgement gating as a repeat of the original type.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use certwarden_common::{Clock, EscalationId, EscalationIdGenerator, EscalationType, SystemClock};
use certwarden_config::EscalationConfig;

use super::error::EscalationError;
use crate::certs::{CertificateInfo, CertificateRegistry, EscalationHook, RenewalError};
use crate::events::{EscalationEvent, Event, EventPublisher, RecoveryEvent, TracingPublisher};
use crate::metrics::WardenMetrics;
use crate::notify::{NotificationChannel, NotifyError};

#[derive(Debug, Clone)]
struct ActiveEscalation {
    id: EscalationId,
    escalation_type: EscalationType,
    acknowledged: bool,
    last_notification_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct EscalationState {
    failure_count: u32,
    first_failure_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    last_error: String,
    active: Option<ActiveEscalation>,
}

#[derive(Debug, Default)]
struct EscalationBook {
    domains: HashMap<String, EscalationState>,
    stats: EscalationStats,
}

/// Counters over the manager's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EscalationStats {
    /// Escalations activated (re-notifications and type changes are not counted)
    pub total_escalations: u64,
    pub by_type: HashMap<EscalationType, u64>,
    pub resolutions: u64,
    pub last_resolution_at: Option<DateTime<Utc>>,
    /// Domains currently escalated
    pub active: usize,
}

/// Read-only view of one domain's escalation state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationSnapshot {
    pub domain: String,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: String,
    pub active: bool,
    pub escalation_id: Option<EscalationId>,
    pub escalation_type: Option<EscalationType>,
    pub acknowledged: bool,
    pub last_notification_at: Option<DateTime<Utc>>,
}

/// How a signal feeds into escalation state
#[derive(Debug, Clone, Copy)]
struct Signal {
    escalation_type: EscalationType,
    /// Counts toward the sliding-window failure counter
    counted: bool,
    /// Only activates once the failure threshold is reached
    thresholded: bool,
}

impl Signal {
    fn failure() -> Self {
        Self {
            escalation_type: EscalationType::RetryExhausted,
            counted: true,
            thresholded: true,
        }
    }

    fn immediate(escalation_type: EscalationType) -> Self {
        Self {
            escalation_type,
            counted: true,
            thresholded: false,
        }
    }

    fn expiry() -> Self {
        Self {
            escalation_type: EscalationType::ExpiringSoon,
            counted: false,
            thresholded: false,
        }
    }
}

enum Decision {
    Quiet,
    Activated(EscalationEvent),
    Renotify(EscalationEvent),
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Converts renewal problems into throttled notifications and recovery events
pub struct EscalationManager {
    config: EscalationConfig,
    window: chrono::Duration,
    cooldown: chrono::Duration,
    book: Mutex<EscalationBook>,
    ids: EscalationIdGenerator,
    channels: Vec<Arc<dyn NotificationChannel>>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    registry: Option<Arc<CertificateRegistry>>,
    metrics: Option<Arc<WardenMetrics>>,
    retry_interval: Option<chrono::Duration>,
}

impl EscalationManager {
    pub fn new(config: EscalationConfig) -> Self {
        Self {
            window: to_chrono(config.window()),
            cooldown: to_chrono(config.notification_cooldown()),
            config,
            book: Mutex::new(EscalationBook::default()),
            ids: EscalationIdGenerator::new(),
            channels: Vec::new(),
            publisher: Arc::new(TracingPublisher),
            clock: Arc::new(SystemClock),
            registry: None,
            metrics: None,
            retry_interval: None,
        }
    }

    pub fn with_channels(mut self, channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach the certificate registry so events carry a certificate snapshot
    pub fn with_registry(mut self, registry: Arc<CertificateRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<WardenMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Interval until the next scheduled renewal, used for `next_retry_time`
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(to_chrono(interval));
        self
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    // =========================================================================
    // Signals
    // =========================================================================

    /// Count a renewal failure.
    ///
    /// Returns the event only when this failure activates the escalation.
    /// Later failures may re-notify channels but return `None`.
    pub async fn record_failure(&self, domain: &str, error: &str) -> Option<EscalationEvent> {
        let cert_info = self.registry_snapshot(domain);
        let decision = self.apply(domain, Signal::failure(), error, cert_info);
        self.settle(domain, decision).await
    }

    /// Escalate a timed-out renewal immediately as `ValidationFailed`
    pub async fn record_timeout(&self, domain: &str, error: &str) -> Option<EscalationEvent> {
        self.escalate(domain, EscalationType::ValidationFailed, error)
            .await
    }

    /// Escalate a CA error, classifying rate limits separately
    pub async fn handle_acme_error(&self, domain: &str, raw_error: &str) -> Option<EscalationEvent> {
        let escalation_type = self.classify_ca_error(raw_error);
        self.escalate(domain, escalation_type, raw_error).await
    }

    /// Escalate `ExpiringSoon` when the certificate is inside the warning window.
    ///
    /// Expiry warnings do not count as failures.
    pub async fn check_expiration(
        &self,
        domain: &str,
        cert_info: Option<&CertificateInfo>,
    ) -> Result<Option<EscalationEvent>, EscalationError> {
        let info = cert_info.ok_or(EscalationError::NilInput("certificate info"))?;

        if info.days_remaining > self.config.expiring_soon_days {
            trace!(
                domain = %domain,
                days_remaining = info.days_remaining,
                "Certificate outside expiry warning window"
            );
            return Ok(None);
        }

        let message = format!("certificate expires in {} days", info.days_remaining);
        let decision = self.apply(domain, Signal::expiry(), &message, Some(info.clone()));
        Ok(self.settle(domain, decision).await)
    }

    /// Escalate immediately with an explicit type
    pub async fn escalate(
        &self,
        domain: &str,
        escalation_type: EscalationType,
        error: &str,
    ) -> Option<EscalationEvent> {
        let cert_info = self.registry_snapshot(domain);
        let decision = self.apply(domain, Signal::immediate(escalation_type), error, cert_info);
        self.settle(domain, decision).await
    }

    fn classify_ca_error(&self, raw_error: &str) -> EscalationType {
        let marker = self.config.rate_limit_marker.as_str();
        if !marker.is_empty() && raw_error.contains(marker) {
            EscalationType::RateLimited
        } else {
            EscalationType::AcmeError
        }
    }

    fn registry_snapshot(&self, domain: &str) -> Option<CertificateInfo> {
        self.registry
            .as_ref()
            .and_then(|registry| registry.info(domain, self.clock.now()))
    }

    /// Update state for one signal under the lock; no I/O happens here
    fn apply(
        &self,
        domain: &str,
        signal: Signal,
        error: &str,
        cert_info: Option<CertificateInfo>,
    ) -> Decision {
        let now = self.clock.now();
        let mut book = self.book.lock();
        let EscalationBook { domains, stats } = &mut *book;
        let state = domains.entry(domain.to_string()).or_default();

        if signal.counted {
            let within_window = state
                .first_failure_at
                .is_some_and(|first| now - first <= self.window);
            if within_window {
                state.failure_count += 1;
            } else {
                state.failure_count = 1;
                state.first_failure_at = Some(now);
            }
            state.last_failure_at = Some(now);
        }
        state.last_error = error.to_string();

        let qualifies =
            !signal.thresholded || state.failure_count >= self.config.failure_threshold;

        match state.active.as_mut() {
            None => {
                if !qualifies {
                    trace!(
                        domain = %domain,
                        failure_count = state.failure_count,
                        threshold = self.config.failure_threshold,
                        "Failure recorded below threshold"
                    );
                    return Decision::Quiet;
                }

                let active = ActiveEscalation {
                    id: self.ids.generate(signal.escalation_type, now),
                    escalation_type: signal.escalation_type,
                    acknowledged: false,
                    last_notification_at: now,
                };
                let event = self.build_event(domain, state, &active, now, cert_info);
                state.active = Some(active);
                stats.total_escalations += 1;
                *stats.by_type.entry(signal.escalation_type).or_insert(0) += 1;
                Decision::Activated(event)
            }
            Some(active) => {
                if qualifies && active.escalation_type != signal.escalation_type {
                    info!(
                        domain = %domain,
                        escalation_id = %active.id,
                        from = %active.escalation_type,
                        to = %signal.escalation_type,
                        "Escalation type changed"
                    );
                    active.escalation_type = signal.escalation_type;
                }

                if active.acknowledged {
                    debug!(
                        domain = %domain,
                        escalation_id = %active.id,
                        "Escalation acknowledged, notification suppressed"
                    );
                    return Decision::Quiet;
                }
                if now - active.last_notification_at < self.cooldown {
                    trace!(
                        domain = %domain,
                        escalation_id = %active.id,
                        "Escalation in cooldown, notification suppressed"
                    );
                    return Decision::Quiet;
                }

                active.last_notification_at = now;
                let active = active.clone();
                Decision::Renotify(self.build_event(domain, state, &active, now, cert_info))
            }
        }
    }

    fn build_event(
        &self,
        domain: &str,
        state: &EscalationState,
        active: &ActiveEscalation,
        now: DateTime<Utc>,
        cert_info: Option<CertificateInfo>,
    ) -> EscalationEvent {
        let last_failure_time = state.last_failure_at.unwrap_or(now);
        EscalationEvent {
            domain: domain.to_string(),
            escalation_id: active.id.clone(),
            timestamp: now,
            failure_count: state.failure_count,
            last_failure_time,
            next_retry_time: self
                .retry_interval
                .and_then(|interval| last_failure_time.checked_add_signed(interval)),
            escalation_type: active.escalation_type,
            severity: active.escalation_type.severity(),
            current_cert_info: cert_info,
            last_error: state.last_error.clone(),
        }
    }

    async fn settle(&self, domain: &str, decision: Decision) -> Option<EscalationEvent> {
        match decision {
            Decision::Quiet => None,
            Decision::Activated(event) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_escalation(event.escalation_type);
                }
                warn!(
                    domain = %domain,
                    escalation_id = %event.escalation_id,
                    escalation_type = %event.escalation_type,
                    severity = %event.severity,
                    failure_count = event.failure_count,
                    "Escalation activated"
                );
                self.dispatch(&event).await;
                Some(event)
            }
            Decision::Renotify(event) => {
                info!(
                    domain = %domain,
                    escalation_id = %event.escalation_id,
                    escalation_type = %event.escalation_type,
                    "Re-notifying active escalation"
                );
                self.dispatch(&event).await;
                None
            }
        }
    }

    /// Deliver to the publisher and every channel concurrently, best effort
    async fn dispatch(&self, event: &EscalationEvent) {
        self.publisher.publish(&Event::Escalation(event.clone()));

        let timeout = self.config.notify_timeout();
        let deliveries = self.channels.iter().map(|channel| async move {
            let result = match tokio::time::timeout(timeout, channel.notify(event)).await {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Timeout(timeout)),
            };
            (channel, result)
        });

        for (channel, result) in join_all(deliveries).await {
            if let Some(metrics) = &self.metrics {
                metrics.record_notification(channel.name(), result.is_ok());
            }
            match result {
                Ok(()) => debug!(
                    channel = %channel.name(),
                    escalation_id = %event.escalation_id,
                    "Notification delivered"
                ),
                Err(e) => warn!(
                    channel = %channel.name(),
                    escalation_id = %event.escalation_id,
                    error = %e,
                    "Notification delivery failed"
                ),
            }
        }
    }

    // =========================================================================
    // Operator actions
    // =========================================================================

    /// Suppress further notifications for the active escalation until it is cleared
    pub fn acknowledge(&self, domain: &str) -> Result<(), EscalationError> {
        let mut book = self.book.lock();
        let active = book
            .domains
            .get_mut(domain)
            .and_then(|state| state.active.as_mut())
            .ok_or_else(|| EscalationError::NotFound(domain.to_string()))?;

        active.acknowledged = true;
        info!(domain = %domain, escalation_id = %active.id, "Escalation acknowledged");
        Ok(())
    }

    /// Resolve the active escalation, returning the recovery event.
    ///
    /// A domain without an active escalation is left untouched.
    pub fn clear(&self, domain: &str) -> Option<RecoveryEvent> {
        let now = self.clock.now();

        let recovery = {
            let mut book = self.book.lock();
            let active = book
                .domains
                .get(domain)
                .and_then(|state| state.active.as_ref())
                .map(|active| (active.id.clone(), active.escalation_type));

            let Some((escalation_id, escalation_type)) = active else {
                trace!(domain = %domain, "No active escalation to clear");
                return None;
            };

            book.domains.remove(domain);
            book.stats.resolutions += 1;
            book.stats.last_resolution_at = Some(now);

            RecoveryEvent {
                domain: domain.to_string(),
                escalation_id,
                escalation_type,
                resolved_at: now,
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_resolution();
        }
        info!(
            domain = %domain,
            escalation_id = %recovery.escalation_id,
            "Escalation resolved"
        );
        self.publisher.publish(&Event::Recovery(recovery.clone()));
        Some(recovery)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn stats(&self) -> EscalationStats {
        let book = self.book.lock();
        let mut stats = book.stats.clone();
        stats.active = book
            .domains
            .values()
            .filter(|state| state.active.is_some())
            .count();
        stats
    }

    pub fn is_active(&self, domain: &str) -> bool {
        self.book
            .lock()
            .domains
            .get(domain)
            .is_some_and(|state| state.active.is_some())
    }

    pub fn escalation_id(&self, domain: &str) -> Option<EscalationId> {
        self.book
            .lock()
            .domains
            .get(domain)
            .and_then(|state| state.active.as_ref())
            .map(|active| active.id.clone())
    }

    pub fn snapshot(&self, domain: &str) -> Option<EscalationSnapshot> {
        let book = self.book.lock();
        let state = book.domains.get(domain)?;
        let active = state.active.as_ref();

        Some(EscalationSnapshot {
            domain: domain.to_string(),
            failure_count: state.failure_count,
            last_failure_at: state.last_failure_at,
            last_error: state.last_error.clone(),
            active: active.is_some(),
            escalation_id: active.map(|a| a.id.clone()),
            escalation_type: active.map(|a| a.escalation_type),
            acknowledged: active.is_some_and(|a| a.acknowledged),
            last_notification_at: active.map(|a| a.last_notification_at),
        })
    }
}

impl std::fmt::Debug for EscalationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationManager")
            .field("channels", &self.channels.len())
            .field("failure_threshold", &self.config.failure_threshold)
            .finish()
    }
}

#[async_trait]
impl EscalationHook for EscalationManager {
    async fn renewal_exhausted(&self, domain: &str, attempts: u32, error: &RenewalError) {
        let message = format!("renewal failed after {} attempts: {}", attempts, error);
        match error {
            RenewalError::Timeout(_) => {
                self.record_timeout(domain, &message).await;
            }
            RenewalError::Ca(ca) => {
                self.handle_acme_error(domain, &ca.to_string()).await;
            }
            RenewalError::Validation(_) => {
                self.escalate(domain, EscalationType::ValidationFailed, &message)
                    .await;
            }
            RenewalError::Store(_) => {
                self.escalate(domain, EscalationType::RetryExhausted, &message)
                    .await;
            }
        }
    }

    async fn renewal_recovered(&self, domain: &str) {
        self.clear(domain);
    }
}
