//! Prometheus metrics for renewals, escalations and notifications.
//!
//! Metrics live in a registry owned by [`WardenMetrics`] rather than the
//! process-global default, so several managers (and tests) can coexist.

use anyhow::{Context, Result};
use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

use certwarden_common::EscalationType;

/// Renewal outcome label values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    Started,
    Succeeded,
    Failed,
    TimedOut,
}

impl RenewalOutcome {
    fn label(self) -> &'static str {
        match self {
            RenewalOutcome::Started => "started",
            RenewalOutcome::Succeeded => "succeeded",
            RenewalOutcome::Failed => "failed",
            RenewalOutcome::TimedOut => "timed_out",
        }
    }
}

/// Metrics collector shared by the certificate and escalation managers.
pub struct WardenMetrics {
    registry: Registry,

    /// Labels: domain, outcome
    renewals: IntCounterVec,

    /// Renewals currently executing
    renewals_in_flight: IntGauge,

    /// Activated escalations. Labels: escalation_type
    escalations: IntCounterVec,

    /// Notification deliveries. Labels: channel, outcome
    notifications: IntCounterVec,

    /// Escalations cleared by a recovery
    resolutions: IntCounter,
}

impl WardenMetrics {
    /// Create the metrics and register them in a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let renewals = register_int_counter_vec_with_registry!(
            "certwarden_renewals_total",
            "Certificate renewal attempts by outcome",
            &["domain", "outcome"],
            registry
        )
        .context("Failed to register renewals metric")?;

        let renewals_in_flight = register_int_gauge_with_registry!(
            "certwarden_renewals_in_flight",
            "Number of certificate renewals currently executing",
            registry
        )
        .context("Failed to register renewals_in_flight metric")?;

        let escalations = register_int_counter_vec_with_registry!(
            "certwarden_escalations_total",
            "Escalations activated by type",
            &["escalation_type"],
            registry
        )
        .context("Failed to register escalations metric")?;

        let notifications = register_int_counter_vec_with_registry!(
            "certwarden_notifications_total",
            "Escalation notifications by channel and outcome",
            &["channel", "outcome"],
            registry
        )
        .context("Failed to register notifications metric")?;

        let resolutions = register_int_counter_with_registry!(
            "certwarden_escalation_resolutions_total",
            "Escalations resolved by a successful renewal or manual clear",
            registry
        )
        .context("Failed to register resolutions metric")?;

        Ok(Self {
            registry,
            renewals,
            renewals_in_flight,
            escalations,
            notifications,
            resolutions,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_renewal(&self, domain: &str, outcome: RenewalOutcome) {
        self.renewals
            .with_label_values(&[domain, outcome.label()])
            .inc();
    }

    pub fn renewal_started(&self) {
        self.renewals_in_flight.inc();
    }

    pub fn renewal_finished(&self) {
        self.renewals_in_flight.dec();
    }

    pub fn record_escalation(&self, escalation_type: EscalationType) {
        self.escalations
            .with_label_values(&[escalation_type.as_str()])
            .inc();
    }

    pub fn record_notification(&self, channel: &str, delivered: bool) {
        let outcome = if delivered { "delivered" } else { "failed" };
        self.notifications
            .with_label_values(&[channel, outcome])
            .inc();
    }

    pub fn record_resolution(&self) {
        self.resolutions.inc();
    }

    /// Render all metrics in the Prometheus text exposition format
    pub fn gather_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output is not UTF-8")
    }
}

impl std::fmt::Debug for WardenMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WardenMetrics")
            .field("renewals_in_flight", &self.renewals_in_flight.get())
            .field("resolutions", &self.resolutions.get())
            .finish()
    }
}
