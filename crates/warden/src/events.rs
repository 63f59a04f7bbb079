//! Escalation and recovery events
//!
//! Events form a closed enum so publishers handle every kind explicitly.
//! [`Event::record`] flattens any event into the structured record consumed
//! by logging and observability pipelines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, trace, warn};

use certwarden_common::{EscalationId, EscalationType, Severity};

use crate::certs::CertificateInfo;

/// Module name stamped on every event record
pub const EVENT_MODULE: &str = "certificates";

/// An escalation was activated or re-notified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub domain: String,
    pub escalation_id: EscalationId,
    pub timestamp: DateTime<Utc>,
    pub failure_count: u32,
    pub last_failure_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_time: Option<DateTime<Utc>>,
    pub escalation_type: EscalationType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_cert_info: Option<CertificateInfo>,
    pub last_error: String,
}

/// An active escalation was cleared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryEvent {
    pub domain: String,
    pub escalation_id: EscalationId,
    pub escalation_type: EscalationType,
    pub resolved_at: DateTime<Utc>,
}

/// All events emitted by the escalation manager
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Escalation(EscalationEvent),
    Recovery(RecoveryEvent),
}

/// Flat structured form of an [`Event`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub module: &'static str,
    pub phase: &'static str,
    pub event_type: &'static str,
    pub domain: String,
    pub escalation_id: String,
    pub escalation_type: EscalationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_remaining: Option<i64>,
}

impl Event {
    pub fn domain(&self) -> &str {
        match self {
            Event::Escalation(e) => &e.domain,
            Event::Recovery(e) => &e.domain,
        }
    }

    pub fn escalation_id(&self) -> &EscalationId {
        match self {
            Event::Escalation(e) => &e.escalation_id,
            Event::Recovery(e) => &e.escalation_id,
        }
    }

    pub fn record(&self) -> EventRecord {
        match self {
            Event::Escalation(e) => EventRecord {
                module: EVENT_MODULE,
                phase: "escalation",
                event_type: "certificate.escalated",
                domain: e.domain.clone(),
                escalation_id: e.escalation_id.to_string(),
                escalation_type: e.escalation_type,
                failure_count: Some(e.failure_count),
                severity: Some(e.severity),
                days_remaining: e.current_cert_info.as_ref().map(|info| info.days_remaining),
            },
            Event::Recovery(e) => EventRecord {
                module: EVENT_MODULE,
                phase: "recovery",
                event_type: "certificate.recovered",
                domain: e.domain.clone(),
                escalation_id: e.escalation_id.to_string(),
                escalation_type: e.escalation_type,
                failure_count: None,
                severity: None,
                days_remaining: None,
            },
        }
    }
}

/// Sink for escalation and recovery events
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &Event);
}

/// Publishes events as structured log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish(&self, event: &Event) {
        let record = event.record();
        match event {
            Event::Escalation(_) => warn!(
                module = record.module,
                phase = record.phase,
                event_type = record.event_type,
                domain = %record.domain,
                escalation_id = %record.escalation_id,
                escalation_type = %record.escalation_type,
                failure_count = ?record.failure_count,
                severity = ?record.severity,
                days_remaining = ?record.days_remaining,
                "Certificate escalation"
            ),
            Event::Recovery(_) => info!(
                module = record.module,
                phase = record.phase,
                event_type = record.event_type,
                domain = %record.domain,
                escalation_id = %record.escalation_id,
                escalation_type = %record.escalation_type,
                "Certificate escalation resolved"
            ),
        }
    }
}

/// Fans events out to any number of in-process subscribers
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<Event>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: &Event) {
        // No subscribers is not an error
        if self.sender.send(event.clone()).is_err() {
            trace!(domain = %event.domain(), "No event subscribers");
        }
    }
}
