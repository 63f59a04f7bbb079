//! Type-safe escalation identifiers.
//!
//! An escalation id names one failure streak for one domain. It is minted
//! when the escalation activates and reused for every re-notification until
//! the streak is cleared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::types::EscalationType;

/// Identifier of an active escalation, formatted `{type}-{unix nanos}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscalationId(String);

impl EscalationId {
    /// Build an id from an escalation type and a nanosecond timestamp
    pub fn new(escalation_type: EscalationType, nanos: i64) -> Self {
        Self(format!("{}-{}", escalation_type, nanos))
    }

    /// Create from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for EscalationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EscalationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Mints escalation ids with strictly increasing timestamps.
///
/// Two activations observed at the same clock reading (a frozen test clock,
/// or coarse system clocks) still receive distinct ids.
#[derive(Debug, Default)]
pub struct EscalationIdGenerator {
    last_nanos: AtomicI64,
}

impl EscalationIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the id for an escalation activated at `now`
    pub fn generate(&self, escalation_type: EscalationType, now: DateTime<Utc>) -> EscalationId {
        let observed = now.timestamp_nanos_opt().unwrap_or(i64::MAX);
        let mut last = self.last_nanos.load(Ordering::Acquire);
        loop {
            let next = observed.max(last.saturating_add(1));
            match self.last_nanos.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return EscalationId::new(escalation_type, next),
                Err(current) => last = current,
            }
        }
    }
}
