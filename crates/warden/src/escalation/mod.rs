//! Failure escalation
//!
//! Turns renewal failures, timeouts, CA errors and expiry warnings into
//! deduplicated, cooldown-throttled notifications. Each domain is either
//! quiet or has exactly one active escalation:
//!
//! ```text
//!            qualifying signal              clear()
//!   Quiet ─────────────────────▶ Escalated ─────────▶ Quiet
//!                                 │    ▲
//!                                 └────┘
//!                       repeat signal: re-notify if the
//!                       cooldown elapsed and not acknowledged
//! ```

mod error;
mod manager;

pub use error::EscalationError;
pub use manager::{EscalationManager, EscalationSnapshot, EscalationStats};
