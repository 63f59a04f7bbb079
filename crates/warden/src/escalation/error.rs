use thiserror::Error;

/// Errors from [`EscalationManager`](super::EscalationManager) operations.
///
/// Recording a signal never fails because of a notification channel; only
/// missing input or acknowledging an inactive domain is an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscalationError {
    /// A required input (such as certificate info) was not provided
    #[error("missing {0}")]
    NilInput(&'static str),

    /// No active escalation exists for the domain
    #[error("no active escalation for domain '{0}'")]
    NotFound(String),
}
