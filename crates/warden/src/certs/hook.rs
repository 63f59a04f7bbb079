use async_trait::async_trait;

use super::error::RenewalError;

/// Receives the outcome of renewal streaks.
///
/// The certificate manager calls `renewal_exhausted` after a failure that
/// leaves the record at or above its attempt budget, and `renewal_recovered`
/// after every successful renewal.
#[async_trait]
pub trait EscalationHook: Send + Sync {
    async fn renewal_exhausted(&self, domain: &str, attempts: u32, error: &RenewalError);

    async fn renewal_recovered(&self, domain: &str);
}
