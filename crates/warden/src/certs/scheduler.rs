//! Background certificate renewal scheduler
//!
//! Periodically scans tracked certificates and launches renewals when needed.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::manager::CertificateManager;

/// Default check interval (24 hours)
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Minimum check interval
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Background certificate renewal scheduler
///
/// Each tick runs one scan pass. The scan never waits on the renewals it
/// launches, so a slow CA for one domain does not delay the others.
pub struct RenewalScheduler {
    manager: Arc<CertificateManager>,
    check_interval: Duration,
}

impl RenewalScheduler {
    pub fn new(manager: Arc<CertificateManager>) -> Self {
        Self {
            manager,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Set the check interval, clamped to at least one second
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval.max(MIN_CHECK_INTERVAL);
        self
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Run the scan loop until `token` is cancelled.
    ///
    /// The first scan happens immediately.
    pub async fn run(self, token: CancellationToken) {
        info!(
            check_interval_secs = self.check_interval.as_secs(),
            "Starting certificate renewal scheduler"
        );

        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Certificate renewal scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let launched = self.manager.scan_once(&token);
                    debug!(launched = launched.len(), "Scheduled renewal scan complete");
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) onto the runtime
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }
}

impl std::fmt::Debug for RenewalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalScheduler")
            .field("check_interval", &self.check_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::ca::SelfSignedCa;
    use crate::certs::record::CertificateRegistry;
    use crate::certs::storage::MemoryCertificateStore;
    use certwarden_config::ManagerConfig;

    fn idle_scheduler() -> RenewalScheduler {
        let manager = CertificateManager::new(
            ManagerConfig::default(),
            Arc::new(CertificateRegistry::new()),
            Arc::new(SelfSignedCa::new()),
            Arc::new(MemoryCertificateStore::new()),
        );
        RenewalScheduler::new(Arc::new(manager))
    }

    #[test]
    fn test_interval_clamped() {
        let scheduler = idle_scheduler().with_interval(Duration::ZERO);
        assert_eq!(scheduler.check_interval(), MIN_CHECK_INTERVAL);

        let scheduler = idle_scheduler().with_interval(Duration::from_secs(60));
        assert_eq!(scheduler.check_interval(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let token = CancellationToken::new();
        let handle = idle_scheduler()
            .with_interval(Duration::from_secs(60))
            .spawn(token.clone());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(!handle.is_finished());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
