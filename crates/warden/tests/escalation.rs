//! Escalation manager integration tests
//!
//! Drives the escalation manager through its public API with a manual clock
//! and recording channels.

mod common;

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use certwarden::{
    BroadcastPublisher, CertificateInfo, CertificateStatus, Clock, EscalationError,
    EscalationManager, EscalationType, Event, ManualClock, Severity, WardenMetrics,
};
use common::{escalation_config, BrokenChannel, RecordingChannel, StuckChannel};

const DOMAIN: &str = "shop.example.com";

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2031, 3, 14, 9, 0, 0).unwrap(),
    ))
}

fn cert_info(clock: &ManualClock, days_remaining: i64) -> CertificateInfo {
    let now = clock.now();
    CertificateInfo {
        domain: DOMAIN.to_string(),
        status: CertificateStatus::Expiring,
        issued_at: now - Duration::days(90 - days_remaining),
        expires_at: now + Duration::days(days_remaining),
        days_remaining,
        renewal_attempts: 0,
        last_renewed_at: None,
    }
}

// ============================================================================
// Threshold and window
// ============================================================================

mod threshold {
    use super::*;

    #[tokio::test]
    async fn test_third_failure_activates() {
        let clock = clock();
        let channel = Arc::new(RecordingChannel::new("ops"));
        let manager = EscalationManager::new(escalation_config())
            .with_clock(clock.clone())
            .with_channel(channel.clone());

        assert!(manager.record_failure(DOMAIN, "dns timeout").await.is_none());
        clock.advance(Duration::seconds(30));
        assert!(manager.record_failure(DOMAIN, "dns timeout").await.is_none());
        assert_eq!(channel.count(), 0);
        assert!(!manager.is_active(DOMAIN));

        clock.advance(Duration::seconds(30));
        let event = manager
            .record_failure(DOMAIN, "challenge rejected")
            .await
            .expect("third failure activates");

        assert_eq!(event.domain, DOMAIN);
        assert_eq!(event.failure_count, 3);
        assert_eq!(event.escalation_type, EscalationType::RetryExhausted);
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.last_error, "challenge rejected");
        assert_eq!(event.last_failure_time, clock.now());
        assert_eq!(channel.count(), 1);
        assert_eq!(channel.events()[0], event);

        let stats = manager.stats();
        assert_eq!(stats.total_escalations, 1);
        assert_eq!(stats.by_type.get(&EscalationType::RetryExhausted), Some(&1));
        assert_eq!(stats.active, 1);
    }

    #[tokio::test]
    async fn test_spread_out_failures_never_activate() {
        let clock = clock();
        let manager = EscalationManager::new(escalation_config()).with_clock(clock.clone());

        for _ in 0..6 {
            assert!(manager.record_failure(DOMAIN, "flaky").await.is_none());
            clock.advance(Duration::minutes(4));
        }
        assert!(!manager.is_active(DOMAIN));
        assert_eq!(manager.stats().total_escalations, 0);
    }

    #[tokio::test]
    async fn test_domains_are_independent() {
        let manager = EscalationManager::new(escalation_config()).with_clock(clock());

        for _ in 0..2 {
            manager.record_failure("a.example.com", "boom").await;
            manager.record_failure("b.example.com", "boom").await;
        }
        assert!(manager.record_failure("a.example.com", "boom").await.is_some());
        assert!(manager.is_active("a.example.com"));
        assert!(!manager.is_active("b.example.com"));
    }
}

// ============================================================================
// Cooldown and acknowledgement
// ============================================================================

mod notifications {
    use super::*;

    #[tokio::test]
    async fn test_cooldown_throttles_renotification() {
        let clock = clock();
        let channel = Arc::new(RecordingChannel::new("ops"));
        let manager = EscalationManager::new(escalation_config())
            .with_clock(clock.clone())
            .with_channel(channel.clone());

        let event = manager
            .escalate(DOMAIN, EscalationType::AcmeError, "server error")
            .await
            .unwrap();
        assert_eq!(channel.count(), 1);

        // Repeats inside the 10 minute cooldown are silent
        for _ in 0..4 {
            clock.advance(Duration::minutes(2));
            assert!(manager
                .escalate(DOMAIN, EscalationType::AcmeError, "server error")
                .await
                .is_none());
        }
        assert_eq!(channel.count(), 1);

        clock.advance(Duration::minutes(3));
        assert!(manager
            .escalate(DOMAIN, EscalationType::AcmeError, "server error")
            .await
            .is_none());
        assert_eq!(channel.count(), 2);

        let renotified = &channel.events()[1];
        assert_eq!(renotified.escalation_id, event.escalation_id);
        assert_eq!(manager.stats().total_escalations, 1);
    }

    #[tokio::test]
    async fn test_acknowledge_silences_until_cleared() {
        let clock = clock();
        let channel = Arc::new(RecordingChannel::new("ops"));
        let manager = EscalationManager::new(escalation_config())
            .with_clock(clock.clone())
            .with_channel(channel.clone());

        let first = manager
            .escalate(DOMAIN, EscalationType::RateLimited, "rateLimited")
            .await
            .unwrap();
        manager.acknowledge(DOMAIN).unwrap();
        assert!(manager.snapshot(DOMAIN).unwrap().acknowledged);

        clock.advance(Duration::hours(2));
        manager
            .escalate(DOMAIN, EscalationType::RateLimited, "rateLimited")
            .await;
        assert_eq!(channel.count(), 1);

        manager.clear(DOMAIN).unwrap();
        let second = manager
            .escalate(DOMAIN, EscalationType::RateLimited, "rateLimited")
            .await
            .expect("new escalation after clear");
        assert_eq!(channel.count(), 2);
        assert_ne!(second.escalation_id, first.escalation_id);
        assert!(!manager.snapshot(DOMAIN).unwrap().acknowledged);
    }

    #[tokio::test]
    async fn test_acknowledge_unknown_domain() {
        let manager = EscalationManager::new(escalation_config()).with_clock(clock());
        assert_eq!(
            manager.acknowledge(DOMAIN),
            Err(EscalationError::NotFound(DOMAIN.to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_channels_do_not_block_delivery() {
        let channel = Arc::new(RecordingChannel::new("ops"));
        let metrics = Arc::new(WardenMetrics::new().unwrap());
        let manager = EscalationManager::new(escalation_config())
            .with_clock(clock())
            .with_channel(Arc::new(BrokenChannel))
            .with_channel(Arc::new(StuckChannel))
            .with_channel(channel.clone())
            .with_metrics(metrics.clone());

        let event = manager
            .escalate(DOMAIN, EscalationType::ValidationFailed, "bad chain")
            .await;
        assert!(event.is_some());
        assert_eq!(channel.count(), 1);

        let text = metrics.gather_text().unwrap();
        assert!(text.contains("channel=\"broken\",outcome=\"failed\""));
        assert!(text.contains("channel=\"stuck\",outcome=\"failed\""));
        assert!(text.contains("channel=\"ops\",outcome=\"delivered\""));
    }
}

// ============================================================================
// Recovery
// ============================================================================

mod recovery {
    use super::*;

    #[tokio::test]
    async fn test_clear_publishes_one_recovery() {
        let clock = clock();
        let publisher = Arc::new(BroadcastPublisher::new(16));
        let mut events = publisher.subscribe();
        let manager = EscalationManager::new(escalation_config())
            .with_clock(clock.clone())
            .with_publisher(publisher.clone());

        let escalation = manager
            .escalate(DOMAIN, EscalationType::AcmeError, "boom")
            .await
            .unwrap();
        clock.advance(Duration::minutes(20));

        let recovery = manager.clear(DOMAIN).expect("active escalation cleared");
        assert_eq!(recovery.escalation_id, escalation.escalation_id);
        assert_eq!(recovery.escalation_type, EscalationType::AcmeError);
        assert_eq!(recovery.resolved_at, clock.now());

        // Clearing again does nothing
        assert!(manager.clear(DOMAIN).is_none());

        let stats = manager.stats();
        assert_eq!(stats.resolutions, 1);
        assert_eq!(stats.last_resolution_at, Some(clock.now()));
        assert_eq!(stats.active, 0);
        assert!(manager.snapshot(DOMAIN).is_none());

        assert!(matches!(events.try_recv().unwrap(), Event::Escalation(_)));
        assert_eq!(events.try_recv().unwrap(), Event::Recovery(recovery));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clear_without_escalation_is_noop() {
        let manager = EscalationManager::new(escalation_config()).with_clock(clock());
        manager.record_failure(DOMAIN, "one-off").await;

        assert!(manager.clear(DOMAIN).is_none());
        assert_eq!(manager.stats().resolutions, 0);
        // Failure history below the threshold is kept
        assert_eq!(manager.snapshot(DOMAIN).unwrap().failure_count, 1);
    }
}

// ============================================================================
// Expiry and CA error classification
// ============================================================================

mod classification {
    use super::*;

    #[tokio::test]
    async fn test_expiration_window() {
        let clock = clock();
        let manager = EscalationManager::new(escalation_config()).with_clock(clock.clone());

        let far = cert_info(&clock, 15);
        assert!(manager
            .check_expiration(DOMAIN, Some(&far))
            .await
            .unwrap()
            .is_none());
        assert!(!manager.is_active(DOMAIN));

        let near = cert_info(&clock, 5);
        let event = manager
            .check_expiration(DOMAIN, Some(&near))
            .await
            .unwrap()
            .expect("expiring certificate escalates");
        assert_eq!(event.escalation_type, EscalationType::ExpiringSoon);
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.current_cert_info, Some(near));
    }

    #[tokio::test]
    async fn test_expiration_requires_info() {
        let manager = EscalationManager::new(escalation_config()).with_clock(clock());
        let err = manager.check_expiration(DOMAIN, None).await.unwrap_err();
        assert!(matches!(err, EscalationError::NilInput(_)));
        assert!(manager.snapshot(DOMAIN).is_none());
    }

    #[tokio::test]
    async fn test_acme_error_classification() {
        let manager = EscalationManager::new(escalation_config()).with_clock(clock());

        let limited = manager
            .handle_acme_error(
                "limited.example.com",
                "urn:ietf:params:acme:error:rateLimited: too many certificates",
            )
            .await
            .unwrap();
        assert_eq!(limited.escalation_type, EscalationType::RateLimited);

        let other = manager
            .handle_acme_error("other.example.com", "urn:ietf:params:acme:error:serverInternal")
            .await
            .unwrap();
        assert_eq!(other.escalation_type, EscalationType::AcmeError);
        assert_eq!(other.last_error, "urn:ietf:params:acme:error:serverInternal");
    }

    #[tokio::test]
    async fn test_timeout_escalates_as_validation_failure() {
        let manager = EscalationManager::new(escalation_config()).with_clock(clock());
        let event = manager
            .record_timeout(DOMAIN, "renewal timed out after 600s")
            .await
            .unwrap();
        assert_eq!(event.escalation_type, EscalationType::ValidationFailed);
        assert_eq!(event.failure_count, 1);
    }

    #[tokio::test]
    async fn test_escalation_ids_increase() {
        let manager = EscalationManager::new(escalation_config()).with_clock(clock());

        let mut ids = Vec::new();
        for i in 0..5 {
            let domain = format!("d{}.example.com", i);
            let event = manager
                .escalate(&domain, EscalationType::AcmeError, "boom")
                .await
                .unwrap();
            let (kind, nanos) = event.escalation_id.as_str().rsplit_once('-').unwrap();
            assert_eq!(kind, "acme_error");
            ids.push(nanos.parse::<i64>().unwrap());
        }
        // Frozen clock, still distinct and ordered
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
