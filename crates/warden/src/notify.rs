//! Notification channels for escalation events
//!
//! # Webhook payload
//!
//! ```text
//! POST {url}
//! Content-Type: application/json
//!
//! {
//!   "domain": "example.com",
//!   "escalation_id": "retry_exhausted-1767225600000000000",
//!   "escalation_type": "retry_exhausted",
//!   "severity": "critical",
//!   "failure_count": 3,
//!   ...
//! }
//! ```
//!
//! Any 2xx response counts as delivered.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use certwarden_config::{ChannelConfig, NotificationConfig};

use crate::events::EscalationEvent;

/// Errors delivering a notification
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Channel could not be constructed
    #[error("notification channel configuration error: {0}")]
    Configuration(String),

    /// Request could not be sent
    #[error("notification request failed: {0}")]
    Request(String),

    /// Endpoint answered with a non-success status
    #[error("notification endpoint returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Delivery exceeded the per-channel timeout
    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
}

/// Destination for escalation notifications
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Stable channel name used in logs and metrics
    fn name(&self) -> &str;

    async fn notify(&self, event: &EscalationEvent) -> Result<(), NotifyError>;
}

/// Writes escalations to the process log
#[derive(Debug, Default, Clone)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &EscalationEvent) -> Result<(), NotifyError> {
        warn!(
            domain = %event.domain,
            escalation_id = %event.escalation_id,
            escalation_type = %event.escalation_type,
            severity = %event.severity,
            failure_count = event.failure_count,
            last_error = %event.last_error,
            "Certificate escalation notification"
        );
        Ok(())
    }
}

/// POSTs escalations as JSON to an HTTP endpoint
#[derive(Debug)]
pub struct WebhookChannel {
    name: String,
    url: String,
    headers: HashMap<String, String>,
    client: Client,
}

impl WebhookChannel {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: name.into(),
            url: url.into(),
            headers,
            client,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, event: &EscalationEvent) -> Result<(), NotifyError> {
        debug!(
            channel = %self.name,
            url = %self.url,
            domain = %event.domain,
            "Sending escalation webhook"
        );

        let mut request = self.client.post(&self.url).json(event);
        for (header, value) in &self.headers {
            request = request.header(header.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NotifyError::Request(format!("webhook request timed out: {}", e))
            } else {
                NotifyError::Request(format!("webhook request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Build channels from configuration
pub fn build_channels(
    config: &NotificationConfig,
    timeout: Duration,
) -> Result<Vec<Arc<dyn NotificationChannel>>, NotifyError> {
    config
        .channels
        .iter()
        .map(|channel| -> Result<Arc<dyn NotificationChannel>, NotifyError> {
            match channel {
                ChannelConfig::Log => Ok(Arc::new(LogChannel)),
                ChannelConfig::Webhook { name, url, headers } => Ok(Arc::new(WebhookChannel::new(
                    name.clone(),
                    url.clone(),
                    headers.clone(),
                    timeout,
                )?)),
            }
        })
        .collect()
}
