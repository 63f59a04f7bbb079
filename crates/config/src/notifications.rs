//! Notification channel configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ConfigError;

/// Notification channels escalations are delivered to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

/// A single notification channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelConfig {
    /// Write escalations to the process log
    Log,
    /// POST escalations as JSON to an HTTP endpoint
    Webhook {
        name: String,
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

impl ChannelConfig {
    /// Channel kinds understood by this build
    pub const KINDS: [&'static str; 2] = ["log", "webhook"];

    pub fn name(&self) -> &str {
        match self {
            ChannelConfig::Log => "log",
            ChannelConfig::Webhook { name, .. } => name,
        }
    }
}

impl NotificationConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let mut names = std::collections::HashSet::new();

        for channel in &self.channels {
            if !names.insert(channel.name()) {
                return Err(ConfigError::Invalid(format!(
                    "notification channel '{}' is configured more than once",
                    channel.name()
                )));
            }

            if let ChannelConfig::Webhook { name, url, .. } = channel {
                let parsed = url::Url::parse(url).map_err(|e| {
                    ConfigError::Invalid(format!("webhook '{}' has invalid url: {}", name, e))
                })?;

                match parsed.scheme() {
                    "http" | "https" => {}
                    other => {
                        return Err(ConfigError::Unsupported {
                            kind: "webhook scheme",
                            value: other.to_string(),
                        })
                    }
                }
            }
        }

        Ok(())
    }
}
