//! Manager, escalation, storage, notification and certificate KDL parsing.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::trace;

use crate::lifecycle::*;
use crate::notifications::{ChannelConfig, NotificationConfig};
use crate::ConfigError;

use super::helpers::{
    get_bool_entry, get_first_arg_string, get_string_entry, get_unsigned_entry,
};

/// Parse manager configuration block
pub fn parse_manager_config(node: &kdl::KdlNode) -> Result<ManagerConfig> {
    trace!("Parsing manager configuration block");

    let defaults = ManagerConfig::default();
    let config = ManagerConfig {
        default_pre_renewal_days: get_unsigned_entry(node, "default-pre-renewal-days")?
            .unwrap_or(defaults.default_pre_renewal_days),
        default_escalation_days: get_unsigned_entry(node, "default-escalation-days")?
            .unwrap_or(defaults.default_escalation_days),
        default_max_renewal_attempts: get_unsigned_entry(node, "default-max-renewal-attempts")?
            .unwrap_or(defaults.default_max_renewal_attempts),
        check_interval_secs: get_unsigned_entry(node, "check-interval-secs")?
            .unwrap_or(defaults.check_interval_secs),
        renewal_timeout_secs: get_unsigned_entry(node, "renewal-timeout-secs")?
            .unwrap_or(defaults.renewal_timeout_secs),
        enable_auto_renewal: get_bool_entry(node, "enable-auto-renewal")
            .unwrap_or(defaults.enable_auto_renewal),
        expected_issuer: get_string_entry(node, "expected-issuer"),
    };

    trace!(
        check_interval_secs = config.check_interval_secs,
        renewal_timeout_secs = config.renewal_timeout_secs,
        enable_auto_renewal = config.enable_auto_renewal,
        "Parsed manager configuration"
    );

    Ok(config)
}

/// Parse escalation configuration block
pub fn parse_escalation_config(node: &kdl::KdlNode) -> Result<EscalationConfig> {
    trace!("Parsing escalation configuration block");

    let defaults = EscalationConfig::default();
    let config = EscalationConfig {
        failure_threshold: get_unsigned_entry(node, "failure-threshold")?
            .unwrap_or(defaults.failure_threshold),
        window_secs: get_unsigned_entry(node, "window-secs")?.unwrap_or(defaults.window_secs),
        expiring_soon_days: get_unsigned_entry::<u32>(node, "expiring-soon-days")?
            .map(i64::from)
            .unwrap_or(defaults.expiring_soon_days),
        rate_limit_marker: get_string_entry(node, "rate-limit-marker")
            .unwrap_or(defaults.rate_limit_marker),
        notification_cooldown_secs: get_unsigned_entry(node, "notification-cooldown-secs")?
            .unwrap_or(defaults.notification_cooldown_secs),
        notify_timeout_secs: get_unsigned_entry(node, "notify-timeout-secs")?
            .unwrap_or(defaults.notify_timeout_secs),
    };

    trace!(
        failure_threshold = config.failure_threshold,
        window_secs = config.window_secs,
        cooldown_secs = config.notification_cooldown_secs,
        "Parsed escalation configuration"
    );

    Ok(config)
}

/// Parse storage configuration block
pub fn parse_storage_config(node: &kdl::KdlNode) -> Result<StorageConfig> {
    let path = get_string_entry(node, "path")
        .map(PathBuf::from)
        .unwrap_or_else(|| StorageConfig::default().path);

    trace!(path = %path.display(), "Parsed storage configuration");
    Ok(StorageConfig { path })
}

/// Parse notifications block
///
/// ```kdl
/// notifications {
///     log
///     webhook "ops" {
///         url "https://hooks.example.com/certs"
///         header "Authorization" "Bearer token"
///     }
/// }
/// ```
pub fn parse_notification_config(node: &kdl::KdlNode) -> Result<NotificationConfig> {
    let mut channels = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let channel = match child.name().value() {
                "log" => ChannelConfig::Log,
                "webhook" => {
                    let name = get_first_arg_string(child).ok_or_else(|| {
                        anyhow!("Webhook requires a name argument, e.g., webhook \"ops\" {{ ... }}")
                    })?;
                    let url = get_string_entry(child, "url").ok_or_else(|| {
                        anyhow!("Webhook '{}' requires a 'url' field", name)
                    })?;
                    ChannelConfig::Webhook {
                        headers: parse_headers(child),
                        name,
                        url,
                    }
                }
                other => {
                    return Err(ConfigError::Unsupported {
                        kind: "notification channel",
                        value: other.to_string(),
                    }
                    .into());
                }
            };

            trace!(channel = %channel.name(), "Parsed notification channel");
            channels.push(channel);
        }
    }

    Ok(NotificationConfig { channels })
}

fn parse_headers(node: &kdl::KdlNode) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    if let Some(children) = node.children() {
        for child in children.nodes().iter().filter(|n| n.name().value() == "header") {
            let mut values = child.entries().iter().filter_map(|e| e.value().as_string());
            if let (Some(name), Some(value)) = (values.next(), values.next()) {
                headers.insert(name.to_string(), value.to_string());
            }
        }
    }

    headers
}

/// Parse a `certificate "domain" { ... }` node
pub fn parse_certificate_entry(node: &kdl::KdlNode) -> Result<CertificateEntry> {
    let domain = get_first_arg_string(node).ok_or_else(|| {
        anyhow!("Certificate requires a domain argument, e.g., certificate \"example.com\"")
    })?;

    let mut metadata = HashMap::new();
    if let Some(children) = node.children() {
        if let Some(meta) = children.get("metadata") {
            if let Some(meta_children) = meta.children() {
                for item in meta_children.nodes() {
                    if let Some(value) = get_first_arg_string(item) {
                        metadata.insert(item.name().value().to_string(), value);
                    }
                }
            }
        }
    }

    let entry = CertificateEntry {
        pre_renewal_days: get_unsigned_entry(node, "pre-renewal-days")?,
        escalation_days: get_unsigned_entry(node, "escalation-days")?,
        max_renewal_attempts: get_unsigned_entry(node, "max-renewal-attempts")?,
        metadata,
        domain,
    };

    trace!(domain = %entry.domain, "Parsed certificate entry");
    Ok(entry)
}
