//! KDL configuration parsing.

mod helpers;
mod lifecycle;

use anyhow::Result;
use tracing::{trace, warn};

use crate::Config;

pub use helpers::offset_to_line_col;

/// Convert a parsed KDL document to Config
pub fn parse_kdl_document(doc: kdl::KdlDocument) -> Result<Config> {
    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "manager" => config.manager = lifecycle::parse_manager_config(node)?,
            "escalation" => config.escalation = lifecycle::parse_escalation_config(node)?,
            "storage" => config.storage = lifecycle::parse_storage_config(node)?,
            "notifications" => {
                config.notifications = lifecycle::parse_notification_config(node)?
            }
            "certificate" => config
                .certificates
                .push(lifecycle::parse_certificate_entry(node)?),
            other => {
                warn!(node = %other, "Ignoring unknown top-level configuration node");
            }
        }
    }

    trace!(
        certificates = config.certificates.len(),
        channels = config.notifications.channels.len(),
        "Parsed KDL configuration"
    );

    Ok(config)
}
