//! Stream topic naming.

use crate::config::AppConfig;

/// Name of the ingress topic carrying one versioned event from producers.
pub fn ingress_topic(config: &AppConfig, domain: &str, event_name: &str, version: &str) -> String {
    format!(
        "{}.{}.{}.{}",
        config.ingress_topic_prefix, domain, event_name, version
    )
}

/// Name of the egress topic carrying one event to one partner.
pub fn egress_topic(config: &AppConfig, partner: &str, event_name: &str) -> String {
    format!("{}.{}.{}", config.egress_topic_prefix, partner, event_name)
}
