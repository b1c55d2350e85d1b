//! Pipeline configuration.
//!
//! `AppConfig` is built once at startup and handed to every component that
//! needs it. Nothing in the workspace reads configuration from a global.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default idempotency marker lifetime in seconds.
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 3600;

/// Configuration shared by the ingestion and dispatch steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Table holding schema records.
    pub event_schema_table: String,
    /// Table holding partner subscriptions.
    pub subscription_table: String,
    /// Table holding delivery status records.
    pub delivery_status_table: String,
    /// Table holding idempotency markers.
    pub idempotency_table: String,
    /// Prefix of the per-event ingress topics.
    pub ingress_topic_prefix: String,
    /// Prefix of the per-partner egress topics.
    pub egress_topic_prefix: String,
    /// How long an idempotency marker suppresses redelivery, in seconds.
    pub idempotency_ttl_secs: u64,
    /// HTTP attempts per delivery call.
    pub delivery_max_attempts: u32,
    /// Base delay of the delivery backoff, in milliseconds.
    pub backoff_base_ms: u64,
    /// Fraction of the backoff added as random jitter (0.0 to 1.0).
    pub backoff_jitter: f64,
    /// Per-request HTTP timeout, in milliseconds.
    pub request_timeout_ms: u64,
    /// Failed deliveries after which an event is marked `FAILED` and no
    /// longer handed back to the stream. 0 disables the cutoff.
    pub dead_letter_after_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            event_schema_table: "event_schema".to_string(),
            subscription_table: "partner_event_subscription".to_string(),
            delivery_status_table: "event_delivery_status".to_string(),
            idempotency_table: "idempotency_ledger".to_string(),
            ingress_topic_prefix: "wh.ingress".to_string(),
            egress_topic_prefix: "wh.egress".to_string(),
            idempotency_ttl_secs: DEFAULT_IDEMPOTENCY_TTL_SECS,
            delivery_max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_jitter: 0.5,
            request_timeout_ms: 10_000,
            dead_letter_after_attempts: 10,
        }
    }
}

impl AppConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from process environment variables, falling
    /// back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };
        let count = |key: &str, default: u32| {
            lookup(key)
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(default)
        };

        Self {
            event_schema_table: string("EVENT_SCHEMA_TABLE", defaults.event_schema_table),
            subscription_table: string("SUBSCRIPTION_TABLE", defaults.subscription_table),
            delivery_status_table: string("DELIVERY_STATUS_TABLE", defaults.delivery_status_table),
            idempotency_table: string("IDEMPOTENCY_TABLE", defaults.idempotency_table),
            ingress_topic_prefix: string("INGRESS_TOPIC_PREFIX", defaults.ingress_topic_prefix),
            egress_topic_prefix: string("EGRESS_TOPIC_PREFIX", defaults.egress_topic_prefix),
            idempotency_ttl_secs: number("IDEMPOTENCY_TTL_SECS", defaults.idempotency_ttl_secs),
            delivery_max_attempts: count("DELIVERY_MAX_ATTEMPTS", defaults.delivery_max_attempts)
                .max(1),
            backoff_base_ms: number("BACKOFF_BASE_MS", defaults.backoff_base_ms),
            backoff_jitter: lookup("BACKOFF_JITTER")
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(defaults.backoff_jitter),
            request_timeout_ms: number("REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
            dead_letter_after_attempts: count(
                "DEAD_LETTER_AFTER_ATTEMPTS",
                defaults.dead_letter_after_attempts,
            ),
        }
    }

    /// Sets the egress topic prefix.
    pub fn egress_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.egress_topic_prefix = prefix.into();
        self
    }

    /// Sets the ingress topic prefix.
    pub fn ingress_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ingress_topic_prefix = prefix.into();
        self
    }

    /// Sets the idempotency marker lifetime in seconds.
    pub fn idempotency_ttl_secs(mut self, secs: u64) -> Self {
        self.idempotency_ttl_secs = secs;
        self
    }

    /// Sets the HTTP attempts per delivery call.
    pub fn delivery_max_attempts(mut self, attempts: u32) -> Self {
        self.delivery_max_attempts = attempts.max(1);
        self
    }

    /// Sets the backoff base delay in milliseconds.
    pub fn backoff_base_ms(mut self, ms: u64) -> Self {
        self.backoff_base_ms = ms;
        self
    }

    /// Sets the backoff jitter fraction.
    pub fn backoff_jitter(mut self, jitter: f64) -> Self {
        self.backoff_jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Sets the per-request timeout in milliseconds.
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    /// Sets the dead-letter threshold.
    pub fn dead_letter_after_attempts(mut self, attempts: u32) -> Self {
        self.dead_letter_after_attempts = attempts;
        self
    }

    /// Idempotency marker lifetime.
    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }

    /// Backoff base delay.
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Per-request HTTP timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.subscription_table, "partner_event_subscription");
        assert_eq!(config.egress_topic_prefix, "wh.egress");
        assert_eq!(config.idempotency_ttl(), Duration::from_secs(3600));
        assert_eq!(config.delivery_max_attempts, 3);
    }

    #[test]
    fn test_from_lookup_overrides_and_falls_back() {
        let vars: HashMap<&str, &str> = [
            ("EGRESS_TOPIC_PREFIX", "partners.out"),
            ("DELIVERY_MAX_ATTEMPTS", "5"),
            ("BACKOFF_BASE_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.egress_topic_prefix, "partners.out");
        assert_eq!(config.delivery_max_attempts, 5);
        assert_eq!(config.backoff_base_ms, 1000);
        assert_eq!(config.ingress_topic_prefix, "wh.ingress");
    }

    #[test]
    fn test_out_of_range_counts_fall_back() {
        let vars: HashMap<&str, &str> = [
            ("DELIVERY_MAX_ATTEMPTS", "4294967297"),
            ("DEAD_LETTER_AFTER_ATTEMPTS", "-1"),
            ("IDEMPOTENCY_TTL_SECS", "4294967297"),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.delivery_max_attempts, 3);
        assert_eq!(config.dead_letter_after_attempts, 10);
        assert_eq!(config.idempotency_ttl_secs, 4_294_967_297);
    }

    #[test]
    fn test_builder_clamps() {
        let config = AppConfig::new().delivery_max_attempts(0).backoff_jitter(4.0);
        assert_eq!(config.delivery_max_attempts, 1);
        assert_eq!(config.backoff_jitter, 1.0);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: AppConfig =
            serde_json::from_value(serde_json::json!({ "idempotency_table": "ledger" })).unwrap();
        assert_eq!(config.idempotency_table, "ledger");
        assert_eq!(config.subscription_table, "partner_event_subscription");
        assert_eq!(config.delivery_max_attempts, 3);
    }
}
