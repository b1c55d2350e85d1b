//! Core data types for Eventgate.
//!
//! This module defines the records persisted by the durable store gateway:
//! partner subscriptions, schema records, delivery status records and
//! idempotency markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator used in composite record identifiers.
pub const KEY_SEPARATOR: char = '#';

/// Composite identity of a partner subscription.
///
/// Rendered as `partner#domain#event_name#version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey {
    /// Partner receiving the events.
    pub partner: String,
    /// Business domain of the event.
    pub domain: String,
    /// Event name within the domain.
    pub event_name: String,
    /// Event schema version.
    pub version: String,
}

impl SubscriptionKey {
    /// Creates a new subscription key.
    pub fn new(
        partner: impl Into<String>,
        domain: impl Into<String>,
        event_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            partner: partner.into(),
            domain: domain.into(),
            event_name: event_name.into(),
            version: version.into(),
        }
    }

    /// Returns the composite string id used as the table key.
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.partner,
            self.domain,
            self.event_name,
            self.version,
            sep = KEY_SEPARATOR
        )
    }
}

/// Lifecycle status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    /// Registered but not yet confirmed.
    #[default]
    Pending,
    /// Receiving deliveries.
    Active,
    /// Switched off by an operator.
    Disabled,
}

/// Authentication settings attached to a subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionAuth {
    /// Shared secret used to HMAC-sign outbound bodies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// A partner's subscription to one versioned event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Composite id (`partner#domain#event_name#version`).
    pub id: String,

    /// Absolute HTTP(S) URL receiving the webhook.
    pub delivery_url: String,

    /// Lifecycle status.
    #[serde(default)]
    pub status: SubscriptionStatus,

    /// Signing configuration.
    #[serde(default)]
    pub auth: SubscriptionAuth,

    /// When the subscription was registered.
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Creates a pending subscription with no signing secret.
    pub fn new(key: &SubscriptionKey, delivery_url: impl Into<String>) -> Self {
        Self {
            id: key.id(),
            delivery_url: delivery_url.into(),
            status: SubscriptionStatus::Pending,
            auth: SubscriptionAuth::default(),
            created_at: Utc::now(),
        }
    }

    /// Sets the status.
    pub fn with_status(mut self, status: SubscriptionStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the signing secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.auth.secret = Some(secret.into());
        self
    }

    /// Returns the partner id, the first segment of the composite id.
    pub fn partner_id(&self) -> &str {
        self.id.split(KEY_SEPARATOR).next().unwrap_or_default()
    }

    /// Returns the signing secret, if one is configured and non-empty.
    pub fn signing_secret(&self) -> Option<&str> {
        self.auth.secret.as_deref().filter(|s| !s.is_empty())
    }
}

/// Composite identity of a schema record.
///
/// Rendered as `domain#event_name#version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaKey {
    /// Business domain of the event.
    pub domain: String,
    /// Event name within the domain.
    pub event_name: String,
    /// Event schema version.
    pub version: String,
}

impl SchemaKey {
    /// Creates a new schema key.
    pub fn new(
        domain: impl Into<String>,
        event_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            event_name: event_name.into(),
            version: version.into(),
        }
    }

    /// Returns the composite string id used as the table key.
    pub fn id(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.domain,
            self.event_name,
            self.version,
            sep = KEY_SEPARATOR
        )
    }
}

/// A registered JSON Schema for one versioned event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecord {
    /// Composite id (`domain#event_name#version`).
    pub id: String,
    /// Raw JSON Schema document.
    pub schema: String,
    /// Free-form status, `ACTIVE` unless the registrant says otherwise.
    pub status: String,
    /// Whether payloads carry sensitive data.
    #[serde(default)]
    pub contains_sensitive: bool,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

/// Outcome recorded for an event after a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Delivered to the partner endpoint.
    Success,
    /// Delivery failed; the stream will redeliver.
    Retry,
    /// Delivery abandoned.
    Failed,
}

impl DeliveryStatus {
    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Success => "SUCCESS",
            DeliveryStatus::Retry => "RETRY",
            DeliveryStatus::Failed => "FAILED",
        }
    }

    /// Returns true for statuses no pipeline step moves away from.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Success | DeliveryStatus::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of a single event, keyed by event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatusRecord {
    /// Event id.
    pub event_id: String,
    /// Latest status.
    pub status: DeliveryStatus,
    /// Error from the latest failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Delivery attempts recorded so far.
    #[serde(default)]
    pub attempts: u32,
    /// When the event was delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl DeliveryStatusRecord {
    /// Creates a record for an event seen for the first time.
    pub fn new(event_id: impl Into<String>, status: DeliveryStatus) -> Self {
        Self {
            event_id: event_id.into(),
            status,
            last_error: None,
            attempts: 0,
            delivered_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Sets the status and merges the fields present in `update`.
    pub fn apply(&mut self, status: DeliveryStatus, update: DeliveryStatusUpdate) {
        self.status = status;
        if let Some(last_error) = update.last_error {
            self.last_error = Some(last_error);
        }
        if let Some(attempts) = update.attempts {
            self.attempts = attempts;
        }
        if let Some(delivered_at) = update.delivered_at {
            self.delivered_at = Some(delivered_at);
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update of a delivery status record.
///
/// Only fields set to `Some` are written; the rest keep their stored values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStatusUpdate {
    /// Error message of the latest failure.
    pub last_error: Option<String>,
    /// Attempt count to store.
    pub attempts: Option<u32>,
    /// Delivery timestamp.
    pub delivered_at: Option<DateTime<Utc>>,
}

impl DeliveryStatusUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the last error.
    pub fn last_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    /// Sets the attempt count.
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Sets the delivery timestamp.
    pub fn delivered_at(mut self, at: DateTime<Utc>) -> Self {
        self.delivered_at = Some(at);
        self
    }
}

/// Proof that an idempotency key was already delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyMarker {
    /// Idempotency key.
    pub key: String,
    /// After this instant the marker no longer suppresses deliveries.
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyMarker {
    /// Creates a marker.
    pub fn new(key: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            expires_at,
        }
    }

    /// Returns true while the marker is still in force at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
