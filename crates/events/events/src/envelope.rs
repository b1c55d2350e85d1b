//! Event envelope carried on the ingress and egress streams.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PipelineError, PipelineResult};

/// Routing and idempotency metadata wrapped around an opaque payload.
///
/// Fields this pipeline does not know about are kept in `extra` so that
/// forwarding an envelope does not drop producer metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique per emission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    /// Composite id of the target subscription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,

    /// Event name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,

    /// Payload delivered to the partner.
    #[serde(default)]
    pub data: Value,

    /// Deduplication key; the event id when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    /// Delivery attempt counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,

    /// Unrecognised producer fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventEnvelope {
    /// Creates an envelope for a subscription.
    pub fn new(
        event_id: impl Into<String>,
        subscription_id: impl Into<String>,
        event_name: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            event_id: Some(event_id.into()),
            subscription_id: Some(subscription_id.into()),
            event_name: Some(event_name.into()),
            data,
            ..Default::default()
        }
    }

    /// Sets the idempotency key.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Sets the attempt counter.
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Non-empty event id.
    pub fn event_id(&self) -> Option<&str> {
        non_empty(self.event_id.as_deref())
    }

    /// Non-empty subscription id.
    pub fn subscription_id(&self) -> Option<&str> {
        non_empty(self.subscription_id.as_deref())
    }

    /// Event name, `"unknown"` when absent.
    pub fn event_name_or_unknown(&self) -> &str {
        non_empty(self.event_name.as_deref()).unwrap_or("unknown")
    }

    /// Key used for duplicate suppression: the explicit key, else the event id.
    pub fn effective_idempotency_key(&self) -> Option<&str> {
        non_empty(self.idempotency_key.as_deref()).or_else(|| self.event_id())
    }

    /// Attempt counter, 1 when absent.
    pub fn current_attempt(&self) -> u32 {
        self.attempt.unwrap_or(1).max(1)
    }

    /// Decodes a base64 stream value.
    pub fn decode(value: Option<&str>) -> PipelineResult<Self> {
        let value = value.ok_or_else(|| PipelineError::Decode("Missing record value".into()))?;
        let bytes = STANDARD.decode(value.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Encodes the envelope as a base64 stream value.
    pub fn encode(&self) -> PipelineResult<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| PipelineError::Publish(format!("Failed to encode envelope: {e}")))?;
        Ok(STANDARD.encode(json))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_json(value: &Value) -> String {
        STANDARD.encode(serde_json::to_vec(value).unwrap())
    }

    #[test]
    fn test_decode_wire_format() {
        let value = encode_json(&serde_json::json!({
            "event_id": "e1",
            "subscription_id": "p1#d#ev#v1",
            "event_name": "ev",
            "data": {"x": 1},
            "trace_id": "abc"
        }));

        let envelope = EventEnvelope::decode(Some(&value)).unwrap();
        assert_eq!(envelope.event_id(), Some("e1"));
        assert_eq!(envelope.subscription_id(), Some("p1#d#ev#v1"));
        assert_eq!(envelope.data, serde_json::json!({"x": 1}));
        assert_eq!(envelope.effective_idempotency_key(), Some("e1"));
        assert_eq!(envelope.current_attempt(), 1);
        assert_eq!(envelope.extra.get("trace_id"), Some(&serde_json::json!("abc")));
    }

    #[test]
    fn test_explicit_idempotency_key_and_attempt() {
        let envelope = EventEnvelope::new("e1", "s", "ev", Value::Null)
            .with_idempotency_key("order-7")
            .with_attempt(4);
        assert_eq!(envelope.effective_idempotency_key(), Some("order-7"));
        assert_eq!(envelope.current_attempt(), 4);

        let envelope = EventEnvelope::new("e1", "s", "ev", Value::Null).with_idempotency_key("");
        assert_eq!(envelope.effective_idempotency_key(), Some("e1"));
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(
            EventEnvelope::decode(None),
            Err(PipelineError::Decode(_))
        ));
        assert!(matches!(
            EventEnvelope::decode(Some("%%% not base64")),
            Err(PipelineError::Decode(_))
        ));
        let not_json = STANDARD.encode(b"not json");
        assert!(matches!(
            EventEnvelope::decode(Some(&not_json)),
            Err(PipelineError::Decode(_))
        ));
        let not_object = encode_json(&serde_json::json!([1, 2]));
        assert!(matches!(
            EventEnvelope::decode(Some(&not_object)),
            Err(PipelineError::Decode(_))
        ));
    }

    #[test]
    fn test_encode_preserves_fields() {
        let mut envelope = EventEnvelope::new("e1", "p1#d#ev#v1", "ev", serde_json::json!({"x": 1}));
        envelope.extra.insert("source".into(), serde_json::json!("billing"));

        let decoded = EventEnvelope::decode(Some(&envelope.encode().unwrap())).unwrap();
        assert_eq!(decoded, envelope);
    }
}
