//! Producer event intake: validate a payload against its registered schema
//! and publish it to the event's ingress topic.

use chrono::Utc;
use eventgate_core::{ingress_topic, AppConfig, DurableStore, SchemaKey};
use eventgate_events::{EgressPublisher, EventEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::schema::EventSchema;

/// Header naming the producer's domain.
pub const DOMAIN_HEADER: &str = "X-Producer-Domain";

/// Header naming the event schema version.
pub const VERSION_HEADER: &str = "X-Event-Version";

/// Optional header carrying the producer's event id.
pub const EVENT_ID_HEADER: &str = "X-Event-Id";

/// Optional header carrying the deduplication key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Optional header naming the subscription the event is meant for.
pub const SUBSCRIPTION_HEADER: &str = "X-Subscription-Id";

/// An event submitted by a producer.
#[derive(Debug, Clone, Default)]
pub struct EventSubmission {
    pub event_name: String,
    pub domain: Option<String>,
    pub version: Option<String>,
    pub event_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub subscription_id: Option<String>,
    pub payload: Option<Value>,
}

/// Answer to an accepted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAccepted {
    pub event_id: String,
    pub topic: String,
}

/// Validates producer events and publishes them to the ingress stream.
pub struct IntakeService {
    config: AppConfig,
    store: Arc<dyn DurableStore>,
    publisher: Arc<dyn EgressPublisher>,
}

impl IntakeService {
    /// Creates a new intake service.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn DurableStore>,
        publisher: Arc<dyn EgressPublisher>,
    ) -> Self {
        Self {
            config,
            store,
            publisher,
        }
    }

    /// Validates the payload against the registered schema and publishes it.
    ///
    /// Fails with `NotFound` when no schema is registered for the event and
    /// with `Validation` listing every violation when the payload does not
    /// match it.
    pub async fn publish_event(&self, submission: EventSubmission) -> ApiResult<EventAccepted> {
        let payload = submission
            .payload
            .ok_or_else(|| ApiError::Validation("Body required".into()))?;

        let domain = non_empty(submission.domain.as_deref());
        let version = non_empty(submission.version.as_deref());
        let (Some(domain), Some(version)) = (domain, version) else {
            let missing: Vec<&str> = [(DOMAIN_HEADER, domain), (VERSION_HEADER, version)]
                .into_iter()
                .filter(|(_, value)| value.is_none())
                .map(|(name, _)| name)
                .collect();
            return Err(ApiError::Validation(format!(
                "Missing required headers: {}",
                missing.join(", ")
            )));
        };
        let event_name = submission.event_name.as_str();

        let key = SchemaKey::new(domain, event_name, version);
        let record = self
            .store
            .fetch_schema(&key.id())
            .await?
            .ok_or_else(|| ApiError::NotFound("Schema not found".into()))?;

        let schema = EventSchema::parse(&record.schema).map_err(|e| {
            ApiError::Internal(format!("Stored schema {} is unusable: {e}", record.id))
        })?;
        schema.validate(&payload).map_err(ApiError::Validation)?;

        let event_id = submission
            .event_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let idempotency_key = submission
            .idempotency_key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| event_id.clone());

        let mut envelope = EventEnvelope {
            event_id: Some(event_id.clone()),
            subscription_id: submission.subscription_id.filter(|s| !s.is_empty()),
            event_name: Some(event_name.to_string()),
            data: payload,
            idempotency_key: Some(idempotency_key),
            ..Default::default()
        };
        envelope.extra.insert("domain".into(), domain.into());
        envelope.extra.insert("version".into(), version.into());
        envelope
            .extra
            .insert("timestamp".into(), Utc::now().to_rfc3339().into());

        let topic = ingress_topic(&self.config, domain, event_name, version);
        self.publisher.publish(&topic, &envelope).await?;

        tracing::info!(target: "intake", event_id = %event_id, topic = %topic, "Event accepted");

        Ok(EventAccepted { event_id, topic })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventgate_adapter_memory::MemoryStore;
    use eventgate_core::SchemaRecord;
    use eventgate_events::MemoryPublisher;
    use serde_json::json;

    const CUSTOMER_SCHEMA: &str = r#"{
        "type": "object",
        "properties": {"customerId": {"type": "string"}},
        "required": ["customerId"]
    }"#;

    async fn service() -> (IntakeService, MemoryStore, MemoryPublisher) {
        let store = MemoryStore::new();
        store
            .put_schema(&SchemaRecord {
                id: "demo#CustomerUpdated#v1".into(),
                schema: CUSTOMER_SCHEMA.into(),
                status: "ACTIVE".into(),
                contains_sensitive: false,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        let publisher = MemoryPublisher::new();
        let service = IntakeService::new(
            AppConfig::default(),
            Arc::new(store.clone()),
            Arc::new(publisher.clone()),
        );
        (service, store, publisher)
    }

    fn submission(payload: Value) -> EventSubmission {
        EventSubmission {
            event_name: "CustomerUpdated".into(),
            domain: Some("demo".into()),
            version: Some("v1".into()),
            payload: Some(payload),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_valid_event_is_published_to_ingress() {
        let (intake, _, publisher) = service().await;

        let accepted = intake
            .publish_event(EventSubmission {
                event_id: Some("e1".into()),
                subscription_id: Some("p1#demo#CustomerUpdated#v1".into()),
                ..submission(json!({"customerId": "123"}))
            })
            .await
            .unwrap();
        assert_eq!(accepted.event_id, "e1");
        assert_eq!(accepted.topic, "wh.ingress.demo.CustomerUpdated.v1");

        let messages = publisher.messages().await;
        assert_eq!(messages.len(), 1);
        let envelope = &messages[0].envelope;
        assert_eq!(messages[0].topic, accepted.topic);
        assert_eq!(envelope.event_id(), Some("e1"));
        assert_eq!(envelope.effective_idempotency_key(), Some("e1"));
        assert_eq!(envelope.subscription_id(), Some("p1#demo#CustomerUpdated#v1"));
        assert_eq!(envelope.data, json!({"customerId": "123"}));
        assert_eq!(envelope.extra.get("domain"), Some(&json!("demo")));
    }

    #[tokio::test]
    async fn test_event_id_is_generated_when_absent() {
        let (intake, _, publisher) = service().await;

        let accepted = intake
            .publish_event(EventSubmission {
                idempotency_key: Some("order-7".into()),
                ..submission(json!({"customerId": "123"}))
            })
            .await
            .unwrap();

        assert!(Uuid::parse_str(&accepted.event_id).is_ok());
        let envelope = &publisher.messages().await[0].envelope;
        assert_eq!(envelope.effective_idempotency_key(), Some("order-7"));
    }

    #[tokio::test]
    async fn test_invalid_payload_lists_violations() {
        let (intake, _, publisher) = service().await;

        let err = intake
            .publish_event(submission(json!({"customerId": 5})))
            .await
            .unwrap_err();

        assert!(matches!(&err, ApiError::Validation(m) if m.contains("/customerId")));
        assert!(publisher.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_schema_is_not_found() {
        let (intake, _, _) = service().await;

        let err = intake
            .publish_event(EventSubmission {
                version: Some("v9".into()),
                ..submission(json!({"customerId": "123"}))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(err.status_code(), http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_body_and_headers() {
        let (intake, _, _) = service().await;

        let err = intake
            .publish_event(EventSubmission {
                payload: None,
                ..submission(Value::Null)
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Body required");

        let err = intake
            .publish_event(EventSubmission {
                domain: None,
                version: Some(String::new()),
                ..submission(json!({}))
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required headers: X-Producer-Domain, X-Event-Version"
        );
    }

    #[tokio::test]
    async fn test_publisher_outage_is_internal() {
        let (intake, _, publisher) = service().await;
        publisher.fail_with(Some("broker down".into())).await;

        let err = intake
            .publish_event(submission(json!({"customerId": "123"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(m) if m.contains("broker down")));
    }
}
