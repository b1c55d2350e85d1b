//! Schema and subscription registration.

use chrono::Utc;
use eventgate_core::{
    egress_topic, ingress_topic, AppConfig, DurableStore, SchemaKey, SchemaRecord, Subscription,
    SubscriptionAuth, SubscriptionKey, SubscriptionStatus, KEY_SEPARATOR,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

use crate::error::{ApiError, ApiResult};
use crate::schema::EventSchema;

/// Status given to schemas registered without one.
pub const DEFAULT_SCHEMA_STATUS: &str = "ACTIVE";

/// Body of a schema registration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SchemaRegistration {
    pub domain: Option<String>,
    pub event_name: Option<String>,
    pub version: Option<String>,
    /// JSON Schema document, as a string.
    pub schema: Option<String>,
    pub status: Option<String>,
    pub contains_sensitive: bool,
}

/// Answer to a successful schema registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRegistered {
    pub schema_id: String,
    pub topic: String,
}

/// Body of a subscription registration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubscriptionRegistration {
    pub partner_id: Option<String>,
    pub domain: Option<String>,
    pub event_name: Option<String>,
    pub version: Option<String>,
    pub delivery_url: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub auth: Option<SubscriptionAuth>,
}

/// Answer to a successful subscription registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRegistered {
    pub subscription_id: String,
    pub topic: String,
}

/// Registers schemas and subscriptions in the durable store.
pub struct AdminService {
    config: AppConfig,
    store: Arc<dyn DurableStore>,
}

impl AdminService {
    /// Creates a new admin service.
    pub fn new(config: AppConfig, store: Arc<dyn DurableStore>) -> Self {
        Self { config, store }
    }

    /// Validates and stores a schema, returning its id and ingress topic.
    pub async fn register_schema(
        &self,
        request: SchemaRegistration,
    ) -> ApiResult<SchemaRegistered> {
        let [domain, event_name, version, schema] = required([
            ("domain", &request.domain),
            ("event_name", &request.event_name),
            ("version", &request.version),
            ("schema", &request.schema),
        ])?;
        check_key_segments(&[("domain", domain), ("event_name", event_name), ("version", version)])?;

        EventSchema::parse(schema).map_err(ApiError::Validation)?;

        let key = SchemaKey::new(domain, event_name, version);
        let record = SchemaRecord {
            id: key.id(),
            schema: schema.to_string(),
            status: request
                .status
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SCHEMA_STATUS.to_string()),
            contains_sensitive: request.contains_sensitive,
            updated_at: Utc::now(),
        };
        self.store.put_schema(&record).await?;

        let topic = ingress_topic(&self.config, domain, event_name, version);
        tracing::info!(target: "admin", schema_id = %record.id, topic = %topic, "Ensuring topic");

        Ok(SchemaRegistered {
            schema_id: record.id,
            topic,
        })
    }

    /// Validates and stores a subscription, returning its id and egress topic.
    pub async fn register_subscription(
        &self,
        request: SubscriptionRegistration,
    ) -> ApiResult<SubscriptionRegistered> {
        let [partner_id, domain, event_name, version, delivery_url] = required([
            ("partner_id", &request.partner_id),
            ("domain", &request.domain),
            ("event_name", &request.event_name),
            ("version", &request.version),
            ("delivery_url", &request.delivery_url),
        ])?;
        check_key_segments(&[
            ("partner_id", partner_id),
            ("domain", domain),
            ("event_name", event_name),
            ("version", version),
        ])?;
        check_delivery_url(delivery_url)?;

        let key = SubscriptionKey::new(partner_id, domain, event_name, version);
        let mut subscription = Subscription::new(&key, delivery_url)
            .with_status(request.status.unwrap_or_default());
        subscription.auth = request.auth.unwrap_or_default();
        self.store.put_subscription(&subscription).await?;

        let topic = egress_topic(&self.config, partner_id, event_name);
        tracing::info!(
            target: "admin",
            subscription_id = %subscription.id,
            topic = %topic,
            "Ensuring topic"
        );

        Ok(SubscriptionRegistered {
            subscription_id: subscription.id,
            topic,
        })
    }
}

/// Returns the values of required string fields, or every missing name at once.
fn required<'a, const N: usize>(
    fields: [(&'static str, &'a Option<String>); N],
) -> ApiResult<[&'a str; N]> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
        .map(|(name, _)| *name)
        .collect();

    if !missing.is_empty() {
        return Err(ApiError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    Ok(fields.map(|(_, value)| value.as_deref().unwrap_or_default()))
}

fn check_key_segments(segments: &[(&str, &str)]) -> ApiResult<()> {
    for (name, value) in segments {
        if value.contains(KEY_SEPARATOR) {
            return Err(ApiError::Validation(format!(
                "Field {name} must not contain '{KEY_SEPARATOR}'"
            )));
        }
    }
    Ok(())
}

fn check_delivery_url(raw: &str) -> ApiResult<()> {
    let url = Url::parse(raw)
        .map_err(|e| ApiError::Validation(format!("Invalid delivery_url: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ApiError::Validation(format!(
            "Invalid delivery_url: {raw} is not an absolute http(s) URL"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventgate_adapter_memory::MemoryStore;

    fn service() -> (AdminService, MemoryStore) {
        let store = MemoryStore::new();
        (
            AdminService::new(AppConfig::default(), Arc::new(store.clone())),
            store,
        )
    }

    fn schema_request() -> SchemaRegistration {
        SchemaRegistration {
            domain: Some("demo".into()),
            event_name: Some("CustomerUpdated".into()),
            version: Some("v1".into()),
            schema: Some(r#"{"type": "object"}"#.into()),
            ..Default::default()
        }
    }

    fn subscription_request() -> SubscriptionRegistration {
        SubscriptionRegistration {
            partner_id: Some("p1".into()),
            domain: Some("d".into()),
            event_name: Some("ev".into()),
            version: Some("v1".into()),
            delivery_url: Some("https://p1.example.com/hook".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_schema() {
        let (admin, store) = service();

        let registered = admin.register_schema(schema_request()).await.unwrap();
        assert_eq!(registered.schema_id, "demo#CustomerUpdated#v1");
        assert_eq!(registered.topic, "wh.ingress.demo.CustomerUpdated.v1");

        let record = store.fetch_schema("demo#CustomerUpdated#v1").await.unwrap().unwrap();
        assert_eq!(record.status, DEFAULT_SCHEMA_STATUS);
        assert!(!record.contains_sensitive);
    }

    #[tokio::test]
    async fn test_register_schema_rejects_bad_input() {
        let (admin, _) = service();

        let err = admin
            .register_schema(SchemaRegistration {
                schema: None,
                version: None,
                ..schema_request()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: version, schema");

        let err = admin
            .register_schema(SchemaRegistration {
                schema: Some(r#"{"type": "widget"}"#.into()),
                ..schema_request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(m) if m.starts_with("Invalid JSON Schema")));

        for schema in [r#"{"pattern": 5}"#, r#"{"required": ["a", "a"]}"#, r#"{"$ref": 1}"#] {
            let err = admin
                .register_schema(SchemaRegistration {
                    schema: Some(schema.into()),
                    ..schema_request()
                })
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)), "{schema}");
        }

        let err = admin
            .register_schema(SchemaRegistration {
                domain: Some("de#mo".into()),
                ..schema_request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_register_subscription() {
        let (admin, store) = service();
        let request = SubscriptionRegistration {
            auth: Some(SubscriptionAuth {
                secret: Some("whsec".into()),
            }),
            ..subscription_request()
        };

        let registered = admin.register_subscription(request).await.unwrap();
        assert_eq!(registered.subscription_id, "p1#d#ev#v1");
        assert_eq!(registered.topic, "wh.egress.p1.ev");

        let stored = store.fetch_subscription("p1#d#ev#v1").await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Pending);
        assert_eq!(stored.signing_secret(), Some("whsec"));
        assert_eq!(stored.partner_id(), "p1");
    }

    #[tokio::test]
    async fn test_register_subscription_rejects_bad_urls() {
        let (admin, _) = service();

        for url in ["not a url", "ftp://p1.example.com/hook", "/relative/hook"] {
            let err = admin
                .register_subscription(SubscriptionRegistration {
                    delivery_url: Some(url.into()),
                    ..subscription_request()
                })
                .await
                .unwrap_err();
            assert!(
                matches!(&err, ApiError::Validation(m) if m.starts_with("Invalid delivery_url")),
                "{url}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_internal() {
        let (admin, store) = service();
        store.fail_with(Some("offline".into())).await;

        let err = admin.register_subscription(subscription_request()).await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
