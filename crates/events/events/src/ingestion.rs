//! Ingestion step: raw stream → per-partner egress stream.

use std::sync::Arc;

use eventgate_core::{egress_topic, AppConfig, DurableStore};

use crate::batch::{BatchResponse, StreamBatch, StreamRecord};
use crate::envelope::EventEnvelope;
use crate::error::{PipelineError, PipelineResult};
use crate::publisher::{EgressPublisher, LoggingPublisher};

/// Where an ingested event was forwarded.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedEvent {
    /// Egress topic the envelope was published to.
    pub topic: String,
    /// Partner owning the subscription.
    pub partner_id: String,
    /// Envelope as published.
    pub envelope: EventEnvelope,
}

/// Consumes raw stream batches, resolves each event's subscription and
/// forwards it to the partner's egress topic.
pub struct IngestionStep {
    config: AppConfig,
    store: Arc<dyn DurableStore>,
    publisher: Arc<dyn EgressPublisher>,
}

impl IngestionStep {
    /// Creates an ingestion step that logs instead of producing.
    pub fn new(config: AppConfig, store: Arc<dyn DurableStore>) -> Self {
        Self::with_publisher(config, store, Arc::new(LoggingPublisher))
    }

    /// Creates an ingestion step with a custom publisher.
    pub fn with_publisher(
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

    /// Gets the configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Processes a batch record by record.
    ///
    /// A failing record never stops the batch; its identifier is listed in
    /// `batchItemFailures` and the next record is processed.
    pub async fn process_batch(&self, batch: &StreamBatch) -> BatchResponse {
        let mut response = BatchResponse::new();

        for record in batch.iter() {
            match self.process_record(record).await {
                Ok(forwarded) => {
                    tracing::debug!(
                        target: "ingestion",
                        event_id = forwarded.envelope.event_id().unwrap_or_default(),
                        topic = %forwarded.topic,
                        "Record forwarded"
                    );
                    response.metrics_mut().processed += 1;
                }
                Err((record_id, err)) => {
                    tracing::error!(
                        target: "ingestion",
                        record_id = %record_id,
                        kind = err.kind(),
                        error = %err,
                        "Failed to process record"
                    );
                    response.fail(record_id);
                }
            }
        }

        let metrics = response.metrics_mut();
        tracing::info!(
            target: "ingestion",
            records = batch.len(),
            processed = metrics.processed,
            failed = metrics.failed,
            "Ingestion batch complete"
        );
        response
    }

    /// Processes one record, returning the failure identifier with any error.
    async fn process_record(
        &self,
        record: &StreamRecord,
    ) -> Result<ForwardedEvent, (String, PipelineError)> {
        let envelope = EventEnvelope::decode(record.value.as_deref())
            .map_err(|e| (record.identifier(None), e))?;
        let record_id = record.identifier(envelope.event_id());

        self.forward(envelope).await.map_err(|e| (record_id, e))
    }

    /// Resolves the subscription of an envelope and publishes it.
    pub async fn forward(&self, envelope: EventEnvelope) -> PipelineResult<ForwardedEvent> {
        let subscription_id = envelope
            .subscription_id()
            .ok_or_else(|| PipelineError::Validation("subscription_id missing".into()))?;

        let subscription = self
            .store
            .fetch_subscription(subscription_id)
            .await?
            .ok_or_else(|| {
                PipelineError::NotFound(format!("Subscription {subscription_id} not found"))
            })?;

        let partner_id = subscription.partner_id().to_string();
        let topic = egress_topic(&self.config, &partner_id, envelope.event_name_or_unknown());

        tracing::info!(
            target: "ingestion",
            event_id = envelope.event_id().unwrap_or_default(),
            subscription_id,
            topic = %topic,
            "Publishing event to partner topic"
        );
        self.publisher.publish(&topic, &envelope).await?;

        Ok(ForwardedEvent {
            topic,
            partner_id,
            envelope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::MemoryPublisher;
    use eventgate_adapter_memory::MemoryStore;
    use eventgate_core::{Subscription, SubscriptionKey};

    async fn setup() -> (IngestionStep, MemoryStore, MemoryPublisher) {
        let store = MemoryStore::new();
        let key = SubscriptionKey::new("p1", "d", "ev", "v1");
        store
            .put_subscription(&Subscription::new(&key, "https://p1.example.com/hook"))
            .await
            .unwrap();

        let publisher = MemoryPublisher::new();
        let step = IngestionStep::with_publisher(
            AppConfig::default(),
            Arc::new(store.clone()),
            Arc::new(publisher.clone()),
        );
        (step, store, publisher)
    }

    fn record(id: &str, envelope: &EventEnvelope) -> StreamRecord {
        StreamRecord::new(id, envelope.encode().unwrap())
    }

    #[tokio::test]
    async fn test_forward_resolves_partner_topic() {
        let (step, _, publisher) = setup().await;
        let envelope = EventEnvelope::new("e1", "p1#d#ev#v1", "ev", serde_json::json!({"x": 1}));

        let forwarded = step.forward(envelope.clone()).await.unwrap();
        assert_eq!(forwarded.topic, "wh.egress.p1.ev");
        assert_eq!(forwarded.partner_id, "p1");

        let messages = publisher.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].envelope, envelope);
    }

    #[tokio::test]
    async fn test_missing_subscription_id_is_validation_error() {
        let (step, _, _) = setup().await;
        let mut envelope = EventEnvelope::new("e1", "", "ev", serde_json::Value::Null);
        envelope.subscription_id = None;

        let err = step.forward(envelope).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_subscription_is_not_found() {
        let (step, _, _) = setup().await;
        let envelope = EventEnvelope::new("e1", "p9#d#ev#v1", "ev", serde_json::Value::Null);

        let err = step.forward(envelope).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_partial_batch_isolation() {
        let (step, _, publisher) = setup().await;
        let valid = |id: &str| EventEnvelope::new(id, "p1#d#ev#v1", "ev", serde_json::json!({}));

        let batch = StreamBatch::new()
            .with_record("part-0", record("r1", &valid("e1")))
            .with_record("part-0", StreamRecord::new("r2", "!!not-base64!!"))
            .with_record("part-0", record("r3", &valid("e3")))
            .with_record("part-1", record("r4", &valid("e4")));

        let response = step.process_batch(&batch).await;

        assert_eq!(response.failed_identifiers(), vec!["r2"]);
        let metrics = response.metrics.unwrap();
        assert_eq!(metrics.processed, 3);
        assert_eq!(metrics.failed, 1);
        assert_eq!(publisher.len().await, 3);
    }

    #[tokio::test]
    async fn test_every_failure_kind_is_listed() {
        let (step, _, publisher) = setup().await;
        let mut no_sub = EventEnvelope::new("e2", "", "ev", serde_json::Value::Null);
        no_sub.subscription_id = None;

        let batch = StreamBatch::new()
            .with_record("p", StreamRecord { sequence_number: Some(7.into()), ..Default::default() })
            .with_record("p", record("r2", &no_sub))
            .with_record(
                "p",
                record("r3", &EventEnvelope::new("e3", "p9#d#ev#v1", "ev", serde_json::Value::Null)),
            );

        let response = step.process_batch(&batch).await;
        assert_eq!(response.failed_identifiers(), vec!["7", "r2", "r3"]);
        assert_eq!(response.metrics.unwrap().processed, 0);
        assert!(publisher.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_and_publisher_outages_fail_records() {
        let (step, store, publisher) = setup().await;
        let envelope = EventEnvelope::new("e1", "p1#d#ev#v1", "ev", serde_json::Value::Null);
        let batch = StreamBatch::new().with_record("p", record("r1", &envelope));

        publisher.fail_with(Some("broker down".into())).await;
        assert_eq!(step.process_batch(&batch).await.failed_identifiers(), vec!["r1"]);

        publisher.fail_with(None).await;
        store.fail_with(Some("offline".into())).await;
        assert_eq!(step.process_batch(&batch).await.failed_identifiers(), vec!["r1"]);

        store.fail_with(None).await;
        assert!(step.process_batch(&batch).await.batch_item_failures.is_empty());
    }
}
