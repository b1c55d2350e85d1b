//! Stream publishers.
//!
//! The ingestion step hands every resolved envelope to an
//! [`EgressPublisher`], and producer intake uses the same publisher for the
//! ingress topics. Producing to a real broker is a deployment concern;
//! the publishers here either log the intent or keep messages in memory.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::batch::{StreamBatch, StreamRecord};
use crate::envelope::EventEnvelope;
use crate::error::{PipelineError, PipelineResult};

/// Trait for producing envelopes to stream topics.
#[async_trait]
pub trait EgressPublisher: Send + Sync {
    /// Publishes an envelope to `topic`.
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> PipelineResult<()>;
}

/// Publisher that only logs what it would have produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPublisher;

#[async_trait]
impl EgressPublisher for LoggingPublisher {
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> PipelineResult<()> {
        tracing::info!(
            target: "egress",
            topic,
            event_id = envelope.event_id().unwrap_or_default(),
            subscription_id = envelope.subscription_id().unwrap_or_default(),
            "Publishing event"
        );
        Ok(())
    }
}

/// A message held by [`MemoryPublisher`].
#[derive(Debug, Clone, PartialEq)]
pub struct EgressMessage {
    /// Target topic.
    pub topic: String,
    /// Forwarded envelope.
    pub envelope: EventEnvelope,
}

/// Publisher that keeps messages in memory until drained.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    messages: Arc<RwLock<Vec<EgressMessage>>>,
    outage: Arc<RwLock<Option<String>>>,
    sequence: Arc<RwLock<u64>>,
}

impl MemoryPublisher {
    /// Creates an empty publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every publish fail with `message`, or restores normal operation.
    pub async fn fail_with(&self, message: Option<String>) {
        *self.outage.write().await = message;
    }

    /// Returns the pending messages.
    pub async fn messages(&self) -> Vec<EgressMessage> {
        self.messages.read().await.clone()
    }

    /// Returns the number of pending messages.
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Checks if no messages are pending.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Removes all pending messages and returns them as a stream batch with
    /// one partition per topic, ready for the dispatch step.
    pub async fn drain_batch(&self) -> PipelineResult<StreamBatch> {
        let drained: Vec<EgressMessage> = self.messages.write().await.drain(..).collect();
        let mut sequence = self.sequence.write().await;
        let mut batch = StreamBatch::new();

        for message in drained {
            *sequence += 1;
            let record_id = format!("{}-{}", message.topic, *sequence);
            let value = message.envelope.encode()?;
            batch.push(message.topic, StreamRecord::new(record_id, value));
        }

        Ok(batch)
    }
}

#[async_trait]
impl EgressPublisher for MemoryPublisher {
    async fn publish(&self, topic: &str, envelope: &EventEnvelope) -> PipelineResult<()> {
        if let Some(message) = self.outage.read().await.as_ref() {
            return Err(PipelineError::Publish(message.clone()));
        }

        self.messages.write().await.push(EgressMessage {
            topic: topic.to_string(),
            envelope: envelope.clone(),
        });
        Ok(())
    }
}
