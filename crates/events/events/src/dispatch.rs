//! Dispatch step: egress stream → partner HTTP endpoint.
//!
//! Delivery is at-least-once. An idempotency marker written after a
//! successful POST suppresses redeliveries of the same key until it expires;
//! the check and the write are separate store calls, so two concurrent
//! copies of one event can both be delivered.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use eventgate_core::{AppConfig, DeliveryStatus, DeliveryStatusUpdate, DurableStore};
use eventgate_webhooks::{ExponentialBackoff, RetryStrategy, SignedDeliveryClient};

use crate::batch::{BatchResponse, StreamBatch, StreamRecord};
use crate::envelope::EventEnvelope;
use crate::error::{PipelineError, PipelineResult};

/// Header carrying the event name.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Header carrying the event id.
pub const EVENT_ID_HEADER: &str = "X-Webhook-EventId";

/// What happened to a record that does not need redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The partner endpoint accepted the event.
    Delivered {
        /// HTTP status returned by the endpoint.
        status: u16,
        /// Attempt counter recorded on the status record.
        attempts: u32,
    },
    /// A live idempotency marker exists; nothing was sent.
    Duplicate,
    /// The record can never be delivered and was dropped.
    Rejected {
        /// Why the record was dropped.
        reason: String,
    },
    /// Delivery failed too many times; the event is now `FAILED`.
    DeadLettered {
        /// Attempt counter recorded on the status record.
        attempts: u32,
    },
    /// The event already reached a terminal status; it was left untouched.
    Settled {
        /// The stored terminal status.
        status: DeliveryStatus,
    },
}

/// Delivers egress envelopes to partner endpoints.
pub struct DispatchStep<R: RetryStrategy = ExponentialBackoff> {
    config: AppConfig,
    store: Arc<dyn DurableStore>,
    client: SignedDeliveryClient<R>,
}

impl DispatchStep<ExponentialBackoff> {
    /// Creates a dispatch step whose HTTP client follows the backoff and
    /// timeout settings of `config`.
    pub fn from_config(config: AppConfig, store: Arc<dyn DurableStore>) -> PipelineResult<Self> {
        let retry = ExponentialBackoff::new()
            .base(config.backoff_base())
            .max_attempts(config.delivery_max_attempts)
            .jitter(config.backoff_jitter);
        let client = SignedDeliveryClient::new(retry, config.request_timeout())?;

        Ok(Self::new(config, store, client))
    }
}

impl<R: RetryStrategy> DispatchStep<R> {
    /// Creates a dispatch step with a custom delivery client.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn DurableStore>,
        client: SignedDeliveryClient<R>,
    ) -> Self {
        Self {
            config,
            store,
            client,
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Processes a batch record by record.
    ///
    /// Records whose delivery may succeed later are listed in
    /// `batchItemFailures`. Duplicates, rejected records and dead letters
    /// are consumed.
    pub async fn process_batch(&self, batch: &StreamBatch) -> BatchResponse {
        let mut response = BatchResponse::new();

        for record in batch.iter() {
            match self.process_record(record).await {
                Ok(outcome) => {
                    let metrics = response.metrics_mut();
                    match outcome {
                        DispatchOutcome::Delivered { .. } => metrics.processed += 1,
                        DispatchOutcome::Duplicate | DispatchOutcome::Settled { .. } => {
                            metrics.duplicates += 1
                        }
                        DispatchOutcome::Rejected { .. } => metrics.rejected += 1,
                        DispatchOutcome::DeadLettered { .. } => metrics.dead_lettered += 1,
                    }
                }
                Err((record_id, err)) if !err.is_retryable() => {
                    tracing::warn!(
                        target: "dispatch",
                        record_id = %record_id,
                        kind = err.kind(),
                        error = %err,
                        "Dropping record that can never be delivered"
                    );
                    response.metrics_mut().rejected += 1;
                }
                Err((record_id, err)) => {
                    tracing::error!(
                        target: "dispatch",
                        record_id = %record_id,
                        kind = err.kind(),
                        error = %err,
                        "Failed to dispatch record"
                    );
                    response.fail(record_id);
                }
            }
        }

        let metrics = response.metrics_mut();
        tracing::info!(
            target: "dispatch",
            records = batch.len(),
            processed = metrics.processed,
            failed = metrics.failed,
            duplicates = metrics.duplicates,
            rejected = metrics.rejected,
            dead_lettered = metrics.dead_lettered,
            "Dispatch batch complete"
        );
        response
    }

    async fn process_record(
        &self,
        record: &StreamRecord,
    ) -> Result<DispatchOutcome, (String, PipelineError)> {
        let envelope = EventEnvelope::decode(record.value.as_deref())
            .map_err(|e| (record.identifier(None), e))?;
        let record_id = record.identifier(envelope.event_id());

        self.dispatch(&envelope).await.map_err(|e| (record_id, e))
    }

    /// Delivers a decoded envelope and records the result.
    ///
    /// Returns an error only when redelivering the envelope may succeed.
    pub async fn dispatch(&self, envelope: &EventEnvelope) -> PipelineResult<DispatchOutcome> {
        let Some(event_id) = envelope.event_id() else {
            return self.reject(envelope, "event_id missing").await;
        };
        let Some(subscription_id) = envelope.subscription_id() else {
            return self.reject(envelope, "subscription_id missing").await;
        };

        let subscription = self
            .store
            .fetch_subscription(subscription_id)
            .await?
            .ok_or_else(|| {
                PipelineError::NotFound(format!("Subscription {subscription_id} not found"))
            })?;

        let idempotency_key = envelope.effective_idempotency_key().unwrap_or(event_id);
        if self.store.check_idempotency(idempotency_key).await? {
            tracing::info!(
                target: "dispatch",
                event_id,
                idempotency_key,
                "Skipping already delivered event"
            );
            return Ok(DispatchOutcome::Duplicate);
        }

        let stored = self.store.fetch_delivery_status(event_id).await?;
        if let Some(record) = stored.as_ref().filter(|r| r.status.is_terminal()) {
            tracing::info!(
                target: "dispatch",
                event_id,
                status = %record.status,
                "Skipping settled event"
            );
            return Ok(DispatchOutcome::Settled {
                status: record.status,
            });
        }
        let stored_attempts = stored.map_or(0, |record| record.attempts);
        let current_attempt = envelope.current_attempt().max(stored_attempts);

        let headers = HashMap::from([
            (EVENT_HEADER.to_string(), envelope.event_name_or_unknown().to_string()),
            (EVENT_ID_HEADER.to_string(), event_id.to_string()),
        ]);

        tracing::debug!(
            target: "dispatch",
            event_id,
            subscription_id,
            url = %subscription.delivery_url,
            attempt = current_attempt,
            "Delivering event"
        );

        let delivery = self
            .client
            .deliver(
                &subscription.delivery_url,
                &envelope.data,
                &headers,
                subscription.signing_secret(),
            )
            .await;

        match delivery {
            Ok(receipt) => {
                let now = Utc::now();
                self.store
                    .update_delivery_status(
                        event_id,
                        DeliveryStatus::Success,
                        DeliveryStatusUpdate::new()
                            .attempts(current_attempt)
                            .delivered_at(now),
                    )
                    .await?;
                self.store
                    .put_idempotency_marker(idempotency_key, self.marker_expiry(now))
                    .await?;

                tracing::info!(
                    target: "dispatch",
                    event_id,
                    subscription_id,
                    status = receipt.status,
                    "Event delivered"
                );
                Ok(DispatchOutcome::Delivered {
                    status: receipt.status,
                    attempts: current_attempt,
                })
            }
            Err(err) => {
                let attempts = current_attempt.saturating_add(1);
                let update = DeliveryStatusUpdate::new()
                    .last_error(err.to_string())
                    .attempts(attempts);

                if self.is_dead_letter(attempts) {
                    if let Some(status) = self
                        .record_failure(event_id, DeliveryStatus::Failed, update)
                        .await?
                    {
                        return Ok(DispatchOutcome::Settled { status });
                    }
                    tracing::error!(
                        target: "dispatch",
                        event_id,
                        subscription_id,
                        attempts,
                        error = %err,
                        "Giving up on event"
                    );
                    return Ok(DispatchOutcome::DeadLettered { attempts });
                }

                match self
                    .record_failure(event_id, DeliveryStatus::Retry, update)
                    .await
                {
                    Ok(Some(status)) => return Ok(DispatchOutcome::Settled { status }),
                    Ok(None) => {}
                    Err(store_err) => {
                        tracing::error!(
                            target: "dispatch",
                            event_id,
                            error = %store_err,
                            "Failed to record delivery failure"
                        );
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Writes a `RETRY` or `FAILED` status unless another copy of the event
    /// already settled it. Returns the stored terminal status when the write
    /// was skipped.
    async fn record_failure(
        &self,
        event_id: &str,
        status: DeliveryStatus,
        update: DeliveryStatusUpdate,
    ) -> PipelineResult<Option<DeliveryStatus>> {
        if let Some(record) = self.store.fetch_delivery_status(event_id).await? {
            if record.status.is_terminal() {
                tracing::info!(
                    target: "dispatch",
                    event_id,
                    stored = %record.status,
                    skipped = %status,
                    "Keeping settled delivery status"
                );
                return Ok(Some(record.status));
            }
        }

        self.store
            .update_delivery_status(event_id, status, update)
            .await?;
        Ok(None)
    }

    /// Drops an envelope that can never be delivered, marking its event
    /// `FAILED` when the event id is known and the event is not settled.
    async fn reject(
        &self,
        envelope: &EventEnvelope,
        reason: &str,
    ) -> PipelineResult<DispatchOutcome> {
        tracing::warn!(
            target: "dispatch",
            event_id = envelope.event_id().unwrap_or_default(),
            reason,
            "Rejecting envelope"
        );

        if let Some(event_id) = envelope.event_id() {
            self.record_failure(
                event_id,
                DeliveryStatus::Failed,
                DeliveryStatusUpdate::new().last_error(reason),
            )
            .await?;
        }

        Ok(DispatchOutcome::Rejected {
            reason: reason.to_string(),
        })
    }

    fn is_dead_letter(&self, attempts: u32) -> bool {
        let threshold = self.config.dead_letter_after_attempts;
        threshold > 0 && attempts > threshold
    }

    fn marker_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.config.idempotency_ttl())
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
