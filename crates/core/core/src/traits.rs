//! Core traits for Eventgate.
//!
//! `DurableStore` is the gateway the pipeline steps use for every persisted
//! record. Adapters implement it over a concrete key-value store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::types::{
    DeliveryStatus, DeliveryStatusRecord, DeliveryStatusUpdate, SchemaRecord, Subscription,
};

/// Typed access to the subscription, delivery status, idempotency and
/// schema tables.
///
/// Writes have overwrite semantics, so repeating one is harmless. Adapters
/// must tolerate concurrent calls from independent workers and must not
/// retry failed operations on their own.
#[async_trait]
pub trait DurableStore: Send + Sync {
    // ==================== Subscription Operations ====================

    /// Saves a subscription, replacing any record with the same id.
    async fn put_subscription(&self, subscription: &Subscription) -> StoreResult<()>;

    /// Gets a subscription by composite id.
    async fn fetch_subscription(&self, id: &str) -> StoreResult<Option<Subscription>>;

    // ==================== Schema Operations ====================

    /// Saves a schema record, replacing any record with the same id.
    async fn put_schema(&self, schema: &SchemaRecord) -> StoreResult<()>;

    /// Gets a schema record by composite id.
    async fn fetch_schema(&self, id: &str) -> StoreResult<Option<SchemaRecord>>;

    // ==================== Delivery Status Operations ====================

    /// Sets the status of an event and merges `update` into its record.
    ///
    /// Creates the record when it does not exist yet.
    async fn update_delivery_status(
        &self,
        event_id: &str,
        status: DeliveryStatus,
        update: DeliveryStatusUpdate,
    ) -> StoreResult<()>;

    /// Gets the status record of an event.
    async fn fetch_delivery_status(
        &self,
        event_id: &str,
    ) -> StoreResult<Option<DeliveryStatusRecord>>;

    // ==================== Idempotency Operations ====================

    /// Returns true when a non-expired marker exists for `key`.
    async fn check_idempotency(&self, key: &str) -> StoreResult<bool>;

    /// Writes a marker for `key` that stays in force until `expires_at`.
    async fn put_idempotency_marker(&self, key: &str, expires_at: DateTime<Utc>)
        -> StoreResult<()>;
}
