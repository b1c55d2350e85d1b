//! # Eventgate Memory Adapter
//!
//! An in-memory `DurableStore` for Eventgate, intended for tests and for
//! running the whole pipeline inside a single process.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use eventgate_adapter_memory::MemoryStore;
//!
//! let store = std::sync::Arc::new(MemoryStore::from_config(&config));
//! let dispatch = DispatchStep::new(config, store.clone(), client);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventgate_core::config::AppConfig;
use eventgate_core::error::{StoreError, StoreResult};
use eventgate_core::traits::DurableStore;
use eventgate_core::types::{
    DeliveryStatus, DeliveryStatusRecord, DeliveryStatusUpdate, IdempotencyMarker, SchemaRecord,
    Subscription,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage for a single table.
type Table<T> = Arc<RwLock<HashMap<String, T>>>;

/// Configured names of the four logical tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub subscriptions: String,
    pub schemas: String,
    pub delivery_status: String,
    pub idempotency: String,
}

impl TableNames {
    /// Takes the table names from the pipeline configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            subscriptions: config.subscription_table.clone(),
            schemas: config.event_schema_table.clone(),
            delivery_status: config.delivery_status_table.clone(),
            idempotency: config.idempotency_table.clone(),
        }
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// In-memory durable store.
///
/// Cloning shares the underlying tables, so clones handed to concurrent
/// workers see each other's writes. Data is lost when the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    names: TableNames,
    subscriptions: Table<Subscription>,
    schemas: Table<SchemaRecord>,
    delivery_status: Table<DeliveryStatusRecord>,
    idempotency: Table<IdempotencyMarker>,
    outage: Arc<RwLock<Option<String>>>,
}

impl MemoryStore {
    /// Creates an empty store with the default table names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store named after the configured tables.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            names: TableNames::from_config(config),
            ..Self::default()
        }
    }

    /// Gets the table names.
    pub fn table_names(&self) -> &TableNames {
        &self.names
    }

    /// Makes every subsequent operation fail with `StoreError::Unavailable`
    /// carrying `message`, or restores normal operation with `None`.
    pub async fn fail_with(&self, message: Option<String>) {
        *self.outage.write().await = message;
    }

    /// Returns the number of subscriptions stored.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Gets the raw idempotency marker for a key, expired or not.
    pub async fn marker(&self, key: &str) -> Option<IdempotencyMarker> {
        self.idempotency.read().await.get(key).cloned()
    }

    async fn ensure_available(&self, table: &str) -> StoreResult<()> {
        match self.outage.read().await.as_ref() {
            Some(message) => Err(StoreError::unavailable(format!("{table}: {message}"))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    // ==================== Subscription Operations ====================

    async fn put_subscription(&self, subscription: &Subscription) -> StoreResult<()> {
        self.ensure_available(&self.names.subscriptions).await?;
        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscription.id.clone(), subscription.clone());
        Ok(())
    }

    async fn fetch_subscription(&self, id: &str) -> StoreResult<Option<Subscription>> {
        self.ensure_available(&self.names.subscriptions).await?;
        let subscriptions = self.subscriptions.read().await;
        Ok(subscriptions.get(id).cloned())
    }

    // ==================== Schema Operations ====================

    async fn put_schema(&self, schema: &SchemaRecord) -> StoreResult<()> {
        self.ensure_available(&self.names.schemas).await?;
        let mut schemas = self.schemas.write().await;
        schemas.insert(schema.id.clone(), schema.clone());
        Ok(())
    }

    async fn fetch_schema(&self, id: &str) -> StoreResult<Option<SchemaRecord>> {
        self.ensure_available(&self.names.schemas).await?;
        let schemas = self.schemas.read().await;
        Ok(schemas.get(id).cloned())
    }

    // ==================== Delivery Status Operations ====================

    async fn update_delivery_status(
        &self,
        event_id: &str,
        status: DeliveryStatus,
        update: DeliveryStatusUpdate,
    ) -> StoreResult<()> {
        self.ensure_available(&self.names.delivery_status).await?;
        let mut records = self.delivery_status.write().await;
        records
            .entry(event_id.to_string())
            .or_insert_with(|| DeliveryStatusRecord::new(event_id, status))
            .apply(status, update);
        tracing::debug!(
            table = %self.names.delivery_status,
            event_id,
            status = %status,
            "Delivery status updated"
        );
        Ok(())
    }

    async fn fetch_delivery_status(
        &self,
        event_id: &str,
    ) -> StoreResult<Option<DeliveryStatusRecord>> {
        self.ensure_available(&self.names.delivery_status).await?;
        let records = self.delivery_status.read().await;
        Ok(records.get(event_id).cloned())
    }

    // ==================== Idempotency Operations ====================

    async fn check_idempotency(&self, key: &str) -> StoreResult<bool> {
        self.ensure_available(&self.names.idempotency).await?;
        let markers = self.idempotency.read().await;
        Ok(markers.get(key).is_some_and(|m| m.is_live(Utc::now())))
    }

    async fn put_idempotency_marker(
        &self,
        key: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.ensure_available(&self.names.idempotency).await?;
        let mut markers = self.idempotency.write().await;
        markers.insert(key.to_string(), IdempotencyMarker::new(key, expires_at));
        Ok(())
    }
}
