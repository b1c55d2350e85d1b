//! # Eventgate Core
//!
//! This crate provides the foundational types and traits for Eventgate.
//! It defines the persisted records (`Subscription`, `SchemaRecord`,
//! `DeliveryStatusRecord`, `IdempotencyMarker`), the `DurableStore` gateway
//! trait that storage adapters implement, the pipeline configuration and
//! topic naming helpers.

pub mod config;
pub mod error;
pub mod topics;
pub mod traits;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::{AppConfig, DEFAULT_IDEMPOTENCY_TTL_SECS};
pub use error::{StoreError, StoreResult};
pub use topics::{egress_topic, ingress_topic};
pub use traits::DurableStore;
pub use types::{
    DeliveryStatus, DeliveryStatusRecord, DeliveryStatusUpdate, IdempotencyMarker, SchemaKey,
    SchemaRecord, Subscription, SubscriptionAuth, SubscriptionKey, SubscriptionStatus,
    KEY_SEPARATOR,
};
