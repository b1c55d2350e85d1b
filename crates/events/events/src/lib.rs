//! # Eventgate Events
//!
//! Stream pipeline steps for partner webhook delivery:
//! - Batch consumer contract with partial batch failures
//! - Base64 JSON event envelopes
//! - Ingestion step routing events to per-partner egress topics
//! - Dispatch step delivering signed webhooks with idempotency and retries
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use eventgate_adapter_memory::MemoryStore;
//! use eventgate_core::AppConfig;
//! use eventgate_events::{DispatchStep, IngestionStep, MemoryPublisher};
//!
//! let config = AppConfig::from_env();
//! let store = Arc::new(MemoryStore::new());
//! let publisher = Arc::new(MemoryPublisher::new());
//!
//! let ingestion = IngestionStep::with_publisher(config.clone(), store.clone(), publisher.clone());
//! let dispatch = DispatchStep::from_config(config, store)?;
//!
//! let ingested = ingestion.process_batch(&raw_batch).await;
//! let delivered = dispatch.process_batch(&publisher.drain_batch().await?).await;
//! ```

mod batch;
mod dispatch;
mod envelope;
mod error;
mod ingestion;
mod publisher;

pub use batch::{
    BatchItemFailure, BatchMetrics, BatchResponse, Partition, StreamBatch, StreamRecord,
    UNKNOWN_IDENTIFIER,
};
pub use dispatch::{DispatchOutcome, DispatchStep, EVENT_HEADER, EVENT_ID_HEADER};
pub use envelope::EventEnvelope;
pub use error::{PipelineError, PipelineResult};
pub use ingestion::{ForwardedEvent, IngestionStep};
pub use publisher::{EgressMessage, EgressPublisher, LoggingPublisher, MemoryPublisher};
