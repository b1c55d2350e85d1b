//! # Eventgate Server
//!
//! Service host for the webhook pipeline. Exposes the admin operations,
//! producer event intake and the ingestion and dispatch steps over HTTP so
//! the pipeline can run without a stream framework in front of it.

mod admin;
mod config;
mod error;
mod intake;
mod routes;
mod schema;

pub use admin::{
    AdminService, SchemaRegistered, SchemaRegistration, SubscriptionRegistered,
    SubscriptionRegistration, DEFAULT_SCHEMA_STATUS,
};
pub use config::{load_config, parse_config, ConfigError, LogFormat, ServerConfig};
pub use error::{ApiError, ApiResult, ServerError};
pub use intake::{
    EventAccepted, EventSubmission, IntakeService, DOMAIN_HEADER, EVENT_ID_HEADER,
    IDEMPOTENCY_KEY_HEADER, SUBSCRIPTION_HEADER, VERSION_HEADER,
};
pub use routes::{router, AppState};
pub use schema::EventSchema;

use axum::Router;
use eventgate_core::DurableStore;
use eventgate_events::{DispatchStep, EgressPublisher, IngestionStep, LoggingPublisher};
use std::sync::Arc;

/// The pipeline service host.
pub struct EventgateServer {
    /// Server configuration.
    pub config: ServerConfig,
    state: AppState,
}

impl EventgateServer {
    /// Creates a server whose intake and ingestion only log published events.
    pub fn new(config: ServerConfig, store: Arc<dyn DurableStore>) -> Result<Self, ServerError> {
        Self::with_publisher(config, store, Arc::new(LoggingPublisher))
    }

    /// Creates a server with a custom egress publisher.
    pub fn with_publisher(
        config: ServerConfig,
        store: Arc<dyn DurableStore>,
        publisher: Arc<dyn EgressPublisher>,
    ) -> Result<Self, ServerError> {
        let pipeline = config.pipeline.clone();
        let state = AppState {
            admin: Arc::new(AdminService::new(pipeline.clone(), store.clone())),
            intake: Arc::new(IntakeService::new(
                pipeline.clone(),
                store.clone(),
                publisher.clone(),
            )),
            ingestion: Arc::new(IngestionStep::with_publisher(
                pipeline.clone(),
                store.clone(),
                publisher,
            )),
            dispatch: Arc::new(DispatchStep::from_config(pipeline, store)?),
        };

        Ok(Self { config, state })
    }

    /// Builds the HTTP router.
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Binds the configured address and serves until Ctrl-C.
    pub async fn run(&self) -> Result<(), ServerError> {
        let address = self.config.bind_address();
        let listener = tokio::net::TcpListener::bind(&address).await?;

        tracing::info!(
            address = %address,
            ingress_prefix = %self.config.pipeline.ingress_topic_prefix,
            egress_prefix = %self.config.pipeline.egress_topic_prefix,
            "Starting Eventgate server"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
