//! HTTP routes.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use eventgate_events::{BatchResponse, DispatchStep, IngestionStep, StreamBatch};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::admin::{
    AdminService, SchemaRegistered, SchemaRegistration, SubscriptionRegistered,
    SubscriptionRegistration,
};
use crate::error::{ApiError, ApiResult};
use crate::intake::{
    EventAccepted, EventSubmission, IntakeService, DOMAIN_HEADER, EVENT_ID_HEADER,
    IDEMPOTENCY_KEY_HEADER, SUBSCRIPTION_HEADER, VERSION_HEADER,
};

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub admin: Arc<AdminService>,
    pub intake: Arc<IntakeService>,
    pub ingestion: Arc<IngestionStep>,
    pub dispatch: Arc<DispatchStep>,
}

/// Creates the router with the admin, event, batch and health routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/admin/schemas", post(register_schema))
        .route("/admin/subscriptions", post(register_subscription))
        .route("/events/{event_name}", post(publish_event))
        .route("/batches/ingest", post(ingest_batch))
        .route("/batches/dispatch", post(dispatch_batch))
        .route("/health", get(health))
        .with_state(state)
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    if body.is_empty() {
        return Err(ApiError::Validation("Missing body".into()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("Invalid request body: {e}")))
}

async fn register_schema(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SchemaRegistered>)> {
    let request: SchemaRegistration = parse_body(&body)?;
    let registered = state.admin.register_schema(request).await.inspect_err(|e| {
        tracing::error!(target: "admin", error = %e, "Schema registration failed");
    })?;
    Ok((StatusCode::CREATED, Json(registered)))
}

async fn register_subscription(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SubscriptionRegistered>)> {
    let request: SubscriptionRegistration = parse_body(&body)?;
    let registered = state
        .admin
        .register_subscription(request)
        .await
        .inspect_err(|e| {
            tracing::error!(target: "admin", error = %e, "Subscription registration failed");
        })?;
    Ok((StatusCode::CREATED, Json(registered)))
}

async fn publish_event(
    State(state): State<AppState>,
    Path(event_name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<EventAccepted>)> {
    let payload = if body.is_empty() {
        None
    } else {
        Some(
            serde_json::from_slice(&body)
                .map_err(|e| ApiError::Validation(format!("Invalid request body: {e}")))?,
        )
    };

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let submission = EventSubmission {
        event_name,
        domain: header(DOMAIN_HEADER),
        version: header(VERSION_HEADER),
        event_id: header(EVENT_ID_HEADER),
        idempotency_key: header(IDEMPOTENCY_KEY_HEADER),
        subscription_id: header(SUBSCRIPTION_HEADER),
        payload,
    };

    let accepted = state.intake.publish_event(submission).await.inspect_err(|e| {
        tracing::warn!(target: "intake", error = %e, "Event rejected");
    })?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn ingest_batch(
    State(state): State<AppState>,
    Json(batch): Json<StreamBatch>,
) -> Json<BatchResponse> {
    let span = tracing::info_span!("batch", step = "ingest", batch_id = %Uuid::new_v4());
    Json(state.ingestion.process_batch(&batch).instrument(span).await)
}

async fn dispatch_batch(
    State(state): State<AppState>,
    Json(batch): Json<StreamBatch>,
) -> Json<BatchResponse> {
    let span = tracing::info_span!("batch", step = "dispatch", batch_id = %Uuid::new_v4());
    Json(state.dispatch.process_batch(&batch).instrument(span).await)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
