//! Health and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::AggregateId;
use event_store::{EventStore, EventStoreExt};
use serde::Serialize;

use super::orders::AppState;

/// Stream id looked up by the readiness check; never written to.
const READINESS_CHECK_ID: &str = "_readiness_check";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResponse {
    fn ok() -> Self {
        Self {
            status: "ok",
            error: None,
        }
    }
}

/// GET /health and GET /_status/liveness: the process is up.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// GET /_status/readiness: the event store answers within the store timeout.
pub async fn readiness<S: EventStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    let repository = state.order_service.repository();
    let check_id = AggregateId::new(READINESS_CHECK_ID);

    let result = tokio::time::timeout(
        repository.config().store_timeout,
        repository.store().aggregate_exists(&check_id),
    )
    .await;

    let error = match result {
        Ok(Ok(_)) => return (StatusCode::OK, Json(HealthResponse::ok())),
        Ok(Err(err)) => err.to_string(),
        Err(_) => "event store did not answer in time".to_string(),
    };

    tracing::warn!(%error, "readiness check failed");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(HealthResponse {
            status: "unavailable",
            error: Some(error),
        }),
    )
}
