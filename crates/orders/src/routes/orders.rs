//! Order lifecycle endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::AggregateId;
use event_store::{EventEnvelope, EventStore, Version};
use orderbook::{
    Aggregate, CreateOrder, Order, OrderCommand, OrderService, OrderSide, OrderType, ProductId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub order_service: OrderService<S>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub size: Decimal,
    pub price: Decimal,
    #[serde(default)]
    pub order_type: OrderType,
    pub side: OrderSide,
    pub product_id: String,
}

impl From<CreateOrderRequest> for CreateOrder {
    fn from(req: CreateOrderRequest) -> Self {
        CreateOrder::new(
            req.size,
            req.price,
            req.order_type,
            req.side,
            ProductId::new(req.product_id),
        )
    }
}

// -- Response types --

/// Identifier and version after a successful command.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub id: String,
    pub version: i64,
}

impl CommandResponse {
    fn new(id: &AggregateId, version: Version) -> Self {
        Self {
            id: id.to_string(),
            version: version.as_i64(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub version: i64,
    pub state: String,
    pub size: Decimal,
    pub price: Decimal,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub product_id: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl OrderResponse {
    fn new(id: &AggregateId, order: &Order) -> Self {
        Self {
            id: id.to_string(),
            version: order.version().as_i64(),
            state: order.state().to_string(),
            size: order.size(),
            price: order.price(),
            order_type: order.order_type(),
            side: order.side(),
            product_id: order.product_id().to_string(),
            created_at: order.created_at().map(|t| t.to_rfc3339()),
            updated_at: order.updated_at().map(|t| t.to_rfc3339()),
        }
    }
}

/// Response type for event envelope data.
#[derive(Debug, Serialize)]
pub struct EventEnvelopeResponse {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub version: i64,
    pub timestamp: String,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl From<EventEnvelope> for EventEnvelopeResponse {
    fn from(e: EventEnvelope) -> Self {
        Self {
            event_id: e.event_id.to_string(),
            event_type: e.event_type,
            aggregate_id: e.aggregate_id.to_string(),
            version: e.version.as_i64(),
            timestamp: e.timestamp.to_rfc3339(),
            payload: e.payload,
            metadata: e.metadata,
        }
    }
}

// -- Handlers --

/// POST /orders: create a new order under a generated id.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: EventStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let Json(req) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let id = state.order_service.create_order(req.into()).await?;

    // A create command always produces exactly the first event.
    Ok((
        StatusCode::CREATED,
        Json(CommandResponse::new(&id, Version::first())),
    ))
}

/// GET /orders/{id}: current state rebuilt from the order's events.
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id = parse_aggregate_id(&id)?;
    let order = state.order_service.get_order(&id).await?;
    Ok(Json(OrderResponse::new(&id, &order)))
}

/// POST /orders/{id}/{action}: run a lifecycle command such as `accept` or `settle`.
#[tracing::instrument(skip(state))]
pub async fn transition<S: EventStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, action)): Path<(String, String)>,
) -> Result<Json<CommandResponse>, ApiError> {
    let id = parse_aggregate_id(&id)?;
    let command = OrderCommand::parse_lifecycle(&action)?;

    let version = state.order_service.apply(&id, command).await?;
    Ok(Json(CommandResponse::new(&id, version)))
}

/// GET /orders/{id}/events: list all stored events for an order.
#[tracing::instrument(skip(state))]
pub async fn events<S: EventStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventEnvelopeResponse>>, ApiError> {
    let id = parse_aggregate_id(&id)?;
    let envelopes = state.order_service.order_events(&id).await?;
    Ok(Json(envelopes.into_iter().map(Into::into).collect()))
}

fn parse_aggregate_id(id: &str) -> Result<AggregateId, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::BadRequest("Order id must not be empty".to_string()));
    }
    Ok(AggregateId::new(id))
}
