//! HTTP API server for the order lifecycle.
//!
//! Exposes order commands and queries as REST endpoints, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod publisher;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use common::UuidIdGenerator;
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use orderbook::{Observer, Order, OrderEvent, OrderService, Repository, RepositoryConfig};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/_status/liveness", get(routes::health::check))
        .route("/_status/readiness", get(routes::health::readiness::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/events", get(routes::orders::events::<S>))
        .route("/orders/{id}/{action}", post(routes::orders::transition::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the application state: an order service over `event_store` with
/// random UUID order ids and the given observers.
pub fn create_state<S: EventStore + 'static>(
    event_store: S,
    config: RepositoryConfig,
    observers: impl IntoIterator<Item = Arc<dyn Observer>>,
) -> Arc<AppState<S>> {
    let repository = observers.into_iter().fold(
        Repository::<S, Order>::new(event_store, OrderEvent::registry()).with_config(config),
        |repository, observer| repository.with_shared_observer(observer),
    );

    Arc::new(AppState {
        order_service: OrderService::new(repository, Arc::new(UuidIdGenerator)),
    })
}
