//! Integration tests for the API server.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::AggregateId;
use event_store::{
    EventEnvelope, EventStore, EventStoreError, InMemoryEventStore, Snapshot, Version,
};
use metrics_exporter_prometheus::PrometheusHandle;
use orderbook::{Observer, ObserverError, RepositoryConfig};
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> Router {
    setup_with_store(InMemoryEventStore::new(), Vec::new())
}

fn setup_with_store<S: EventStore + 'static>(
    store: S,
    observers: Vec<Arc<dyn Observer>>,
) -> Router {
    let state = orders::create_state(store, RepositoryConfig::default(), observers);
    orders::create_app(state, get_metrics_handle())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn get(uri: impl AsRef<str>) -> Request<Body> {
    Request::builder()
        .uri(uri.as_ref())
        .body(Body::empty())
        .unwrap()
}

fn post(uri: impl AsRef<str>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri.as_ref())
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn order_body() -> Value {
    json!({
        "size": "1.34",
        "price": "13.34",
        "order_type": "limit",
        "side": "sell",
        "product_id": "BTC-USD"
    })
}

async fn create_order(app: &Router) -> String {
    let (status, json) = send(app, post_json("/orders", order_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    for uri in ["/health", "/_status/liveness", "/_status/readiness"] {
        let (status, json) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(json["status"], "ok", "{uri}");
    }
}

#[tokio::test]
async fn test_create_order() {
    let app = setup();

    let (status, json) = send(&app, post_json("/orders", order_body())).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["version"], 1);
    assert!(!json["id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_and_get_order() {
    let app = setup();
    let id = create_order(&app).await;

    let (status, order) = send(&app, get(format!("/orders/{id}"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["id"], id.as_str());
    assert_eq!(order["version"], 1);
    assert_eq!(order["state"], "created");
    assert_eq!(order["size"], "1.34");
    assert_eq!(order["price"], "13.34");
    assert_eq!(order["order_type"], "limit");
    assert_eq!(order["side"], "sell");
    assert_eq!(order["product_id"], "BTC-USD");
    assert!(order["created_at"].is_string());
}

#[tokio::test]
async fn test_create_rejects_bad_input() {
    let app = setup();

    let mut zero_size = order_body();
    zero_size["size"] = json!("0");
    let (status, json) = send(&app, post_json("/orders", zero_size)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("size"));

    let mut blank_product = order_body();
    blank_product["product_id"] = json!("  ");
    let (status, _) = send(&app, post_json("/orders", blank_product)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(&app, post_json("/orders", json!({ "size": "1" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let malformed = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_full_lifecycle() {
    let app = setup();
    let id = create_order(&app).await;

    let steps = ["accept", "publish", "match", "confirm", "clear", "settle"];
    for (i, action) in steps.into_iter().enumerate() {
        let (status, json) = send(&app, post(format!("/orders/{id}/{action}"))).await;
        assert_eq!(status, StatusCode::OK, "{action}");
        assert_eq!(json["id"], id.as_str());
        assert_eq!(json["version"], i as i64 + 2, "{action}");
    }

    let (_, order) = send(&app, get(format!("/orders/{id}"))).await;
    assert_eq!(order["state"], "settled");
    assert_eq!(order["version"], 7);
}

#[tokio::test]
async fn test_invalid_transition_conflicts() {
    let app = setup();
    let id = create_order(&app).await;

    let (status, _) = send(&app, post(format!("/orders/{id}/accept"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, post(format!("/orders/{id}/cancel"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("cancel"));

    let (_, events) = send(&app, get(format!("/orders/{id}/events"))).await;
    assert_eq!(events.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_order() {
    let app = setup();

    let (status, _) = send(&app, get("/orders/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, post("/orders/missing/accept")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/orders/missing/events")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_action() {
    let app = setup();
    let id = create_order(&app).await;

    let (status, json) = send(&app, post(format!("/orders/{id}/explode"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("explode"));

    // Creation is not a lifecycle action.
    let (status, _) = send(&app, post(format!("/orders/{id}/create"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_events() {
    let app = setup();
    let id = create_order(&app).await;
    send(&app, post(format!("/orders/{id}/cancel"))).await;

    let (status, events) = send(&app, get(format!("/orders/{id}/events"))).await;

    assert_eq!(status, StatusCode::OK);
    let events = events.as_array().unwrap();
    assert_eq!(events.len(), 2);

    assert_eq!(events[0]["event_type"], "OrderCreated");
    assert_eq!(events[0]["aggregate_id"], id.as_str());
    assert_eq!(events[0]["version"], 1);
    assert_eq!(events[0]["payload"]["product_id"], "BTC-USD");

    assert_eq!(events[1]["event_type"], "OrderCanceled");
    assert_eq!(events[1]["version"], 2);
}

#[tokio::test]
async fn test_observers_see_published_events() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let observer = move |event: &EventEnvelope| -> Result<(), ObserverError> {
        sink.lock().unwrap().push(event.event_type.clone());
        Ok(())
    };

    let app = setup_with_store(InMemoryEventStore::new(), vec![Arc::new(observer)]);
    let id = create_order(&app).await;
    send(&app, post(format!("/orders/{id}/accept"))).await;
    send(&app, post(format!("/orders/{id}/match"))).await;

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["OrderCreated".to_string(), "OrderAccepted".to_string()]
    );
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();
    create_order(&app).await;

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_commands_total"));
    assert!(text.contains("orders_command_duration_seconds"));
}

/// Store whose every call fails, as if the database were unreachable.
struct DownStore;

impl DownStore {
    fn error(operation: &'static str) -> EventStoreError {
        EventStoreError::Timeout {
            operation,
            after: Duration::from_millis(1),
        }
    }
}

#[async_trait]
impl EventStore for DownStore {
    async fn append_if_version(
        &self,
        _aggregate_id: &AggregateId,
        _expected_version: Version,
        _events: Vec<EventEnvelope>,
    ) -> event_store::Result<Version> {
        Err(Self::error("append_if_version"))
    }

    async fn read_all(
        &self,
        _aggregate_id: &AggregateId,
    ) -> event_store::Result<Vec<EventEnvelope>> {
        Err(Self::error("read_all"))
    }

    async fn read_from(
        &self,
        _aggregate_id: &AggregateId,
        _from_version: Version,
    ) -> event_store::Result<Vec<EventEnvelope>> {
        Err(Self::error("read_from"))
    }

    async fn current_version(
        &self,
        _aggregate_id: &AggregateId,
    ) -> event_store::Result<Option<Version>> {
        Err(Self::error("current_version"))
    }

    async fn save_snapshot(&self, _snapshot: Snapshot) -> event_store::Result<()> {
        Err(Self::error("save_snapshot"))
    }

    async fn get_snapshot(
        &self,
        _aggregate_id: &AggregateId,
    ) -> event_store::Result<Option<Snapshot>> {
        Err(Self::error("get_snapshot"))
    }
}

#[tokio::test]
async fn test_readiness_stays_ready_with_orders() {
    let app = setup();
    create_order(&app).await;

    let (status, json) = send(&app, get("/_status/readiness")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_store_failures() {
    let app = setup_with_store(DownStore, Vec::new());

    let (status, json) = send(&app, get("/_status/readiness")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "unavailable");

    let (status, _) = send(&app, get("/_status/liveness")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&app, post_json("/orders", order_body())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("timed out"));
}
