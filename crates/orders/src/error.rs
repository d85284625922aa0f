//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orderbook::{DomainError, OrderError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
}

impl ApiError {
    /// HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Domain(err) => domain_status(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Domain(err) => {
                if status.is_server_error() {
                    tracing::error!(error = %err, "request failed");
                }
                err.to_string()
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::AggregateNotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::AggregateAlreadyExists { .. } | DomainError::ConcurrencyConflict { .. } => {
            StatusCode::CONFLICT
        }
        DomainError::Order(order_err) => match order_err {
            OrderError::NotCreated { .. } => StatusCode::NOT_FOUND,
            OrderError::InvalidStateTransition { .. } | OrderError::AlreadyCreated => {
                StatusCode::CONFLICT
            }
            OrderError::UnknownCommand(_)
            | OrderError::InvalidSize { .. }
            | OrderError::InvalidPrice { .. }
            | OrderError::ProductIdRequired => StatusCode::BAD_REQUEST,
        },
        DomainError::UnknownEventKind { .. }
        | DomainError::MalformedEvent { .. }
        | DomainError::CorruptStream { .. }
        | DomainError::EventStore(_)
        | DomainError::Serialization(_)
        | DomainError::Envelope(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Domain(err.into())
    }
}
