//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use commands::{CreateOrder, OrderCommand};
pub use events::{OrderCreatedData, OrderEvent};
pub use service::OrderService;
pub use state::OrderState;
pub use value_objects::{OrderSide, OrderType, ProductId};

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order is not in the state the command requires.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderState,
        action: &'static str,
    },

    /// A lifecycle command targeted an order with no events.
    #[error("Cannot {action} an order that has not been created")]
    NotCreated { action: &'static str },

    /// Command name is not part of the order lifecycle.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Order is already created.
    #[error("Order already created")]
    AlreadyCreated,

    #[error("Invalid size: {size} (must be greater than 0)")]
    InvalidSize { size: Decimal },

    #[error("Invalid price: {price} (must not be negative)")]
    InvalidPrice { price: Decimal },

    #[error("Product ID is required")]
    ProductIdRequired,
}
