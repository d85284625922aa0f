//! Order domain events.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::registry::EventRegistry;

use super::{CreateOrder, OrderSide, OrderType, ProductId};

/// Events that can occur on an order aggregate.
///
/// Only `Created` carries a payload; every other event is a bare state change
/// stored with an empty JSON object.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    /// Order was created by the system.
    Created(OrderCreatedData),

    /// Order was accepted by a risk analyst.
    Accepted,

    /// Order was canceled.
    Canceled,

    /// Order was published on the exchange.
    Published,

    /// Sell and buy order were matched.
    Matched,

    /// Both clients confirmed the trade.
    Confirmed,

    /// All calculations and obligations are fulfilled.
    Cleared,

    /// Money and security settled.
    Settled,
}

impl OrderEvent {
    pub const CREATED: &'static str = "OrderCreated";
    pub const ACCEPTED: &'static str = "OrderAccepted";
    pub const CANCELED: &'static str = "OrderCanceled";
    pub const PUBLISHED: &'static str = "OrderPublished";
    pub const MATCHED: &'static str = "OrderMatched";
    pub const CONFIRMED: &'static str = "OrderConfirmed";
    pub const CLEARED: &'static str = "OrderCleared";
    pub const SETTLED: &'static str = "OrderSettled";

    /// Builds the registry of every order event kind.
    pub fn registry() -> EventRegistry<OrderEvent> {
        EventRegistry::new("Order")
            .register(Self::CREATED, |payload| {
                serde_json::from_value(payload).map(OrderEvent::Created)
            })
            .register(Self::ACCEPTED, |_| Ok(OrderEvent::Accepted))
            .register(Self::CANCELED, |_| Ok(OrderEvent::Canceled))
            .register(Self::PUBLISHED, |_| Ok(OrderEvent::Published))
            .register(Self::MATCHED, |_| Ok(OrderEvent::Matched))
            .register(Self::CONFIRMED, |_| Ok(OrderEvent::Confirmed))
            .register(Self::CLEARED, |_| Ok(OrderEvent::Cleared))
            .register(Self::SETTLED, |_| Ok(OrderEvent::Settled))
    }
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => Self::CREATED,
            OrderEvent::Accepted => Self::ACCEPTED,
            OrderEvent::Canceled => Self::CANCELED,
            OrderEvent::Published => Self::PUBLISHED,
            OrderEvent::Matched => Self::MATCHED,
            OrderEvent::Confirmed => Self::CONFIRMED,
            OrderEvent::Cleared => Self::CLEARED,
            OrderEvent::Settled => Self::SETTLED,
        }
    }

    fn payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            OrderEvent::Created(data) => serde_json::to_value(data),
            _ => Ok(serde_json::Value::Object(serde_json::Map::new())),
        }
    }
}

/// Data for OrderCreated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub size: Decimal,
    pub price: Decimal,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub product_id: ProductId,
}

impl From<&CreateOrder> for OrderCreatedData {
    fn from(cmd: &CreateOrder) -> Self {
        Self {
            size: cmd.size,
            price: cmd.price,
            order_type: cmd.order_type,
            side: cmd.side,
            product_id: cmd.product_id.clone(),
        }
    }
}
