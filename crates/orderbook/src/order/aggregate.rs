//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, DomainCommand, EventRecord};

use super::{
    OrderCommand, OrderCreatedData, OrderError, OrderEvent, OrderSide, OrderState, OrderType,
    ProductId,
};

/// Order aggregate root.
///
/// Represents a trade order from creation through settlement. The state is
/// only ever changed by [`Aggregate::apply`]; commands go through
/// [`Aggregate::decide`] and produce events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier, set by the first event.
    id: Option<AggregateId>,

    /// Version of the last applied event.
    #[serde(default)]
    version: Version,

    size: Decimal,
    price: Decimal,
    order_type: OrderType,
    side: OrderSide,
    product_id: ProductId,

    /// Current state of the order.
    state: OrderState,

    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<&AggregateId> {
        self.id.as_ref()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn apply(&mut self, record: &EventRecord<OrderEvent>) {
        match &record.event {
            OrderEvent::Created(data) => self.apply_created(data, record.timestamp),
            OrderEvent::Accepted => self.state = OrderState::Accepted,
            OrderEvent::Canceled => self.state = OrderState::Canceled,
            OrderEvent::Published => self.state = OrderState::Published,
            OrderEvent::Matched => self.state = OrderState::Matched,
            OrderEvent::Confirmed => self.state = OrderState::Confirmed,
            OrderEvent::Cleared => self.state = OrderState::Cleared,
            OrderEvent::Settled => self.state = OrderState::Settled,
        }

        self.id = Some(record.aggregate_id.clone());
        self.version = record.version;
        self.updated_at = Some(record.timestamp);
    }

    fn decide(
        &self,
        id: &AggregateId,
        command: &OrderCommand,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventRecord<OrderEvent>>, OrderError> {
        let (allowed, event) = match command {
            OrderCommand::Create(cmd) => {
                if self.is_created() {
                    return Err(OrderError::AlreadyCreated);
                }
                cmd.validate()?;
                return Ok(vec![self.record(id, now, OrderEvent::Created(cmd.into()))]);
            }
            _ if !self.is_created() => {
                return Err(OrderError::NotCreated {
                    action: command.kind(),
                });
            }
            OrderCommand::Accept => (self.state.can_accept(), OrderEvent::Accepted),
            OrderCommand::Cancel => (self.state.can_cancel(), OrderEvent::Canceled),
            OrderCommand::Publish => (self.state.can_publish(), OrderEvent::Published),
            OrderCommand::Match => (self.state.can_match(), OrderEvent::Matched),
            OrderCommand::Confirm => (self.state.can_confirm(), OrderEvent::Confirmed),
            OrderCommand::Clear => (self.state.can_clear(), OrderEvent::Cleared),
            OrderCommand::Settle => (self.state.can_settle(), OrderEvent::Settled),
        };

        if !allowed {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action: command.kind(),
            });
        }

        Ok(vec![self.record(id, now, event)])
    }
}

// Query methods
impl Order {
    pub fn size(&self) -> Decimal {
        self.size
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn side(&self) -> OrderSide {
        self.side
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    /// Returns the current state.
    pub fn state(&self) -> OrderState {
        self.state
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn is_created(&self) -> bool {
        !self.version.is_initial()
    }
}

// Event application
impl Order {
    fn apply_created(&mut self, data: &OrderCreatedData, at: DateTime<Utc>) {
        self.size = data.size;
        self.price = data.price;
        self.order_type = data.order_type;
        self.side = data.side;
        self.product_id = data.product_id.clone();
        self.state = OrderState::Created;
        self.created_at = Some(at);
    }

    fn record(
        &self,
        id: &AggregateId,
        now: DateTime<Utc>,
        event: OrderEvent,
    ) -> EventRecord<OrderEvent> {
        EventRecord::new(id.clone(), self.version.next(), now, event)
    }
}
