//! Order commands.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainCommand;

use super::{OrderError, OrderSide, OrderType, ProductId};

/// Payload of the command that opens a new order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub size: Decimal,
    pub price: Decimal,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub product_id: ProductId,
}

impl CreateOrder {
    pub fn new(
        size: Decimal,
        price: Decimal,
        order_type: OrderType,
        side: OrderSide,
        product_id: impl Into<ProductId>,
    ) -> Self {
        Self {
            size,
            price,
            order_type,
            side,
            product_id: product_id.into(),
        }
    }

    /// Checks the payload independently of any order state.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.size <= Decimal::ZERO {
            return Err(OrderError::InvalidSize { size: self.size });
        }
        if self.price.is_sign_negative() {
            return Err(OrderError::InvalidPrice { price: self.price });
        }
        if self.product_id.is_empty() {
            return Err(OrderError::ProductIdRequired);
        }
        Ok(())
    }
}

/// Every intent the order aggregate accepts.
///
/// The target order is addressed separately, by the identifier passed to the
/// repository alongside the command.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderCommand {
    Create(CreateOrder),
    Accept,
    Cancel,
    Publish,
    Match,
    Confirm,
    Clear,
    Settle,
}

impl OrderCommand {
    /// Names of the commands that advance an existing order.
    pub const LIFECYCLE: [&'static str; 7] = [
        "accept", "cancel", "publish", "match", "confirm", "clear", "settle",
    ];

    /// Parses a lifecycle command from its lowercase name.
    ///
    /// `create` is not accepted here: it needs a payload.
    pub fn parse_lifecycle(kind: &str) -> Result<Self, OrderError> {
        match kind {
            "accept" => Ok(OrderCommand::Accept),
            "cancel" => Ok(OrderCommand::Cancel),
            "publish" => Ok(OrderCommand::Publish),
            "match" => Ok(OrderCommand::Match),
            "confirm" => Ok(OrderCommand::Confirm),
            "clear" => Ok(OrderCommand::Clear),
            "settle" => Ok(OrderCommand::Settle),
            other => Err(OrderError::UnknownCommand(other.to_string())),
        }
    }
}

impl DomainCommand for OrderCommand {
    fn kind(&self) -> &'static str {
        match self {
            OrderCommand::Create(_) => "create",
            OrderCommand::Accept => "accept",
            OrderCommand::Cancel => "cancel",
            OrderCommand::Publish => "publish",
            OrderCommand::Match => "match",
            OrderCommand::Confirm => "confirm",
            OrderCommand::Clear => "clear",
            OrderCommand::Settle => "settle",
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, OrderCommand::Create(_))
    }
}

impl From<CreateOrder> for OrderCommand {
    fn from(cmd: CreateOrder) -> Self {
        OrderCommand::Create(cmd)
    }
}
