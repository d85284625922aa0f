//! Order lifecycle state machine.

use serde::{Deserialize, Serialize};

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Created ──► Accepted ──► Published ──► Matched ──► Confirmed ──► Cleared ──► Settled
///    │
///    └──► Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    /// Order was entered by the system.
    #[default]
    Created,

    /// Order was accepted by a risk analyst.
    Accepted,

    /// Order was published on the exchange.
    Published,

    /// Order was canceled before acceptance (terminal state).
    Canceled,

    /// A counter order was matched.
    Matched,

    /// Both parties confirmed the trade.
    Confirmed,

    /// All calculations and obligations are fulfilled.
    Cleared,

    /// Money and security settled (terminal state).
    Settled,
}

impl OrderState {
    pub fn can_accept(&self) -> bool {
        matches!(self, OrderState::Created)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderState::Created)
    }

    pub fn can_publish(&self) -> bool {
        matches!(self, OrderState::Accepted)
    }

    pub fn can_match(&self) -> bool {
        matches!(self, OrderState::Published)
    }

    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderState::Matched)
    }

    pub fn can_clear(&self) -> bool {
        matches!(self, OrderState::Confirmed)
    }

    pub fn can_settle(&self) -> bool {
        matches!(self, OrderState::Cleared)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Canceled | OrderState::Settled)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Created => "created",
            OrderState::Accepted => "accepted",
            OrderState::Published => "published",
            OrderState::Canceled => "canceled",
            OrderState::Matched => "matched",
            OrderState::Confirmed => "confirmed",
            OrderState::Cleared => "cleared",
            OrderState::Settled => "settled",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
