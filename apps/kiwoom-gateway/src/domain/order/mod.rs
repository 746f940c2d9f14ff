//! Order Ticket Types
//!
//! Typed form of the broker's order submission parameters. The gateway
//! forwards tickets verbatim; fills and balance changes come back through
//! the execution (chejan) push stream, not through request correlation.

use serde::{Deserialize, Serialize};

// =============================================================================
// Order Classification
// =============================================================================

/// Order action (the broker's order-type marker, 1–6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderAction {
    /// New buy.
    Buy,
    /// New sell.
    Sell,
    /// Cancel an open buy.
    CancelBuy,
    /// Cancel an open sell.
    CancelSell,
    /// Amend an open buy.
    AmendBuy,
    /// Amend an open sell.
    AmendSell,
}

impl OrderAction {
    /// The broker's numeric marker.
    #[must_use]
    pub const fn as_code(self) -> i32 {
        match self {
            Self::Buy => 1,
            Self::Sell => 2,
            Self::CancelBuy => 3,
            Self::CancelSell => 4,
            Self::AmendBuy => 5,
            Self::AmendSell => 6,
        }
    }

    /// Whether this action references an original order number.
    #[must_use]
    pub const fn references_original(self) -> bool {
        !matches!(self, Self::Buy | Self::Sell)
    }
}

/// Price condition (the broker's hoga marker).
///
/// Market-style conditions must not carry a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceCondition {
    /// Limit order ("00").
    Limit,
    /// Market order ("03").
    Market,
    /// Conditional limit ("05").
    ConditionalLimit,
    /// Best limit ("06").
    BestLimit,
    /// Priority limit ("07").
    PriorityLimit,
}

impl PriceCondition {
    /// The broker's two-digit marker.
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::Limit => "00",
            Self::Market => "03",
            Self::ConditionalLimit => "05",
            Self::BestLimit => "06",
            Self::PriorityLimit => "07",
        }
    }

    /// Whether orders under this condition carry a price.
    #[must_use]
    pub const fn is_priced(self) -> bool {
        matches!(self, Self::Limit | Self::ConditionalLimit)
    }
}

// =============================================================================
// Order Ticket
// =============================================================================

/// One order submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTicket {
    /// Caller-chosen request name for the order's notices.
    pub rq_name: String,
    /// Account number.
    pub account: String,
    /// Order action.
    pub action: OrderAction,
    /// Instrument code.
    pub code: String,
    /// Quantity.
    pub quantity: u32,
    /// Price (zero for market-style conditions).
    pub price: u32,
    /// Price condition.
    pub condition: PriceCondition,
    /// Original order number for cancels and amendments.
    pub original_order_no: Option<String>,
}
