//! Broker adapter: the uniform contract over a paper/live broker.
//!
//! Implementations translate vendor wire-level responses into the
//! normalized status enum via a closed table; anything outside the table
//! becomes `UNKNOWN`, which is never terminal.

mod api_types;
mod http;
mod mock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{BrokerOrderId, LifecycleState, OrderIntent, Quote};

pub use http::HttpBroker;
pub use mock::{MockBroker, ScriptedOrder};

/// Normalized broker order status.
///
/// `Unknown` covers any vendor status outside the closed mapping table
/// and is never treated as terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalizedStatus {
    /// Submitted, not yet acknowledged.
    New,
    /// Accepted / open / working at the broker.
    Accepted,
    /// Partially filled.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Canceled.
    Cancelled,
    /// Rejected.
    Rejected,
    /// Expired.
    Expired,
    /// Outside the closed mapping table.
    Unknown,
}

impl NormalizedStatus {
    /// Map a vendor status string through the closed table.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "new" | "pending_new" => Self::New,
            "accepted" | "open" | "working" => Self::Accepted,
            "partially_filled" => Self::PartiallyFilled,
            "filled" => Self::Filled,
            "canceled" | "cancelled" => Self::Cancelled,
            "rejected" => Self::Rejected,
            "expired" => Self::Expired,
            _ => Self::Unknown,
        }
    }

    /// Returns true if the normalized status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// The lifecycle state this status corresponds to, if any.
    ///
    /// `Unknown` carries no lifecycle information.
    #[must_use]
    pub const fn to_lifecycle(&self) -> Option<LifecycleState> {
        match self {
            Self::New => Some(LifecycleState::New),
            Self::Accepted => Some(LifecycleState::Accepted),
            Self::PartiallyFilled => Some(LifecycleState::PartiallyFilled),
            Self::Filled => Some(LifecycleState::Filled),
            Self::Cancelled => Some(LifecycleState::Cancelled),
            Self::Rejected => Some(LifecycleState::Rejected),
            Self::Expired => Some(LifecycleState::Expired),
            Self::Unknown => None,
        }
    }
}

impl std::fmt::Display for NormalizedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Acknowledgment of a successful `place`.
#[derive(Debug, Clone)]
pub struct PlaceAck {
    /// Broker-assigned order id.
    pub broker_order_id: BrokerOrderId,
    /// Raw vendor status string.
    pub status_raw: String,
    /// Normalized status.
    pub status_norm: NormalizedStatus,
}

/// Broker-side view of a submitted order, as returned by `get_order`.
#[derive(Debug, Clone)]
pub struct BrokerOrderView {
    /// Broker-assigned order id.
    pub broker_order_id: BrokerOrderId,
    /// Raw vendor status string.
    pub status_raw: String,
    /// Normalized status.
    pub status_norm: NormalizedStatus,
    /// Cumulative filled quantity (brokers report totals, not deltas).
    pub filled_qty: Decimal,
    /// Average fill price across all fills, if any.
    pub avg_price: Option<Decimal>,
}

/// Broker adapter failure kinds.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Transport failure, 5xx, or deadline miss. Retryable by the caller
    /// or the recovery loop; never auto-retried inside the engine.
    #[error("broker unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// The broker rejected the order. Terminal for this intent.
    #[error("broker rejected order: {code}")]
    Rejected {
        /// Vendor rejection code or message.
        code: String,
    },

    /// Unknown order id. Success for idempotent cancel/poll.
    #[error("broker order not found: {order_id}")]
    NotFound {
        /// The missing order id.
        order_id: String,
    },
}

/// Uniform capability set over a paper/live broker.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Submit an order built from the intent.
    async fn place(&self, intent: &OrderIntent) -> Result<PlaceAck, BrokerError>;

    /// Cancel a broker order. `NotFound` is an idempotent success for
    /// callers.
    async fn cancel(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError>;

    /// Fetch the broker-side view of an order.
    async fn get_order(&self, broker_order_id: &BrokerOrderId)
    -> Result<BrokerOrderView, BrokerError>;

    /// Fetch a top-of-book quote for smart routing.
    async fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerError>;
}
