//! Order intents: the desired orders handed to the execution core.
//!
//! An intent is produced outside the core (by a strategy component) and
//! consumed exactly once by the execution engine. The `intent_id` is the
//! idempotency key end-to-end and must be stable across retries.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::identifiers::{IntentId, StrategyId, TenantId, UserId};

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy / long.
    Buy,
    /// Sell / short.
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Market order.
    Market,
    /// Limit order.
    Limit,
    /// Stop order.
    Stop,
    /// Stop-limit order.
    StopLimit,
}

impl OrderType {
    /// Returns true if this order type carries a limit price.
    #[must_use]
    pub const fn is_limit_like(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
            Self::Stop => write!(f, "STOP"),
            Self::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// Time in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Valid for the trading day.
    Day,
    /// Good 'til canceled.
    Gtc,
    /// Immediate or cancel.
    Ioc,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day => write!(f, "DAY"),
            Self::Gtc => write!(f, "GTC"),
            Self::Ioc => write!(f, "IOC"),
        }
    }
}

/// Asset class of the traded instrument.
///
/// Drives the smart-routing spread threshold and the recovery-loop
/// timeout table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetClass {
    /// Listed equities.
    Equity,
    /// Listed option contracts.
    Option,
    /// Foreign exchange pairs.
    Forex,
    /// Crypto pairs.
    Crypto,
    /// Futures contracts.
    Future,
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equity => write!(f, "EQUITY"),
            Self::Option => write!(f, "OPTION"),
            Self::Forex => write!(f, "FOREX"),
            Self::Crypto => write!(f, "CRYPTO"),
            Self::Future => write!(f, "FUTURE"),
        }
    }
}

/// Required identity context carried by every intent.
///
/// The advisory metadata bag stays opaque; these fields are validated at
/// ingress before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentContext {
    /// Tenant the intent belongs to.
    pub tenant_id: TenantId,
    /// User the intent trades on behalf of.
    pub user_id: UserId,
    /// Strategy that produced the intent.
    pub strategy_id: StrategyId,
}

/// Validation errors for an incoming intent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentError {
    /// Quantity must be strictly positive.
    #[error("intent {intent_id}: quantity must be positive, got {qty}")]
    NonPositiveQty {
        /// The offending intent.
        intent_id: IntentId,
        /// The rejected quantity.
        qty: Decimal,
    },

    /// Limit-like order types require a limit price.
    #[error("intent {intent_id}: {order_type} order requires a limit price")]
    MissingLimitPrice {
        /// The offending intent.
        intent_id: IntentId,
        /// The order type that requires a price.
        order_type: OrderType,
    },

    /// A required context field is empty.
    #[error("intent {intent_id}: required context field '{field}' is empty")]
    MissingContext {
        /// The offending intent.
        intent_id: IntentId,
        /// Name of the empty field.
        field: &'static str,
    },
}

/// A desired order, prior to broker submission.
///
/// Immutable value produced outside the core and consumed once by the
/// engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Client-supplied idempotency key.
    pub intent_id: IntentId,
    /// Required identity context.
    pub context: IntentContext,
    /// Symbol to trade.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Quantity (must be > 0).
    pub qty: Decimal,
    /// Order type.
    pub order_type: OrderType,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Asset class of the instrument.
    pub asset_class: AssetClass,
    /// Limit price; required iff the order type is limit-like.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    /// Advisory metadata (may carry `reasoning`, `max_slippage_pct`).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl OrderIntent {
    /// Validate the intent at ingress.
    ///
    /// # Errors
    ///
    /// Returns an `IntentError` if the quantity is not positive, a
    /// limit-like order is missing its price, or a required context field
    /// is empty.
    pub fn validate(&self) -> Result<(), IntentError> {
        if self.qty <= Decimal::ZERO {
            return Err(IntentError::NonPositiveQty {
                intent_id: self.intent_id.clone(),
                qty: self.qty,
            });
        }

        if self.order_type.is_limit_like() && self.limit_price.is_none() {
            return Err(IntentError::MissingLimitPrice {
                intent_id: self.intent_id.clone(),
                order_type: self.order_type,
            });
        }

        if self.context.tenant_id.as_str().is_empty() {
            return Err(IntentError::MissingContext {
                intent_id: self.intent_id.clone(),
                field: "tenant_id",
            });
        }
        if self.context.user_id.as_str().is_empty() {
            return Err(IntentError::MissingContext {
                intent_id: self.intent_id.clone(),
                field: "user_id",
            });
        }

        Ok(())
    }

    /// Per-intent spread override from the advisory metadata, if present
    /// and parseable.
    #[must_use]
    pub fn max_slippage_pct(&self) -> Option<Decimal> {
        let value = self.metadata.get("max_slippage_pct")?;
        match value {
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Number(n) => n.to_string().parse().ok(),
            _ => None,
        }
    }
}
