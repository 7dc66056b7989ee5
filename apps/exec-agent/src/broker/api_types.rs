//! Broker REST wire types.
//!
//! These map to the Alpaca-style trading API the platform runs against in
//! paper and live.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{BrokerOrderId, OrderIntent, OrderSide, OrderType, Quote, TimeInForce};

use super::{BrokerOrderView, NormalizedStatus, PlaceAck};

/// Order submission request body.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// Symbol to trade.
    pub symbol: String,
    /// Quantity (as string, vendor convention).
    pub qty: String,
    /// Order side.
    pub side: String,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: String,
    /// Time in force.
    pub time_in_force: String,
    /// Limit price (for limit orders).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
    /// Client order ID (the intent id).
    pub client_order_id: String,
}

impl OrderRequest {
    /// Build the wire request from an intent.
    #[must_use]
    pub fn from_intent(intent: &OrderIntent) -> Self {
        let side = match intent.side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let order_type = match intent.order_type {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::Stop => "stop",
            OrderType::StopLimit => "stop_limit",
        };
        let time_in_force = match intent.time_in_force {
            TimeInForce::Day => "day",
            TimeInForce::Gtc => "gtc",
            TimeInForce::Ioc => "ioc",
        };

        Self {
            symbol: intent.symbol.clone(),
            qty: intent.qty.to_string(),
            side: side.to_string(),
            order_type: order_type.to_string(),
            time_in_force: time_in_force.to_string(),
            limit_price: intent.limit_price.map(|p| p.to_string()),
            client_order_id: intent.intent_id.as_str().to_string(),
        }
    }
}

/// Order response body.
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct OrderResponse {
    /// Broker order ID.
    pub id: String,
    /// Client order ID echoed back.
    pub client_order_id: String,
    /// Symbol.
    pub symbol: String,
    /// Requested quantity (as string).
    pub qty: String,
    /// Cumulative filled quantity (as string).
    pub filled_qty: String,
    /// Average fill price (as string).
    #[serde(default)]
    pub filled_avg_price: Option<String>,
    /// Vendor status string.
    pub status: String,
    /// Order side.
    pub side: String,
    /// Order type.
    #[serde(rename = "type", default)]
    pub order_type: Option<String>,
    /// Time in force.
    #[serde(default)]
    pub time_in_force: Option<String>,
}

impl OrderResponse {
    /// Convert to a place acknowledgment.
    #[must_use]
    pub fn to_place_ack(&self) -> PlaceAck {
        PlaceAck {
            broker_order_id: BrokerOrderId::new(&self.id),
            status_raw: self.status.clone(),
            status_norm: NormalizedStatus::from_raw(&self.status),
        }
    }

    /// Convert to the broker-side order view.
    #[must_use]
    pub fn to_order_view(&self) -> BrokerOrderView {
        BrokerOrderView {
            broker_order_id: BrokerOrderId::new(&self.id),
            status_raw: self.status.clone(),
            status_norm: NormalizedStatus::from_raw(&self.status),
            filled_qty: self.filled_qty.parse().unwrap_or(Decimal::ZERO),
            avg_price: self.filled_avg_price.as_ref().and_then(|p| p.parse().ok()),
        }
    }
}

/// Latest-quote response body.
#[derive(Debug, Clone, Deserialize)]
pub struct LatestQuoteResponse {
    /// Quoted symbol.
    pub symbol: String,
    /// Best bid (as string).
    pub bid_price: String,
    /// Best ask (as string).
    pub ask_price: String,
    /// Quote timestamp (RFC 3339).
    pub timestamp: String,
}

impl LatestQuoteResponse {
    /// Convert to the domain quote.
    #[must_use]
    pub fn to_quote(&self) -> Quote {
        let ts = chrono::DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now());
        Quote {
            symbol: self.symbol.clone(),
            bid: self.bid_price.parse().unwrap_or(Decimal::ZERO),
            ask: self.ask_price.parse().unwrap_or(Decimal::ZERO),
            ts,
        }
    }
}

/// Error response body.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerErrorResponse {
    /// Vendor error code.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetClass, IntentContext, IntentId, StrategyId, TenantId, UserId};
    use rust_decimal_macros::dec;

    fn intent() -> OrderIntent {
        OrderIntent {
            intent_id: IntentId::new("i-1"),
            context: IntentContext {
                tenant_id: TenantId::new("t1"),
                user_id: UserId::new("u1"),
                strategy_id: StrategyId::new("s1"),
            },
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            qty: dec!(10),
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Gtc,
            asset_class: AssetClass::Equity,
            limit_price: Some(dec!(150.25)),
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn order_request_from_intent() {
        let request = OrderRequest::from_intent(&intent());
        assert_eq!(request.symbol, "AAPL");
        assert_eq!(request.qty, "10");
        assert_eq!(request.side, "buy");
        assert_eq!(request.order_type, "limit");
        assert_eq!(request.time_in_force, "gtc");
        assert_eq!(request.limit_price, Some("150.25".to_string()));
        assert_eq!(request.client_order_id, "i-1");
    }

    #[test]
    fn order_request_market_has_no_limit_price() {
        let mut i = intent();
        i.order_type = OrderType::Market;
        i.limit_price = None;
        let request = OrderRequest::from_intent(&i);
        assert_eq!(request.order_type, "market");
        assert!(request.limit_price.is_none());
    }

    #[test]
    fn order_response_to_view_parses_decimals() {
        let response = OrderResponse {
            id: "o1".to_string(),
            client_order_id: "i-1".to_string(),
            symbol: "AAPL".to_string(),
            qty: "10".to_string(),
            filled_qty: "4".to_string(),
            filled_avg_price: Some("150.03".to_string()),
            status: "partially_filled".to_string(),
            side: "buy".to_string(),
            order_type: None,
            time_in_force: None,
        };
        let view = response.to_order_view();
        assert_eq!(view.broker_order_id.as_str(), "o1");
        assert_eq!(view.status_norm, NormalizedStatus::PartiallyFilled);
        assert_eq!(view.filled_qty, dec!(4));
        assert_eq!(view.avg_price, Some(dec!(150.03)));
    }

    #[test]
    fn quote_response_to_quote() {
        let response = LatestQuoteResponse {
            symbol: "AAPL".to_string(),
            bid_price: "150.00".to_string(),
            ask_price: "150.05".to_string(),
            timestamp: "2026-01-04T15:30:00Z".to_string(),
        };
        let quote = response.to_quote();
        assert_eq!(quote.bid, dec!(150.00));
        assert_eq!(quote.ask, dec!(150.05));
        assert_eq!(quote.symbol, "AAPL");
    }
}
