//! Scriptable mock broker for tests.
//!
//! Returns simulated responses without network I/O. Tests script place
//! outcomes and successive `get_order` views per broker order; call
//! counters let tests assert that no broker traffic happened at all.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{BrokerOrderId, OrderIntent, Quote};

use super::{BrokerAdapter, BrokerError, BrokerOrderView, NormalizedStatus, PlaceAck};

/// Successive broker-side views of one scripted order.
///
/// Each `get_order` pops the next view; the final view repeats forever.
#[derive(Debug, Default)]
pub struct ScriptedOrder {
    views: VecDeque<BrokerOrderView>,
}

impl ScriptedOrder {
    fn next_view(&mut self) -> Option<BrokerOrderView> {
        if self.views.len() > 1 {
            self.views.pop_front()
        } else {
            self.views.front().cloned()
        }
    }
}

/// Mock broker adapter.
#[derive(Debug, Default)]
pub struct MockBroker {
    order_counter: AtomicU64,
    place_calls: AtomicU64,
    cancel_calls: AtomicU64,
    poll_calls: AtomicU64,
    place_script: Mutex<VecDeque<Result<PlaceAck, BrokerError>>>,
    orders: Mutex<HashMap<String, ScriptedOrder>>,
    quotes: Mutex<HashMap<String, Quote>>,
}

impl MockBroker {
    /// Create a fresh mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a broker order view for scripting.
    #[must_use]
    pub fn view(
        broker_order_id: &str,
        status_raw: &str,
        filled_qty: Decimal,
        avg_price: Option<Decimal>,
    ) -> BrokerOrderView {
        BrokerOrderView {
            broker_order_id: BrokerOrderId::new(broker_order_id),
            status_raw: status_raw.to_string(),
            status_norm: NormalizedStatus::from_raw(status_raw),
            filled_qty,
            avg_price,
        }
    }

    /// Script the next `place` to succeed with the given id and status.
    pub fn script_place_ok(&self, broker_order_id: &str, status_raw: &str) {
        let ack = PlaceAck {
            broker_order_id: BrokerOrderId::new(broker_order_id),
            status_raw: status_raw.to_string(),
            status_norm: NormalizedStatus::from_raw(status_raw),
        };
        if let Ok(mut script) = self.place_script.lock() {
            script.push_back(Ok(ack));
        }
        // Ensure polls on the new id resolve to something sensible until
        // views are scripted.
        self.push_view(Self::view(broker_order_id, status_raw, Decimal::ZERO, None));
    }

    /// Script the next `place` to fail.
    pub fn script_place_err(&self, err: BrokerError) {
        if let Ok(mut script) = self.place_script.lock() {
            script.push_back(Err(err));
        }
    }

    /// Append a `get_order` view for its broker order.
    pub fn push_view(&self, view: BrokerOrderView) {
        if let Ok(mut orders) = self.orders.lock() {
            orders
                .entry(view.broker_order_id.as_str().to_string())
                .or_default()
                .views
                .push_back(view);
        }
    }

    /// Replace all scripted views for a broker order.
    pub fn set_views(&self, broker_order_id: &str, views: Vec<BrokerOrderView>) {
        if let Ok(mut orders) = self.orders.lock() {
            orders.insert(
                broker_order_id.to_string(),
                ScriptedOrder {
                    views: views.into(),
                },
            );
        }
    }

    /// Publish a quote for a symbol.
    pub fn set_quote(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        if let Ok(mut quotes) = self.quotes.lock() {
            quotes.insert(
                symbol.to_string(),
                Quote {
                    symbol: symbol.to_string(),
                    bid,
                    ask,
                    ts: chrono::Utc::now(),
                },
            );
        }
    }

    /// Number of `place` calls observed.
    #[must_use]
    pub fn place_calls(&self) -> u64 {
        self.place_calls.load(Ordering::SeqCst)
    }

    /// Number of `cancel` calls observed.
    #[must_use]
    pub fn cancel_calls(&self) -> u64 {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Number of `get_order` calls observed.
    #[must_use]
    pub fn poll_calls(&self) -> u64 {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerAdapter for MockBroker {
    async fn place(&self, _intent: &OrderIntent) -> Result<PlaceAck, BrokerError> {
        self.place_calls.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .place_script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());
        if let Some(result) = scripted {
            return result;
        }

        // Unscripted: accept with a sequential id.
        let n = self.order_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("mock-{n}");
        self.push_view(Self::view(&id, "accepted", Decimal::ZERO, None));
        Ok(PlaceAck {
            broker_order_id: BrokerOrderId::new(&id),
            status_raw: "accepted".to_string(),
            status_norm: NormalizedStatus::Accepted,
        })
    }

    async fn cancel(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);

        let mut orders = match self.orders.lock() {
            Ok(guard) => guard,
            Err(_) => {
                return Err(BrokerError::Unavailable {
                    message: "mock poisoned".to_string(),
                });
            }
        };

        let Some(order) = orders.get_mut(broker_order_id.as_str()) else {
            return Err(BrokerError::NotFound {
                order_id: broker_order_id.as_str().to_string(),
            });
        };

        // If the script does not already end in a terminal view, append a
        // cancellation that preserves the last observed fill quantity.
        let needs_terminal = order.views.back().is_none_or(|v| !v.status_norm.is_terminal());
        if needs_terminal {
            let (filled_qty, avg_price) = order
                .views
                .back()
                .map_or((Decimal::ZERO, None), |v| (v.filled_qty, v.avg_price));
            order.views.push_back(Self::view(
                broker_order_id.as_str(),
                "canceled",
                filled_qty,
                avg_price,
            ));
        }
        Ok(())
    }

    async fn get_order(
        &self,
        broker_order_id: &BrokerOrderId,
    ) -> Result<BrokerOrderView, BrokerError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);

        let mut orders = match self.orders.lock() {
            Ok(guard) => guard,
            Err(_) => {
                return Err(BrokerError::Unavailable {
                    message: "mock poisoned".to_string(),
                });
            }
        };

        orders
            .get_mut(broker_order_id.as_str())
            .and_then(ScriptedOrder::next_view)
            .ok_or_else(|| BrokerError::NotFound {
                order_id: broker_order_id.as_str().to_string(),
            })
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerError> {
        self.quotes
            .lock()
            .ok()
            .and_then(|quotes| quotes.get(symbol).cloned())
            .ok_or_else(|| BrokerError::Unavailable {
                message: format!("no quote for {symbol}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AssetClass, IntentContext, IntentId, OrderSide, OrderType, StrategyId, TenantId,
        TimeInForce, UserId,
    };
    use rust_decimal_macros::dec;

    fn test_intent() -> OrderIntent {
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
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Day,
            asset_class: AssetClass::Equity,
            limit_price: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn unscripted_place_accepts_sequentially() {
        let broker = MockBroker::new();
        let a = broker.place(&test_intent()).await.unwrap();
        let b = broker.place(&test_intent()).await.unwrap();
        assert_ne!(a.broker_order_id, b.broker_order_id);
        assert_eq!(a.status_norm, NormalizedStatus::Accepted);
        assert_eq!(broker.place_calls(), 2);
    }

    #[tokio::test]
    async fn scripted_views_pop_in_order_and_last_repeats() {
        let broker = MockBroker::new();
        broker.set_views(
            "o1",
            vec![
                MockBroker::view("o1", "partially_filled", dec!(2), Some(dec!(1.20))),
                MockBroker::view("o1", "filled", dec!(5), Some(dec!(1.21))),
            ],
        );

        let id = BrokerOrderId::new("o1");
        assert_eq!(
            broker.get_order(&id).await.unwrap().status_norm,
            NormalizedStatus::PartiallyFilled
        );
        assert_eq!(
            broker.get_order(&id).await.unwrap().status_norm,
            NormalizedStatus::Filled
        );
        // Terminal view repeats.
        assert_eq!(
            broker.get_order(&id).await.unwrap().status_norm,
            NormalizedStatus::Filled
        );
    }

    #[tokio::test]
    async fn cancel_appends_terminal_view_preserving_fill() {
        let broker = MockBroker::new();
        broker.set_views(
            "o1",
            vec![MockBroker::view(
                "o1",
                "partially_filled",
                dec!(2),
                Some(dec!(1.20)),
            )],
        );

        let id = BrokerOrderId::new("o1");
        broker.cancel(&id).await.unwrap();

        // First poll returns the pre-cancel view, then the cancellation.
        assert_eq!(
            broker.get_order(&id).await.unwrap().status_norm,
            NormalizedStatus::PartiallyFilled
        );
        let view = broker.get_order(&id).await.unwrap();
        assert_eq!(view.status_norm, NormalizedStatus::Cancelled);
        assert_eq!(view.filled_qty, dec!(2));
    }

    #[tokio::test]
    async fn cancel_unknown_order_is_not_found() {
        let broker = MockBroker::new();
        let err = broker.cancel(&BrokerOrderId::new("nope")).await.unwrap_err();
        assert!(matches!(err, BrokerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn quote_lookup() {
        let broker = MockBroker::new();
        broker.set_quote("BTC/USD", dec!(50000), dec!(50150));
        let quote = broker.get_quote("BTC/USD").await.unwrap();
        assert_eq!(quote.bid, dec!(50000));
        assert!(broker.get_quote("ETH/USD").await.is_err());
    }
}
