//! Fill events: incremental executions appended to the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::identifiers::{BrokerOrderId, IntentId};
use super::intent::{AssetClass, OrderSide};

/// A (partial or complete) execution of a broker order.
///
/// Quantities are incremental deltas, not cumulative totals; each event is
/// appended to the ledger exactly once per `(broker_order_id, fill_seq)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillEvent {
    /// Deterministic identifier derived from the broker order id and
    /// fill sequence.
    pub fill_id: String,
    /// Broker order this fill belongs to.
    pub broker_order_id: BrokerOrderId,
    /// Monotonically increasing sequence number within the broker order.
    pub fill_seq: u32,
    /// Intent that produced the broker order.
    pub intent_id: IntentId,
    /// Symbol traded.
    pub symbol: String,
    /// Side of the execution.
    pub side: OrderSide,
    /// Incremental quantity (> 0).
    pub qty: Decimal,
    /// Execution price.
    pub price: Decimal,
    /// Asset class of the instrument.
    pub asset_class: AssetClass,
    /// When the fill was observed.
    pub timestamp: DateTime<Utc>,
}

impl FillEvent {
    /// Derive the deterministic fill id for a broker order and sequence.
    ///
    /// The composite key is the dedupe backstop: re-deriving the same
    /// `(broker_order_id, fill_seq)` after a restart produces the same id.
    #[must_use]
    pub fn derive_id(broker_order_id: &BrokerOrderId, fill_seq: u32) -> String {
        format!("{}-{fill_seq}", broker_order_id.as_str())
    }
}
