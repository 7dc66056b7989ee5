//! Broker-view reconciliation shared by the engine and the recovery loop.
//!
//! The one real subtlety of the pipeline lives here: brokers report
//! cumulative filled quantity, while the ledger wants incremental events.
//! The delta cursor (`filled_qty_seen`, `next_fill_seq`) is persisted on
//! the tracker record and only advances after a successful ledger append,
//! so restarts and repeated polls never re-emit prior fills; the ledger's
//! `(tenant_id, fill_id)` key is the backstop.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::broker::{BrokerError, BrokerOrderView, NormalizedStatus};
use crate::domain::{FillEvent, LifecycleMachine};
use crate::ledger::{Ledger, LedgerError};

use super::store::{ExecutionOrderRecord, OrderTracker, TrackerError};

/// Errors from reconciliation and recovery.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// Tracker store failure.
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// Ledger failure.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Broker failure.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// What one reconciliation pass did to a record.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOutcome {
    /// Number of fill events appended to the ledger.
    pub appended_fills: u32,
    /// Whether the record reached a terminal lifecycle state.
    pub became_terminal: bool,
}

/// Applies broker order views to tracker records and routes fill deltas
/// to the ledger.
pub struct Reconciler {
    tracker: Arc<OrderTracker>,
    ledger: Arc<Ledger>,
}

impl Reconciler {
    /// Create a reconciler over the tracker and ledger stores.
    #[must_use]
    pub fn new(tracker: Arc<OrderTracker>, ledger: Arc<Ledger>) -> Self {
        Self { tracker, ledger }
    }

    /// Apply one broker view to a record: sync status, derive the fill
    /// delta, advance the lifecycle, and persist the record.
    ///
    /// # Errors
    ///
    /// Returns a `RecoveryError` if the ledger append or the record save
    /// fails; in that case the delta cursor has not advanced and the next
    /// poll retries safely.
    pub async fn apply_view(
        &self,
        record: &mut ExecutionOrderRecord,
        view: &BrokerOrderView,
    ) -> Result<ReconcileOutcome, RecoveryError> {
        let mut outcome = ReconcileOutcome::default();

        record.status_raw = view.status_raw.clone();
        record.status_norm = view.status_norm;
        record.last_broker_sync_at = chrono::Utc::now();

        // A rejection is terminal and produces no ledger writes.
        if view.status_norm == NormalizedStatus::Rejected {
            self.advance_lifecycle(record, &mut outcome);
            self.tracker.save(record).await?;
            return Ok(outcome);
        }

        // Cumulative-to-incremental fill derivation.
        let reported = view.filled_qty;
        if reported > record.filled_qty_seen {
            let mut delta = reported - record.filled_qty_seen;
            let remaining = record.qty - record.filled_qty_seen;
            if delta > remaining {
                warn!(
                    broker_order_id = %record.broker_order_id,
                    reported = %reported,
                    submitted = %record.qty,
                    "broker reported more than the submitted quantity; clamping"
                );
                delta = remaining;
            }

            if delta > Decimal::ZERO {
                let fill = FillEvent {
                    fill_id: FillEvent::derive_id(&record.broker_order_id, record.next_fill_seq),
                    broker_order_id: record.broker_order_id.clone(),
                    fill_seq: record.next_fill_seq,
                    intent_id: record.intent_id.clone(),
                    symbol: record.symbol.clone(),
                    side: record.side,
                    qty: delta,
                    price: view
                        .avg_price
                        .or(record.limit_price)
                        .unwrap_or(Decimal::ZERO),
                    asset_class: record.asset_class,
                    timestamp: chrono::Utc::now(),
                };

                self.ledger
                    .append(&record.tenant_id, &record.user_id, &fill)
                    .await?;

                // Cursor advances only after the append landed.
                record.filled_qty_seen += delta;
                record.next_fill_seq += 1;
                outcome.appended_fills += 1;

                debug!(
                    broker_order_id = %record.broker_order_id,
                    fill_seq = fill.fill_seq,
                    delta = %delta,
                    "fill delta reconciled"
                );
            }
        }

        self.advance_lifecycle(record, &mut outcome);
        self.tracker.save(record).await?;
        Ok(outcome)
    }

    /// Advance the lifecycle toward the normalized broker status, if the
    /// canonical table permits it. Invalid transitions are logged and
    /// dropped; the state does not move.
    fn advance_lifecycle(&self, record: &mut ExecutionOrderRecord, outcome: &mut ReconcileOutcome) {
        let Some(target) = record.status_norm.to_lifecycle() else {
            // UNKNOWN carries no lifecycle information.
            return;
        };
        if target == record.lifecycle {
            return;
        }

        match LifecycleMachine::apply(record.lifecycle, target) {
            Ok(state) => {
                record.lifecycle = state;
                if state.is_terminal() {
                    outcome.became_terminal = true;
                }
            }
            Err(e) => {
                error!(
                    broker_order_id = %record.broker_order_id,
                    error = %e,
                    "lifecycle transition dropped"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBroker;
    use crate::domain::{
        AssetClass, BrokerOrderId, IntentContext, IntentId, LifecycleState, OrderIntent,
        OrderSide, OrderType, StrategyId, TenantId, TimeInForce, UserId,
    };
    use rust_decimal_macros::dec;

    async fn fixtures() -> (Arc<OrderTracker>, Arc<Ledger>, Reconciler) {
        let db = turso::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        let tracker = Arc::new(OrderTracker::new(db.clone()).await.unwrap());
        let ledger = Arc::new(Ledger::new(db).await.unwrap());
        let reconciler = Reconciler::new(Arc::clone(&tracker), Arc::clone(&ledger));
        (tracker, ledger, reconciler)
    }

    fn record() -> ExecutionOrderRecord {
        let intent = OrderIntent {
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
        };
        ExecutionOrderRecord::from_submission(
            &intent,
            BrokerOrderId::new("o1"),
            "accepted".to_string(),
            crate::broker::NormalizedStatus::Accepted,
            LifecycleState::Accepted,
            chrono::Utc::now(),
        )
    }

    #[tokio::test]
    async fn full_fill_appends_delta_and_terminates() {
        let (_tracker, ledger, reconciler) = fixtures().await;
        let mut r = record();

        let view = MockBroker::view("o1", "filled", dec!(10), Some(dec!(150.03)));
        let outcome = reconciler.apply_view(&mut r, &view).await.unwrap();

        assert_eq!(outcome.appended_fills, 1);
        assert!(outcome.became_terminal);
        assert_eq!(r.lifecycle, LifecycleState::Filled);
        assert_eq!(r.filled_qty_seen, dec!(10));
        assert_eq!(r.next_fill_seq, 2);

        let fills = ledger
            .fills_for_order(&TenantId::new("t1"), &BrokerOrderId::new("o1"))
            .await
            .unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].qty, dec!(10));
        assert_eq!(fills[0].price, dec!(150.03));
    }

    #[tokio::test]
    async fn partial_fills_emit_increasing_sequences() {
        let (_tracker, ledger, reconciler) = fixtures().await;
        let mut r = record();

        let first = MockBroker::view("o1", "partially_filled", dec!(2), Some(dec!(1.20)));
        reconciler.apply_view(&mut r, &first).await.unwrap();
        assert_eq!(r.lifecycle, LifecycleState::PartiallyFilled);

        let second = MockBroker::view("o1", "canceled", dec!(3), Some(dec!(1.20)));
        let outcome = reconciler.apply_view(&mut r, &second).await.unwrap();
        assert_eq!(outcome.appended_fills, 1);
        assert!(outcome.became_terminal);
        assert_eq!(r.lifecycle, LifecycleState::Cancelled);

        let fills = ledger
            .fills_for_order(&TenantId::new("t1"), &BrokerOrderId::new("o1"))
            .await
            .unwrap();
        let seqs: Vec<u32> = fills.iter().map(|f| f.fill_seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        let total: Decimal = fills.iter().map(|f| f.qty).sum();
        assert_eq!(total, dec!(3));
    }

    #[tokio::test]
    async fn repeated_view_emits_nothing_new() {
        let (_tracker, ledger, reconciler) = fixtures().await;
        let mut r = record();

        let view = MockBroker::view("o1", "partially_filled", dec!(2), Some(dec!(1.20)));
        reconciler.apply_view(&mut r, &view).await.unwrap();
        let outcome = reconciler.apply_view(&mut r, &view).await.unwrap();

        assert_eq!(outcome.appended_fills, 0);
        let fills = ledger
            .fills_for_order(&TenantId::new("t1"), &BrokerOrderId::new("o1"))
            .await
            .unwrap();
        assert_eq!(fills.len(), 1);
    }

    #[tokio::test]
    async fn rejection_writes_no_fills() {
        let (_tracker, ledger, reconciler) = fixtures().await;
        let mut r = record();

        // Even a bogus filled_qty on a rejection must not reach the ledger.
        let view = MockBroker::view("o1", "rejected", dec!(5), Some(dec!(1.0)));
        let outcome = reconciler.apply_view(&mut r, &view).await.unwrap();

        assert!(outcome.became_terminal);
        assert_eq!(r.lifecycle, LifecycleState::Rejected);
        assert!(
            ledger
                .fills_for_order(&TenantId::new("t1"), &BrokerOrderId::new("o1"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn over_reported_fill_is_clamped_to_submitted_qty() {
        let (_tracker, ledger, reconciler) = fixtures().await;
        let mut r = record();

        let view = MockBroker::view("o1", "filled", dec!(12), Some(dec!(150.00)));
        reconciler.apply_view(&mut r, &view).await.unwrap();

        let total = ledger
            .filled_qty_for_order(&TenantId::new("t1"), &BrokerOrderId::new("o1"))
            .await
            .unwrap();
        assert_eq!(total, dec!(10));
        assert_eq!(r.filled_qty_seen, dec!(10));
    }

    #[tokio::test]
    async fn unknown_status_does_not_move_lifecycle() {
        let (_tracker, _ledger, reconciler) = fixtures().await;
        let mut r = record();

        let view = MockBroker::view("o1", "pending_replace", dec!(0), None);
        let outcome = reconciler.apply_view(&mut r, &view).await.unwrap();

        assert!(!outcome.became_terminal);
        assert_eq!(r.lifecycle, LifecycleState::Accepted);
        assert_eq!(r.status_norm, NormalizedStatus::Unknown);
    }

    #[tokio::test]
    async fn terminal_record_ignores_further_status_changes() {
        let (_tracker, _ledger, reconciler) = fixtures().await;
        let mut r = record();
        r.lifecycle = LifecycleState::Filled;
        r.filled_qty_seen = dec!(10);

        let view = MockBroker::view("o1", "canceled", dec!(10), None);
        let outcome = reconciler.apply_view(&mut r, &view).await.unwrap();

        assert!(!outcome.became_terminal);
        assert_eq!(r.lifecycle, LifecycleState::Filled);
    }

    #[tokio::test]
    async fn persisted_cursor_survives_reload() {
        let (tracker, _ledger, reconciler) = fixtures().await;
        let mut r = record();

        let view = MockBroker::view("o1", "partially_filled", dec!(4), Some(dec!(1.0)));
        reconciler.apply_view(&mut r, &view).await.unwrap();

        let reloaded = tracker
            .get(&TenantId::new("t1"), &IntentId::new("i-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.filled_qty_seen, dec!(4));
        assert_eq!(reloaded.next_fill_seq, 2);
    }
}
