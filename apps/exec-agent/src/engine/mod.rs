//! The execution engine: the dispatcher from intent to broker to ledger.
//!
//! `execute` is safe to call from multiple tasks; intents serialize on a
//! striped per-intent lock, and two calls with the same `intent_id`
//! produce at most one broker order.

mod routing;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::broker::{BrokerAdapter, BrokerError, NormalizedStatus};
use crate::config::RoutingConfig;
use crate::domain::{BrokerOrderId, IntentId, LifecycleState, OrderIntent};
use crate::ledger::Ledger;
use crate::observability;
use crate::safety::{GateDecision, SafetyController, UserPolicyStore};
use crate::tracker::{ExecutionOrderRecord, OrderTracker, Reconciler};

pub use routing::{RoutingVerdict, evaluate as evaluate_routing, threshold_for};

/// Outcome status of an `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Order submitted to the broker.
    Placed,
    /// Smart routing downgraded the intent; no broker call was made.
    Downgraded,
    /// The safety gate denied the call; no side effects.
    Blocked,
    /// The broker rejected the order.
    Rejected,
    /// A recoverable failure; see `retryable`.
    Error,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Placed => write!(f, "PLACED"),
            Self::Downgraded => write!(f, "DOWNGRADED"),
            Self::Blocked => write!(f, "BLOCKED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Structured result of an `execute` call.
///
/// All recoverable failures surface here; `execute` never panics on
/// broker or store trouble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Outcome status.
    pub status: ExecutionStatus,
    /// The intent this result answers.
    pub intent_id: IntentId,
    /// Broker order id, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_order_id: Option<BrokerOrderId>,
    /// Machine-readable reason for non-placed outcomes; rendered to the
    /// user verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Observed spread, on downgrades.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread_pct: Option<Decimal>,
    /// Whether the caller may retry (only meaningful for `ERROR`).
    #[serde(default)]
    pub retryable: bool,
}

impl ExecutionResult {
    fn placed(intent_id: IntentId, broker_order_id: BrokerOrderId) -> Self {
        Self {
            status: ExecutionStatus::Placed,
            intent_id,
            broker_order_id: Some(broker_order_id),
            reason: None,
            spread_pct: None,
            retryable: false,
        }
    }

    fn downgraded(intent_id: IntentId, spread_pct: Decimal) -> Self {
        Self {
            status: ExecutionStatus::Downgraded,
            intent_id,
            broker_order_id: None,
            reason: Some("SPREAD_EXCEEDED".to_string()),
            spread_pct: Some(spread_pct),
            retryable: false,
        }
    }

    fn blocked(intent_id: IntentId, reason: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Blocked,
            intent_id,
            broker_order_id: None,
            reason: Some(reason.into()),
            spread_pct: None,
            retryable: false,
        }
    }

    fn rejected(
        intent_id: IntentId,
        broker_order_id: Option<BrokerOrderId>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            status: ExecutionStatus::Rejected,
            intent_id,
            broker_order_id,
            reason: Some(reason.into()),
            spread_pct: None,
            retryable: false,
        }
    }

    fn error(intent_id: IntentId, reason: impl Into<String>, retryable: bool) -> Self {
        Self {
            status: ExecutionStatus::Error,
            intent_id,
            broker_order_id: None,
            reason: Some(reason.into()),
            spread_pct: None,
            retryable,
        }
    }
}

/// Striped async locks keyed by intent id.
struct IntentLocks {
    stripes: Vec<tokio::sync::Mutex<()>>,
}

impl IntentLocks {
    const STRIPES: usize = 16;

    fn new() -> Self {
        Self {
            stripes: (0..Self::STRIPES)
                .map(|_| tokio::sync::Mutex::new(()))
                .collect(),
        }
    }

    fn for_intent(&self, intent_id: &IntentId) -> &tokio::sync::Mutex<()> {
        let mut hasher = DefaultHasher::new();
        intent_id.as_str().hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.stripes.len();
        &self.stripes[idx]
    }
}

/// The dispatcher: smart routing, safety gate, broker submission,
/// tracking, and immediate reconciliation.
pub struct ExecutionEngine {
    broker: Arc<dyn BrokerAdapter>,
    tracker: Arc<OrderTracker>,
    reconciler: Reconciler,
    gate: Arc<SafetyController>,
    policy: Arc<dyn UserPolicyStore>,
    routing: RoutingConfig,
    locks: IntentLocks,
}

impl ExecutionEngine {
    /// Wire up the engine.
    #[must_use]
    pub fn new(
        broker: Arc<dyn BrokerAdapter>,
        tracker: Arc<OrderTracker>,
        ledger: Arc<Ledger>,
        gate: Arc<SafetyController>,
        policy: Arc<dyn UserPolicyStore>,
        routing: RoutingConfig,
    ) -> Self {
        let reconciler = Reconciler::new(Arc::clone(&tracker), ledger);
        Self {
            broker,
            tracker,
            reconciler,
            gate,
            policy,
            routing,
            locks: IntentLocks::new(),
        }
    }

    /// Execute one intent end-to-end.
    pub async fn execute(&self, intent: OrderIntent) -> ExecutionResult {
        let result = self.execute_inner(intent).await;
        observability::record_execution(&result.status.to_string());
        result
    }

    async fn execute_inner(&self, intent: OrderIntent) -> ExecutionResult {
        let intent_id = intent.intent_id.clone();

        if let Err(e) = intent.validate() {
            warn!(intent_id = %intent_id, error = %e, "intent rejected at ingress");
            return ExecutionResult::error(intent_id, e.to_string(), false);
        }

        // Serialize per intent id: the second of two concurrent duplicates
        // waits here and then observes the first's record.
        let _guard = self.locks.for_intent(&intent_id).lock().await;

        match self
            .tracker
            .get(&intent.context.tenant_id, &intent_id)
            .await
        {
            Ok(Some(existing)) => {
                info!(
                    intent_id = %intent_id,
                    broker_order_id = %existing.broker_order_id,
                    "duplicate intent; returning existing submission"
                );
                return Self::result_from_record(&existing);
            }
            Ok(None) => {}
            Err(e) => {
                error!(intent_id = %intent_id, error = %e, "tracker lookup failed");
                return ExecutionResult::error(intent_id, e.to_string(), true);
            }
        }

        // Smart routing: cost gate ahead of everything else.
        if self.routing.enabled
            && let Some(verdict) = self.routing_verdict(&intent).await
            && let RoutingVerdict::Downgrade {
                spread_pct,
                threshold,
            } = verdict
        {
            info!(
                intent_id = %intent_id,
                symbol = %intent.symbol,
                spread_pct = %spread_pct,
                threshold = %threshold,
                "intent downgraded by smart routing"
            );
            return ExecutionResult::downgraded(intent_id, spread_pct);
        }

        // Safety gate: steps 1-4, then the per-user flag, fail-closed.
        if let Err(reason) = self.gate.precheck() {
            return ExecutionResult::blocked(intent_id, reason.as_str());
        }
        let user_enabled = match self
            .policy
            .is_trading_enabled(&intent.context.tenant_id, &intent.context.user_id)
            .await
        {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!(
                    intent_id = %intent_id,
                    error = %e,
                    "user policy read failed; denying"
                );
                false
            }
        };
        match self.gate.finalize(user_enabled) {
            GateDecision::Allow => {}
            GateDecision::Deny(reason) => {
                return ExecutionResult::blocked(intent_id, reason.as_str());
            }
        }

        // Broker submission.
        let ack = match self.broker.place(&intent).await {
            Ok(ack) => ack,
            Err(BrokerError::Rejected { code }) => {
                // The broker refused the order outright; nothing to track.
                warn!(intent_id = %intent_id, code = %code, "order rejected by broker");
                return ExecutionResult::rejected(intent_id, None, code);
            }
            Err(e) => {
                // Not retried here; the caller decides.
                warn!(intent_id = %intent_id, error = %e, "broker place failed");
                return ExecutionResult::error(intent_id, e.to_string(), true);
            }
        };

        let lifecycle = initial_lifecycle(ack.status_norm);
        let mut record = ExecutionOrderRecord::from_submission(
            &intent,
            ack.broker_order_id.clone(),
            ack.status_raw.clone(),
            ack.status_norm,
            lifecycle,
            chrono::Utc::now(),
        );

        if let Err(e) = self.tracker.save(&record).await {
            // The broker order exists; surface it even though tracking
            // failed, and leave recovery to the operator.
            error!(
                intent_id = %intent_id,
                broker_order_id = %record.broker_order_id,
                error = %e,
                "failed to persist execution order record"
            );
        }

        info!(
            intent_id = %intent_id,
            broker_order_id = %record.broker_order_id,
            status = %ack.status_raw,
            lifecycle = %record.lifecycle,
            "order placed"
        );

        // One bounded best-effort poll to capture instant fills. Broker
        // and ledger trouble here never fails the call; the recovery
        // loop catches up.
        if record.lifecycle.is_open() {
            match self.broker.get_order(&record.broker_order_id).await {
                Ok(view) => {
                    if let Err(e) = self.reconciler.apply_view(&mut record, &view).await {
                        warn!(
                            broker_order_id = %record.broker_order_id,
                            error = %e,
                            "immediate reconciliation failed"
                        );
                    } else if record.filled_qty_seen > Decimal::ZERO {
                        observability::record_ledger_append();
                    }
                }
                Err(e) => {
                    warn!(
                        broker_order_id = %record.broker_order_id,
                        error = %e,
                        "immediate poll failed"
                    );
                }
            }
        }

        // Auto-lockdown: one unlock admits one submission. Only on the
        // successful branch; a broker outage must not re-arm the
        // kill-switch for nothing.
        self.gate.lockdown();

        Self::result_from_record(&record)
    }

    /// Evaluate smart routing for the intent, if its class is routed.
    async fn routing_verdict(&self, intent: &OrderIntent) -> Option<RoutingVerdict> {
        threshold_for(intent, &self.routing)?;

        match self.broker.get_quote(&intent.symbol).await {
            Ok(quote) => Some(routing::evaluate(intent, &quote, &self.routing)),
            Err(e) => {
                // No quote, no evidence of a wide spread; the safety gate
                // still stands between the intent and the broker.
                warn!(
                    symbol = %intent.symbol,
                    error = %e,
                    "quote fetch failed; skipping cost gate"
                );
                None
            }
        }
    }

    fn result_from_record(record: &ExecutionOrderRecord) -> ExecutionResult {
        if record.lifecycle == LifecycleState::Rejected {
            ExecutionResult::rejected(
                record.intent_id.clone(),
                Some(record.broker_order_id.clone()),
                record.status_raw.clone(),
            )
        } else {
            ExecutionResult::placed(record.intent_id.clone(), record.broker_order_id.clone())
        }
    }
}

/// Lifecycle state implied by the place acknowledgment.
///
/// An instant fill on the ack still enters at `ACCEPTED`; the immediate
/// poll advances it through the canonical table.
const fn initial_lifecycle(status: NormalizedStatus) -> LifecycleState {
    match status {
        NormalizedStatus::Rejected => LifecycleState::Rejected,
        NormalizedStatus::New | NormalizedStatus::Unknown => LifecycleState::New,
        _ => LifecycleState::Accepted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_lifecycle_mapping() {
        assert_eq!(
            initial_lifecycle(NormalizedStatus::Accepted),
            LifecycleState::Accepted
        );
        assert_eq!(
            initial_lifecycle(NormalizedStatus::Rejected),
            LifecycleState::Rejected
        );
        assert_eq!(initial_lifecycle(NormalizedStatus::New), LifecycleState::New);
        assert_eq!(
            initial_lifecycle(NormalizedStatus::Unknown),
            LifecycleState::New
        );
        assert_eq!(
            initial_lifecycle(NormalizedStatus::Filled),
            LifecycleState::Accepted
        );
    }

    #[test]
    fn intent_locks_are_stable_per_id() {
        let locks = IntentLocks::new();
        let a = locks.for_intent(&IntentId::new("i-42")) as *const _;
        let b = locks.for_intent(&IntentId::new("i-42")) as *const _;
        assert_eq!(a, b);
    }

    #[test]
    fn execution_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Downgraded).unwrap(),
            "\"DOWNGRADED\""
        );
        assert_eq!(format!("{}", ExecutionStatus::Blocked), "BLOCKED");
    }
}
