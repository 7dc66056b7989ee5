//! The recovery loop: sweep open orders, cancel the timed-out, reconcile
//! the rest.
//!
//! Runs on demand (admin trigger) and optionally on a periodic schedule.
//! Per-record errors are caught and logged; one poisoned record cannot
//! halt the sweep. When a pass exits, every previously-open order has
//! either advanced to a terminal state, been observed legitimately open
//! within its timeout, or been cancelled and reconciled.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::broker::{BrokerAdapter, BrokerError};
use crate::config::TimeoutConfig;
use crate::domain::TenantId;
use crate::ledger::Ledger;
use crate::observability;
use crate::safety::SafetyController;

use super::reconcile::{Reconciler, RecoveryError};
use super::store::{ExecutionOrderRecord, OrderTracker, TrackerError};

/// Which tenants a replica owns.
///
/// Multiple replicas split tenants by hash so no two loops sweep the same
/// tenant.
#[derive(Debug, Clone, Copy)]
pub struct ShardConfig {
    /// This replica's index.
    pub index: u64,
    /// Total replica count.
    pub count: u64,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self { index: 0, count: 1 }
    }
}

impl ShardConfig {
    /// Whether this replica owns the given tenant.
    #[must_use]
    pub fn owns(&self, tenant_id: &TenantId) -> bool {
        if self.count <= 1 {
            return true;
        }
        let mut hasher = DefaultHasher::new();
        tenant_id.as_str().hash(&mut hasher);
        hasher.finish() % self.count == self.index
    }
}

/// Summary of one recovery pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RecoverySummary {
    /// Broker polls performed.
    pub polled: u64,
    /// Cancel calls issued for timed-out orders.
    pub cancelled: u64,
    /// Records that had fill deltas appended.
    pub reconciled: u64,
    /// Records that reached a terminal state this pass.
    pub terminal: u64,
}

/// Periodic sweep over stuck or stale broker orders.
pub struct RecoveryLoop {
    tracker: Arc<OrderTracker>,
    broker: Arc<dyn BrokerAdapter>,
    reconciler: Reconciler,
    gate: Arc<SafetyController>,
    timeouts: TimeoutConfig,
    shard: ShardConfig,
}

impl RecoveryLoop {
    /// Create a recovery loop over the given stores and broker.
    ///
    /// The safety gate's kill-switch also binds here: while halted, the
    /// loop polls but never cancels.
    #[must_use]
    pub fn new(
        tracker: Arc<OrderTracker>,
        ledger: Arc<Ledger>,
        broker: Arc<dyn BrokerAdapter>,
        gate: Arc<SafetyController>,
        timeouts: TimeoutConfig,
    ) -> Self {
        let reconciler = Reconciler::new(Arc::clone(&tracker), ledger);
        Self {
            tracker,
            broker,
            reconciler,
            gate,
            timeouts,
            shard: ShardConfig::default(),
        }
    }

    /// Restrict this loop to its shard of tenants.
    #[must_use]
    pub const fn with_shard(mut self, shard: ShardConfig) -> Self {
        self.shard = shard;
        self
    }

    /// Run one pass for a single tenant.
    ///
    /// # Errors
    ///
    /// Returns a `TrackerError` only if the open-order listing itself
    /// fails; per-record failures are logged and skipped.
    pub async fn run_once(&self, tenant_id: &TenantId) -> Result<RecoverySummary, TrackerError> {
        let open = self.tracker.open_orders(tenant_id).await?;
        let mut summary = RecoverySummary::default();

        for mut record in open {
            if let Err(e) = self.process_record(&mut record, &mut summary).await {
                warn!(
                    tenant_id = %tenant_id,
                    intent_id = %record.intent_id,
                    broker_order_id = %record.broker_order_id,
                    error = %e,
                    "recovery skipped record"
                );
            }
        }

        info!(
            tenant_id = %tenant_id,
            polled = summary.polled,
            cancelled = summary.cancelled,
            reconciled = summary.reconciled,
            terminal = summary.terminal,
            "recovery pass complete"
        );
        observability::record_recovery_pass(&summary);

        Ok(summary)
    }

    /// Run one pass for every tenant this replica owns.
    ///
    /// # Errors
    ///
    /// Returns a `TrackerError` if the tenant listing fails.
    pub async fn run_all(&self) -> Result<RecoverySummary, TrackerError> {
        let mut total = RecoverySummary::default();
        for tenant_id in self.tracker.tenants_with_open_orders().await? {
            if !self.shard.owns(&tenant_id) {
                continue;
            }
            let summary = self.run_once(&tenant_id).await?;
            total.polled += summary.polled;
            total.cancelled += summary.cancelled;
            total.reconciled += summary.reconciled;
            total.terminal += summary.terminal;
        }
        Ok(total)
    }

    /// Handle one open record: cancel on timeout, otherwise poll when
    /// stale, and reconcile whatever the broker reports.
    async fn process_record(
        &self,
        record: &mut ExecutionOrderRecord,
        summary: &mut RecoverySummary,
    ) -> Result<(), RecoveryError> {
        let now = chrono::Utc::now();
        let age = now
            .signed_duration_since(record.created_at)
            .to_std()
            .unwrap_or_default();
        let since_sync = now
            .signed_duration_since(record.last_broker_sync_at)
            .to_std()
            .unwrap_or_default();

        let timeout = self
            .timeouts
            .order_timeout(record.asset_class, record.order_type);

        if age >= timeout {
            if self.gate.is_halted() {
                // Kill-switch: no broker writes, not even cancels. Fall
                // back to a stale poll so the record keeps reconciling.
                warn!(
                    broker_order_id = %record.broker_order_id,
                    "execution halted; skipping timeout cancel"
                );
                if since_sync >= self.timeouts.stale_after() {
                    self.poll_and_reconcile(record, summary).await?;
                }
                return Ok(());
            }

            // Timed out and still open: force a cancel, then re-poll once
            // to capture any trailing partial fill.
            match self.broker.cancel(&record.broker_order_id).await {
                Ok(()) | Err(BrokerError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            summary.cancelled += 1;
            info!(
                broker_order_id = %record.broker_order_id,
                age_secs = age.as_secs(),
                timeout_secs = timeout.as_secs(),
                "timed-out order cancelled"
            );

            match self.poll_and_reconcile(record, summary).await {
                Ok(()) => {}
                // Best-effort: the next pass catches up.
                Err(e) => warn!(
                    broker_order_id = %record.broker_order_id,
                    error = %e,
                    "post-cancel poll failed"
                ),
            }
            return Ok(());
        }

        if since_sync >= self.timeouts.stale_after() {
            self.poll_and_reconcile(record, summary).await?;
        }

        Ok(())
    }

    async fn poll_and_reconcile(
        &self,
        record: &mut ExecutionOrderRecord,
        summary: &mut RecoverySummary,
    ) -> Result<(), RecoveryError> {
        let view = match self.broker.get_order(&record.broker_order_id).await {
            Ok(view) => view,
            // An unknown id is success for an idempotent poll; the record
            // simply stays as-is until the broker knows it again.
            Err(BrokerError::NotFound { .. }) => {
                warn!(
                    broker_order_id = %record.broker_order_id,
                    "broker does not know this order; leaving record untouched"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        summary.polled += 1;

        let outcome = self.reconciler.apply_view(record, &view).await?;
        if outcome.appended_fills > 0 {
            summary.reconciled += 1;
        }
        if outcome.became_terminal {
            summary.terminal += 1;
        }
        Ok(())
    }
}
