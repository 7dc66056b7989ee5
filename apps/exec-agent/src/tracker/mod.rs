//! Order tracker and recovery loop.
//!
//! The tracker persists one durable record per `(tenant_id, intent_id)`;
//! the recovery loop sweeps open records, cancels the timed-out, and
//! routes fill deltas to the ledger through the shared reconciler.

mod reconcile;
mod recovery;
mod store;

pub use reconcile::{ReconcileOutcome, Reconciler, RecoveryError};
pub use recovery::{RecoveryLoop, RecoverySummary, ShardConfig};
pub use store::{ExecutionOrderRecord, OrderTracker, TrackerError};
