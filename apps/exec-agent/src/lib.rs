// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Execution core of the trading platform.
//!
//! The pipeline from order intent to broker to ledger:
//!
//! - **domain**: intents, the lifecycle machine, fills, quotes. Pure.
//! - **safety**: the composite allow/deny gate ahead of every broker
//!   call, including the kill-switch and the per-user trading flag.
//! - **broker**: the uniform adapter contract over a paper/live broker,
//!   its HTTP implementation, and the status normalization table.
//! - **ledger**: the append-only, tenant-scoped fill store with the
//!   best-effort per-user portfolio mirror.
//! - **tracker**: durable execution order records, the shared
//!   reconciler (cumulative-to-incremental fill derivation), and the
//!   recovery loop.
//! - **engine**: the dispatcher tying it all together behind
//!   `execute(intent)`.
//! - **server**: the axum admin surface (`/health`, `/status`,
//!   `/intents`, `/orders`, `/orders/recover`).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Environment-driven configuration.
pub mod config;

/// Domain types and the lifecycle machine.
pub mod domain;

/// The safety gate and per-user policy.
pub mod safety;

/// Broker adapter port and implementations.
pub mod broker;

/// Append-only fill ledger.
pub mod ledger;

/// Order tracker, reconciler, and recovery loop.
pub mod tracker;

/// The execution engine.
pub mod engine;

/// Admin HTTP surface.
pub mod server;

/// Prometheus metrics.
pub mod observability;

pub use broker::{BrokerAdapter, BrokerError, HttpBroker, MockBroker, NormalizedStatus};
pub use config::{Config, ConfigError, TradingMode, UrlClass};
pub use domain::{
    AssetClass, FillEvent, IntentContext, LifecycleMachine, LifecycleState, OrderIntent,
    OrderSide, OrderType, Quote, TimeInForce,
};
pub use engine::{ExecutionEngine, ExecutionResult, ExecutionStatus};
pub use ledger::{AppendOutcome, Ledger};
pub use safety::{
    DenyReason, GateDecision, InMemoryUserPolicy, SafetyController, TursoUserPolicyStore,
    UserPolicyStore,
};
pub use server::{AppState, create_router};
pub use tracker::{ExecutionOrderRecord, OrderTracker, RecoveryLoop, RecoverySummary};
