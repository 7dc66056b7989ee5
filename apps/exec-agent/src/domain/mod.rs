//! Domain layer: intents, lifecycle, fills, quotes.
//!
//! Pure data and pure functions; no I/O.

mod fill;
mod identifiers;
mod intent;
mod lifecycle;
mod quote;

pub use fill::FillEvent;
pub use identifiers::{BrokerOrderId, IntentId, StrategyId, TenantId, UserId};
pub use intent::{
    AssetClass, IntentContext, IntentError, OrderIntent, OrderSide, OrderType, TimeInForce,
};
pub use lifecycle::{LifecycleError, LifecycleMachine, LifecycleState};
pub use quote::Quote;
