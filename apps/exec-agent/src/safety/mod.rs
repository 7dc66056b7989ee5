//! The hard safety gate consulted before every broker call.
//!
//! All process-wide mutable gate state lives behind a single mutex on the
//! [`SafetyController`]; writes are linearizable. The gate is fail-closed:
//! missing or unparseable input denies.

mod controller;
mod policy;

pub use controller::{DenyReason, GateDecision, GateSnapshot, SafetyController};
pub use policy::{InMemoryUserPolicy, PolicyError, TursoUserPolicyStore, UserPolicyStore};
