//! Process-wide safety gate state and decision logic.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::config::{GateConfig, TradingMode, UrlClass};

/// Machine-readable reason for a gate denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    /// The kill-switch is engaged.
    Halted,
    /// Declared mode and broker endpoint class disagree.
    ModeUrlMismatch,
    /// Execution disabled or the guard is locked.
    GuardLocked,
    /// The required confirm token is absent.
    TokenMissing,
    /// Trading is disabled for this user.
    UserDisabled,
}

impl DenyReason {
    /// Stable wire string for this reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Halted => "HALTED",
            Self::ModeUrlMismatch => "MODE_URL_MISMATCH",
            Self::GuardLocked => "GUARD_LOCKED",
            Self::TokenMissing => "TOKEN_MISSING",
            Self::UserDisabled => "USER_DISABLED",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a gate consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The broker call may proceed. The confirm token has been consumed
    /// and auto-lockdown is armed: the engine must call
    /// [`SafetyController::lockdown`] once the broker call succeeds.
    Allow,
    /// The broker call must not happen.
    Deny(DenyReason),
}

/// Point-in-time gate state for the `/status` surface. Carries no secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSnapshot {
    /// Operational mode.
    pub mode: TradingMode,
    /// Global enablement flag.
    pub execution_enabled: bool,
    /// Kill-switch state.
    pub execution_halted: bool,
    /// Guard unlock state.
    pub exec_guard_unlocked: bool,
    /// Endpoint classification.
    pub broker_url_class: UrlClass,
    /// Whether a confirm token is currently loaded.
    pub confirm_token_present: bool,
}

/// Mutable gate state; one mutex, linearizable writes.
#[derive(Debug)]
struct GateState {
    halted: bool,
    guard_unlocked: bool,
    confirm_token: Option<String>,
}

/// The composite allow/deny check preceding any broker write.
///
/// Owned by the engine and passed by reference into every component that
/// performs broker I/O. Nothing here reads the environment; boot values
/// come from [`GateConfig`].
#[derive(Debug)]
pub struct SafetyController {
    mode: TradingMode,
    execution_enabled: bool,
    url_class: UrlClass,
    state: Mutex<GateState>,
}

impl SafetyController {
    /// Build a controller from boot configuration and the classified
    /// broker endpoint.
    #[must_use]
    pub fn new(config: &GateConfig, url_class: UrlClass) -> Self {
        Self {
            mode: config.mode,
            execution_enabled: config.execution_enabled,
            url_class,
            state: Mutex::new(GateState {
                halted: config.execution_halted,
                guard_unlocked: config.exec_guard_unlock,
                confirm_token: config.confirm_token.clone(),
            }),
        }
    }

    /// Steps 1-4 of the decision order, against a locked state.
    fn evaluate(&self, state: &GateState) -> Option<DenyReason> {
        if state.halted {
            return Some(DenyReason::Halted);
        }
        // LIVE mode must point at a live endpoint and vice versa.
        if self.mode.is_live() != matches!(self.url_class, UrlClass::Live) {
            return Some(DenyReason::ModeUrlMismatch);
        }
        if !self.execution_enabled || !state.guard_unlocked {
            return Some(DenyReason::GuardLocked);
        }
        if state.confirm_token.is_none() {
            return Some(DenyReason::TokenMissing);
        }
        None
    }

    /// Cheap pre-check of steps 1-4, without consuming the token.
    ///
    /// Lets the caller skip the per-user policy read when the gate would
    /// deny anyway.
    ///
    /// # Errors
    ///
    /// Returns the first failing deny reason.
    pub fn precheck(&self) -> Result<(), DenyReason> {
        let state = match self.state.lock() {
            Ok(guard) => guard,
            // A poisoned gate denies; fail-closed.
            Err(_) => return Err(DenyReason::Halted),
        };
        match self.evaluate(&state) {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Final decision with the per-user flag in hand.
    ///
    /// Re-evaluates steps 1-4 under the lock (the state may have moved
    /// since `precheck`), then applies the user check, and on allow
    /// consumes the confirm token.
    pub fn finalize(&self, user_trading_enabled: bool) -> GateDecision {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => return GateDecision::Deny(DenyReason::Halted),
        };

        if let Some(reason) = self.evaluate(&state) {
            return GateDecision::Deny(reason);
        }
        if !user_trading_enabled {
            return GateDecision::Deny(DenyReason::UserDisabled);
        }

        // Single-use: one token admits one broker submission.
        state.confirm_token = None;
        GateDecision::Allow
    }

    /// Engage the kill-switch.
    ///
    /// Called by the engine after a successful single-shot execution
    /// (auto-lockdown), and available to operators. Never terminates the
    /// process.
    pub fn lockdown(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.halted = true;
            tracing::warn!("execution halted (kill-switch engaged)");
        }
    }

    /// Disengage the kill-switch (operator action).
    pub fn clear_halt(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.halted = false;
            tracing::warn!("execution halt cleared by operator");
        }
    }

    /// Load a fresh confirm token (operator action; one token admits one
    /// broker submission).
    pub fn set_confirm_token(&self, token: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.confirm_token = Some(token.into());
        }
    }

    /// Whether the kill-switch is currently engaged.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.state.lock().map(|s| s.halted).unwrap_or(true)
    }

    /// Snapshot for the `/status` surface.
    #[must_use]
    pub fn snapshot(&self) -> GateSnapshot {
        let (halted, unlocked, token_present) = match self.state.lock() {
            Ok(state) => (
                state.halted,
                state.guard_unlocked,
                state.confirm_token.is_some(),
            ),
            Err(_) => (true, false, false),
        };
        GateSnapshot {
            mode: self.mode,
            execution_enabled: self.execution_enabled,
            execution_halted: halted,
            exec_guard_unlocked: unlocked,
            broker_url_class: self.url_class,
            confirm_token_present: token_present,
        }
    }
}
