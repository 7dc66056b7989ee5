//! Safety gate configuration.

use serde::{Deserialize, Serialize};

use super::{ConfigError, env_bool, env_opt};

/// Operational trading mode declared by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradingMode {
    /// Decisions are computed but never executed against a live endpoint.
    Shadow,
    /// Paper trading (simulated money).
    Paper,
    /// Live trading (real money).
    Live,
}

impl TradingMode {
    /// Parse a mode string (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for anything other than
    /// shadow/paper/live; the gate is fail-closed, so guessing is not an
    /// option.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_lowercase().as_str() {
            "shadow" => Ok(Self::Shadow),
            "paper" => Ok(Self::Paper),
            "live" => Ok(Self::Live),
            _ => Err(ConfigError::InvalidValue {
                key: "TRADING_MODE",
                value: value.to_string(),
            }),
        }
    }

    /// Whether this mode requires a live broker endpoint.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shadow => write!(f, "SHADOW"),
            Self::Paper => write!(f, "PAPER"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

/// Initial safety gate state, loaded once at startup.
///
/// The mutable pieces (`execution_halted`, the confirm token, the guard
/// unlock) are owned by the `SafetyController` afterwards; this struct is
/// only their boot values.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Operational mode (`TRADING_MODE`, default shadow).
    pub mode: TradingMode,
    /// Global execution enablement (`EXECUTION_ENABLED`, default off).
    pub execution_enabled: bool,
    /// Kill-switch boot value (`EXECUTION_HALTED`, default on).
    pub execution_halted: bool,
    /// Single-shot guard unlock (`EXEC_GUARD_UNLOCK`, default locked).
    pub exec_guard_unlock: bool,
    /// Required per-submission token (`EXECUTION_CONFIRM_TOKEN`).
    pub confirm_token: Option<String>,
}

impl GateConfig {
    /// Load gate configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` on an unparseable mode or boolean.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = match env_opt("TRADING_MODE") {
            Some(v) => TradingMode::parse(&v)?,
            None => TradingMode::Shadow,
        };

        Ok(Self {
            mode,
            execution_enabled: env_bool("EXECUTION_ENABLED", false)?,
            // The kill-switch defaults to engaged: an operator must
            // explicitly clear it before any broker call is possible.
            execution_halted: env_bool("EXECUTION_HALTED", true)?,
            exec_guard_unlock: env_bool("EXEC_GUARD_UNLOCK", false)?,
            confirm_token: env_opt("EXECUTION_CONFIRM_TOKEN"),
        })
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::Shadow,
            execution_enabled: false,
            execution_halted: true,
            exec_guard_unlock: false,
            confirm_token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parse_case_insensitive() {
        assert_eq!(TradingMode::parse("PAPER").unwrap(), TradingMode::Paper);
        assert_eq!(TradingMode::parse("live").unwrap(), TradingMode::Live);
        assert_eq!(TradingMode::parse("Shadow").unwrap(), TradingMode::Shadow);
    }

    #[test]
    fn mode_parse_rejects_unknown() {
        assert!(TradingMode::parse("backtest").is_err());
        assert!(TradingMode::parse("").is_err());
    }

    #[test]
    fn default_is_locked_down() {
        let config = GateConfig::default();
        assert_eq!(config.mode, TradingMode::Shadow);
        assert!(!config.execution_enabled);
        assert!(config.execution_halted);
        assert!(!config.exec_guard_unlock);
        assert!(config.confirm_token.is_none());
    }

    #[test]
    fn mode_display() {
        assert_eq!(format!("{}", TradingMode::Live), "LIVE");
        assert_eq!(format!("{}", TradingMode::Paper), "PAPER");
    }
}
