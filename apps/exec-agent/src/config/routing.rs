//! Smart-routing (cost gate) configuration.

use rust_decimal::Decimal;

use crate::domain::AssetClass;

use super::{ConfigError, env_bool, env_opt};

/// Smart-routing thresholds.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// Whether the cost gate runs at all (`EXEC_SMART_ROUTING_ENABLED`).
    pub enabled: bool,
    /// Global spread override applied to every asset class
    /// (`EXEC_MAX_SPREAD_PCT`, e.g. `0.001` = 0.1%).
    pub max_spread_override: Option<Decimal>,
}

impl RoutingConfig {
    /// Load routing configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` on an unparseable boolean or decimal.
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_spread_override = match env_opt("EXEC_MAX_SPREAD_PCT") {
            None => None,
            Some(v) => Some(v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "EXEC_MAX_SPREAD_PCT",
                value: v,
            })?),
        };

        Ok(Self {
            enabled: env_bool("EXEC_SMART_ROUTING_ENABLED", true)?,
            max_spread_override,
        })
    }

    /// Default spread threshold for an asset class, if the class is
    /// routed at all.
    #[must_use]
    pub fn default_threshold(asset_class: AssetClass) -> Option<Decimal> {
        match asset_class {
            AssetClass::Equity => Some(Decimal::new(1, 3)),  // 0.1%
            AssetClass::Forex => Some(Decimal::new(5, 4)),   // 0.05%
            AssetClass::Crypto => Some(Decimal::new(2, 3)),  // 0.2%
            AssetClass::Option => Some(Decimal::new(5, 3)),  // 0.5%
            AssetClass::Future => None,
        }
    }

    /// Effective threshold for an asset class after the global override.
    ///
    /// Per-intent overrides (`metadata.max_slippage_pct`) take precedence
    /// over this at the engine.
    #[must_use]
    pub fn threshold_for(&self, asset_class: AssetClass) -> Option<Decimal> {
        Self::default_threshold(asset_class).map(|d| self.max_spread_override.unwrap_or(d))
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_spread_override: None,
        }
    }
}
