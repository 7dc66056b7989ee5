//! Recovery-loop staleness and order-timeout configuration.

use std::time::Duration;

use crate::domain::{AssetClass, OrderType};

use super::{ConfigError, env_parse};

/// Timeout table for the order tracker and recovery loop.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Cancel cutoff for OPTION market orders
    /// (`EXEC_ORDER_TIMEOUT_S_OPTIONS_MARKET`).
    pub options_market_s: u64,
    /// Cancel cutoff for OPTION limit-like orders
    /// (`EXEC_ORDER_TIMEOUT_S_OPTIONS_LIMIT`).
    pub options_limit_s: u64,
    /// Cancel cutoff for market orders in other classes
    /// (`EXEC_ORDER_TIMEOUT_S_DEFAULT_MARKET`).
    pub default_market_s: u64,
    /// Cancel cutoff for limit-like orders in other classes
    /// (`EXEC_ORDER_TIMEOUT_S_DEFAULT_LIMIT`).
    pub default_limit_s: u64,
    /// Staleness threshold before a broker re-poll (`EXEC_ORDER_STALE_S`).
    pub stale_after_s: u64,
    /// Periodic sweep interval (`EXEC_RECOVER_INTERVAL_S`, 0 = admin
    /// trigger only).
    pub recover_interval_s: u64,
}

impl TimeoutConfig {
    /// Load the timeout table from the environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` on an unparseable number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            options_market_s: env_parse("EXEC_ORDER_TIMEOUT_S_OPTIONS_MARKET", 20)?,
            options_limit_s: env_parse("EXEC_ORDER_TIMEOUT_S_OPTIONS_LIMIT", 120)?,
            default_market_s: env_parse("EXEC_ORDER_TIMEOUT_S_DEFAULT_MARKET", 15)?,
            default_limit_s: env_parse("EXEC_ORDER_TIMEOUT_S_DEFAULT_LIMIT", 90)?,
            stale_after_s: env_parse("EXEC_ORDER_STALE_S", 60)?,
            recover_interval_s: env_parse("EXEC_RECOVER_INTERVAL_S", 0)?,
        })
    }

    /// Cancel cutoff for an open order of the given class and type.
    ///
    /// Everything that is not a plain market order sits on the limit-like
    /// row of the table.
    #[must_use]
    pub const fn order_timeout(&self, asset_class: AssetClass, order_type: OrderType) -> Duration {
        let secs = match (asset_class, order_type) {
            (AssetClass::Option, OrderType::Market) => self.options_market_s,
            (AssetClass::Option, _) => self.options_limit_s,
            (_, OrderType::Market) => self.default_market_s,
            (_, _) => self.default_limit_s,
        };
        Duration::from_secs(secs)
    }

    /// Staleness threshold before a broker re-poll.
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_s)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            options_market_s: 20,
            options_limit_s: 120,
            default_market_s: 15,
            default_limit_s: 90,
            stale_after_s: 60,
            recover_interval_s: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(AssetClass::Option, OrderType::Market, 20)]
    #[test_case(AssetClass::Option, OrderType::Limit, 120)]
    #[test_case(AssetClass::Option, OrderType::StopLimit, 120)]
    #[test_case(AssetClass::Equity, OrderType::Market, 15)]
    #[test_case(AssetClass::Equity, OrderType::Limit, 90)]
    #[test_case(AssetClass::Crypto, OrderType::Stop, 90)]
    #[test_case(AssetClass::Future, OrderType::Market, 15)]
    fn timeout_table(asset_class: AssetClass, order_type: OrderType, expect_s: u64) {
        let config = TimeoutConfig::default();
        assert_eq!(
            config.order_timeout(asset_class, order_type),
            Duration::from_secs(expect_s)
        );
    }

    #[test]
    fn stale_after_default() {
        assert_eq!(TimeoutConfig::default().stale_after(), Duration::from_secs(60));
    }
}
