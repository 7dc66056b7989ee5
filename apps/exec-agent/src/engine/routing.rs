//! Smart routing: the cost-based pre-check at the intent boundary.

use rust_decimal::Decimal;

use crate::config::RoutingConfig;
use crate::domain::{OrderIntent, Quote};

/// Verdict of the cost gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingVerdict {
    /// Spread is acceptable; proceed to the safety gate.
    Proceed,
    /// Spread exceeds the threshold; downgrade without calling the broker.
    Downgrade {
        /// Observed relative spread.
        spread_pct: Decimal,
        /// Threshold that was exceeded.
        threshold: Decimal,
    },
}

/// Resolve the spread threshold for an intent.
///
/// Per-intent `metadata.max_slippage_pct` wins over the configured
/// (possibly globally-overridden) per-class default. `None` means the
/// asset class is not routed.
#[must_use]
pub fn threshold_for(intent: &OrderIntent, config: &RoutingConfig) -> Option<Decimal> {
    let class_threshold = config.threshold_for(intent.asset_class)?;
    Some(intent.max_slippage_pct().unwrap_or(class_threshold))
}

/// Compare a quote's spread against the intent's threshold.
///
/// Strict `>` downgrades: a spread exactly at the threshold is allowed.
#[must_use]
pub fn evaluate(intent: &OrderIntent, quote: &Quote, config: &RoutingConfig) -> RoutingVerdict {
    let Some(threshold) = threshold_for(intent, config) else {
        return RoutingVerdict::Proceed;
    };
    let Some(spread_pct) = quote.spread_pct() else {
        // Degenerate quote: no usable evidence of a wide spread.
        return RoutingVerdict::Proceed;
    };

    if spread_pct > threshold {
        RoutingVerdict::Downgrade {
            spread_pct,
            threshold,
        }
    } else {
        RoutingVerdict::Proceed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AssetClass, IntentContext, IntentId, OrderSide, OrderType, StrategyId, TenantId,
        TimeInForce, UserId,
    };
    use rust_decimal_macros::dec;

    fn intent(asset_class: AssetClass) -> OrderIntent {
        OrderIntent {
            intent_id: IntentId::new("i-1"),
            context: IntentContext {
                tenant_id: TenantId::new("t1"),
                user_id: UserId::new("u1"),
                strategy_id: StrategyId::new("s1"),
            },
            symbol: "X".to_string(),
            side: OrderSide::Buy,
            qty: dec!(1),
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Day,
            asset_class,
            limit_price: None,
            metadata: serde_json::Map::new(),
        }
    }

    fn quote(bid: Decimal, ask: Decimal) -> Quote {
        Quote {
            symbol: "X".to_string(),
            bid,
            ask,
            ts: chrono::Utc::now(),
        }
    }

    #[test]
    fn wide_crypto_spread_downgrades() {
        // (50150 - 50000) / 50075 = 0.2996% > 0.2%
        let verdict = evaluate(
            &intent(AssetClass::Crypto),
            &quote(dec!(50000), dec!(50150)),
            &RoutingConfig::default(),
        );
        assert!(matches!(verdict, RoutingVerdict::Downgrade { .. }));
    }

    #[test]
    fn tight_equity_spread_proceeds() {
        // (150.05 - 150.00) / 150.025 = 0.033% < 0.1%
        let verdict = evaluate(
            &intent(AssetClass::Equity),
            &quote(dec!(150.00), dec!(150.05)),
            &RoutingConfig::default(),
        );
        assert_eq!(verdict, RoutingVerdict::Proceed);
    }

    #[test]
    fn spread_exactly_at_threshold_is_allowed() {
        // bid 999, ask 1001: spread = 2/1000 = 0.2%, exactly the crypto
        // threshold. Strict `>` means no downgrade.
        let verdict = evaluate(
            &intent(AssetClass::Crypto),
            &quote(dec!(999), dec!(1001)),
            &RoutingConfig::default(),
        );
        assert_eq!(verdict, RoutingVerdict::Proceed);
    }

    #[test]
    fn per_intent_override_wins() {
        let mut i = intent(AssetClass::Equity);
        i.metadata.insert(
            "max_slippage_pct".to_string(),
            serde_json::json!("0.0001"),
        );
        // 0.033% spread is fine for the 0.1% default but over the 0.01%
        // per-intent override.
        let verdict = evaluate(&i, &quote(dec!(150.00), dec!(150.05)), &RoutingConfig::default());
        assert!(matches!(verdict, RoutingVerdict::Downgrade { .. }));
    }

    #[test]
    fn futures_are_not_routed() {
        let verdict = evaluate(
            &intent(AssetClass::Future),
            &quote(dec!(90), dec!(110)),
            &RoutingConfig::default(),
        );
        assert_eq!(verdict, RoutingVerdict::Proceed);
    }

    #[test]
    fn degenerate_quote_proceeds() {
        let verdict = evaluate(
            &intent(AssetClass::Equity),
            &quote(dec!(0), dec!(0)),
            &RoutingConfig::default(),
        );
        assert_eq!(verdict, RoutingVerdict::Proceed);
    }
}
