//! Market quotes consumed by smart routing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A top-of-book quote.
///
/// Consumed only at the smart-routing boundary; never persisted by the
/// core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Quoted symbol.
    pub symbol: String,
    /// Best bid.
    pub bid: Decimal,
    /// Best ask.
    pub ask: Decimal,
    /// Quote timestamp.
    pub ts: DateTime<Utc>,
}

impl Quote {
    /// Midpoint price `(bid + ask) / 2`.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Relative spread `(ask - bid) / mid`.
    ///
    /// Returns `None` for a degenerate quote (non-positive mid), which
    /// smart routing treats as unusable.
    #[must_use]
    pub fn spread_pct(&self) -> Option<Decimal> {
        let mid = self.mid();
        if mid <= Decimal::ZERO {
            return None;
        }
        Some((self.ask - self.bid) / mid)
    }
}
