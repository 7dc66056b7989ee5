//! The append-only execution ledger.
//!
//! Tenant-scoped fill store keyed by `(tenant_id, fill_id)`. Appends are
//! idempotent; duplicates are benign and logged at debug. Each primary
//! append is mirrored best-effort to a per-user portfolio view; mirror
//! failures never fail the primary write.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};
use turso::{Database, Value};

use crate::domain::{
    AssetClass, BrokerOrderId, FillEvent, IntentId, OrderSide, TenantId, UserId,
};

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database connection error.
    #[error("ledger connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("ledger query error: {0}")]
    Query(String),

    /// A stored row is missing or corrupt.
    #[error("ledger integrity error: {0}")]
    Integrity(String),
}

impl From<turso::Error> for LedgerError {
    fn from(err: turso::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

/// Outcome of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The fill was written.
    Appended,
    /// The `(tenant_id, fill_id)` key already existed; nothing changed.
    Duplicate,
}

/// Append-only, tenant-scoped fill store.
pub struct Ledger {
    db: Database,
}

impl Ledger {
    /// Open the ledger and ensure its tables exist.
    ///
    /// # Errors
    ///
    /// Returns a `LedgerError` if the migration fails.
    pub async fn new(db: Database) -> Result<Self, LedgerError> {
        let conn = db.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ledger_trades (
                tenant_id TEXT NOT NULL,
                fill_id TEXT NOT NULL,
                broker_order_id TEXT NOT NULL,
                fill_seq INTEGER NOT NULL,
                intent_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                qty TEXT NOT NULL,
                price TEXT NOT NULL,
                asset_class TEXT NOT NULL,
                ts TEXT NOT NULL,
                PRIMARY KEY (tenant_id, fill_id)
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_trades_order
             ON ledger_trades(tenant_id, broker_order_id, fill_seq);

            CREATE TABLE IF NOT EXISTS portfolio_history (
                user_id TEXT NOT NULL,
                fill_id TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                broker_order_id TEXT NOT NULL,
                fill_seq INTEGER NOT NULL,
                intent_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                qty TEXT NOT NULL,
                price TEXT NOT NULL,
                asset_class TEXT NOT NULL,
                ts TEXT NOT NULL,
                PRIMARY KEY (user_id, fill_id)
            );",
        )
        .await
        .map_err(|e| LedgerError::Query(e.to_string()))?;

        Ok(Self { db })
    }

    /// Append a fill, idempotent on `(tenant_id, fill_id)`.
    ///
    /// The per-user mirror write happens after a successful primary
    /// append and is best-effort.
    ///
    /// # Errors
    ///
    /// Returns a `LedgerError` only for primary-append failures.
    pub async fn append(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        fill: &FillEvent,
    ) -> Result<AppendOutcome, LedgerError> {
        let conn = self.db.connect()?;

        let params: Vec<Value> = vec![
            Value::Text(tenant_id.as_str().to_string()),
            Value::Text(fill.fill_id.clone()),
            Value::Text(fill.broker_order_id.as_str().to_string()),
            Value::Integer(i64::from(fill.fill_seq)),
            Value::Text(fill.intent_id.as_str().to_string()),
            Value::Text(fill.symbol.clone()),
            Value::Text(fill.side.to_string()),
            Value::Text(fill.qty.to_string()),
            Value::Text(fill.price.to_string()),
            Value::Text(fill.asset_class.to_string()),
            Value::Text(fill.timestamp.to_rfc3339()),
        ];

        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO ledger_trades (
                    tenant_id, fill_id, broker_order_id, fill_seq, intent_id,
                    symbol, side, qty, price, asset_class, ts
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params,
            )
            .await
            .map_err(|e| LedgerError::Query(e.to_string()))?;

        if changed == 0 {
            debug!(
                tenant_id = %tenant_id,
                fill_id = %fill.fill_id,
                "duplicate fill append ignored"
            );
            return Ok(AppendOutcome::Duplicate);
        }

        debug!(
            tenant_id = %tenant_id,
            fill_id = %fill.fill_id,
            qty = %fill.qty,
            price = %fill.price,
            "fill appended to ledger"
        );

        // Best-effort mirror; never fails the primary append.
        if let Err(e) = self.mirror(tenant_id, user_id, fill).await {
            warn!(
                user_id = %user_id,
                fill_id = %fill.fill_id,
                error = %e,
                "portfolio mirror write failed"
            );
        }

        Ok(AppendOutcome::Appended)
    }

    /// Mirror a fill into the per-user portfolio view.
    async fn mirror(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        fill: &FillEvent,
    ) -> Result<(), LedgerError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![
            Value::Text(user_id.as_str().to_string()),
            Value::Text(fill.fill_id.clone()),
            Value::Text(tenant_id.as_str().to_string()),
            Value::Text(fill.broker_order_id.as_str().to_string()),
            Value::Integer(i64::from(fill.fill_seq)),
            Value::Text(fill.intent_id.as_str().to_string()),
            Value::Text(fill.symbol.clone()),
            Value::Text(fill.side.to_string()),
            Value::Text(fill.qty.to_string()),
            Value::Text(fill.price.to_string()),
            Value::Text(fill.asset_class.to_string()),
            Value::Text(fill.timestamp.to_rfc3339()),
        ];
        conn.execute(
            "INSERT OR IGNORE INTO portfolio_history (
                user_id, fill_id, tenant_id, broker_order_id, fill_seq,
                intent_id, symbol, side, qty, price, asset_class, ts
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params,
        )
        .await
        .map_err(|e| LedgerError::Query(e.to_string()))?;
        Ok(())
    }

    /// Stream fills for one broker order in increasing `fill_seq`.
    ///
    /// # Errors
    ///
    /// Returns a `LedgerError` if the query or row decoding fails.
    pub async fn fills_for_order(
        &self,
        tenant_id: &TenantId,
        broker_order_id: &BrokerOrderId,
    ) -> Result<Vec<FillEvent>, LedgerError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![
            Value::Text(tenant_id.as_str().to_string()),
            Value::Text(broker_order_id.as_str().to_string()),
        ];

        let mut rows = conn
            .query(
                "SELECT fill_id, broker_order_id, fill_seq, intent_id, symbol,
                        side, qty, price, asset_class, ts
                 FROM ledger_trades
                 WHERE tenant_id = ? AND broker_order_id = ?
                 ORDER BY fill_seq ASC",
                params,
            )
            .await
            .map_err(|e| LedgerError::Query(e.to_string()))?;

        let mut fills = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| LedgerError::Query(e.to_string()))?
        {
            fills.push(Self::row_to_fill(&row)?);
        }
        Ok(fills)
    }

    /// Total filled quantity recorded for one broker order.
    ///
    /// # Errors
    ///
    /// Returns a `LedgerError` if the query fails.
    pub async fn filled_qty_for_order(
        &self,
        tenant_id: &TenantId,
        broker_order_id: &BrokerOrderId,
    ) -> Result<Decimal, LedgerError> {
        let fills = self.fills_for_order(tenant_id, broker_order_id).await?;
        Ok(fills.iter().map(|f| f.qty).sum())
    }

    /// All mirrored fills for one user, newest last.
    ///
    /// # Errors
    ///
    /// Returns a `LedgerError` if the query or row decoding fails.
    pub async fn portfolio_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<FillEvent>, LedgerError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(user_id.as_str().to_string())];

        let mut rows = conn
            .query(
                "SELECT fill_id, broker_order_id, fill_seq, intent_id, symbol,
                        side, qty, price, asset_class, ts
                 FROM portfolio_history
                 WHERE user_id = ?
                 ORDER BY ts ASC",
                params,
            )
            .await
            .map_err(|e| LedgerError::Query(e.to_string()))?;

        let mut fills = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| LedgerError::Query(e.to_string()))?
        {
            fills.push(Self::row_to_fill(&row)?);
        }
        Ok(fills)
    }

    fn row_to_fill(row: &turso::Row) -> Result<FillEvent, LedgerError> {
        let side_raw: String = row
            .get(5)
            .map_err(|e| LedgerError::Integrity(format!("side: {e}")))?;
        let side = match side_raw.as_str() {
            "BUY" => OrderSide::Buy,
            "SELL" => OrderSide::Sell,
            other => {
                return Err(LedgerError::Integrity(format!("unknown side '{other}'")));
            }
        };

        let asset_raw: String = row
            .get(8)
            .map_err(|e| LedgerError::Integrity(format!("asset_class: {e}")))?;
        let asset_class = match asset_raw.as_str() {
            "EQUITY" => AssetClass::Equity,
            "OPTION" => AssetClass::Option,
            "FOREX" => AssetClass::Forex,
            "CRYPTO" => AssetClass::Crypto,
            "FUTURE" => AssetClass::Future,
            other => {
                return Err(LedgerError::Integrity(format!(
                    "unknown asset class '{other}'"
                )));
            }
        };

        let ts_raw: String = row
            .get(9)
            .map_err(|e| LedgerError::Integrity(format!("ts: {e}")))?;
        let timestamp = chrono::DateTime::parse_from_rfc3339(&ts_raw)
            .map_err(|e| LedgerError::Integrity(format!("ts: {e}")))?
            .with_timezone(&chrono::Utc);

        Ok(FillEvent {
            fill_id: row
                .get(0)
                .map_err(|e| LedgerError::Integrity(format!("fill_id: {e}")))?,
            broker_order_id: BrokerOrderId::new(
                row.get::<String>(1)
                    .map_err(|e| LedgerError::Integrity(format!("broker_order_id: {e}")))?,
            ),
            fill_seq: u32::try_from(
                row.get::<i64>(2)
                    .map_err(|e| LedgerError::Integrity(format!("fill_seq: {e}")))?,
            )
            .map_err(|e| LedgerError::Integrity(format!("fill_seq: {e}")))?,
            intent_id: IntentId::new(
                row.get::<String>(3)
                    .map_err(|e| LedgerError::Integrity(format!("intent_id: {e}")))?,
            ),
            symbol: row
                .get(4)
                .map_err(|e| LedgerError::Integrity(format!("symbol: {e}")))?,
            side,
            qty: row
                .get::<String>(6)
                .map_err(|e| LedgerError::Integrity(format!("qty: {e}")))?
                .parse()
                .map_err(|e| LedgerError::Integrity(format!("qty: {e}")))?,
            price: row
                .get::<String>(7)
                .map_err(|e| LedgerError::Integrity(format!("price: {e}")))?
                .parse()
                .map_err(|e| LedgerError::Integrity(format!("price: {e}")))?,
            asset_class,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn open_ledger() -> Ledger {
        let db = turso::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        Ledger::new(db).await.unwrap()
    }

    fn fill(broker_order_id: &str, seq: u32, qty: Decimal) -> FillEvent {
        let id = BrokerOrderId::new(broker_order_id);
        FillEvent {
            fill_id: FillEvent::derive_id(&id, seq),
            broker_order_id: id,
            fill_seq: seq,
            intent_id: IntentId::new("i-1"),
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            qty,
            price: dec!(150.03),
            asset_class: AssetClass::Equity,
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_then_read_back() {
        let ledger = open_ledger().await;
        let tenant = TenantId::new("t1");
        let user = UserId::new("u1");

        let outcome = ledger.append(&tenant, &user, &fill("o1", 1, dec!(10))).await.unwrap();
        assert_eq!(outcome, AppendOutcome::Appended);

        let fills = ledger
            .fills_for_order(&tenant, &BrokerOrderId::new("o1"))
            .await
            .unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].qty, dec!(10));
        assert_eq!(fills[0].price, dec!(150.03));
        assert_eq!(fills[0].side, OrderSide::Buy);
        assert_eq!(fills[0].asset_class, AssetClass::Equity);
    }

    #[tokio::test]
    async fn duplicate_append_leaves_ledger_unchanged() {
        let ledger = open_ledger().await;
        let tenant = TenantId::new("t1");
        let user = UserId::new("u1");
        let event = fill("o1", 1, dec!(10));

        assert_eq!(
            ledger.append(&tenant, &user, &event).await.unwrap(),
            AppendOutcome::Appended
        );
        assert_eq!(
            ledger.append(&tenant, &user, &event).await.unwrap(),
            AppendOutcome::Duplicate
        );

        let fills = ledger
            .fills_for_order(&tenant, &BrokerOrderId::new("o1"))
            .await
            .unwrap();
        assert_eq!(fills.len(), 1);
    }

    #[tokio::test]
    async fn fills_stream_in_fill_seq_order() {
        let ledger = open_ledger().await;
        let tenant = TenantId::new("t1");
        let user = UserId::new("u1");

        // Insert out of order; reads come back sorted.
        ledger.append(&tenant, &user, &fill("o1", 2, dec!(1))).await.unwrap();
        ledger.append(&tenant, &user, &fill("o1", 1, dec!(2))).await.unwrap();
        ledger.append(&tenant, &user, &fill("o1", 3, dec!(3))).await.unwrap();

        let fills = ledger
            .fills_for_order(&tenant, &BrokerOrderId::new("o1"))
            .await
            .unwrap();
        let seqs: Vec<u32> = fills.iter().map(|f| f.fill_seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn ledger_is_tenant_scoped() {
        let ledger = open_ledger().await;
        let user = UserId::new("u1");
        ledger
            .append(&TenantId::new("t1"), &user, &fill("o1", 1, dec!(10)))
            .await
            .unwrap();

        let other = ledger
            .fills_for_order(&TenantId::new("t2"), &BrokerOrderId::new("o1"))
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn append_mirrors_to_portfolio_history() {
        let ledger = open_ledger().await;
        let tenant = TenantId::new("t1");
        let user = UserId::new("u1");

        ledger.append(&tenant, &user, &fill("o1", 1, dec!(10))).await.unwrap();

        let mirrored = ledger.portfolio_for_user(&user).await.unwrap();
        assert_eq!(mirrored.len(), 1);
        assert_eq!(mirrored[0].fill_id, "o1-1");
    }

    #[tokio::test]
    async fn filled_qty_sums_fills() {
        let ledger = open_ledger().await;
        let tenant = TenantId::new("t1");
        let user = UserId::new("u1");

        ledger.append(&tenant, &user, &fill("o1", 1, dec!(2))).await.unwrap();
        ledger.append(&tenant, &user, &fill("o1", 2, dec!(1))).await.unwrap();

        let total = ledger
            .filled_qty_for_order(&tenant, &BrokerOrderId::new("o1"))
            .await
            .unwrap();
        assert_eq!(total, dec!(3));
    }
}
