//! Durable store of execution order records.
//!
//! One record per `(tenant_id, intent_id)`, created by the engine on
//! successful submission and mutated by the engine (cancel) and the
//! recovery loop (poll). Records are never deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;
use turso::{Database, Value};

use crate::broker::NormalizedStatus;
use crate::domain::{
    AssetClass, BrokerOrderId, IntentId, LifecycleState, OrderIntent, OrderSide, OrderType,
    TenantId, UserId,
};

/// Errors from tracker store operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Database connection error.
    #[error("tracker connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("tracker query error: {0}")]
    Query(String),

    /// A stored row is missing or corrupt.
    #[error("tracker integrity error: {0}")]
    Integrity(String),
}

impl From<turso::Error> for TrackerError {
    fn from(err: turso::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

/// The tracker's durable unit: one submitted intent at the broker.
#[derive(Debug, Clone)]
pub struct ExecutionOrderRecord {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Intent that produced this order (idempotency key).
    pub intent_id: IntentId,
    /// Broker-assigned order id.
    pub broker_order_id: BrokerOrderId,
    /// Raw vendor status string from the last sync.
    pub status_raw: String,
    /// Normalized status from the last sync.
    pub status_norm: NormalizedStatus,
    /// Lifecycle state; mutated only through the lifecycle machine.
    pub lifecycle: LifecycleState,
    /// Intent snapshot: user the order trades for.
    pub user_id: UserId,
    /// Intent snapshot: symbol.
    pub symbol: String,
    /// Intent snapshot: side.
    pub side: OrderSide,
    /// Intent snapshot: submitted quantity.
    pub qty: Decimal,
    /// Intent snapshot: order type.
    pub order_type: OrderType,
    /// Intent snapshot: limit price, if any.
    pub limit_price: Option<Decimal>,
    /// Intent snapshot: asset class.
    pub asset_class: AssetClass,
    /// Cumulative filled quantity already reconciled into the ledger.
    pub filled_qty_seen: Decimal,
    /// Next fill sequence number to assign.
    pub next_fill_seq: u32,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the broker last confirmed this order's state.
    pub last_broker_sync_at: DateTime<Utc>,
}

impl ExecutionOrderRecord {
    /// Build the initial record from an intent and the place acknowledgment.
    #[must_use]
    pub fn from_submission(
        intent: &OrderIntent,
        broker_order_id: BrokerOrderId,
        status_raw: String,
        status_norm: NormalizedStatus,
        lifecycle: LifecycleState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id: intent.context.tenant_id.clone(),
            intent_id: intent.intent_id.clone(),
            broker_order_id,
            status_raw,
            status_norm,
            lifecycle,
            user_id: intent.context.user_id.clone(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            qty: intent.qty,
            order_type: intent.order_type,
            limit_price: intent.limit_price,
            asset_class: intent.asset_class,
            filled_qty_seen: Decimal::ZERO,
            next_fill_seq: 1,
            created_at: now,
            last_broker_sync_at: now,
        }
    }
}

/// Turso-backed tracker store.
pub struct OrderTracker {
    db: Database,
}

impl OrderTracker {
    /// Open the tracker and ensure its table exists.
    ///
    /// # Errors
    ///
    /// Returns a `TrackerError` if the migration fails.
    pub async fn new(db: Database) -> Result<Self, TrackerError> {
        let conn = db.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS execution_orders (
                tenant_id TEXT NOT NULL,
                intent_id TEXT NOT NULL,
                broker_order_id TEXT NOT NULL,
                status_raw TEXT NOT NULL,
                status_norm TEXT NOT NULL,
                lifecycle TEXT NOT NULL,
                user_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                qty TEXT NOT NULL,
                order_type TEXT NOT NULL,
                limit_price TEXT,
                asset_class TEXT NOT NULL,
                filled_qty_seen TEXT NOT NULL,
                next_fill_seq INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                last_broker_sync_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, intent_id)
            );

            CREATE INDEX IF NOT EXISTS idx_execution_orders_lifecycle
             ON execution_orders(tenant_id, lifecycle);",
        )
        .await
        .map_err(|e| TrackerError::Query(e.to_string()))?;

        Ok(Self { db })
    }

    /// Insert or update a record.
    ///
    /// # Errors
    ///
    /// Returns a `TrackerError` if the write fails.
    pub async fn save(&self, record: &ExecutionOrderRecord) -> Result<(), TrackerError> {
        let conn = self.db.connect()?;

        let params: Vec<Value> = vec![
            Value::Text(record.tenant_id.as_str().to_string()),
            Value::Text(record.intent_id.as_str().to_string()),
            Value::Text(record.broker_order_id.as_str().to_string()),
            Value::Text(record.status_raw.clone()),
            Value::Text(record.status_norm.to_string()),
            Value::Text(record.lifecycle.to_string()),
            Value::Text(record.user_id.as_str().to_string()),
            Value::Text(record.symbol.clone()),
            Value::Text(record.side.to_string()),
            Value::Text(record.qty.to_string()),
            Value::Text(record.order_type.to_string()),
            record
                .limit_price
                .map_or(Value::Null, |p| Value::Text(p.to_string())),
            Value::Text(record.asset_class.to_string()),
            Value::Text(record.filled_qty_seen.to_string()),
            Value::Integer(i64::from(record.next_fill_seq)),
            Value::Text(record.created_at.to_rfc3339()),
            Value::Text(record.last_broker_sync_at.to_rfc3339()),
        ];

        conn.execute(
            "INSERT OR REPLACE INTO execution_orders (
                tenant_id, intent_id, broker_order_id, status_raw, status_norm,
                lifecycle, user_id, symbol, side, qty, order_type, limit_price,
                asset_class, filled_qty_seen, next_fill_seq, created_at,
                last_broker_sync_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params,
        )
        .await
        .map_err(|e| TrackerError::Query(e.to_string()))?;

        debug!(
            tenant_id = %record.tenant_id,
            intent_id = %record.intent_id,
            lifecycle = %record.lifecycle,
            "execution order record saved"
        );
        Ok(())
    }

    /// Fetch one record by its key.
    ///
    /// # Errors
    ///
    /// Returns a `TrackerError` if the query or row decoding fails.
    pub async fn get(
        &self,
        tenant_id: &TenantId,
        intent_id: &IntentId,
    ) -> Result<Option<ExecutionOrderRecord>, TrackerError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![
            Value::Text(tenant_id.as_str().to_string()),
            Value::Text(intent_id.as_str().to_string()),
        ];

        let mut rows = conn
            .query(
                &format!("{SELECT_COLUMNS} WHERE tenant_id = ? AND intent_id = ?"),
                params,
            )
            .await
            .map_err(|e| TrackerError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| TrackerError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(Self::row_to_record(&row)?)),
            None => Ok(None),
        }
    }

    /// All records for a tenant whose lifecycle is still open.
    ///
    /// # Errors
    ///
    /// Returns a `TrackerError` if the query or row decoding fails.
    pub async fn open_orders(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<ExecutionOrderRecord>, TrackerError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(tenant_id.as_str().to_string())];

        let mut rows = conn
            .query(
                &format!(
                    "{SELECT_COLUMNS}
                     WHERE tenant_id = ?
                       AND lifecycle IN ('NEW', 'ACCEPTED', 'PARTIALLY_FILLED')
                     ORDER BY created_at ASC"
                ),
                params,
            )
            .await
            .map_err(|e| TrackerError::Query(e.to_string()))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| TrackerError::Query(e.to_string()))?
        {
            records.push(Self::row_to_record(&row)?);
        }
        Ok(records)
    }

    /// All records for a tenant, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a `TrackerError` if the query or row decoding fails.
    pub async fn list(&self, tenant_id: &TenantId) -> Result<Vec<ExecutionOrderRecord>, TrackerError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![Value::Text(tenant_id.as_str().to_string())];

        let mut rows = conn
            .query(
                &format!("{SELECT_COLUMNS} WHERE tenant_id = ? ORDER BY created_at ASC"),
                params,
            )
            .await
            .map_err(|e| TrackerError::Query(e.to_string()))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| TrackerError::Query(e.to_string()))?
        {
            records.push(Self::row_to_record(&row)?);
        }
        Ok(records)
    }

    /// Distinct tenants that still have open orders.
    ///
    /// # Errors
    ///
    /// Returns a `TrackerError` if the query fails.
    pub async fn tenants_with_open_orders(&self) -> Result<Vec<TenantId>, TrackerError> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT DISTINCT tenant_id FROM execution_orders
                 WHERE lifecycle IN ('NEW', 'ACCEPTED', 'PARTIALLY_FILLED')
                 ORDER BY tenant_id ASC",
                Vec::<Value>::new(),
            )
            .await
            .map_err(|e| TrackerError::Query(e.to_string()))?;

        let mut tenants = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| TrackerError::Query(e.to_string()))?
        {
            tenants.push(TenantId::new(
                row.get::<String>(0)
                    .map_err(|e| TrackerError::Integrity(format!("tenant_id: {e}")))?,
            ));
        }
        Ok(tenants)
    }

    fn row_to_record(row: &turso::Row) -> Result<ExecutionOrderRecord, TrackerError> {
        fn text(row: &turso::Row, idx: usize, name: &str) -> Result<String, TrackerError> {
            row.get::<String>(idx)
                .map_err(|e| TrackerError::Integrity(format!("{name}: {e}")))
        }
        fn timestamp(raw: &str, name: &str) -> Result<DateTime<Utc>, TrackerError> {
            chrono::DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| TrackerError::Integrity(format!("{name}: {e}")))
        }
        fn decimal(raw: &str, name: &str) -> Result<Decimal, TrackerError> {
            raw.parse()
                .map_err(|e| TrackerError::Integrity(format!("{name}: {e}")))
        }

        let lifecycle = match text(row, 5, "lifecycle")?.as_str() {
            "NEW" => LifecycleState::New,
            "ACCEPTED" => LifecycleState::Accepted,
            "PARTIALLY_FILLED" => LifecycleState::PartiallyFilled,
            "FILLED" => LifecycleState::Filled,
            "CANCELLED" => LifecycleState::Cancelled,
            "REJECTED" => LifecycleState::Rejected,
            "EXPIRED" => LifecycleState::Expired,
            other => {
                return Err(TrackerError::Integrity(format!(
                    "unknown lifecycle '{other}'"
                )));
            }
        };

        let side = match text(row, 8, "side")?.as_str() {
            "BUY" => OrderSide::Buy,
            "SELL" => OrderSide::Sell,
            other => return Err(TrackerError::Integrity(format!("unknown side '{other}'"))),
        };

        let order_type = match text(row, 10, "order_type")?.as_str() {
            "MARKET" => OrderType::Market,
            "LIMIT" => OrderType::Limit,
            "STOP" => OrderType::Stop,
            "STOP_LIMIT" => OrderType::StopLimit,
            other => {
                return Err(TrackerError::Integrity(format!(
                    "unknown order type '{other}'"
                )));
            }
        };

        let asset_class = match text(row, 12, "asset_class")?.as_str() {
            "EQUITY" => AssetClass::Equity,
            "OPTION" => AssetClass::Option,
            "FOREX" => AssetClass::Forex,
            "CRYPTO" => AssetClass::Crypto,
            "FUTURE" => AssetClass::Future,
            other => {
                return Err(TrackerError::Integrity(format!(
                    "unknown asset class '{other}'"
                )));
            }
        };

        Ok(ExecutionOrderRecord {
            tenant_id: TenantId::new(text(row, 0, "tenant_id")?),
            intent_id: IntentId::new(text(row, 1, "intent_id")?),
            broker_order_id: BrokerOrderId::new(text(row, 2, "broker_order_id")?),
            status_raw: text(row, 3, "status_raw")?,
            status_norm: NormalizedStatus::from_raw(&text(row, 4, "status_norm")?),
            lifecycle,
            user_id: UserId::new(text(row, 6, "user_id")?),
            symbol: text(row, 7, "symbol")?,
            side,
            qty: decimal(&text(row, 9, "qty")?, "qty")?,
            order_type,
            limit_price: row
                .get::<String>(11)
                .ok()
                .and_then(|s| s.parse().ok()),
            asset_class,
            filled_qty_seen: decimal(&text(row, 13, "filled_qty_seen")?, "filled_qty_seen")?,
            next_fill_seq: u32::try_from(
                row.get::<i64>(14)
                    .map_err(|e| TrackerError::Integrity(format!("next_fill_seq: {e}")))?,
            )
            .map_err(|e| TrackerError::Integrity(format!("next_fill_seq: {e}")))?,
            created_at: timestamp(&text(row, 15, "created_at")?, "created_at")?,
            last_broker_sync_at: timestamp(
                &text(row, 16, "last_broker_sync_at")?,
                "last_broker_sync_at",
            )?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT tenant_id, intent_id, broker_order_id, status_raw,
        status_norm, lifecycle, user_id, symbol, side, qty, order_type,
        limit_price, asset_class, filled_qty_seen, next_fill_seq, created_at,
        last_broker_sync_at
 FROM execution_orders";
