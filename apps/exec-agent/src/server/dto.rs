//! Request and response bodies for the admin HTTP surface.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::tracker::ExecutionOrderRecord;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Liveness status.
    pub status: String,
    /// Application version.
    pub version: String,
}

/// Recover request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverRequest {
    /// Tenant to sweep.
    pub tenant_id: String,
}

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Query parameters for the order listing.
#[derive(Debug, Clone, Deserialize)]
pub struct OrdersQuery {
    /// Tenant whose records to list.
    pub tenant_id: String,
}

/// One tracked order in the read model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecordResponse {
    /// Intent id (idempotency key).
    pub intent_id: String,
    /// Broker order id.
    pub broker_order_id: String,
    /// Raw vendor status.
    pub status: String,
    /// Normalized status.
    pub status_norm: String,
    /// Lifecycle state.
    pub lifecycle: String,
    /// Symbol.
    pub symbol: String,
    /// Side.
    pub side: String,
    /// Submitted quantity.
    pub qty: Decimal,
    /// Quantity reconciled into the ledger so far.
    pub filled_qty: Decimal,
    /// Asset class.
    pub asset_class: String,
    /// Record creation time.
    pub created_at: DateTime<Utc>,
    /// Last broker sync time.
    pub last_broker_sync_at: DateTime<Utc>,
}

impl From<&ExecutionOrderRecord> for OrderRecordResponse {
    fn from(record: &ExecutionOrderRecord) -> Self {
        Self {
            intent_id: record.intent_id.as_str().to_string(),
            broker_order_id: record.broker_order_id.as_str().to_string(),
            status: record.status_raw.clone(),
            status_norm: record.status_norm.to_string(),
            lifecycle: record.lifecycle.to_string(),
            symbol: record.symbol.clone(),
            side: record.side.to_string(),
            qty: record.qty,
            filled_qty: record.filled_qty_seen,
            asset_class: record.asset_class.to_string(),
            created_at: record.created_at,
            last_broker_sync_at: record.last_broker_sync_at,
        }
    }
}
