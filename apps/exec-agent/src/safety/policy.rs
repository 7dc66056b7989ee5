//! Per-user trading enablement, read through on every execution.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;
use turso::{Database, Value};

use crate::domain::{TenantId, UserId};

/// Errors from the user-policy store.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Database connection error.
    #[error("policy store connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("policy query error: {0}")]
    Query(String),
}

impl From<turso::Error> for PolicyError {
    fn from(err: turso::Error) -> Self {
        Self::Connection(err.to_string())
    }
}

/// Port for the per-user trading flag.
///
/// The engine reads through this on every call; no caching. A missing
/// row means trading is disabled for that user (fail-closed).
#[async_trait]
pub trait UserPolicyStore: Send + Sync {
    /// Whether trading is enabled for the given user within the tenant.
    async fn is_trading_enabled(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<bool, PolicyError>;
}

/// Turso-backed user policy store.
///
/// Rows are provisioned by the tenant system; this store only reads.
pub struct TursoUserPolicyStore {
    db: Database,
}

impl TursoUserPolicyStore {
    /// Open the store and ensure the table exists.
    ///
    /// # Errors
    ///
    /// Returns a `PolicyError` if the migration fails.
    pub async fn new(db: Database) -> Result<Self, PolicyError> {
        let conn = db.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_policies (
                tenant_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                trading_enabled INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (tenant_id, user_id)
            );",
        )
        .await
        .map_err(|e| PolicyError::Query(e.to_string()))?;
        Ok(Self { db })
    }

    /// Upsert a user's trading flag (test and ops tooling).
    ///
    /// # Errors
    ///
    /// Returns a `PolicyError` if the write fails.
    pub async fn set_trading_enabled(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        enabled: bool,
    ) -> Result<(), PolicyError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![
            Value::Text(tenant_id.as_str().to_string()),
            Value::Text(user_id.as_str().to_string()),
            Value::Integer(i64::from(enabled)),
        ];
        conn.execute(
            "INSERT OR REPLACE INTO user_policies (
                tenant_id, user_id, trading_enabled, updated_at
            ) VALUES (?, ?, ?, datetime('now'))",
            params,
        )
        .await
        .map_err(|e| PolicyError::Query(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl UserPolicyStore for TursoUserPolicyStore {
    async fn is_trading_enabled(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<bool, PolicyError> {
        let conn = self.db.connect()?;
        let params: Vec<Value> = vec![
            Value::Text(tenant_id.as_str().to_string()),
            Value::Text(user_id.as_str().to_string()),
        ];
        let mut rows = conn
            .query(
                "SELECT trading_enabled FROM user_policies WHERE tenant_id = ? AND user_id = ?",
                params,
            )
            .await
            .map_err(|e| PolicyError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| PolicyError::Query(e.to_string()))?
        {
            Some(row) => Ok(row.get::<i64>(0).unwrap_or(0) != 0),
            None => Ok(false),
        }
    }
}

/// In-memory user policy for tests.
#[derive(Debug, Default)]
pub struct InMemoryUserPolicy {
    enabled: RwLock<HashSet<(String, String)>>,
}

impl InMemoryUserPolicy {
    /// Create an empty policy (everyone disabled).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable trading for a user.
    pub fn enable(&self, tenant_id: &TenantId, user_id: &UserId) {
        if let Ok(mut set) = self.enabled.write() {
            set.insert((
                tenant_id.as_str().to_string(),
                user_id.as_str().to_string(),
            ));
        }
    }

    /// Disable trading for a user.
    pub fn disable(&self, tenant_id: &TenantId, user_id: &UserId) {
        if let Ok(mut set) = self.enabled.write() {
            set.remove(&(
                tenant_id.as_str().to_string(),
                user_id.as_str().to_string(),
            ));
        }
    }
}

#[async_trait]
impl UserPolicyStore for InMemoryUserPolicy {
    async fn is_trading_enabled(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<bool, PolicyError> {
        Ok(self
            .enabled
            .read()
            .map(|set| {
                set.contains(&(
                    tenant_id.as_str().to_string(),
                    user_id.as_str().to_string(),
                ))
            })
            .unwrap_or(false))
    }
}
