//! Admin HTTP surface.
//!
//! Axum router for liveness, the safety gate snapshot, intent ingress,
//! the recovery trigger, and the operator read model.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::domain::{OrderIntent, TenantId};
use crate::engine::ExecutionEngine;
use crate::safety::SafetyController;
use crate::tracker::{OrderTracker, RecoveryLoop};

use super::dto::{
    ErrorResponse, HealthResponse, OrderRecordResponse, OrdersQuery, RecoverRequest,
};

/// Header carrying the admin key.
const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The execution engine.
    pub engine: Arc<ExecutionEngine>,
    /// The safety gate (for `/status`).
    pub gate: Arc<SafetyController>,
    /// The recovery loop (for `/orders/recover`).
    pub recovery: Arc<RecoveryLoop>,
    /// The order tracker (for the read model).
    pub tracker: Arc<OrderTracker>,
    /// Admin key; `None` disables the recover endpoint.
    pub admin_key: Option<String>,
    /// Application version.
    pub version: String,
}

/// Create the HTTP router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/intents", post(submit_intent))
        .route("/orders", get(list_orders))
        .route("/orders/recover", post(recover))
        .with_state(state)
}

/// Liveness probe.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "serving".to_string(),
        version: state.version,
    })
}

/// Safety gate snapshot. Carries no secrets.
async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gate.snapshot())
}

/// Intent ingress: hand an `OrderIntent` to the engine.
async fn submit_intent(
    State(state): State<AppState>,
    Json(intent): Json<OrderIntent>,
) -> impl IntoResponse {
    let result = state.engine.execute(intent).await;
    (StatusCode::OK, Json(result))
}

/// Trigger one recovery pass for a tenant. Requires the admin key.
async fn recover(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RecoverRequest>,
) -> Response {
    if !admin_key_matches(state.admin_key.as_deref(), &headers) {
        let body = ErrorResponse {
            code: "UNAUTHORIZED".to_string(),
            message: "missing or invalid admin key".to_string(),
        };
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }

    let tenant_id = TenantId::new(request.tenant_id);
    match state.recovery.run_once(&tenant_id).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => {
            let body = ErrorResponse {
                code: "RECOVERY_FAILED".to_string(),
                message: e.to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// Read model: all tracked records for a tenant.
async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> Response {
    let tenant_id = TenantId::new(query.tenant_id);
    match state.tracker.list(&tenant_id).await {
        Ok(records) => {
            let body: Vec<OrderRecordResponse> =
                records.iter().map(OrderRecordResponse::from).collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            let body = ErrorResponse {
                code: "STORE_ERROR".to_string(),
                message: e.to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// Admin key check; absent configuration denies.
fn admin_key_matches(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|provided| provided == expected)
}
