//! Execution core binary.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin exec-agent
//! ```
//!
//! # Environment Variables
//!
//! - `TRADING_MODE`: shadow | paper | live (default: shadow)
//! - `EXECUTION_ENABLED`, `EXECUTION_HALTED`, `EXEC_GUARD_UNLOCK`,
//!   `EXECUTION_CONFIRM_TOKEN`: safety gate state
//! - `BROKER_BASE_URL`, `BROKER_API_KEY`, `BROKER_API_SECRET`: broker
//! - `EXEC_DB_PATH`: local database file (default: exec-agent.db)
//! - `HTTP_PORT`: admin HTTP port (default: 8080)
//! - `METRICS_PORT`: Prometheus port (default: 9090)
//! - `RUST_LOG`: log level (default: info)
//!
//! Exit codes: 0 on clean shutdown, 2 on configuration error.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use exec_agent::broker::{BrokerAdapter, HttpBroker};
use exec_agent::config::Config;
use exec_agent::engine::ExecutionEngine;
use exec_agent::ledger::Ledger;
use exec_agent::observability;
use exec_agent::safety::{SafetyController, TursoUserPolicyStore, UserPolicyStore};
use exec_agent::server::{AppState, create_router};
use exec_agent::tracker::{OrderTracker, RecoveryLoop};
use tokio::net::TcpListener;
use tokio::signal;

/// Exit code for unrecoverable configuration errors.
const EXIT_CONFIG: i32 = 2;

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> anyhow::Result<()> {
    // Load .env if present.
    let _ = dotenvy::dotenv();

    // Static directive strings are guaranteed to parse successfully
    #[allow(clippy::unwrap_used)]
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("exec_agent=info".parse().unwrap()),
        )
        .init();

    tracing::info!("Starting execution core");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let url_class = config.broker.url_class();
    tracing::info!(
        mode = %config.gate.mode,
        broker_url_class = %url_class,
        execution_halted = config.gate.execution_halted,
        "Configuration loaded"
    );

    let broker: Arc<dyn BrokerAdapter> = match HttpBroker::new(&config.broker) {
        Ok(broker) => Arc::new(broker),
        Err(e) => {
            tracing::error!("Broker configuration error: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    // Metrics exporter is best-effort; trading must not depend on it.
    let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.server.metrics_port).into();
    if let Err(e) = observability::init_metrics(metrics_addr) {
        tracing::warn!("Metrics exporter disabled: {e}");
    }

    // Open the local database and the stores over it.
    let db = match turso::Builder::new_local(&config.server.db_path).build().await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to open database '{}': {e}", config.server.db_path);
            std::process::exit(EXIT_CONFIG);
        }
    };

    let tracker = match OrderTracker::new(db.clone()).await {
        Ok(tracker) => Arc::new(tracker),
        Err(e) => {
            tracing::error!("Tracker migration failed: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };
    let ledger = match Ledger::new(db.clone()).await {
        Ok(ledger) => Arc::new(ledger),
        Err(e) => {
            tracing::error!("Ledger migration failed: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };
    let policy: Arc<dyn UserPolicyStore> = match TursoUserPolicyStore::new(db).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("User policy migration failed: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let gate = Arc::new(SafetyController::new(&config.gate, url_class));

    let engine = Arc::new(ExecutionEngine::new(
        Arc::clone(&broker),
        Arc::clone(&tracker),
        Arc::clone(&ledger),
        Arc::clone(&gate),
        Arc::clone(&policy),
        config.routing.clone(),
    ));

    let recovery = Arc::new(RecoveryLoop::new(
        Arc::clone(&tracker),
        Arc::clone(&ledger),
        Arc::clone(&broker),
        Arc::clone(&gate),
        config.timeouts.clone(),
    ));

    // Optional periodic sweep; 0 keeps the loop admin-triggered only.
    if config.timeouts.recover_interval_s > 0 {
        let interval = Duration::from_secs(config.timeouts.recover_interval_s);
        let periodic = Arc::clone(&recovery);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = periodic.run_all().await {
                    tracing::warn!("Periodic recovery pass failed: {e}");
                }
            }
        });
        tracing::info!(interval_secs = interval.as_secs(), "Periodic recovery enabled");
    }

    let state = AppState {
        engine,
        gate,
        recovery,
        tracker,
        admin_key: config.server.admin_key.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let app = create_router(state);

    let http_addr: SocketAddr = ([0, 0, 0, 0], config.server.http_port).into();
    tracing::info!(%http_addr, "Admin HTTP server starting");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health");
    tracing::info!("  GET  /status");
    tracing::info!("  POST /intents");
    tracing::info!("  GET  /orders");
    tracing::info!("  POST /orders/recover");

    let listener = TcpListener::bind(http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Execution core stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
