//! Prometheus metrics for the execution core.

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::tracker::RecoverySummary;

/// Error type for metrics initialization.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to install the metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Initialize the Prometheus exporter.
///
/// Starts an HTTP listener that exposes metrics at `/metrics`.
///
/// # Errors
///
/// Returns an error if the exporter fails to start (e.g. port in use).
pub fn init_metrics(listen_addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(addr = %listen_addr, "Prometheus metrics exporter started");
    Ok(())
}

/// Record the outcome of one `execute` call.
pub fn record_execution(status: &str) {
    counter!("exec_executions_total", "status" => status.to_string()).increment(1);
}

/// Record one ledger append.
pub fn record_ledger_append() {
    counter!("exec_ledger_appends_total").increment(1);
}

/// Record the tallies of one recovery pass.
pub fn record_recovery_pass(summary: &RecoverySummary) {
    counter!("exec_recovery_passes_total").increment(1);
    counter!("exec_recovery_polled_total").increment(summary.polled);
    counter!("exec_recovery_cancelled_total").increment(summary.cancelled);
    counter!("exec_recovery_reconciled_total").increment(summary.reconciled);
    counter!("exec_recovery_terminal_total").increment(summary.terminal);
}
