//! Admin server configuration.

use super::{ConfigError, env_opt, env_parse};

/// Admin HTTP server and storage configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Admin HTTP port (`HTTP_PORT`).
    pub http_port: u16,
    /// Prometheus exporter port (`METRICS_PORT`).
    pub metrics_port: u16,
    /// Admin key required on the recover endpoint
    /// (`EXEC_AGENT_ADMIN_KEY`; unset disables the endpoint).
    pub admin_key: Option<String>,
    /// Path of the local database file (`EXEC_DB_PATH`).
    pub db_path: String,
}

impl ServerConfig {
    /// Load server configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` on an unparseable port.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            http_port: env_parse("HTTP_PORT", 8080)?,
            metrics_port: env_parse("METRICS_PORT", 9090)?,
            admin_key: env_opt("EXEC_AGENT_ADMIN_KEY"),
            db_path: env_opt("EXEC_DB_PATH").unwrap_or_else(|| "exec-agent.db".to_string()),
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            metrics_port: 9090,
            admin_key: None,
            db_path: "exec-agent.db".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.metrics_port, 9090);
        assert!(config.admin_key.is_none());
        assert_eq!(config.db_path, "exec-agent.db");
    }
}
