//! Configuration module for the execution core.
//!
//! All configuration comes from environment variables (see the variable
//! names on each field). Loading happens once at startup; an unparseable
//! or missing required value is a `ConfigError`, which the binary treats
//! as fatal (exit code 2). Nothing in the core reads the environment at
//! the call site.

mod broker;
mod routing;
mod safety;
mod server;
mod timeouts;

use thiserror::Error;

pub use broker::{BrokerConfig, UrlClass};
pub use routing::RoutingConfig;
pub use safety::{GateConfig, TradingMode};
pub use server::ServerConfig;
pub use timeouts::TimeoutConfig;

/// Configuration errors. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// Environment variable present but unparseable.
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue {
        /// The offending variable.
        key: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Root configuration for the execution core.
#[derive(Debug, Clone)]
pub struct Config {
    /// Safety gate configuration.
    pub gate: GateConfig,
    /// Broker endpoint and credentials.
    pub broker: BrokerConfig,
    /// Smart-routing thresholds.
    pub routing: RoutingConfig,
    /// Recovery-loop timeout table.
    pub timeouts: TimeoutConfig,
    /// Admin server configuration.
    pub server: ServerConfig,
}

impl Config {
    /// Load the full configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if any recognized variable is unparseable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            gate: GateConfig::from_env()?,
            broker: BrokerConfig::from_env()?,
            routing: RoutingConfig::from_env()?,
            timeouts: TimeoutConfig::from_env()?,
            server: ServerConfig::from_env()?,
        })
    }
}

/// Read an optional environment variable, treating empty as unset.
pub(crate) fn env_opt(key: &'static str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => Some(v),
        _ => None,
    }
}

/// Parse a boolean environment variable (`1`/`true`/`yes` vs `0`/`false`/`no`).
pub(crate) fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env_opt(key) {
        None => Ok(default),
        Some(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { key, value: v }),
        },
    }
}

/// Parse a numeric environment variable with a default.
pub(crate) fn env_parse<T: std::str::FromStr>(
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match env_opt(key) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: v }),
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; each uses a distinct key so they
    // can run in parallel.

    #[test]
    fn env_bool_default_when_unset() {
        assert!(env_bool("EXEC_TEST_BOOL_UNSET", true).unwrap());
        assert!(!env_bool("EXEC_TEST_BOOL_UNSET", false).unwrap());
    }

    #[test]
    fn env_bool_accepts_common_spellings() {
        unsafe { std::env::set_var("EXEC_TEST_BOOL_TRUE", "TRUE") };
        assert!(env_bool("EXEC_TEST_BOOL_TRUE", false).unwrap());

        unsafe { std::env::set_var("EXEC_TEST_BOOL_ZERO", "0") };
        assert!(!env_bool("EXEC_TEST_BOOL_ZERO", true).unwrap());
    }

    #[test]
    fn env_bool_rejects_garbage() {
        unsafe { std::env::set_var("EXEC_TEST_BOOL_BAD", "maybe") };
        let err = env_bool("EXEC_TEST_BOOL_BAD", false).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "EXEC_TEST_BOOL_BAD",
                ..
            }
        ));
    }

    #[test]
    fn env_parse_default_and_value() {
        assert_eq!(env_parse("EXEC_TEST_NUM_UNSET", 60u64).unwrap(), 60);

        unsafe { std::env::set_var("EXEC_TEST_NUM_SET", "120") };
        assert_eq!(env_parse("EXEC_TEST_NUM_SET", 60u64).unwrap(), 120);
    }

    #[test]
    fn env_parse_rejects_garbage() {
        unsafe { std::env::set_var("EXEC_TEST_NUM_BAD", "twelve") };
        assert!(env_parse("EXEC_TEST_NUM_BAD", 60u64).is_err());
    }

    #[test]
    fn empty_var_is_unset() {
        unsafe { std::env::set_var("EXEC_TEST_EMPTY", "") };
        assert_eq!(env_opt("EXEC_TEST_EMPTY"), None);
    }
}
