//! Broker endpoint and credential configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ConfigError, env_opt};

/// Classification of the configured broker endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlClass {
    /// Paper / simulated endpoint.
    Paper,
    /// Live endpoint.
    Live,
}

impl std::fmt::Display for UrlClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paper => write!(f, "paper"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// Default paper endpoint.
const DEFAULT_BASE_URL: &str = "https://paper-api.alpaca.markets";

/// Configuration for the broker HTTP adapter.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Trading API base URL (`BROKER_BASE_URL`).
    pub base_url: String,
    /// API key (`BROKER_API_KEY`).
    pub api_key: String,
    /// API secret (`BROKER_API_SECRET`).
    pub api_secret: String,
    /// Deadline for place/cancel calls.
    pub write_deadline: Duration,
    /// Deadline for poll/quote calls.
    pub read_deadline: Duration,
}

impl BrokerConfig {
    /// Load broker configuration from the environment.
    ///
    /// Credentials may be absent here; the HTTP adapter refuses to start
    /// without them, which the binary reports as a configuration error.
    ///
    /// # Errors
    ///
    /// Currently infallible, kept fallible for parity with the other
    /// config sections.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_opt("BROKER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: env_opt("BROKER_API_KEY").unwrap_or_default(),
            api_secret: env_opt("BROKER_API_SECRET").unwrap_or_default(),
            write_deadline: Duration::from_secs(5),
            read_deadline: Duration::from_secs(2),
        })
    }

    /// Classify the endpoint as paper or live by substring.
    #[must_use]
    pub fn url_class(&self) -> UrlClass {
        if self.base_url.contains("paper") {
            UrlClass::Paper
        } else {
            UrlClass::Live
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            write_deadline: Duration::from_secs(5),
            read_deadline: Duration::from_secs(2),
        }
    }
}
