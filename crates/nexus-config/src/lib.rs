//! Shared configuration for the Nexus daemon and controller.
//!
//! Both binaries resolve the same [`Config`] through `ortho_config`, which
//! layers built-in defaults, an optional TOML file (`--config-path`),
//! `NEXUS_*` environment variables and command-line flags, in that order of
//! increasing precedence. The crate also owns the websocket [`Endpoint`] type
//! and the `tracing` subscriber installation used by both binaries.

mod defaults;
mod endpoint;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_STEP_DELAY_MS, default_endpoint, default_log_filter, default_log_filter_string,
    default_log_format,
};
pub use endpoint::{Endpoint, EndpointParseError};
pub use logging::{LogFormat, LogFormatParseError, TelemetryError, TelemetryHandle, initialise};

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "NEXUS")]
pub struct Config {
    /// Websocket endpoint the daemon listens on and the controller dials.
    #[ortho_config(default = default_endpoint())]
    pub endpoint: Endpoint,
    /// `tracing_subscriber::EnvFilter` expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log lines.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Upper bound on how long a caller waits for its correlated response.
    #[ortho_config(default = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,
    /// Pause inserted between the steps of a plan.
    #[ortho_config(default = DEFAULT_STEP_DELAY_MS)]
    pub step_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            step_delay_ms: DEFAULT_STEP_DELAY_MS,
        }
    }
}

impl Config {
    /// Endpoint shared by the daemon listener and the controller.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Correlation timeout applied to every request.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Pacing delay between plan steps.
    #[must_use]
    pub const fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_documented_values() {
        let config = Config::default();
        assert_eq!(config.endpoint().to_string(), "ws://localhost:8765");
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Compact);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.step_delay(), Duration::from_millis(500));
    }
}
