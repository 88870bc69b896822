use crate::endpoint::Endpoint;
use crate::logging::LogFormat;

/// Host the daemon binds to when nothing else is configured.
pub const DEFAULT_HOST: &str = "localhost";

/// Port the daemon listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 8765;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default correlation timeout, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default pause between plan steps, in milliseconds.
pub const DEFAULT_STEP_DELAY_MS: u64 = 500;

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Endpoint shared by the daemon and controller when unconfigured.
#[must_use]
pub fn default_endpoint() -> Endpoint {
    Endpoint::new(DEFAULT_HOST, DEFAULT_PORT)
}
