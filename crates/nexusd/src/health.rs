//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use nexus_config::{Config, Endpoint};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the listener is bound.
    fn server_listening(&self, endpoint: &Endpoint);

    /// Invoked after the listener and every connection have shut down.
    fn server_stopped(&self);

    /// Invoked when a controller completes the websocket handshake.
    fn connection_opened(&self, peer: &str);

    /// Invoked when a controller connection ends.
    fn connection_closed(&self, peer: &str);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn server_listening(&self, endpoint: &Endpoint) {
        (**self).server_listening(endpoint);
    }

    fn server_stopped(&self) {
        (**self).server_stopped();
    }

    fn connection_opened(&self, peer: &str) {
        (**self).connection_opened(peer);
    }

    fn connection_closed(&self, peer: &str) {
        (**self).connection_closed(peer);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            endpoint = %config.endpoint(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            request_timeout_ms = config.request_timeout_ms,
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn server_listening(&self, endpoint: &Endpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_listening",
            endpoint = %endpoint,
            "accepting controller connections"
        );
    }

    fn server_stopped(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_stopped",
            "server stopped"
        );
    }

    fn connection_opened(&self, peer: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "connection_opened",
            peer,
            "controller connected"
        );
    }

    fn connection_closed(&self, peer: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "connection_closed",
            peer,
            "controller disconnected"
        );
    }
}
