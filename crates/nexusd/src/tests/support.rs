//! Test doubles shared by the daemon suites.

use std::ffi::OsString;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nexus_config::{Config, Endpoint};
use ortho_config::{OrthoConfig, OrthoError};

use crate::bootstrap::{BootstrapError, ConfigLoader};
use crate::health::HealthReporter;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    ServerListening(u16),
    ServerStopped,
    ConnectionOpened,
    ConnectionClosed,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Counts recorded occurrences of `event`.
    pub fn count(&self, event: &HealthEvent) -> usize {
        self.events().iter().filter(|seen| *seen == event).count()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn server_listening(&self, endpoint: &Endpoint) {
        self.record(HealthEvent::ServerListening(endpoint.port()));
    }

    fn server_stopped(&self) {
        self.record(HealthEvent::ServerStopped);
    }

    fn connection_opened(&self, _peer: &str) {
        self.record(HealthEvent::ConnectionOpened);
    }

    fn connection_closed(&self, _peer: &str) {
        self.record(HealthEvent::ConnectionClosed);
    }
}

/// Loader that listens on an ephemeral loopback port.
pub struct TestConfigLoader;

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            endpoint: Endpoint::new("127.0.0.1", 0),
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing an invalid CLI argument.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("nexusd"),
            OsString::from("--request-timeout-ms"),
            OsString::from("soon"),
        ];
        Config::load_from_iter(args)
    }
}

/// Polls `condition` until it holds or two seconds pass.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
