//! Error types and diagnostics helpers for the CLI runtime.

use std::io;
use std::sync::Arc;

use nexus_config::TelemetryError;
use nexus_rpc::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise telemetry: {0}")]
    Telemetry(TelemetryError),
    #[error("failed to start the async runtime: {0}")]
    Runtime(io::Error),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("no object named '{0}' in the scene")]
    UnknownObject(String),
    #[error("failed to serialise output: {0}")]
    SerialiseOutput(serde_json::Error),
    #[error("failed to write output: {0}")]
    WriteOutput(io::Error),
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerialiseOutput(error)
    }
}

impl From<io::Error> for AppError {
    fn from(error: io::Error) -> Self {
        Self::WriteOutput(error)
    }
}

/// Determines whether an error indicates the daemon is not listening.
pub(crate) fn is_daemon_not_running(error: &AppError) -> bool {
    matches!(
        error,
        AppError::Client(ClientError::Channel(channel)) if channel.is_refused()
    )
}
