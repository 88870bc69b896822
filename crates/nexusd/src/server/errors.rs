//! Error types for the websocket server.

use std::io;

use nexus_config::Endpoint;
use thiserror::Error;

/// Errors raised while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the TCP listener failed.
    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        /// Endpoint that could not be bound.
        endpoint: Endpoint,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The bound address could not be read back.
    #[error("failed to read the bound address: {source}")]
    LocalAddress {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl ServerError {
    /// Whether the endpoint is already taken by another process.
    #[must_use]
    pub fn is_address_in_use(&self) -> bool {
        matches!(
            self,
            Self::Bind { source, .. } if source.kind() == io::ErrorKind::AddrInUse
        )
    }
}
