//! Websocket server hosting answering channels.
//!
//! A [`Server`] owns its whole lifecycle: `start` binds the endpoint and
//! spawns the accept loop, each accepted stream becomes a [`Channel`] that
//! answers requests with the configured dispatcher, and `stop` tears it all
//! down again. Several controllers may be connected at once; each gets its
//! own channel and correlation table.

mod errors;
mod listener;

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use nexus_config::Endpoint;
use nexus_rpc::{Channel, ChannelOptions};
use strum::{AsRefStr, Display};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use errors::ServerError;

use crate::health::HealthReporter;
use listener::{Acceptor, Connections, LISTENER_TARGET, accept_loop};

/// Lifecycle of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ServerState {
    /// Not listening.
    Stopped,
    /// Binding the listener.
    Starting,
    /// Accepting connections.
    Running,
    /// Closing connections.
    Stopping,
}

struct Running {
    local: Endpoint,
    shutdown: oneshot::Sender<()>,
    accept: JoinHandle<()>,
    connections: Arc<Connections>,
}

/// Listens for controllers and serves each over its own channel.
pub struct Server {
    endpoint: Endpoint,
    options: ChannelOptions,
    reporter: Arc<dyn HealthReporter>,
    state: ServerState,
    running: Option<Running>,
}

impl fmt::Debug for Server {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Server")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Builds a stopped server.
    ///
    /// `options` are applied to every accepted channel; they should carry the
    /// dispatcher that answers requests.
    #[must_use]
    pub fn new(
        endpoint: Endpoint,
        options: ChannelOptions,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            endpoint,
            options,
            reporter,
            state: ServerState::Stopped,
            running: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Whether the server is accepting connections.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.state, ServerState::Running)
    }

    /// The bound endpoint while running. Differs from the configured one
    /// when port `0` was requested.
    #[must_use]
    pub fn local_endpoint(&self) -> Option<&Endpoint> {
        self.running.as_ref().map(|running| &running.local)
    }

    /// Number of open controller connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.running
            .as_ref()
            .map_or(0, |running| running.connections.len())
    }

    /// Binds the endpoint and starts accepting connections.
    ///
    /// Calling `start` on a running server returns the bound endpoint
    /// without rebinding.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the endpoint cannot be bound; the server
    /// is left stopped.
    pub async fn start(&mut self) -> Result<Endpoint, ServerError> {
        if let Some(running) = &self.running {
            debug!(target: LISTENER_TARGET, endpoint = %running.local, "already running");
            return Ok(running.local.clone());
        }

        self.transition(ServerState::Starting);
        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(error) => {
                self.transition(ServerState::Stopped);
                return Err(error);
            }
        };
        let local = match listener.local_addr() {
            Ok(address) => self.endpoint.with_port(address.port()),
            Err(source) => {
                self.transition(ServerState::Stopped);
                return Err(ServerError::LocalAddress { source });
            }
        };

        let connections = Arc::new(Connections::default());
        let acceptor = Arc::new(Acceptor {
            options: self.options.clone(),
            connections: Arc::clone(&connections),
            reporter: Arc::clone(&self.reporter),
        });
        let (shutdown, signal) = oneshot::channel();
        let accept = tokio::spawn(accept_loop(listener, acceptor, signal));

        self.running = Some(Running {
            local: local.clone(),
            shutdown,
            accept,
            connections,
        });
        self.transition(ServerState::Running);
        self.reporter.server_listening(&local);
        Ok(local)
    }

    /// Stops accepting, closes every open connection and waits for the
    /// accept loop to finish. A stopped server is left untouched.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            debug!(target: LISTENER_TARGET, "stop requested while not running");
            return;
        };

        self.transition(ServerState::Stopping);
        if running.shutdown.send(()).is_err() {
            debug!(target: LISTENER_TARGET, "accept loop already finished");
        }
        if let Err(error) = running.accept.await {
            warn!(target: LISTENER_TARGET, %error, "accept loop ended abnormally");
        }

        let channels = running.connections.drain();
        info!(
            target: LISTENER_TARGET,
            connections = channels.len(),
            "closing controller connections"
        );
        join_all(channels.iter().map(Channel::close)).await;

        self.transition(ServerState::Stopped);
        self.reporter.server_stopped();
    }

    async fn bind(&self) -> Result<TcpListener, ServerError> {
        let address = (self.endpoint.host(), self.endpoint.port());
        TcpListener::bind(address)
            .await
            .map_err(|source| ServerError::Bind {
                endpoint: self.endpoint.clone(),
                source,
            })
    }

    fn transition(&mut self, next: ServerState) {
        debug!(
            target: LISTENER_TARGET,
            from = %self.state,
            to = %next,
            "server state change"
        );
        self.state = next;
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.accept.abort();
        }
    }
}
