//! Daemon process wiring: runtime, host loop and shutdown handling.
//!
//! Host commands must all run on one thread. The daemon keeps that thread
//! for the process main thread: the tokio runtime and the [`Server`] run on
//! a separate thread, and every dispatched command is marshalled back to the
//! host loop, which runs until the server side has dropped its handles.

use std::io;
use std::sync::Arc;
use std::thread;

use nexus_rpc::{ChannelOptions, Dispatcher, host_queue};
use thiserror::Error;
use tracing::info;

use crate::bootstrap::{BootstrapError, ConfigLoader, bootstrap_with};
use crate::health::HealthReporter;
use crate::scene;
use crate::server::{Server, ServerError};
use crate::{StructuredHealthReporter, SystemConfigLoader};

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
const SERVER_THREAD: &str = "nexusd-server";
const RUNTIME_THREADS: &str = "nexusd-io";

/// Errors surfaced while running the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the daemon failed.
    #[error("daemon bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// The async runtime or its thread could not be created.
    #[error("failed to start the runtime: {source}")]
    Runtime {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The server could not start.
    #[error("failed to start the server: {source}")]
    Server {
        /// Underlying server error.
        #[source]
        source: ServerError,
    },
    /// Waiting for the shutdown signal failed.
    #[error("failed to await shutdown signal: {source}")]
    Signal {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The server thread panicked.
    #[error("server thread panicked")]
    ServerPanicked,
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}

impl From<ServerError> for LaunchError {
    fn from(source: ServerError) -> Self {
        Self::Server { source }
    }
}

/// Runs the daemon with the system configuration until Ctrl-C.
///
/// # Errors
///
/// Returns a [`LaunchError`] when bootstrap fails, the endpoint cannot be
/// bound or the shutdown signal cannot be awaited.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
    )
}

/// Runs the daemon with explicit collaborators.
///
/// Blocks the calling thread, which becomes the host execution context.
///
/// # Errors
///
/// See [`run_daemon`].
pub fn run_daemon_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<(), LaunchError> {
    let daemon = bootstrap_with(loader, reporter)?;
    let config = daemon.config();

    let (handle, host) = host_queue();
    let dispatcher = Dispatcher::new(scene::registry(daemon.scene()), Arc::new(handle));
    let options = ChannelOptions::default()
        .with_request_timeout(config.request_timeout())
        .with_dispatcher(Arc::new(dispatcher));
    let server = Server::new(config.endpoint().clone(), options, daemon.reporter());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name(RUNTIME_THREADS)
        .build()
        .map_err(|source| LaunchError::Runtime { source })?;
    let serving = thread::Builder::new()
        .name(SERVER_THREAD.to_owned())
        .spawn(move || runtime.block_on(serve(server)))
        .map_err(|source| LaunchError::Runtime { source })?;

    let executed = host.run();
    info!(target: PROCESS_TARGET, executed, "host loop finished");

    let result = serving.join().map_err(|_| LaunchError::ServerPanicked)?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    result
}

async fn serve(mut server: Server) -> Result<(), LaunchError> {
    server.start().await?;
    let signal = tokio::signal::ctrl_c().await;
    info!(target: PROCESS_TARGET, "shutdown requested");
    server.stop().await;
    signal.map_err(|source| LaunchError::Signal { source })
}
