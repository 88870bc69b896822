//! Host daemon for Nexus.
//!
//! The daemon owns an in-memory scene and answers controller requests over
//! websocket connections. Start-up follows a fixed sequence: load
//! configuration through [`nexus_config`], install telemetry, seed the scene,
//! then bind the [`Server`]. Every accepted connection is served by its own
//! [`nexus_rpc::Channel`], and every command it receives runs on the single
//! host thread so scene mutations are never concurrent.
//!
//! Lifecycle events go through a [`HealthReporter`] so operators see
//! bootstrap, listener and connection changes as structured log records.

mod bootstrap;
mod health;
mod process;
pub mod scene;
mod server;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, run_daemon, run_daemon_with};
pub use server::{Server, ServerError, ServerState};

#[cfg(test)]
mod tests;
