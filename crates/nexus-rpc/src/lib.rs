//! Request/response transport and correlation for Nexus.
//!
//! Both ends of a Nexus connection are built from the same pieces:
//!
//! - [`correlation`] matches asynchronous responses to the callers waiting
//!   on them;
//! - [`channel`] owns a websocket, multiplexes concurrent calls over it and
//!   routes inbound requests to a dispatcher;
//! - [`dispatch`] resolves operation names against a registry of executors
//!   and marshals execution onto the host's execution context;
//! - [`plan`] issues the steps of a plan one at a time with pacing;
//! - [`client`] wraps a channel with the controller's named queries.

pub mod channel;
pub mod client;
pub mod correlation;
pub mod dispatch;
pub mod plan;


pub use channel::{Channel, ChannelError, ChannelOptions, ChannelState};
pub use client::{ClientError, NexusClient};
pub use dispatch::{
    Dispatcher, ExecutionContext, Executor, ExecutorError, ExecutorKind, HostHandle, HostLoop,
    Registry, host_queue,
};
pub use plan::{
    Plan, PlanReport, PlanRunner, Planner, PlannerError, Step, StepOutcome, StepReport,
};
