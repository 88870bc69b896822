//! Resolution and execution of inbound requests.
//!
//! The [`Dispatcher`] turns an operation name and its parameters into an
//! [`Outcome`]. Lookup failures, executor errors and executor panics all become
//! failure outcomes, so nothing an executor does can reach the transport
//! layer raw. Execution is marshalled onto an [`ExecutionContext`], which in
//! the daemon is the host thread.

mod context;
mod registry;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use nexus_protocol::{ErrorCode, Outcome, Params};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub use self::context::{
    ContextClosed, ExecutionContext, HostHandle, HostLoop, InlineContext, Job, host_queue,
};
pub use self::registry::{Executor, ExecutorError, ExecutorKind, Registry, RegistryBuilder};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Routes requests to registered executors.
pub struct Dispatcher {
    registry: Registry,
    context: Arc<dyn ExecutionContext>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher that runs executors on `context`.
    #[must_use]
    pub fn new(registry: Registry, context: Arc<dyn ExecutionContext>) -> Self {
        Self { registry, context }
    }

    /// Creates a dispatcher that runs executors on the calling thread.
    #[must_use]
    pub fn inline(registry: Registry) -> Self {
        Self::new(registry, Arc::new(InlineContext))
    }

    /// The operations this dispatcher serves.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs `name` synchronously on the current thread.
    #[must_use]
    pub fn dispatch(&self, name: &str, params: &Params) -> Outcome {
        let Some(executor) = self.registry.get(name) else {
            debug!(target: DISPATCH_TARGET, method = name, "unknown operation");
            return Outcome::failure(
                ErrorCode::MethodNotFound,
                format!("Unknown command: {name}"),
            );
        };

        let invocation = panic::catch_unwind(AssertUnwindSafe(|| executor.invoke(params)));
        match invocation {
            Ok(Ok(payload)) => {
                debug!(target: DISPATCH_TARGET, method = name, "operation succeeded");
                Outcome::Result(envelope(executor.kind(), payload))
            }
            Ok(Err(error)) => {
                debug!(
                    target: DISPATCH_TARGET,
                    method = name,
                    code = error.code().code(),
                    %error,
                    "operation failed"
                );
                Outcome::failure(error.code(), error.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(target: DISPATCH_TARGET, method = name, %message, "operation panicked");
                Outcome::failure(ErrorCode::InternalError, message)
            }
        }
    }

    /// Runs `name` on the dispatcher's execution context and awaits its
    /// outcome.
    pub async fn submit(self: &Arc<Self>, name: String, params: Params) -> Outcome {
        let (reply, outcome) = oneshot::channel();
        let dispatcher = Arc::clone(self);
        let job_name = name.clone();
        let job: Job = Box::new(move || {
            let result = dispatcher.dispatch(&job_name, &params);
            if reply.send(result).is_err() {
                debug!(target: DISPATCH_TARGET, method = %job_name, "submitter went away");
            }
        });

        if self.context.submit(job).is_err() {
            warn!(target: DISPATCH_TARGET, method = %name, "execution context closed");
            return Outcome::failure(ErrorCode::InternalError, ContextClosed.to_string());
        }

        outcome.await.unwrap_or_else(|_| {
            warn!(target: DISPATCH_TARGET, method = %name, "job dropped before running");
            Outcome::failure(ErrorCode::InternalError, ContextClosed.to_string())
        })
    }
}

fn envelope(kind: ExecutorKind, payload: Value) -> Value {
    match kind {
        ExecutorKind::Action => json!({"status": "success", "message": payload}),
        ExecutorKind::Query => json!({"status": "success", "data": payload}),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "executor panicked".to_owned()
    }
}
