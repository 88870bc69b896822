//! Execution contexts commands are marshalled onto.
//!
//! The host's scene API may only be touched from one designated thread, which
//! is not a runtime worker. [`host_queue`] builds the cross-thread hand-off:
//! the [`HostHandle`] side is submitted to from async code, the [`HostLoop`]
//! side drains jobs on whichever thread calls [`HostLoop::run`].

use std::io;
use std::sync::mpsc;
use std::thread;

use thiserror::Error;
use tracing::debug;

use super::DISPATCH_TARGET;

/// Unit of work queued onto an execution context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// The execution context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("execution context is no longer running")]
pub struct ContextClosed;

/// A place commands run.
pub trait ExecutionContext: Send + Sync {
    /// Queues `job` to run on this context.
    ///
    /// # Errors
    ///
    /// Returns [`ContextClosed`] when the context no longer runs jobs.
    fn submit(&self, job: Job) -> Result<(), ContextClosed>;
}

/// Runs jobs immediately on the submitting thread.
///
/// Suitable for executors with no thread affinity and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineContext;

impl ExecutionContext for InlineContext {
    fn submit(&self, job: Job) -> Result<(), ContextClosed> {
        job();
        Ok(())
    }
}

/// Submitting side of a host queue.
#[derive(Debug, Clone)]
pub struct HostHandle {
    sender: mpsc::Sender<Job>,
}

impl ExecutionContext for HostHandle {
    fn submit(&self, job: Job) -> Result<(), ContextClosed> {
        self.sender.send(job).map_err(|_| ContextClosed)
    }
}

/// Draining side of a host queue.
#[derive(Debug)]
pub struct HostLoop {
    receiver: mpsc::Receiver<Job>,
}

impl HostLoop {
    /// Runs queued jobs on the current thread until every [`HostHandle`] has
    /// been dropped. Returns the number of jobs executed.
    pub fn run(self) -> usize {
        let mut executed = 0_usize;
        for job in self.receiver {
            job();
            executed += 1;
        }
        debug!(target: DISPATCH_TARGET, executed, "host loop drained");
        executed
    }

    /// Runs the loop on a dedicated named thread.
    ///
    /// # Errors
    ///
    /// Returns the operating system error when the thread cannot be spawned.
    pub fn spawn(self, name: &str) -> io::Result<thread::JoinHandle<usize>> {
        thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || self.run())
    }
}

/// Creates a host queue.
#[must_use]
pub fn host_queue() -> (HostHandle, HostLoop) {
    let (sender, receiver) = mpsc::channel();
    (HostHandle { sender }, HostLoop { receiver })
}
