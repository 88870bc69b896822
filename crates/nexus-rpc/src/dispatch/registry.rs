//! Named executors and the registry that resolves them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use nexus_protocol::{ErrorCode, Params};
use serde_json::Value;
use thiserror::Error;

/// The two capability shapes an executor can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// Side-effecting operation reporting a status message.
    Action,
    /// Side-effect free operation reporting data.
    Query,
}

/// Failures an executor reports instead of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// Parameters were missing or malformed.
    #[error("{0}")]
    InvalidParams(String),
    /// The entity the operation targets does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The operation failed while running.
    #[error("{0}")]
    Failed(String),
}

impl ExecutorError {
    /// Creates an invalid parameters error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a generic failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wire code reported for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidParams(_) => ErrorCode::InvalidParams,
            Self::NotFound(_) => ErrorCode::EntityNotFound,
            Self::Failed(_) => ErrorCode::InternalError,
        }
    }
}

/// An operation invocable by name.
pub trait Executor: Send + Sync {
    /// Capability shape, which decides how the payload is wrapped.
    fn kind(&self) -> ExecutorKind;

    /// Runs the operation.
    ///
    /// Actions return their status message, queries their data.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecutorError`] describing why the operation failed.
    fn invoke(&self, params: &Params) -> Result<Value, ExecutorError>;
}

struct ActionFn<F>(F);

impl<F> Executor for ActionFn<F>
where
    F: Fn(&Params) -> Result<String, ExecutorError> + Send + Sync,
{
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Action
    }

    fn invoke(&self, params: &Params) -> Result<Value, ExecutorError> {
        (self.0)(params).map(Value::String)
    }
}

struct QueryFn<F>(F);

impl<F> Executor for QueryFn<F>
where
    F: Fn(&Params) -> Result<Value, ExecutorError> + Send + Sync,
{
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::Query
    }

    fn invoke(&self, params: &Params) -> Result<Value, ExecutorError> {
        (self.0)(params)
    }
}

/// Immutable name to executor mapping.
#[derive(Clone, Default)]
pub struct Registry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl Registry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Looks up an executor by operation name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Executor>> {
        self.executors.get(name)
    }

    /// Registered operation names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Registry")
            .field("operations", &self.names())
            .finish()
    }
}

/// Collects executors before freezing them into a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl RegistryBuilder {
    /// Registers an executor, replacing any earlier one of the same name.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, executor: Arc<dyn Executor>) -> Self {
        self.executors.insert(name.into(), executor);
        self
    }

    /// Registers a closure as an action.
    #[must_use]
    pub fn action<F>(self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&Params) -> Result<String, ExecutorError> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(ActionFn(action)))
    }

    /// Registers a closure as a query.
    #[must_use]
    pub fn query<F>(self, name: impl Into<String>, query: F) -> Self
    where
        F: Fn(&Params) -> Result<Value, ExecutorError> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(QueryFn(query)))
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> Registry {
        Registry {
            executors: self.executors,
        }
    }
}
