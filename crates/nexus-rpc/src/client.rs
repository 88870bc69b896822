//! Controller-side convenience wrapper around a [`Channel`].

use std::time::Duration;

use nexus_protocol::{ErrorCode, ErrorObject, Outcome, Params};
use regex::RegexBuilder;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::channel::{Channel, ChannelError, ChannelOptions};
use crate::plan::{Plan, PlanReport, PlanRunner, Planner, PlannerError};

/// Tracing target for client queries.
pub(crate) const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

const LIST_OPERATION: &str = "list_scene_objects";
const DETAIL_OPERATION: &str = "get_object_details";

/// Errors surfaced by [`NexusClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not complete.
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// The host answered with a failure.
    #[error("{operation} failed: {} ({})", .error.message, .error.code)]
    Remote {
        /// Operation that failed.
        operation: &'static str,
        /// Failure reported by the host.
        error: ErrorObject,
    },
    /// The host answered with a payload of the wrong shape.
    #[error("{operation} returned an unexpected payload: {payload}")]
    UnexpectedPayload {
        /// Operation that was called.
        operation: &'static str,
        /// The payload received.
        payload: Value,
    },
    /// The planner could not produce a plan.
    #[error(transparent)]
    Planner(#[from] PlannerError),
    /// An entity name could not be turned into a search pattern.
    #[error("cannot search the utterance for an entity: {0}")]
    Pattern(#[from] regex::Error),
}

/// High-level queries and plan execution against a host daemon.
#[derive(Debug, Clone)]
pub struct NexusClient {
    channel: Channel,
    runner: PlanRunner,
}

impl NexusClient {
    /// Wraps an open channel.
    #[must_use]
    pub fn new(channel: Channel, step_delay: Duration) -> Self {
        let runner = PlanRunner::new(channel.clone(), step_delay);
        Self { channel, runner }
    }

    /// Dials a daemon.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Channel`] when the connection fails.
    pub async fn connect(
        url: &str,
        request_timeout: Duration,
        step_delay: Duration,
    ) -> Result<Self, ClientError> {
        let options = ChannelOptions::default().with_request_timeout(request_timeout);
        let channel = Channel::connect(url, options).await?;
        Ok(Self::new(channel, step_delay))
    }

    /// The underlying channel.
    #[must_use]
    pub const fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Names of the entities in the scene, in scene order.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] when the call fails or the payload is not a
    /// list of names.
    pub async fn list_entities(&self) -> Result<Vec<String>, ClientError> {
        let data = self.query(LIST_OPERATION, Params::new()).await?;
        let Value::Array(entries) = data else {
            return Err(ClientError::UnexpectedPayload {
                operation: LIST_OPERATION,
                payload: data,
            });
        };
        entries
            .into_iter()
            .map(|entry| match entry {
                Value::String(name) => Ok(name),
                other => Err(ClientError::UnexpectedPayload {
                    operation: LIST_OPERATION,
                    payload: other,
                }),
            })
            .collect()
    }

    /// Details of one entity, or `None` when the host does not know it.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] for any failure other than the entity being
    /// absent.
    pub async fn entity_detail(&self, name: &str) -> Result<Option<Value>, ClientError> {
        let mut params = Params::new();
        params.insert("name".to_owned(), Value::String(name.to_owned()));
        match self.query(DETAIL_OPERATION, params).await {
            Ok(data) => Ok(Some(data)),
            Err(ClientError::Remote { error, .. }) if error.code == ErrorCode::EntityNotFound => {
                debug!(target: CLIENT_TARGET, entity = name, "entity not found");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Describes the scene for a planner.
    ///
    /// Lists every entity and, when the utterance mentions one of them by
    /// name as a whole word, appends that entity's details.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] when either query fails or an entity name
    /// cannot be searched for.
    pub async fn scene_context(&self, utterance: &str) -> Result<String, ClientError> {
        let entities = self.list_entities().await?;
        let mut context = if entities.is_empty() {
            "The scene contains: nothing.".to_owned()
        } else {
            format!(
                "The scene contains: {}.",
                Value::from(entities.clone())
            )
        };

        let mut mentioned = None;
        for name in &entities {
            if mentions_whole_word(utterance, name)? {
                mentioned = Some(name);
                break;
            }
        }
        if let Some(name) = mentioned
            && let Some(detail) = self.entity_detail(name).await?
        {
            context.push_str(&format!("\nCurrent details for '{name}': {detail}"));
        }
        Ok(context)
    }

    /// Runs a plan and reports every step.
    pub async fn run_plan(&self, plan: &Plan) -> PlanReport {
        self.runner.run(plan).await
    }

    /// One sense/think/act turn: builds the scene context, asks `planner`
    /// for a plan and runs it.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] when the scene cannot be read or the planner
    /// fails. Step failures are reported in the [`PlanReport`].
    pub async fn execute<P>(&self, planner: &P, utterance: &str) -> Result<PlanReport, ClientError>
    where
        P: Planner + ?Sized,
    {
        let context = self.scene_context(utterance).await?;
        let plan = planner.produce_plan(&context, utterance)?;
        Ok(self.run_plan(&plan).await)
    }

    /// Closes the connection.
    pub async fn close(&self) {
        self.channel.close().await;
    }

    async fn query(&self, operation: &'static str, params: Params) -> Result<Value, ClientError> {
        match self.channel.call(operation, params).await? {
            Outcome::Result(mut payload) => match payload.get_mut("data") {
                Some(data) => Ok(data.take()),
                None => Err(ClientError::UnexpectedPayload { operation, payload }),
            },
            Outcome::Failure(error) => Err(ClientError::Remote { operation, error }),
        }
    }
}

/// Case-insensitive whole-word search for `name` in `text`.
///
/// Word boundaries and case folding follow Unicode, so `Café` matches
/// `CAFÉ`.
fn mentions_whole_word(text: &str, name: &str) -> Result<bool, regex::Error> {
    if name.is_empty() {
        return Ok(false);
    }
    let pattern = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(name)))
        .case_insensitive(true)
        .build()?;
    Ok(pattern.is_match(text))
}
