//! Sequential execution of multi-step plans.
//!
//! A [`Plan`] is an ordered list of operations produced by a [`Planner`]. The
//! [`PlanRunner`] issues each step as a correlated call and waits for that
//! step's response before issuing the next, so intra-plan ordering holds by
//! construction. A failing step never stops the plan; only a connection that
//! has gone away does, because every later send would fail the same way.

use std::time::Duration;

use nexus_protocol::{ErrorObject, Outcome, Params};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::channel::{Channel, ChannelError};

/// Tracing target for plan execution.
pub(crate) const PLAN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::plan");

/// Member names accepted as the operation of a step, in priority order.
const OPERATION_KEYS: [&str; 3] = ["function", "method", "operation"];

/// One operation of a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    operation: Option<String>,
    params: Params,
}

impl Step {
    /// Creates a step.
    #[must_use]
    pub fn new(operation: impl Into<String>, params: Params) -> Self {
        Self {
            operation: Some(operation.into()),
            params,
        }
    }

    /// A step carrying no operation name.
    #[must_use]
    pub const fn invalid(params: Params) -> Self {
        Self {
            operation: None,
            params,
        }
    }

    /// Operation to invoke, if the step names a non-blank one.
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        self.operation
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Parameters passed to the operation.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    fn from_value(value: Value) -> Self {
        let Value::Object(mut object) = value else {
            return Self::invalid(Params::new());
        };
        let operation = OPERATION_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_str).map(str::to_owned));
        let params = match object.remove("params") {
            Some(Value::Object(params)) => params,
            None | Some(Value::Null) => Params::new(),
            Some(other) => {
                warn!(
                    target: PLAN_TARGET,
                    operation = operation.as_deref().unwrap_or_default(),
                    params = %other,
                    "step parameters are not an object; the step will not be sent"
                );
                return Self::invalid(Params::new());
            }
        };
        Self { operation, params }
    }
}

/// Ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    /// Creates a plan from its steps.
    #[must_use]
    pub const fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Parses a planner's output.
    ///
    /// Accepts a JSON array of `{"function": name, "params": {...}}` objects or
    /// a single such object. `method` and `operation` are accepted in place of
    /// `function`. Entries without a usable name, or whose `params` is
    /// neither an object nor `null`, become invalid steps rather than errors,
    /// so the runner can report them in place.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::Malformed`] when the text is not JSON or is
    /// neither an array nor an object.
    pub fn from_json(text: &str) -> Result<Self, PlannerError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|error| PlannerError::Malformed(format!("plan is not JSON: {error}")))?;
        Self::from_value(value)
    }

    /// Builds a plan from an already parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`PlannerError::Malformed`] when `value` is neither an array
    /// nor an object.
    pub fn from_value(value: Value) -> Result<Self, PlannerError> {
        match value {
            Value::Array(entries) => Ok(Self::new(
                entries.into_iter().map(Step::from_value).collect(),
            )),
            object @ Value::Object(_) => Ok(Self::new(vec![Step::from_value(object)])),
            other => Err(PlannerError::Malformed(format!(
                "expected a list of steps or a single step, got {other}"
            ))),
        }
    }

    /// The steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` for a plan without steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Errors raised while producing a plan.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// The planner's output could not be understood.
    #[error("malformed plan: {0}")]
    Malformed(String),
    /// The planner could not produce a plan.
    #[error("planner unavailable: {0}")]
    Unavailable(String),
}

/// Turns scene context and a user utterance into a plan.
pub trait Planner {
    /// Produces the plan for one user turn.
    ///
    /// # Errors
    ///
    /// Returns a [`PlannerError`] when no plan can be produced.
    fn produce_plan(&self, scene_context: &str, utterance: &str) -> Result<Plan, PlannerError>;
}

impl<F> Planner for F
where
    F: Fn(&str, &str) -> Result<Plan, PlannerError>,
{
    fn produce_plan(&self, scene_context: &str, utterance: &str) -> Result<Plan, PlannerError> {
        self(scene_context, utterance)
    }
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step named no operation and was not sent.
    Invalid,
    /// The operation succeeded with this payload.
    Completed(Value),
    /// The operation reported a failure.
    Failed(ErrorObject),
    /// No response was obtained.
    Transport(String),
}

impl StepOutcome {
    /// Returns `true` for [`StepOutcome::Completed`].
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Outcome of one step, tagged with its position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    /// One-based position in the plan.
    pub number: usize,
    /// Operation the step named, if any.
    pub operation: Option<String>,
    /// What happened.
    pub outcome: StepOutcome,
}

/// Outcomes of a plan run, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanReport {
    /// Reports for every step that was reached.
    pub steps: Vec<StepReport>,
    /// Set when the connection closed and the remaining steps were not sent.
    pub aborted: bool,
}

impl PlanReport {
    /// Returns `true` when every step completed and nothing was skipped.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        !self.aborted && self.steps.iter().all(|step| step.outcome.is_completed())
    }

    /// Number of completed steps.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.outcome.is_completed())
            .count()
    }
}

/// Issues the steps of a plan over a channel, one at a time.
#[derive(Debug, Clone)]
pub struct PlanRunner {
    channel: Channel,
    step_delay: Duration,
}

impl PlanRunner {
    /// Creates a runner pausing `step_delay` between issued steps.
    #[must_use]
    pub const fn new(channel: Channel, step_delay: Duration) -> Self {
        Self {
            channel,
            step_delay,
        }
    }

    /// Pause inserted between issued steps.
    #[must_use]
    pub const fn step_delay(&self) -> Duration {
        self.step_delay
    }

    /// Runs `plan` to completion and reports every step.
    pub async fn run(&self, plan: &Plan) -> PlanReport {
        info!(target: PLAN_TARGET, steps = plan.len(), "executing plan");
        let mut report = PlanReport::default();
        let mut issued_any = false;

        for (index, step) in plan.steps().iter().enumerate() {
            let number = index + 1;
            let Some(operation) = step.operation() else {
                warn!(target: PLAN_TARGET, step = number, "skipping step without an operation");
                report.steps.push(StepReport {
                    number,
                    operation: None,
                    outcome: StepOutcome::Invalid,
                });
                continue;
            };

            if issued_any && !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
            issued_any = true;

            info!(target: PLAN_TARGET, step = number, operation, "sending step");
            let (outcome, fatal) = match self.channel.call(operation, step.params().clone()).await {
                Ok(Outcome::Result(payload)) => (StepOutcome::Completed(payload), false),
                Ok(Outcome::Failure(error)) => (StepOutcome::Failed(error), false),
                Err(error) => {
                    let fatal = matches!(
                        error,
                        ChannelError::Closed | ChannelError::Transport { .. }
                    );
                    (StepOutcome::Transport(error.to_string()), fatal)
                }
            };
            log_outcome(number, operation, &outcome);

            report.steps.push(StepReport {
                number,
                operation: Some(operation.to_owned()),
                outcome,
            });
            if fatal {
                warn!(
                    target: PLAN_TARGET,
                    step = number,
                    remaining = plan.len() - number,
                    "connection closed; abandoning the rest of the plan"
                );
                report.aborted = true;
                break;
            }
        }

        info!(
            target: PLAN_TARGET,
            completed = report.completed(),
            reported = report.steps.len(),
            aborted = report.aborted,
            "plan finished"
        );
        report
    }
}

fn log_outcome(number: usize, operation: &str, outcome: &StepOutcome) {
    match outcome {
        StepOutcome::Completed(payload) => {
            let message = payload.get("message").unwrap_or(payload);
            info!(target: PLAN_TARGET, step = number, operation, %message, "step completed");
        }
        StepOutcome::Failed(error) => {
            warn!(
                target: PLAN_TARGET,
                step = number,
                operation,
                code = error.code.code(),
                message = %error.message,
                "step failed"
            );
        }
        StepOutcome::Transport(reason) => {
            warn!(target: PLAN_TARGET, step = number, operation, %reason, "step got no response");
        }
        StepOutcome::Invalid => {}
    }
}
