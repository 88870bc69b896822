//! Envelope types exchanged between the controller and the host.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ErrorCode;

/// Named parameters of a request.
pub type Params = Map<String, Value>;

/// Process-wide request identifier source.
static REQUEST_ID: AtomicI64 = AtomicI64::new(1);

/// Allocates the next request identifier.
///
/// Identifiers increase monotonically for the whole process lifetime and are
/// never reused, not even by a channel opened after a reconnect.
#[must_use]
pub fn next_request_id() -> i64 {
    REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// A named operation invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation identifier.
    pub id: i64,
    /// Operation name.
    pub method: String,
    /// Operation parameters.
    pub params: Params,
}

impl Request {
    /// Creates a request with a freshly allocated identifier.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Params) -> Self {
        Self::with_id(next_request_id(), method, params)
    }

    /// Creates a request with a specific identifier.
    #[must_use]
    pub fn with_id(id: i64, method: impl Into<String>, params: Params) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// Structured failure reported in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Failure class.
    pub code: ErrorCode,
    /// Human-readable cause.
    pub message: String,
}

impl ErrorObject {
    /// Builds an error object.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// What a request produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The operation succeeded with this payload.
    Result(Value),
    /// The operation failed.
    Failure(ErrorObject),
}

impl Outcome {
    /// Shorthand for a failure outcome.
    #[must_use]
    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Failure(ErrorObject::new(code, message))
    }

    /// Returns `true` for [`Outcome::Result`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Result(_))
    }

    /// The error object of a failure outcome.
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorObject> {
        match self {
            Self::Result(_) => None,
            Self::Failure(error) => Some(error),
        }
    }

    /// Converts the outcome into a standard `Result`.
    ///
    /// # Errors
    ///
    /// Returns the error object of a failure outcome.
    pub fn into_result(self) -> Result<Value, ErrorObject> {
        match self {
            Self::Result(value) => Ok(value),
            Self::Failure(error) => Err(error),
        }
    }
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Identifier of the answered request. `None` when the offending input
    /// could not be attributed to a request.
    pub id: Option<i64>,
    /// Result or failure.
    pub outcome: Outcome,
}

impl Response {
    /// Creates a response carrying an outcome.
    #[must_use]
    pub const fn new(id: Option<i64>, outcome: Outcome) -> Self {
        Self { id, outcome }
    }

    /// Successful response to request `id`.
    #[must_use]
    pub const fn success(id: i64, result: Value) -> Self {
        Self::new(Some(id), Outcome::Result(result))
    }

    /// Failure response, optionally attributed to a request.
    #[must_use]
    pub fn failure(id: Option<i64>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(id, Outcome::failure(code, message))
    }
}

/// Any message that travels over a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// An operation the peer should run.
    Request(Request),
    /// The answer to an earlier request.
    Response(Response),
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Self::Response(response)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    fn allocated_identifiers_increase() {
        let first = next_request_id();
        let second = next_request_id();
        assert!(second > first);
    }

    #[rstest]
    fn request_new_takes_a_fresh_identifier() {
        let first = Request::new("list_scene_objects", Params::new());
        let second = Request::new("list_scene_objects", Params::new());
        assert_ne!(first.id, second.id);
    }

    #[rstest]
    fn outcome_converts_into_result() {
        assert_eq!(
            Outcome::Result(json!(1)).into_result(),
            Ok(json!(1))
        );
        let failure = Outcome::failure(ErrorCode::InternalError, "boom");
        assert!(!failure.is_success());
        assert_eq!(
            failure.into_result(),
            Err(ErrorObject::new(ErrorCode::InternalError, "boom"))
        );
    }
}
