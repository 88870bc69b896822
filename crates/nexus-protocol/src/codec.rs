//! Text encoding of [`Message`]s.
//!
//! Requests and responses share one connection in both directions, so decoding
//! classifies a payload purely by its shape: an object with `method` is a
//! request, an object with `result` or `error` is a response.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{ErrorCode, ErrorObject, Message, Outcome, Params, Request, Response};

/// Protocol version stamped on every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Errors produced while decoding a payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not JSON.
    #[error("malformed JSON payload: {0}")]
    Parse(#[source] serde_json::Error),
    /// The payload is JSON but not a usable envelope.
    #[error("invalid envelope: {reason}")]
    InvalidRequest {
        /// Identifier found in the payload, when one could be read.
        id: Option<i64>,
        /// What was wrong with the envelope.
        reason: String,
    },
    /// The payload is shaped like a response but its members are unusable.
    ///
    /// Responses are never answered; the receiving side fails the matching
    /// waiter locally instead.
    #[error("malformed response: {reason}")]
    MalformedResponse {
        /// Identifier of the request being answered, when one could be read.
        id: Option<i64>,
        /// What was wrong with the response.
        reason: String,
    },
}

impl DecodeError {
    fn invalid(id: Option<i64>, reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            id,
            reason: reason.into(),
        }
    }

    fn malformed(id: Option<i64>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            id,
            reason: reason.into(),
        }
    }

    /// Identifier an error response to this payload should carry.
    #[must_use]
    pub const fn id(&self) -> Option<i64> {
        match self {
            Self::Parse(_) => None,
            Self::InvalidRequest { id, .. } | Self::MalformedResponse { id, .. } => *id,
        }
    }

    /// Error code reported for this payload.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Parse(_) => ErrorCode::ParseError,
            Self::InvalidRequest { .. } | Self::MalformedResponse { .. } => {
                ErrorCode::InvalidRequest
            }
        }
    }

    /// Whether the payload was a response rather than a request.
    #[must_use]
    pub const fn is_response(&self) -> bool {
        matches!(self, Self::MalformedResponse { .. })
    }

    /// Builds the error response an answering peer sends back.
    #[must_use]
    pub fn to_response(&self) -> Response {
        Response::failure(self.id(), self.code(), self.to_string())
    }
}

/// Errors produced while encoding a message.
#[derive(Debug, Error)]
#[error("failed to encode message: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

#[derive(Serialize)]
struct WireRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a Params,
    id: i64,
}

#[derive(Serialize)]
struct WireSuccess<'a> {
    jsonrpc: &'static str,
    result: &'a Value,
    id: Option<i64>,
}

#[derive(Serialize)]
struct WireFailure<'a> {
    jsonrpc: &'static str,
    error: &'a ErrorObject,
    id: Option<i64>,
}

/// Serialises a message to its wire text.
///
/// # Errors
///
/// Returns [`EncodeError`] when `serde_json` rejects the payload.
pub fn encode(message: &Message) -> Result<String, EncodeError> {
    let text = match message {
        Message::Request(request) => serde_json::to_string(&WireRequest {
            jsonrpc: JSONRPC_VERSION,
            method: &request.method,
            params: &request.params,
            id: request.id,
        })?,
        Message::Response(Response {
            id,
            outcome: Outcome::Result(result),
        }) => serde_json::to_string(&WireSuccess {
            jsonrpc: JSONRPC_VERSION,
            result,
            id: *id,
        })?,
        Message::Response(Response {
            id,
            outcome: Outcome::Failure(error),
        }) => serde_json::to_string(&WireFailure {
            jsonrpc: JSONRPC_VERSION,
            error,
            id: *id,
        })?,
    };
    Ok(text)
}

/// Parses wire text into a message.
///
/// A missing `params` member decodes as an empty mapping. A response may omit
/// `id` or carry `null`, which yields an unattributed response.
///
/// # Errors
///
/// Returns [`DecodeError::Parse`] for text that is not JSON,
/// [`DecodeError::MalformedResponse`] for a response with unusable members and
/// [`DecodeError::InvalidRequest`] for any other unusable JSON.
pub fn decode(text: &str) -> Result<Message, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::Parse)?;
    let Value::Object(mut object) = value else {
        return Err(DecodeError::invalid(None, "payload is not a JSON object"));
    };

    if object.contains_key("method") {
        decode_request(&mut object).map(Message::Request)
    } else if object.contains_key("result") || object.contains_key("error") {
        decode_response(&mut object).map(Message::Response)
    } else {
        let id = object.get("id").and_then(Value::as_i64);
        Err(DecodeError::invalid(
            id,
            "payload carries neither `method` nor `result`/`error`",
        ))
    }
}

fn decode_request(object: &mut Map<String, Value>) -> Result<Request, DecodeError> {
    let id = object.get("id").and_then(Value::as_i64);
    let method = match object.remove("method") {
        Some(Value::String(method)) => method,
        _ => return Err(DecodeError::invalid(id, "`method` must be a string")),
    };
    let Some(id) = id else {
        return Err(DecodeError::invalid(
            None,
            format!("request `{method}` lacks an integer `id`"),
        ));
    };
    let params = match object.remove("params") {
        None | Some(Value::Null) => Params::new(),
        Some(Value::Object(params)) => params,
        Some(_) => {
            return Err(DecodeError::invalid(
                Some(id),
                format!("`params` of `{method}` must be an object"),
            ));
        }
    };
    Ok(Request { id, method, params })
}

fn decode_response(object: &mut Map<String, Value>) -> Result<Response, DecodeError> {
    let id = match object.get("id") {
        None | Some(Value::Null) => None,
        Some(value) => match value.as_i64() {
            Some(id) => Some(id),
            None => return Err(DecodeError::malformed(None, "response `id` must be an integer")),
        },
    };

    let outcome = match (object.remove("result"), object.remove("error")) {
        (Some(_), Some(_)) => {
            return Err(DecodeError::malformed(
                id,
                "response carries both `result` and `error`",
            ));
        }
        (Some(result), None) => Outcome::Result(result),
        (None, Some(error)) => Outcome::Failure(
            serde_json::from_value::<ErrorObject>(error).map_err(|source| {
                DecodeError::malformed(id, format!("malformed `error` member: {source}"))
            })?,
        ),
        (None, None) => {
            return Err(DecodeError::malformed(
                id,
                "response carries neither `result` nor `error`",
            ));
        }
    };
    Ok(Response { id, outcome })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    #[rstest]
    fn encodes_request_envelope() {
        let request = Request::with_id(1, "list_scene_objects", Params::new());
        let text = encode(&request.into()).expect("encode");
        let value: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "method": "list_scene_objects", "params": {}, "id": 1})
        );
    }

    #[rstest]
    fn encodes_success_envelope() {
        let response = Response::success(1, json!({"status": "success", "data": ["Cube", "Light"]}));
        let text = encode(&response.into()).expect("encode");
        let value: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "result": {"status": "success", "data": ["Cube", "Light"]},
                "id": 1
            })
        );
    }

    #[rstest]
    fn encodes_unattributed_failure_with_null_id() {
        let response = Response::failure(None, ErrorCode::ParseError, "bad");
        let text = encode(&response.into()).expect("encode");
        let value: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "error": {"code": -32700, "message": "bad"},
                "id": null
            })
        );
    }

    #[rstest]
    #[case(Request::with_id(3, "move_object", params(json!({"name": "Cube", "location": [1, 2, 3]}))).into())]
    #[case(Response::success(4, json!({"status": "success", "message": "moved"})).into())]
    #[case(Response::success(5, Value::Null).into())]
    #[case(Response::failure(Some(6), ErrorCode::EntityNotFound, "Object not found: Ghost").into())]
    #[case(Response::failure(Some(7), ErrorCode::Other(-1), "peer specific").into())]
    #[case(Response::failure(None, ErrorCode::InvalidRequest, "no id").into())]
    fn decode_inverts_encode(#[case] message: Message) {
        let text = encode(&message).expect("encode");
        assert_eq!(decode(&text).expect("decode"), message);
    }

    #[rstest]
    fn decodes_request_without_params_as_empty_mapping() {
        let message = decode(r#"{"jsonrpc":"2.0","method":"list_scene_objects","id":9}"#)
            .expect("decode");
        assert_eq!(
            message,
            Message::Request(Request::with_id(9, "list_scene_objects", Params::new()))
        );
    }

    #[rstest]
    #[case("not json")]
    #[case("{\"method\": ")]
    #[case("")]
    fn reports_parse_errors(#[case] text: &str) {
        let error = decode(text).expect_err("should fail");
        assert!(matches!(error, DecodeError::Parse(_)));
        assert_eq!(error.code(), ErrorCode::ParseError);
        assert_eq!(error.id(), None);
    }

    #[rstest]
    #[case(r#"[1, 2, 3]"#, None)]
    #[case(r#"{"jsonrpc":"2.0","id":4}"#, Some(4))]
    #[case(r#"{"method":7,"id":5}"#, Some(5))]
    #[case(r#"{"method":"move_object","params":{}}"#, None)]
    #[case(r#"{"method":"move_object","params":{},"id":"x"}"#, None)]
    #[case(r#"{"method":"move_object","params":[1],"id":6}"#, Some(6))]
    fn reports_invalid_envelopes(#[case] text: &str, #[case] expected_id: Option<i64>) {
        let error = decode(text).expect_err("should fail");
        assert!(matches!(error, DecodeError::InvalidRequest { .. }));
        assert!(!error.is_response());
        assert_eq!(error.id(), expected_id);
    }

    #[rstest]
    #[case(r#"{"result":1,"error":{"code":1,"message":"m"},"id":8}"#, Some(8))]
    #[case(r#"{"error":{"code":"x"},"id":10}"#, Some(10))]
    #[case(r#"{"jsonrpc":"2.0","error":{"code":"bad"},"id":12}"#, Some(12))]
    #[case(r#"{"result":1,"id":"twelve"}"#, None)]
    fn reports_malformed_responses(#[case] text: &str, #[case] expected_id: Option<i64>) {
        let error = decode(text).expect_err("should fail");
        assert!(matches!(error, DecodeError::MalformedResponse { .. }));
        assert!(error.is_response());
        assert_eq!(error.id(), expected_id);
    }

    #[rstest]
    fn invalid_envelope_response_carries_offending_id() {
        let error = decode(r#"{"jsonrpc":"2.0","id":11}"#).expect_err("should fail");
        let response = error.to_response();
        assert_eq!(response.id, Some(11));
        assert!(matches!(
            response.outcome,
            Outcome::Failure(ErrorObject { code: ErrorCode::InvalidRequest, .. })
        ));
    }
}
