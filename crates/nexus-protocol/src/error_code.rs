//! Numeric error codes carried in failure responses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error code of a [`crate::ErrorObject`].
///
/// The reserved JSON-RPC codes are joined by one application code,
/// [`ErrorCode::EntityNotFound`]. Codes this crate does not know are kept
/// verbatim in [`ErrorCode::Other`] so they survive a decode/encode cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ErrorCode {
    /// The payload was not valid JSON (`-32700`).
    ParseError,
    /// The payload was JSON but not a usable envelope (`-32600`).
    InvalidRequest,
    /// No executor is registered under the requested name (`-32601`).
    MethodNotFound,
    /// The executor rejected its parameters (`-32602`).
    InvalidParams,
    /// The executor failed while running (`-32000`).
    InternalError,
    /// The executor could not find the entity it was asked about (`-32001`).
    EntityNotFound,
    /// Any other code reported by a peer.
    Other(i64),
}

impl ErrorCode {
    /// Integer sent on the wire.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32000,
            Self::EntityNotFound => -32001,
            Self::Other(code) => code,
        }
    }

    /// Short stable label used in logs and CLI output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ParseError => "parse_error",
            Self::InvalidRequest => "invalid_request",
            Self::MethodNotFound => "method_not_found",
            Self::InvalidParams => "invalid_params",
            Self::InternalError => "internal_error",
            Self::EntityNotFound => "entity_not_found",
            Self::Other(_) => "other",
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32000 => Self::InternalError,
            -32001 => Self::EntityNotFound,
            other => Self::Other(other),
        }
    }
}

impl From<ErrorCode> for i64 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} ({})", self.label(), self.code())
    }
}
