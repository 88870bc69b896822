//! Wire protocol shared by the Nexus host daemon and its controllers.
//!
//! Messages are JSON-RPC 2.0 shaped envelopes carried as websocket text
//! frames. The crate owns the envelope types, the error code table and the
//! [`encode`]/[`decode`] pair; it performs no I/O.

mod codec;
mod error_code;
mod message;

pub use codec::{DecodeError, EncodeError, JSONRPC_VERSION, decode, encode};
pub use error_code::ErrorCode;
pub use message::{
    ErrorObject, Message, Outcome, Params, Request, Response, next_request_id,
};
