use std::io;
use std::time::Duration;

use nexus_protocol::EncodeError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors surfaced to callers of a [`super::Channel`].
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The websocket connection could not be established.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// Address that was dialled.
        endpoint: String,
        /// Underlying handshake or socket failure.
        #[source]
        source: Box<tungstenite::Error>,
    },
    /// The connection closed before the call completed.
    #[error("connection closed")]
    Closed,
    /// The connection failed with a transport error.
    #[error("connection lost: {reason}")]
    Transport {
        /// Description of the transport failure.
        reason: String,
    },
    /// No response arrived within the request timeout.
    #[error("request {id} ({method}) timed out after {after:?}")]
    Timeout {
        /// Operation that was called.
        method: String,
        /// Identifier of the abandoned request.
        id: i64,
        /// The timeout that elapsed.
        after: Duration,
    },
    /// The request could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl ChannelError {
    /// Returns `true` when the peer actively refused the connection.
    #[must_use]
    pub fn is_refused(&self) -> bool {
        match self {
            Self::Connect { source, .. } => matches!(
                source.as_ref(),
                tungstenite::Error::Io(error) if error.kind() == io::ErrorKind::ConnectionRefused
            ),
            _ => false,
        }
    }

    /// Returns `true` for failures that end the connection.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Closed | Self::Transport { .. }
        )
    }
}
