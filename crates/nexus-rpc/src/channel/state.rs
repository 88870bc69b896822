//! Connection state machine.

use strum::{AsRefStr, Display};
use tokio::sync::watch;
use tracing::debug;

use super::CHANNEL_TARGET;

/// Lifecycle of one connection.
///
/// ```text
/// Disconnected -> Connecting -> Open -> Closing -> Closed
///                      \           \________________/^
///                       \_______________________________/
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ChannelState {
    /// Nothing has been attempted yet.
    Disconnected,
    /// The websocket handshake is in progress.
    Connecting,
    /// Requests may be sent and received.
    Open,
    /// A close handshake has been started locally.
    Closing,
    /// The connection is gone; every call fails.
    Closed,
}

impl ChannelState {
    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected, Self::Connecting)
                | (Self::Connecting, Self::Open | Self::Closed)
                | (Self::Open, Self::Closing | Self::Closed)
                | (Self::Closing, Self::Closed)
        )
    }
}

/// Observable holder of a [`ChannelState`] that only accepts legal moves.
#[derive(Debug)]
pub(crate) struct StateCell {
    sender: watch::Sender<ChannelState>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(ChannelState::Disconnected);
        Self { sender }
    }

    pub(crate) fn get(&self) -> ChannelState {
        *self.sender.borrow()
    }

    /// Moves to `next` if legal. Returns whether the state changed.
    pub(crate) fn advance(&self, next: ChannelState) -> bool {
        let mut previous = None;
        self.sender.send_if_modified(|current| {
            if current.can_transition_to(next) {
                previous = Some(*current);
                *current = next;
                true
            } else {
                false
            }
        });
        match previous {
            Some(from) => {
                debug!(target: CHANNEL_TARGET, %from, to = %next, "channel state changed");
                true
            }
            None => {
                debug!(
                    target: CHANNEL_TARGET,
                    current = %self.get(),
                    requested = %next,
                    "rejected channel state transition"
                );
                false
            }
        }
    }

    /// Resolves once the state reaches [`ChannelState::Closed`].
    pub(crate) async fn closed(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so waiting cannot fail.
        let _closed = receiver
            .wait_for(|state| *state == ChannelState::Closed)
            .await;
    }
}
