//! Accept loop and connection bookkeeping.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nexus_rpc::{Channel, ChannelOptions};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, warn};

use crate::health::HealthReporter;

pub(super) const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::listener");

/// Pause after a failed `accept` so a persistent error cannot spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Channels accepted by one server run.
#[derive(Default)]
pub(super) struct Connections {
    state: Mutex<ConnectionState>,
}

#[derive(Default)]
struct ConnectionState {
    next_key: u64,
    open: HashMap<u64, Channel>,
    draining: bool,
}

impl Connections {
    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tracks `channel`, or returns `None` once the server is draining.
    fn insert(&self, channel: Channel) -> Option<u64> {
        let mut state = self.lock();
        if state.draining {
            return None;
        }
        let key = state.next_key;
        state.next_key += 1;
        state.open.insert(key, channel);
        Some(key)
    }

    fn remove(&self, key: u64) {
        self.lock().open.remove(&key);
    }

    pub(super) fn len(&self) -> usize {
        self.lock().open.len()
    }

    /// Stops accepting new channels and hands back the open ones.
    pub(super) fn drain(&self) -> Vec<Channel> {
        let mut state = self.lock();
        state.draining = true;
        state.open.values().cloned().collect()
    }
}

/// What every accepted connection needs.
pub(super) struct Acceptor {
    pub(super) options: ChannelOptions,
    pub(super) connections: Arc<Connections>,
    pub(super) reporter: Arc<dyn HealthReporter>,
}

impl Acceptor {
    /// Upgrades one TCP stream and holds it until the channel closes.
    async fn serve(self: Arc<Self>, stream: TcpStream, address: SocketAddr) {
        let peer = address.to_string();
        let websocket = match accept_async(stream).await {
            Ok(websocket) => websocket,
            Err(error) => {
                warn!(target: LISTENER_TARGET, %peer, %error, "websocket handshake failed");
                return;
            }
        };

        let channel = Channel::from_stream(websocket, peer.clone(), self.options.clone());
        let Some(key) = self.connections.insert(channel.clone()) else {
            debug!(target: LISTENER_TARGET, %peer, "server stopping; refusing connection");
            channel.close().await;
            return;
        };

        self.reporter.connection_opened(&peer);
        channel.closed().await;
        self.connections.remove(key);
        self.reporter.connection_closed(&peer);
    }
}

/// Accepts connections until `shutdown` fires or its sender is dropped.
pub(super) async fn accept_loop(
    listener: TcpListener,
    acceptor: Arc<Acceptor>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, address)) => {
                    debug!(target: LISTENER_TARGET, %address, "accepted connection");
                    tokio::spawn(Arc::clone(&acceptor).serve(stream, address));
                }
                Err(error) => {
                    warn!(target: LISTENER_TARGET, %error, "accept failed; backing off");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
    info!(target: LISTENER_TARGET, "listener stopped");
}
