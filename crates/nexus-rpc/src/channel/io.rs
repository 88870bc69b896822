//! Reader and writer tasks that own the two halves of a websocket.

use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tracing::{debug, trace, warn};

use super::{CHANNEL_TARGET, Shared};

/// Work items for the writer task.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// An encoded message.
    Frame(String),
    /// Start the websocket close handshake.
    Close,
    /// The reader has finished; flush and stop.
    Shutdown,
}

/// Drains the outbound queue into the sink.
///
/// This is the only task that writes to the transport, so callers, dispatcher
/// replies and the close handshake never contend for the sink.
pub(crate) async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, WsMessage>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    peer: String,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(item) = queue.recv().await {
        match item {
            Outbound::Frame(text) => {
                trace!(target: CHANNEL_TARGET, %peer, bytes = text.len(), "writing frame");
                if let Err(error) = sink.send(WsMessage::Text(text)).await {
                    warn!(target: CHANNEL_TARGET, %peer, %error, "failed to write frame");
                    break;
                }
            }
            Outbound::Close => {
                if let Err(error) = sink.send(WsMessage::Close(None)).await {
                    debug!(target: CHANNEL_TARGET, %peer, %error, "failed to send close frame");
                }
            }
            Outbound::Shutdown => break,
        }
    }

    if let Err(error) = sink.close().await {
        trace!(target: CHANNEL_TARGET, %peer, %error, "sink already closed");
    }
    debug!(target: CHANNEL_TARGET, %peer, "writer stopped");
}

/// Reads frames until the connection ends, then tears the channel down.
pub(crate) async fn read_loop<S>(shared: Arc<Shared>, mut stream: SplitStream<WebSocketStream<S>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let failure = loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => shared.handle_text(&text),
            Some(Ok(WsMessage::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => shared.handle_text(&text),
                Err(error) => {
                    warn!(
                        target: CHANNEL_TARGET,
                        peer = %shared.peer,
                        %error,
                        "discarding binary frame that is not UTF-8"
                    );
                }
            },
            // Keep reading so the close reply is flushed and the stream ends.
            Some(Ok(WsMessage::Close(frame))) => {
                debug!(target: CHANNEL_TARGET, peer = %shared.peer, ?frame, "peer sent close");
            }
            Some(Ok(_)) => {}
            Some(Err(
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
            ))
            | None => break None,
            Some(Err(error)) => break Some(error.to_string()),
        }
    };
    shared.finish(failure);
}
