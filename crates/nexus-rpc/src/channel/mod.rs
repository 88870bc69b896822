//! Bidirectional request/response channel over a websocket.
//!
//! A [`Channel`] owns one websocket connection. Any number of tasks may
//! [`Channel::call`] concurrently; each call allocates a fresh identifier,
//! registers a waiter in the connection's [`CorrelationTable`] and suspends on
//! it. A single reader task classifies every inbound message by shape:
//! responses resolve waiters, requests are handed to the channel's
//! [`Dispatcher`] on their own task so reading never waits on execution.
//!
//! When the connection ends, for whatever reason, the table is closed and
//! every suspended or later caller fails instead of hanging.

mod error;
mod io;
mod state;

#[cfg(test)]
mod tests;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use nexus_protocol::{
    DecodeError, ErrorCode, Message, Outcome, Params, Request, Response, decode, encode,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::correlation::{CorrelationError, CorrelationTable, Resolution, Waiter};
use crate::dispatch::Dispatcher;

pub use self::error::ChannelError;
pub use self::state::ChannelState;
use self::io::Outbound;
use self::state::StateCell;

/// Tracing target for channel operations.
pub(crate) const CHANNEL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::channel");

/// Default bound on how long a call waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time `close` waits for the peer to acknowledge.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Per-channel settings.
#[derive(Clone)]
pub struct ChannelOptions {
    request_timeout: Duration,
    close_grace: Duration,
    dispatcher: Option<Arc<Dispatcher>>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            close_grace: DEFAULT_CLOSE_GRACE,
            dispatcher: None,
        }
    }
}

impl std::fmt::Debug for ChannelOptions {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ChannelOptions")
            .field("request_timeout", &self.request_timeout)
            .field("close_grace", &self.close_grace)
            .field("answers_requests", &self.dispatcher.is_some())
            .finish()
    }
}

impl ChannelOptions {
    /// Sets the per-call response timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets how long `close` waits for the peer's acknowledgement.
    #[must_use]
    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    /// Answers inbound requests with `dispatcher`.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Per-call response timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// State shared by the channel handles and its background tasks.
pub(crate) struct Shared {
    peer: String,
    table: Arc<CorrelationTable>,
    state: StateCell,
    outbound: mpsc::UnboundedSender<Outbound>,
    options: ChannelOptions,
    failure: Mutex<Option<String>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn handle_text(self: &Arc<Self>, text: &str) {
        match decode(text) {
            Ok(Message::Response(response)) => self.accept_response(response),
            Ok(Message::Request(request)) => self.serve(request),
            Err(error) => self.reject(&error),
        }
    }

    fn accept_response(&self, response: Response) {
        match self.table.resolve(response) {
            Resolution::Delivered => {}
            Resolution::Unmatched(response) => {
                warn!(
                    target: CHANNEL_TARGET,
                    peer = %self.peer,
                    id = response.id,
                    "dropping response nobody awaits"
                );
            }
            Resolution::Unattributed(response) => {
                warn!(
                    target: CHANNEL_TARGET,
                    peer = %self.peer,
                    outcome = ?response.outcome,
                    "peer reported a protocol error"
                );
            }
        }
    }

    fn serve(self: &Arc<Self>, request: Request) {
        let Some(dispatcher) = self.options.dispatcher.clone() else {
            debug!(
                target: CHANNEL_TARGET,
                peer = %self.peer,
                id = request.id,
                method = %request.method,
                "no dispatcher for inbound request"
            );
            self.send_response(Response::failure(
                Some(request.id),
                ErrorCode::MethodNotFound,
                format!("Unknown command: {}", request.method),
            ));
            return;
        };

        debug!(
            target: CHANNEL_TARGET,
            peer = %self.peer,
            id = request.id,
            method = %request.method,
            "dispatching request"
        );
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let Request { id, method, params } = request;
            let outcome = dispatcher.submit(method, params).await;
            shared.send_response(Response::new(Some(id), outcome));
        });
    }

    fn reject(&self, error: &DecodeError) {
        if error.is_response() {
            self.fail_waiter(error);
        } else if self.options.dispatcher.is_some() {
            warn!(
                target: CHANNEL_TARGET,
                peer = %self.peer,
                %error,
                "answering undecodable message"
            );
            self.send_response(error.to_response());
        } else {
            warn!(
                target: CHANNEL_TARGET,
                peer = %self.peer,
                %error,
                "discarding undecodable message"
            );
        }
    }

    /// Fails the caller awaiting a reply that could not be decoded. Replies
    /// are never answered, so the peer hears nothing.
    fn fail_waiter(&self, error: &DecodeError) {
        let Some(id) = error.id() else {
            warn!(
                target: CHANNEL_TARGET,
                peer = %self.peer,
                %error,
                "discarding unattributable malformed response"
            );
            return;
        };
        warn!(target: CHANNEL_TARGET, peer = %self.peer, id, %error, "failing call on malformed response");
        let local = Response::failure(Some(id), error.code(), error.to_string());
        if let Resolution::Unmatched(_) = self.table.resolve(local) {
            warn!(
                target: CHANNEL_TARGET,
                peer = %self.peer,
                id,
                "malformed response answers no pending call"
            );
        }
    }

    fn send_response(&self, response: Response) {
        let id = response.id;
        match encode(&Message::Response(response)) {
            Ok(frame) => {
                if self.outbound.send(Outbound::Frame(frame)).is_err() {
                    debug!(
                        target: CHANNEL_TARGET,
                        peer = %self.peer,
                        id,
                        "connection ended before the response was written"
                    );
                }
            }
            Err(error) => {
                warn!(target: CHANNEL_TARGET, peer = %self.peer, %error, "failed to encode response");
            }
        }
    }

    fn closed_error(&self) -> ChannelError {
        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match failure {
            Some(reason) => ChannelError::Transport { reason },
            None => ChannelError::Closed,
        }
    }

    /// Tears the connection down. Safe to call more than once.
    fn finish(&self, failure: Option<String>) {
        if self.state.get() == ChannelState::Closed {
            return;
        }
        if let Some(reason) = failure {
            warn!(target: CHANNEL_TARGET, peer = %self.peer, %reason, "connection failed");
            *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason);
        }
        let abandoned = self.table.close();
        self.state.advance(ChannelState::Closed);
        if self.outbound.send(Outbound::Shutdown).is_err() {
            debug!(target: CHANNEL_TARGET, peer = %self.peer, "writer already stopped");
        }
        info!(target: CHANNEL_TARGET, peer = %self.peer, abandoned, "channel closed");
    }
}

/// Handle to one websocket connection. Cheap to clone.
///
/// The connection lives until [`Channel::close`] is called or the peer goes
/// away; dropping handles does not close it.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Channel")
            .field("peer", &self.shared.peer)
            .field("state", &self.state())
            .field("pending", &self.pending_requests())
            .finish()
    }
}

impl Channel {
    /// Dials `url` and opens a channel over the resulting websocket.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Connect`] when the connection or the websocket
    /// handshake fails; [`ChannelError::is_refused`] tells a refused
    /// connection apart.
    pub async fn connect(url: &str, options: ChannelOptions) -> Result<Self, ChannelError> {
        let state = StateCell::new();
        state.advance(ChannelState::Connecting);
        info!(target: CHANNEL_TARGET, endpoint = url, "connecting");

        match connect_async(url).await {
            Ok((stream, _response)) => Ok(Self::open(stream, url.to_owned(), state, options)),
            Err(error) => {
                state.advance(ChannelState::Closed);
                Err(ChannelError::Connect {
                    endpoint: url.to_owned(),
                    source: Box::new(error),
                })
            }
        }
    }

    /// Opens a channel over an already established websocket, such as one
    /// accepted by a listener.
    pub fn from_stream<S>(
        stream: WebSocketStream<S>,
        peer: impl Into<String>,
        options: ChannelOptions,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let state = StateCell::new();
        state.advance(ChannelState::Connecting);
        Self::open(stream, peer.into(), state, options)
    }

    fn open<S>(
        stream: WebSocketStream<S>,
        peer: String,
        state: StateCell,
        options: ChannelOptions,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        state.advance(ChannelState::Open);
        let (sink, source) = stream.split();
        let (outbound, queue) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            peer: peer.clone(),
            table: CorrelationTable::new(),
            state,
            outbound,
            options,
            failure: Mutex::new(None),
            reader: Mutex::new(None),
        });

        tokio::spawn(io::write_loop(sink, queue, peer.clone()));
        let reader = tokio::spawn(io::read_loop(Arc::clone(&shared), source));
        *shared.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(reader);

        info!(target: CHANNEL_TARGET, %peer, "channel open");
        Self { shared }
    }

    /// Label of the remote end, used in logs.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.shared.peer
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.shared.state.get()
    }

    /// Number of calls awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.shared.table.pending()
    }

    /// Per-call response timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.shared.options.request_timeout
    }

    /// Sends `method` and waits for its response, bounded by the request
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Timeout`] when no response arrives in time and
    /// [`ChannelError::Closed`] or [`ChannelError::Transport`] when the
    /// connection ends first.
    pub async fn call(&self, method: &str, params: Params) -> Result<Outcome, ChannelError> {
        let waiter = self.issue(method, params)?;
        let id = waiter.id();
        let after = self.shared.options.request_timeout;
        match tokio::time::timeout(after, waiter.wait()).await {
            Ok(result) => self.settle(result),
            Err(_elapsed) => {
                warn!(
                    target: CHANNEL_TARGET,
                    peer = %self.shared.peer,
                    id,
                    method,
                    ?after,
                    "request timed out"
                );
                Err(ChannelError::Timeout {
                    method: method.to_owned(),
                    id,
                    after,
                })
            }
        }
    }

    /// Sends `method` and waits for its response with no time bound.
    ///
    /// The call still fails when the connection ends.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] or [`ChannelError::Transport`] when the
    /// connection ends before the response arrives.
    pub async fn call_without_timeout(
        &self,
        method: &str,
        params: Params,
    ) -> Result<Outcome, ChannelError> {
        let waiter = self.issue(method, params)?;
        self.settle(waiter.wait().await)
    }

    fn issue(&self, method: &str, params: Params) -> Result<Waiter, ChannelError> {
        if self.state() != ChannelState::Open {
            return Err(self.shared.closed_error());
        }

        let request = Request::new(method, params);
        let id = request.id;
        let waiter = self
            .shared
            .table
            .register(id)
            .map_err(|error| self.correlation_error(error))?;
        let frame = encode(&Message::Request(request))?;

        debug!(target: CHANNEL_TARGET, peer = %self.shared.peer, id, method, "sending request");
        self.shared
            .outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| self.shared.closed_error())?;
        Ok(waiter)
    }

    fn settle(&self, result: Result<Response, CorrelationError>) -> Result<Outcome, ChannelError> {
        result
            .map(|response| response.outcome)
            .map_err(|error| self.correlation_error(error))
    }

    fn correlation_error(&self, error: CorrelationError) -> ChannelError {
        match error {
            CorrelationError::Closed => self.shared.closed_error(),
            // Identifiers come from a process-wide counter; a clash means the
            // table is unusable.
            CorrelationError::DuplicateId(id) => ChannelError::Transport {
                reason: format!("request id {id} issued twice"),
            },
        }
    }

    /// Closes the connection.
    ///
    /// Sends a websocket close frame and waits up to the close grace period
    /// for the peer to acknowledge it, then forces the connection down.
    /// Outstanding calls fail with [`ChannelError::Closed`].
    pub async fn close(&self) {
        if self.shared.state.advance(ChannelState::Closing) {
            info!(target: CHANNEL_TARGET, peer = %self.shared.peer, "closing channel");
            if self.shared.outbound.send(Outbound::Close).is_err() {
                debug!(target: CHANNEL_TARGET, peer = %self.shared.peer, "writer already stopped");
            }
        }

        let grace = self.shared.options.close_grace;
        if tokio::time::timeout(grace, self.closed()).await.is_err() {
            warn!(
                target: CHANNEL_TARGET,
                peer = %self.shared.peer,
                ?grace,
                "peer did not acknowledge close; forcing"
            );
            let reader = self
                .shared
                .reader
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(reader) = reader {
                reader.abort();
            }
            self.shared.finish(None);
        }
    }

    /// Resolves once the connection has closed.
    pub async fn closed(&self) {
        self.shared.state.closed().await;
    }
}
