//! Matching of asynchronous responses to the callers awaiting them.
//!
//! Each outstanding request owns one oneshot wakeup. The receive loop is the
//! only writer: delivering a response removes the entry and hands the
//! response to its waiter, so an identifier is observed at most once. A
//! waiter that gives up removes its own entry when dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nexus_protocol::Response;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors raised by the correlation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CorrelationError {
    /// The connection owning the table has closed.
    #[error("connection closed")]
    Closed,
    /// A waiter for this identifier already exists.
    #[error("request id {0} is already awaiting a response")]
    DuplicateId(i64),
}

/// What happened to a response handed to [`CorrelationTable::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A waiter received the response.
    Delivered,
    /// Nobody awaits this identifier; the response is returned for logging.
    Unmatched(Response),
    /// The response carries no identifier.
    Unattributed(Response),
}

#[derive(Debug, Default)]
struct TableState {
    pending: HashMap<i64, oneshot::Sender<Response>>,
    closed: bool,
}

/// Per-connection map from request identifier to its waiting caller.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    state: Mutex<TableState>,
}

impl CorrelationTable {
    /// Creates an empty, open table.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers interest in the response to `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Closed`] once the table has been closed and
    /// [`CorrelationError::DuplicateId`] if `id` is already awaited.
    pub fn register(self: &Arc<Self>, id: i64) -> Result<Waiter, CorrelationError> {
        let mut state = self.lock();
        if state.closed {
            return Err(CorrelationError::Closed);
        }
        if state.pending.contains_key(&id) {
            return Err(CorrelationError::DuplicateId(id));
        }
        let (sender, receiver) = oneshot::channel();
        state.pending.insert(id, sender);
        Ok(Waiter {
            id,
            receiver,
            table: Arc::clone(self),
        })
    }

    /// Hands `response` to the caller waiting on its identifier.
    pub fn resolve(&self, response: Response) -> Resolution {
        let Some(id) = response.id else {
            return Resolution::Unattributed(response);
        };
        let sender = self.lock().pending.remove(&id);
        match sender {
            // A waiter dropped between removal and send has already given up.
            Some(sender) => match sender.send(response) {
                Ok(()) => Resolution::Delivered,
                Err(response) => Resolution::Unmatched(response),
            },
            None => Resolution::Unmatched(response),
        }
    }

    /// Fails every outstanding and future waiter with
    /// [`CorrelationError::Closed`]. Returns how many waiters were pending.
    pub fn close(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.lock();
            state.closed = true;
            state.pending.drain().collect()
        };
        drained.len()
    }

    /// Returns `true` once [`CorrelationTable::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of identifiers currently awaited.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    fn forget(&self, id: i64) {
        self.lock().pending.remove(&id);
    }
}

/// A caller's claim on one response.
///
/// Dropping the waiter, for instance when a timeout fires, removes its entry
/// from the table.
#[derive(Debug)]
pub struct Waiter {
    id: i64,
    receiver: oneshot::Receiver<Response>,
    table: Arc<CorrelationTable>,
}

impl Waiter {
    /// Identifier this waiter is bound to.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    /// Suspends until the response arrives or the table closes.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Closed`] when the table closes first.
    pub async fn wait(mut self) -> Result<Response, CorrelationError> {
        (&mut self.receiver)
            .await
            .map_err(|_| CorrelationError::Closed)
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.table.forget(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use nexus_protocol::ErrorCode;
    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;

    #[fixture]
    fn table() -> Arc<CorrelationTable> {
        CorrelationTable::new()
    }

    #[rstest]
    #[tokio::test]
    async fn delivers_response_to_matching_waiter(table: Arc<CorrelationTable>) {
        let waiter = table.register(1).expect("register");
        let resolution = table.resolve(Response::success(1, json!("done")));
        assert_eq!(resolution, Resolution::Delivered);
        let response = waiter.wait().await.expect("response");
        assert_eq!(response, Response::success(1, json!("done")));
        assert_eq!(table.pending(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn mismatched_identifier_leaves_waiter_suspended(table: Arc<CorrelationTable>) {
        let waiter = table.register(1).expect("register");
        let stray = Response::success(2, json!("other"));
        assert_eq!(table.resolve(stray.clone()), Resolution::Unmatched(stray));

        let pending = tokio::time::timeout(Duration::from_millis(50), waiter.wait()).await;
        assert!(pending.is_err(), "waiter must not observe another id's reply");
    }

    #[rstest]
    fn identifier_is_delivered_at_most_once(table: Arc<CorrelationTable>) {
        let _waiter = table.register(5).expect("register");
        assert_eq!(
            table.resolve(Response::success(5, json!(1))),
            Resolution::Delivered
        );
        assert!(matches!(
            table.resolve(Response::success(5, json!(2))),
            Resolution::Unmatched(_)
        ));
    }

    #[rstest]
    fn unattributed_responses_are_returned(table: Arc<CorrelationTable>) {
        let response = Response::failure(None, ErrorCode::ParseError, "bad");
        assert_eq!(
            table.resolve(response.clone()),
            Resolution::Unattributed(response)
        );
    }

    #[rstest]
    fn rejects_duplicate_registration(table: Arc<CorrelationTable>) {
        let _waiter = table.register(3).expect("register");
        let error = table.register(3).expect_err("duplicate");
        assert_eq!(error, CorrelationError::DuplicateId(3));
    }

    #[rstest]
    fn dropping_a_waiter_removes_its_entry(table: Arc<CorrelationTable>) {
        let waiter = table.register(4).expect("register");
        assert_eq!(table.pending(), 1);
        drop(waiter);
        assert_eq!(table.pending(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn timed_out_waiter_leaves_no_entry(table: Arc<CorrelationTable>) {
        let waiter = table.register(6).expect("register");
        let outcome = tokio::time::timeout(Duration::from_millis(10), waiter.wait()).await;
        assert!(outcome.is_err());
        assert_eq!(table.pending(), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn closing_fails_outstanding_and_future_waiters(table: Arc<CorrelationTable>) {
        let first = table.register(7).expect("register");
        let second = table.register(8).expect("register");
        assert_eq!(table.close(), 2);
        assert!(table.is_closed());

        assert_eq!(first.wait().await, Err(CorrelationError::Closed));
        assert_eq!(second.wait().await, Err(CorrelationError::Closed));
        assert_eq!(
            table.register(9).expect_err("closed"),
            CorrelationError::Closed
        );
    }

    #[rstest]
    #[tokio::test]
    async fn concurrent_waiters_each_receive_their_own_response(table: Arc<CorrelationTable>) {
        let waiters: Vec<_> = (100..132)
            .map(|id| table.register(id).expect("register"))
            .collect();
        for id in (100..132).rev() {
            assert_eq!(
                table.resolve(Response::success(id, json!(id))),
                Resolution::Delivered
            );
        }
        for waiter in waiters {
            let id = waiter.id();
            let response = waiter.wait().await.expect("response");
            assert_eq!(response, Response::success(id, json!(id)));
        }
    }
}
