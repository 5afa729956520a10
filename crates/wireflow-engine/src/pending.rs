/*!
 * Pending requests.
 *
 * A [`PendingRequest`] is owned by the connection loop from the moment its
 * submission is received until one outcome fires. Its lifecycle is:
 *
 * ```text
 * Created -> Sent -> Completed | TimedOut | Cancelled | ConnectionLost
 * ```
 *
 * A request may also end straight from `Created` when it is cancelled, its
 * deadline passes while queued, or the transport fails while sending it.
 */
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, OwnedSemaphorePermit};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ConversationError, Result};

/// Identifier of one request within a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub(crate) u64);

impl RequestId {
    /// Numeric value of the id
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    /// Registered but not yet handed to the transport
    Created,
    /// Handed to the transport, awaiting a matching response
    Sent,
    /// A matching response was delivered
    Completed,
    /// The deadline passed first
    TimedOut,
    /// Cancelled by the caller or by closing the connection
    Cancelled,
    /// The connection failed while the request was outstanding
    ConnectionLost,
}

impl RequestState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestState::Created | RequestState::Sent)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Created, Sent)
                | (Created, TimedOut)
                | (Created, Cancelled)
                | (Created, ConnectionLost)
                | (Sent, Completed)
                | (Sent, TimedOut)
                | (Sent, Cancelled)
                | (Sent, ConnectionLost)
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Sent => write!(f, "Sent"),
            Self::Completed => write!(f, "Completed"),
            Self::TimedOut => write!(f, "Timed Out"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::ConnectionLost => write!(f, "Connection Lost"),
        }
    }
}

/// Predicate deciding whether an incoming message answers a request
pub type Matcher<M> = Box<dyn Fn(&M) -> bool + Send + Sync>;

/// Flag a caller raises to cancel a request, shared with the connection loop
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub(crate) fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A request owned by the connection loop
pub(crate) struct PendingRequest<M> {
    id: RequestId,
    state: RequestState,
    matcher: Matcher<M>,
    deadline: Instant,
    timeout_ms: u64,
    cancelled: CancelFlag,
    tx: Option<oneshot::Sender<Result<M>>>,
    // Releases the in-flight slot when the request is dropped
    _permit: OwnedSemaphorePermit,
}

impl<M> fmt::Debug for PendingRequest<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl<M> PendingRequest<M> {
    pub(crate) fn new(
        id: RequestId,
        matcher: Matcher<M>,
        deadline: Instant,
        timeout_ms: u64,
        cancelled: CancelFlag,
        tx: oneshot::Sender<Result<M>>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            id,
            state: RequestState::Created,
            matcher,
            deadline,
            timeout_ms,
            cancelled,
            tx: Some(tx),
            _permit: permit,
        }
    }

    pub(crate) fn id(&self) -> RequestId {
        self.id
    }

    pub(crate) fn state(&self) -> RequestState {
        self.state
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    pub(crate) fn is_overdue(&self, now: Instant) -> bool {
        self.deadline <= now
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.cancelled.is_raised()
    }

    pub(crate) fn matches(&self, message: &M) -> bool {
        (self.matcher)(message)
    }

    /// Move to a non-terminal state
    pub(crate) fn mark_sent(&mut self) -> bool {
        self.transition(RequestState::Sent)
    }

    fn transition(&mut self, next: RequestState) -> bool {
        if !self.state.can_transition_to(next) {
            debug!("Request {} ignores transition {} -> {}", self.id, self.state, next);
            return false;
        }
        debug!("Request {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        true
    }

    /// Deliver the outcome matching `state` and release the request
    ///
    /// Returns the matcher so an expired request can still recognise its
    /// late response.
    pub(crate) fn finish(mut self, state: RequestState, response: Option<M>) -> (RequestId, Matcher<M>) {
        if self.transition(state) {
            let outcome = match (state, response) {
                (RequestState::Completed, Some(message)) => Ok(message),
                (RequestState::TimedOut, _) => Err(ConversationError::Timeout(self.timeout_ms)),
                (RequestState::Cancelled, _) => Err(ConversationError::Cancelled),
                (RequestState::ConnectionLost, _) => {
                    Err(ConversationError::connection_lost("transport closed"))
                }
                _ => Err(ConversationError::driver("request finished without a response")),
            };
            if let Some(tx) = self.tx.take() {
                if tx.send(outcome).is_err() {
                    debug!("Caller of request {} is gone", self.id);
                }
            }
        }
        (self.id, self.matcher)
    }

    /// Fail the request with a specific error
    pub(crate) fn fail(mut self, state: RequestState, error: ConversationError) -> (RequestId, Matcher<M>) {
        if self.transition(state) {
            if let Some(tx) = self.tx.take() {
                if tx.send(Err(error)).is_err() {
                    debug!("Caller of request {} is gone", self.id);
                }
            }
        }
        (self.id, self.matcher)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Semaphore;

    use super::*;

    fn request(tx: oneshot::Sender<Result<u8>>) -> PendingRequest<u8> {
        let permit = Arc::new(Semaphore::new(1)).try_acquire_owned().unwrap();
        PendingRequest::new(
            RequestId(1),
            Box::new(|m: &u8| *m == 7),
            Instant::now(),
            50,
            CancelFlag::default(),
            tx,
            permit,
        )
    }

    #[test]
    fn test_transitions() {
        use RequestState::*;
        assert!(Created.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Completed));
        assert!(Sent.can_transition_to(ConnectionLost));
        assert!(!Created.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!TimedOut.can_transition_to(Completed));
        assert!(Cancelled.is_terminal());
        assert!(!Sent.is_terminal());
    }

    #[tokio::test]
    async fn test_completion_delivers_message() {
        let (tx, rx) = oneshot::channel();
        let mut pending = request(tx);
        assert!(pending.mark_sent());
        assert!(pending.matches(&7));
        assert!(!pending.matches(&8));

        let (id, matcher) = pending.finish(RequestState::Completed, Some(7));
        assert_eq!(id, RequestId(1));
        assert!(matcher(&7));
        assert_eq!(rx.await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_timeout_reports_deadline() {
        let (tx, rx) = oneshot::channel();
        let mut pending = request(tx);
        pending.mark_sent();
        pending.finish(RequestState::TimedOut, None);
        match rx.await.unwrap() {
            Err(ConversationError::Timeout(ms)) => assert_eq!(ms, 50),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permit_released_on_finish() {
        let semaphore = Arc::new(Semaphore::new(1));
        let (tx, _rx) = oneshot::channel::<Result<u8>>();
        let pending = PendingRequest::new(
            RequestId(2),
            Box::new(|_: &u8| true),
            Instant::now(),
            10,
            CancelFlag::default(),
            tx,
            semaphore.clone().try_acquire_owned().unwrap(),
        );
        assert_eq!(semaphore.available_permits(), 0);
        drop(pending.finish(RequestState::Cancelled, None));
        assert_eq!(semaphore.available_permits(), 1);
    }
}
