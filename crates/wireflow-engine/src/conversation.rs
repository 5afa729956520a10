/*!
 * Conversation engine.
 *
 * One [`Conversation`] owns one transport. All decoding, matching, deadline
 * handling and completion happens on a single task per connection; callers
 * on any task reach it through a bounded submission channel, so the set of
 * pending requests is never shared.
 *
 * Callers encode their message and acquire an in-flight slot before
 * submitting. The loop queues the bytes for the transport and keeps writing
 * them alongside reading, so a peer that stops reading never holds up
 * deadlines, cancellation or shutdown. Once written, a request waits in
 * submission order and completes with the first incoming message its matcher
 * accepts. Messages nobody waits for go to the unsolicited handler, unless
 * they answer a request that recently expired.
 */
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::future::poll_fn;
use futures::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn, Instrument};
use wireflow_codec::{
    Decoded, FrameCodec, FrameDetector, FramingConfig, FramingStats, FramingStatsSnapshot,
    MessageCatalog,
};
use wireflow_core::config::ConversationSettings;
use wireflow_core::event::{SharedEventBus, TypedEvent};
use wireflow_core::logging::connection_span;
use wireflow_core::types::Id;
use wireflow_core::utils::duration_to_millis;

use crate::error::{ConversationError, Result};
use crate::pending::{CancelFlag, Matcher, PendingRequest, RequestId, RequestState};

/// Idle wake-up interval of the loop when nothing is pending
const IDLE_DEADLINE: Duration = Duration::from_secs(3_600);

/// Limits of one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationConfig {
    /// Deadline used when a request does not carry its own
    pub default_timeout: Duration,
    /// Maximum number of submitted requests not yet finished
    pub max_in_flight: usize,
    /// Capacity of the submission channel
    pub submission_queue_depth: usize,
    /// Number of expired requests whose late responses are recognised
    pub late_response_memory: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self::from(&ConversationSettings::default())
    }
}

impl From<&ConversationSettings> for ConversationConfig {
    fn from(settings: &ConversationSettings) -> Self {
        Self {
            default_timeout: settings.default_timeout(),
            max_in_flight: settings.max_in_flight,
            submission_queue_depth: settings.submission_queue_depth,
            late_response_memory: settings.late_response_memory,
        }
    }
}

/// Lifecycle of the transport behind a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// The loop is running
    Open,
    /// Closed locally
    Closed,
    /// The transport failed or the peer went away
    Lost,
}

/// Published on the event bus for every request that reaches a terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEvent {
    /// The request
    pub request: RequestId,
    /// Its terminal state
    pub state: RequestState,
}

/// Receives messages that answer no pending request
pub type UnsolicitedHandler<M> = Box<dyn FnMut(M) + Send>;

struct Submission<M> {
    id: RequestId,
    bytes: Bytes,
    matcher: Matcher<M>,
    deadline: Instant,
    timeout_ms: u64,
    cancelled: CancelFlag,
    tx: oneshot::Sender<Result<M>>,
    permit: OwnedSemaphorePermit,
}

impl<M> Submission<M> {
    fn into_pending(self) -> (PendingRequest<M>, Bytes) {
        let request = PendingRequest::new(
            self.id,
            self.matcher,
            self.deadline,
            self.timeout_ms,
            self.cancelled,
            self.tx,
            self.permit,
        );
        (request, self.bytes)
    }
}

/// Cancels one request; cheap to clone and safe to call any number of times
#[derive(Debug, Clone)]
pub struct Canceller {
    id: RequestId,
    flag: CancelFlag,
    tx: mpsc::UnboundedSender<RequestId>,
}

impl Canceller {
    /// Ask the connection loop to cancel the request
    ///
    /// Cancelling a request that already finished is a no-op.
    pub fn cancel(&self) {
        self.flag.raise();
        if self.tx.send(self.id).is_err() {
            trace!("Cancel of request {} after the connection ended", self.id);
        }
    }
}

/// Caller side of a submitted request
///
/// Dropping the handle before the outcome arrives cancels the request.
pub struct PendingHandle<M> {
    id: RequestId,
    rx: oneshot::Receiver<Result<M>>,
    canceller: Canceller,
    settled: bool,
}

impl<M> fmt::Debug for PendingHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingHandle").field("id", &self.id).finish()
    }
}

impl<M> PendingHandle<M> {
    /// Id of the request
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Cancel the request
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// A detached canceller for use from another task
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// Wait for the outcome of the request
    pub async fn response(mut self) -> Result<M> {
        let outcome = match (&mut self.rx).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ConversationError::connection_lost("connection loop ended")),
        };
        self.settled = true;
        outcome
    }
}

impl<M> Drop for PendingHandle<M> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("Request {} abandoned by its caller", self.id);
            self.canceller.cancel();
        }
    }
}

/// Builder for a [`Conversation`]
pub struct ConversationBuilder<P: MessageCatalog> {
    protocol: Arc<P>,
    id: Id,
    config: ConversationConfig,
    framing: FramingConfig,
    events: SharedEventBus,
    unsolicited: Option<UnsolicitedHandler<P::Message>>,
}

impl<P> ConversationBuilder<P>
where
    P: FrameDetector + MessageCatalog + 'static,
{
    /// Use a specific connection id
    pub fn with_id(mut self, id: Id) -> Self {
        self.id = id;
        self
    }

    /// Set the conversation limits
    pub fn with_config(mut self, config: ConversationConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the framing limits
    pub fn with_framing(mut self, framing: FramingConfig) -> Self {
        self.framing = framing;
        self
    }

    /// Publish request lifecycle events on `events`
    pub fn with_event_bus(mut self, events: SharedEventBus) -> Self {
        self.events = events;
        self
    }

    /// Route messages that answer no request to `handler`
    pub fn on_unsolicited<F>(mut self, handler: F) -> Self
    where
        F: FnMut(P::Message) + Send + 'static,
    {
        self.unsolicited = Some(Box::new(handler));
        self
    }

    /// Start the connection loop over `io`
    pub fn start<IO>(self, io: IO) -> Conversation<P>
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Conversation::start(self, io)
    }
}

/// Handle to the connection loop of one transport
pub struct Conversation<P: MessageCatalog> {
    id: Id,
    protocol: Arc<P>,
    config: ConversationConfig,
    submissions: mpsc::Sender<Submission<P::Message>>,
    cancels: mpsc::UnboundedSender<RequestId>,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    state: watch::Receiver<ConnectionState>,
    stats: Arc<FramingStats>,
    task: JoinHandle<()>,
}

impl<P: MessageCatalog> fmt::Debug for Conversation<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("id", &self.id)
            .field("protocol", &self.protocol.protocol_name())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl<P> Conversation<P>
where
    P: FrameDetector + MessageCatalog + 'static,
{
    /// Start building a conversation for `protocol`
    pub fn builder(protocol: Arc<P>) -> ConversationBuilder<P> {
        ConversationBuilder {
            protocol,
            id: Id::new(),
            config: ConversationConfig::default(),
            framing: FramingConfig::default(),
            events: SharedEventBus::new(),
            unsolicited: None,
        }
    }

    fn start<IO>(builder: ConversationBuilder<P>, io: IO) -> Self
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let ConversationBuilder {
            protocol,
            id,
            config,
            framing,
            events,
            unsolicited,
        } = builder;

        let codec = FrameCodec::new(protocol.clone(), framing);
        let stats = codec.stats();
        let framed = Framed::new(io, codec);

        let (submission_tx, submission_rx) = mpsc::channel(config.submission_queue_depth.max(1));
        let (cancel_tx, cancel_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Open);
        let shutdown = CancellationToken::new();

        let state = LoopState {
            connection: id.clone(),
            outbound: VecDeque::new(),
            pending: Vec::with_capacity(config.max_in_flight),
            late: VecDeque::with_capacity(config.late_response_memory),
            late_capacity: config.late_response_memory,
            events,
            unsolicited,
        };
        let span = connection_span(protocol.protocol_name(), id.as_str());
        let task = tokio::spawn(
            run_connection(
                framed,
                submission_rx,
                cancel_rx,
                shutdown.clone(),
                state_tx,
                state,
            )
            .instrument(span),
        );
        info!("{} connection {} started", protocol.protocol_name(), id);

        Self {
            id,
            protocol,
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            config,
            submissions: submission_tx,
            cancels: cancel_tx,
            next_id: AtomicU64::new(1),
            shutdown,
            state: state_rx,
            stats,
            task,
        }
    }

    /// Connection id
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Protocol spoken on the connection
    pub fn protocol(&self) -> &Arc<P> {
        &self.protocol
    }

    /// Deadline applied when a request carries none
    pub fn default_timeout(&self) -> Duration {
        self.config.default_timeout
    }

    /// Most requests that may be in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.config.max_in_flight
    }

    /// Current transport lifecycle state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Requests submitted and not yet finished
    pub fn in_flight(&self) -> usize {
        self.config.max_in_flight - self.permits.available_permits()
    }

    /// Framing counters of the connection
    pub fn framing_stats(&self) -> FramingStatsSnapshot {
        self.stats.snapshot()
    }

    fn closed_error(&self) -> ConversationError {
        match self.state() {
            ConnectionState::Lost => ConversationError::connection_lost("connection lost"),
            _ => ConversationError::Closed,
        }
    }

    /// Encode `message` and submit it as a request answered by the first
    /// incoming message `matcher` accepts
    ///
    /// Fails immediately with `TooManyPendingRequests` when every in-flight
    /// slot is taken; waits when the submission channel is full.
    pub async fn submit(
        &self,
        message: P::Message,
        matcher: Matcher<P::Message>,
        timeout: Option<Duration>,
    ) -> Result<PendingHandle<P::Message>> {
        if self.state() != ConnectionState::Open {
            return Err(self.closed_error());
        }
        let bytes = Bytes::from(self.protocol.encode(&message)?);
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| ConversationError::TooManyPendingRequests(self.config.max_in_flight))?;

        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let cancelled = CancelFlag::default();
        let (tx, rx) = oneshot::channel();
        debug!("Submitting request {} ({} bytes, {:?})", id, bytes.len(), timeout);

        let submission = Submission {
            id,
            bytes,
            matcher,
            deadline: Instant::now() + timeout,
            timeout_ms: duration_to_millis(timeout),
            cancelled: cancelled.clone(),
            tx,
            permit,
        };
        if self.submissions.send(submission).await.is_err() {
            return Err(self.closed_error());
        }

        Ok(PendingHandle {
            id,
            rx,
            canceller: Canceller {
                id,
                flag: cancelled,
                tx: self.cancels.clone(),
            },
            settled: false,
        })
    }

    /// Submit a request and wait for its outcome
    pub async fn request(
        &self,
        message: P::Message,
        matcher: Matcher<P::Message>,
        timeout: Option<Duration>,
    ) -> Result<P::Message> {
        self.submit(message, matcher, timeout).await?.response().await
    }

    /// Close the connection; requests still pending end as cancelled
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Wait until the connection loop has ended
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        while *state.borrow() == ConnectionState::Open {
            if state.changed().await.is_err() {
                break;
            }
        }
    }

    /// Whether the connection loop task has finished
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Why the loop ended
enum Exit {
    Closed,
    Lost(String),
}

/// A request accepted by the loop and not yet fully written
struct Outbound<M> {
    request: PendingRequest<M>,
    // Taken once handed to the sink
    bytes: Option<Bytes>,
}

impl<M> Outbound<M> {
    fn is_handed_over(&self) -> bool {
        self.bytes.is_none()
    }
}

/// Hand queued requests to `sink` and flush it
///
/// Ready once every queued request has been written.
fn poll_outbound<S, M>(
    sink: &mut S,
    outbound: &mut VecDeque<Outbound<M>>,
    cx: &mut Context<'_>,
) -> Poll<std::result::Result<(), S::Error>>
where
    S: Sink<Bytes> + Unpin,
{
    for entry in outbound.iter_mut().filter(|entry| !entry.is_handed_over()) {
        ready!(sink.poll_ready_unpin(cx))?;
        if let Some(bytes) = entry.bytes.take() {
            sink.start_send_unpin(bytes)?;
        }
    }
    sink.poll_flush_unpin(cx)
}

struct LoopState<M> {
    connection: Id,
    outbound: VecDeque<Outbound<M>>,
    pending: Vec<PendingRequest<M>>,
    late: VecDeque<(RequestId, Matcher<M>)>,
    late_capacity: usize,
    events: SharedEventBus,
    unsolicited: Option<UnsolicitedHandler<M>>,
}

impl<M: fmt::Debug> LoopState<M> {
    fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .iter()
            .chain(self.outbound.iter().map(|entry| &entry.request))
            .map(|request| request.deadline())
            .min()
    }

    fn publish(&self, request: RequestId, state: RequestState) {
        let event = TypedEvent::new(self.connection.clone(), ConversationEvent { request, state });
        if let Err(e) = self.events.publish(event) {
            warn!("Failed to publish lifecycle event of request {}: {}", request, e);
        }
    }

    fn remember(&mut self, id: RequestId, matcher: Matcher<M>) {
        if self.late_capacity == 0 {
            return;
        }
        if self.late.len() == self.late_capacity {
            self.late.pop_front();
        }
        self.late.push_back((id, matcher));
    }

    /// Finish a request and publish its terminal state
    fn retire(&mut self, request: PendingRequest<M>, state: RequestState, response: Option<M>) {
        let was_sent = request.state() == RequestState::Sent;
        let (id, matcher) = request.finish(state, response);
        self.publish(id, state);
        if was_sent && matches!(state, RequestState::TimedOut | RequestState::Cancelled) {
            self.remember(id, matcher);
        }
    }

    /// Finish a request that never got fully written
    ///
    /// Bytes already handed to the transport still go out, so the matcher is
    /// kept for the late response.
    fn retire_unwritten(&mut self, entry: Outbound<M>, state: RequestState) {
        let handed_over = entry.is_handed_over();
        let (id, matcher) = entry.request.finish(state, None);
        self.publish(id, state);
        if handed_over {
            self.remember(id, matcher);
        }
    }

    /// Move requests whose bytes have all been written to the pending set
    fn mark_written(&mut self) {
        while self.outbound.front().map_or(false, Outbound::is_handed_over) {
            if let Some(mut entry) = self.outbound.pop_front() {
                entry.request.mark_sent();
                self.pending.push(entry.request);
            }
        }
    }

    fn expire_overdue(&mut self, now: Instant) {
        let mut index = 0;
        while index < self.pending.len() {
            if self.pending[index].is_overdue(now) {
                let request = self.pending.remove(index);
                warn!("Request {} timed out", request.id());
                self.retire(request, RequestState::TimedOut, None);
            } else {
                index += 1;
            }
        }

        let mut index = 0;
        while index < self.outbound.len() {
            if self.outbound[index].request.is_overdue(now) {
                if let Some(entry) = self.outbound.remove(index) {
                    warn!("Request {} timed out before it was written", entry.request.id());
                    self.retire_unwritten(entry, RequestState::TimedOut);
                }
            } else {
                index += 1;
            }
        }
    }

    fn cancel(&mut self, id: RequestId) {
        if let Some(index) = self.pending.iter().position(|request| request.id() == id) {
            let request = self.pending.remove(index);
            debug!("Request {} cancelled", id);
            self.retire(request, RequestState::Cancelled, None);
            return;
        }
        match self.outbound.iter().position(|entry| entry.request.id() == id) {
            Some(index) => {
                if let Some(entry) = self.outbound.remove(index) {
                    debug!("Request {} cancelled before it was written", id);
                    self.retire_unwritten(entry, RequestState::Cancelled);
                }
            }
            None => trace!("Cancel of request {} ignored, nothing pending", id),
        }
    }

    fn dispatch(&mut self, message: M) {
        self.expire_overdue(Instant::now());

        if let Some(index) = self.pending.iter().position(|request| request.matches(&message)) {
            let request = self.pending.remove(index);
            self.retire(request, RequestState::Completed, Some(message));
            return;
        }

        // The peer may answer before the final flush of a request reports back
        let written_early = self
            .outbound
            .iter()
            .position(|entry| entry.is_handed_over() && entry.request.matches(&message));
        if let Some(mut entry) = written_early.and_then(|index| self.outbound.remove(index)) {
            entry.request.mark_sent();
            self.retire(entry.request, RequestState::Completed, Some(message));
            return;
        }

        if let Some(index) = self.late.iter().position(|(_, matcher)| matcher(&message)) {
            if let Some((id, _)) = self.late.remove(index) {
                warn!("Dropping late response to request {}", id);
            }
            return;
        }

        match self.unsolicited.as_mut() {
            Some(handler) => handler(message),
            None => warn!("Dropping unsolicited message {:?}", message),
        }
    }

    fn fail_all(&mut self, state: RequestState, error: impl Fn() -> ConversationError) {
        let mut pending: Vec<_> = self.pending.drain(..).collect();
        pending.extend(self.outbound.drain(..).map(|entry| entry.request));
        for request in pending {
            let (id, _) = request.fail(state, error());
            self.publish(id, state);
        }
    }
}

async fn run_connection<IO, P>(
    framed: Framed<IO, FrameCodec<P>>,
    mut submissions: mpsc::Receiver<Submission<P::Message>>,
    mut cancels: mpsc::UnboundedReceiver<RequestId>,
    shutdown: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
    mut state: LoopState<P::Message>,
) where
    IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    P: FrameDetector + MessageCatalog + 'static,
{
    let (mut sink, mut stream) = framed.split::<Bytes>();
    // Reusable sleep, reset to the nearest deadline on every iteration
    let mut deadline_sleep = Box::pin(sleep(IDLE_DEADLINE));

    let exit = loop {
        state.expire_overdue(Instant::now());
        let deadline = state
            .next_deadline()
            .unwrap_or_else(|| Instant::now() + IDLE_DEADLINE);
        deadline_sleep.as_mut().reset(deadline);

        tokio::select! {
            _ = shutdown.cancelled() => {
                break Exit::Closed;
            }
            Some(id) = cancels.recv() => {
                state.cancel(id);
            }
            submission = submissions.recv() => {
                let Some(submission) = submission else {
                    break Exit::Closed;
                };
                let (request, bytes) = submission.into_pending();
                if request.is_cancel_requested() {
                    state.retire(request, RequestState::Cancelled, None);
                    continue;
                }
                if request.is_overdue(Instant::now()) {
                    state.retire(request, RequestState::TimedOut, None);
                    continue;
                }
                trace!("Request {} queued for writing", request.id());
                state.outbound.push_back(Outbound {
                    request,
                    bytes: Some(bytes),
                });
            }
            written = poll_fn(|cx| poll_outbound(&mut sink, &mut state.outbound, cx)),
                if !state.outbound.is_empty() =>
            {
                match written {
                    Ok(()) => state.mark_written(),
                    Err(e) => {
                        error!("Failed to write requests: {}", e);
                        break Exit::Lost(e.to_string());
                    }
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Decoded::Message(message))) => state.dispatch(message),
                    Some(Ok(Decoded::Rejected { error, .. })) => {
                        debug!("Rejected frame skipped: {}", error);
                    }
                    Some(Err(e)) => {
                        error!("Connection failed: {}", e);
                        break Exit::Lost(e.to_string());
                    }
                    None => {
                        info!("Peer closed the connection");
                        break Exit::Lost("peer closed the stream".to_string());
                    }
                }
            }
            _ = &mut deadline_sleep => {
                state.expire_overdue(Instant::now());
            }
        }
    };

    submissions.close();
    let final_state = match exit {
        Exit::Closed => {
            state.fail_all(RequestState::Cancelled, || ConversationError::Closed);
            while let Ok(submission) = submissions.try_recv() {
                let (request, _) = submission.into_pending();
                let (id, _) = request.fail(RequestState::Cancelled, ConversationError::Closed);
                state.publish(id, RequestState::Cancelled);
            }
            ConnectionState::Closed
        }
        Exit::Lost(reason) => {
            state.fail_all(RequestState::ConnectionLost, || {
                ConversationError::connection_lost(&reason)
            });
            while let Ok(submission) = submissions.try_recv() {
                let (request, _) = submission.into_pending();
                let (id, _) = request.fail(
                    RequestState::ConnectionLost,
                    ConversationError::connection_lost(&reason),
                );
                state.publish(id, RequestState::ConnectionLost);
            }
            ConnectionState::Lost
        }
    };
    shutdown.cancel();
    let _ = state_tx.send(final_state);
    info!("Connection loop ended: {:?}", final_state);
}
