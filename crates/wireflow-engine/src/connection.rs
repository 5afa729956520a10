/*!
 * Caller-facing connection.
 *
 * A [`Connection`] runs one conversation over a transport the caller already
 * opened and offers logical `read`, `write` and `subscribe` operations.
 * Operations never fail as a whole: every requested tag gets a result, and
 * failures are per-tag response codes.
 */
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn, Instrument, Level};
use wireflow_codec::{FramingConfig, FramingStatsSnapshot, MessageCatalog};
use wireflow_core::config::Config;
use wireflow_core::event::SharedEventBus;
use wireflow_core::log_with_fields;
use wireflow_core::logging::operation_span;
use wireflow_core::types::{Id, ResponseCode, Value};

use crate::conversation::{ConnectionState, Conversation, ConversationConfig};
use crate::driver::ProtocolDriver;
use crate::error::Result;
use crate::optimizer::Dispatch;
use crate::request::{
    LogicalResponse, Operation, RequestOptions, SubOutcome, SubRequest, TagItem, TagResponse,
};
use crate::subscription::{SubscriptionEvent, SubscriptionHandle, SubscriptionRegistry};

/// Settings of one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Conversation limits
    pub conversation: ConversationConfig,
    /// Framing limits
    pub framing: FramingConfig,
    /// Capacity of the subscription dispatch queue
    pub event_queue_depth: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ConnectionConfig {
    /// Derive connection settings from the application configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            conversation: ConversationConfig::from(&config.conversation),
            framing: FramingConfig::from(&config.framing),
            event_queue_depth: config.conversation.event_queue_depth,
        }
    }
}

/// A registered subscription and the outcome of registering each tag
#[derive(Debug)]
pub struct Subscription<T: crate::request::Tag> {
    /// Handle for [`Connection::unsubscribe`]
    pub handle: SubscriptionHandle,
    /// Per-tag registration results
    pub response: LogicalResponse<T>,
}

/// An open connection to one device
pub struct Connection<D: ProtocolDriver> {
    driver: Arc<D>,
    conversation: Conversation<D>,
    subscriptions: Arc<SubscriptionRegistry<D::Tag>>,
    events: SharedEventBus,
}

impl<D: ProtocolDriver> std::fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("conversation", &self.conversation)
            .finish()
    }
}

impl<D: ProtocolDriver> Connection<D> {
    /// Start a connection over `io` and run the driver's connect exchange
    pub async fn open<IO>(driver: D, io: IO, config: ConnectionConfig) -> Result<Self>
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self::open_with_events(driver, io, config, SharedEventBus::new()).await
    }

    /// Start a connection publishing its request lifecycle events on `events`
    pub async fn open_with_events<IO>(
        driver: D,
        io: IO,
        config: ConnectionConfig,
        events: SharedEventBus,
    ) -> Result<Self>
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let driver = Arc::new(driver);
        let subscriptions = Arc::new(SubscriptionRegistry::new(config.event_queue_depth));

        let unsolicited = {
            let driver = driver.clone();
            let subscriptions = subscriptions.clone();
            move |message: D::Message| {
                let values = driver.decode_event(&message);
                if values.is_empty() {
                    warn!("Dropping unsolicited {} message {:?}", driver.protocol_name(), message);
                }
                for (tag, value) in values {
                    subscriptions.offer(tag, value);
                }
            }
        };

        let conversation = Conversation::builder(driver.clone())
            .with_id(Id::new())
            .with_config(config.conversation)
            .with_framing(config.framing)
            .with_event_bus(events.clone())
            .on_unsolicited(unsolicited)
            .start(io);

        if let Err(e) = driver.on_connect(&conversation).await {
            warn!("{} connect exchange failed: {}", driver.protocol_name(), e);
            conversation.close();
            return Err(e);
        }
        info!("{} connection {} ready", driver.protocol_name(), conversation.id());

        Ok(Self {
            driver,
            conversation,
            subscriptions,
            events,
        })
    }

    /// Connection id
    pub fn id(&self) -> &Id {
        self.conversation.id()
    }

    /// The protocol driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The underlying conversation
    pub fn conversation(&self) -> &Conversation<D> {
        &self.conversation
    }

    /// Event bus carrying the connection's lifecycle events
    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// Transport lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.conversation.state()
    }

    /// Framing counters
    pub fn framing_stats(&self) -> FramingStatsSnapshot {
        self.conversation.framing_stats()
    }

    /// Read the current values of `tags`
    pub async fn read(&self, tags: &[D::Tag], options: RequestOptions) -> LogicalResponse<D::Tag> {
        let items = tags
            .iter()
            .enumerate()
            .map(|(index, tag)| TagItem {
                index,
                tag: tag.clone(),
                value: None,
            })
            .collect();
        self.execute(Operation::Read, tags, items, &options).await
    }

    /// Write `values[i]` to `tags[i]`
    ///
    /// Tags without a value fail with `InvalidData` and are not sent.
    pub async fn write(
        &self,
        tags: &[D::Tag],
        values: &[Value],
        options: RequestOptions,
    ) -> LogicalResponse<D::Tag> {
        let mut items = Vec::with_capacity(tags.len());
        let mut missing = Vec::new();
        for (index, tag) in tags.iter().enumerate() {
            match values.get(index) {
                Some(value) => items.push(TagItem {
                    index,
                    tag: tag.clone(),
                    value: Some(value.clone()),
                }),
                None => missing.push(TagItem {
                    index,
                    tag: tag.clone(),
                    value: None,
                }),
            }
        }
        if values.len() > tags.len() {
            warn!("Ignoring {} values without a tag", values.len() - tags.len());
        }

        if missing.is_empty() {
            return self.execute(Operation::Write, tags, items, &options).await;
        }
        let span = operation_span("write", self.driver.protocol_name());
        async {
            let mut outcomes = self.run_plan(Operation::Write, items, &options).await;
            outcomes.push((SubRequest::new(missing), Err(ResponseCode::InvalidData)));
            self.driver.optimizer().merge(tags, outcomes)
        }
        .instrument(span)
        .await
    }

    /// Subscribe to value changes of `tags`
    ///
    /// `callback` runs on the connection's dispatch task for every value an
    /// unsolicited message carries for one of the successfully registered tags.
    pub async fn subscribe<F>(
        &self,
        tags: &[D::Tag],
        callback: F,
        options: RequestOptions,
    ) -> Subscription<D::Tag>
    where
        F: Fn(SubscriptionEvent<D::Tag>) + Send + Sync + 'static,
    {
        let items = tags
            .iter()
            .enumerate()
            .map(|(index, tag)| TagItem {
                index,
                tag: tag.clone(),
                value: None,
            })
            .collect();
        let response = self.execute(Operation::Subscribe, tags, items, &options).await;
        let accepted = response
            .items()
            .iter()
            .filter(|item| item.code.is_ok())
            .map(|item| item.tag.clone());
        let handle = self.subscriptions.register(accepted, Arc::new(callback)).await;
        Subscription { handle, response }
    }

    /// Stop delivering values to a subscription; returns whether it was live
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.subscriptions.unregister(handle).await
    }

    /// Close the connection; outstanding requests end as cancelled
    pub async fn close(&self) {
        self.conversation.close();
        self.conversation.closed().await;
    }

    async fn execute(
        &self,
        operation: Operation,
        tags: &[D::Tag],
        items: Vec<TagItem<D::Tag>>,
        options: &RequestOptions,
    ) -> LogicalResponse<D::Tag> {
        let span = operation_span(&operation.to_string(), self.driver.protocol_name());
        async {
            let outcomes = self.run_plan(operation, items, options).await;
            let response = self.driver.optimizer().merge(tags, outcomes);
            let failed = response.items().iter().filter(|item| !item.code.is_ok()).count();
            log_with_fields!(
                Level::DEBUG,
                "operation finished",
                operation = %operation,
                tags = tags.len(),
                failed = failed
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn run_plan(
        &self,
        operation: Operation,
        items: Vec<TagItem<D::Tag>>,
        options: &RequestOptions,
    ) -> Vec<(SubRequest<D::Tag>, SubOutcome<D::Tag>)> {
        let optimizer = self.driver.optimizer();
        let plan = optimizer.plan(operation, items);
        debug!("{} planned as {} exchanges", operation, plan.len());

        match optimizer.dispatch() {
            // No more exchanges at once than there are in-flight slots
            Dispatch::Concurrent => {
                stream::iter(plan)
                    .map(|sub| self.exchange(operation, sub, options))
                    .buffered(self.conversation.max_in_flight().max(1))
                    .collect()
                    .await
            }
            Dispatch::Sequential => {
                let mut outcomes = Vec::with_capacity(plan.len());
                for sub in plan {
                    outcomes.push(self.exchange(operation, sub, options).await);
                }
                outcomes
            }
        }
    }

    async fn exchange(
        &self,
        operation: Operation,
        sub: SubRequest<D::Tag>,
        options: &RequestOptions,
    ) -> (SubRequest<D::Tag>, SubOutcome<D::Tag>) {
        let wire = match self.driver.encode_request(operation, &sub) {
            Ok(Some(wire)) => wire,
            Ok(None) => {
                let done = sub.items.iter().map(|item| TagResponse::done(item.tag.clone())).collect();
                return (sub, Ok(done));
            }
            Err(code) => {
                debug!("{} of {} tags not encodable: {}", operation, sub.len(), code);
                return (sub, Err(code));
            }
        };

        let outcome = match self
            .conversation
            .request(wire.message, wire.matcher, options.timeout)
            .await
        {
            Ok(response) => Ok(self.driver.decode_response(operation, &sub, response)),
            Err(e) => {
                debug!("{} exchange failed: {}", operation, e);
                Err(e.response_code())
            }
        };
        (sub, outcome)
    }
}
