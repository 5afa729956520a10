/*!
 * Event bus for Wireflow.
 *
 * Connections publish request lifecycle transitions, framing incidents and
 * subscription values here. Each payload type gets its own broadcast channel,
 * so observers only see the events they asked for.
 */
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::{Error, Result};
use crate::types::Id;

/// Maximum number of events that can be buffered in a channel
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// An event stamped with its source connection and wall-clock time
#[derive(Debug, Clone)]
pub struct TypedEvent<T: Clone + Debug + Send + Sync + 'static> {
    /// Connection that produced the event
    pub source: Id,
    /// Wall-clock time the event was produced
    pub timestamp: DateTime<Utc>,
    /// Strongly-typed payload
    pub payload: T,
}

impl<T: Clone + Debug + Send + Sync + 'static> TypedEvent<T> {
    /// Create a new event stamped with the current time
    pub fn new(source: Id, payload: T) -> Self {
        Self {
            source,
            timestamp: Utc::now(),
            payload,
        }
    }
}

type EventSender<T> = broadcast::Sender<T>;
type EventReceiver<T> = broadcast::Receiver<T>;

/// Event bus for publishing and subscribing to events
#[derive(Debug)]
pub struct EventBus {
    channels: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    channel_capacity: usize,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with a specific channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            channel_capacity: capacity.max(1),
        }
    }

    fn sender<T: Clone + Debug + Send + Sync + 'static>(&self) -> Result<EventSender<T>> {
        let type_id = TypeId::of::<T>();
        let mut channels = self
            .channels
            .lock()
            .map_err(|_| Error::event("Failed to lock channels"))?;

        if let Some(sender) = channels.get(&type_id) {
            return sender
                .downcast_ref::<EventSender<T>>()
                .cloned()
                .ok_or_else(|| Error::event("Failed to downcast sender"));
        }

        let (sender, _) = broadcast::channel(self.channel_capacity);
        channels.insert(type_id, Box::new(sender.clone()));
        Ok(sender)
    }

    /// Publish an event, returning the number of receivers that got it
    ///
    /// Publishing without receivers is not an error.
    pub fn publish<T: Clone + Debug + Send + Sync + 'static>(&self, event: T) -> Result<usize> {
        let sender = self.sender::<T>()?;
        if sender.receiver_count() == 0 {
            trace!("No receivers for {}", std::any::type_name::<T>());
            return Ok(0);
        }
        sender
            .send(event)
            .map_err(|e| Error::event(format!("Failed to publish event: {}", e)))
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<T: Clone + Debug + Send + Sync + 'static>(&self) -> Result<EventReceiver<T>> {
        Ok(self.sender::<T>()?.subscribe())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A shared event bus that can be cloned
#[derive(Debug, Clone, Default)]
pub struct SharedEventBus(Arc<EventBus>);

impl SharedEventBus {
    /// Create a new shared event bus
    pub fn new() -> Self {
        Self(Arc::new(EventBus::new()))
    }

    /// Create a new shared event bus with a specific channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Arc::new(EventBus::with_capacity(capacity)))
    }

    /// Publish an event
    pub fn publish<T: Clone + Debug + Send + Sync + 'static>(&self, event: T) -> Result<usize> {
        self.0.publish(event)
    }

    /// Subscribe to events of a specific type
    pub fn subscribe<T: Clone + Debug + Send + Sync + 'static>(&self) -> Result<EventReceiver<T>> {
        self.0.subscribe()
    }
}
