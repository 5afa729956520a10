/*!
 * Subscriptions.
 *
 * The connection loop turns unsolicited messages into `(tag, value)` pairs
 * and queues them without blocking. A dedicated dispatch task fans each
 * value out to the callbacks of every subscription covering the tag, so
 * callbacks never run on the connection loop.
 */
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn, Instrument};
use wireflow_core::types::{Id, Value};

use crate::request::Tag;

/// Identifies one subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Id);

impl SubscriptionHandle {
    fn new() -> Self {
        Self(Id::new())
    }

    /// Identifier of the subscription
    pub fn id(&self) -> &Id {
        &self.0
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value delivered to a subscription callback
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionEvent<T> {
    /// Subscription the value is delivered to
    pub handle: SubscriptionHandle,
    /// Tag the value belongs to
    pub tag: T,
    /// The value
    pub value: Value,
    /// When the value was received
    pub timestamp: DateTime<Utc>,
}

/// Callback invoked for each value of a subscription
pub type SubscriptionCallback<T> = Arc<dyn Fn(SubscriptionEvent<T>) + Send + Sync>;

struct Entry<T> {
    tags: HashSet<T>,
    callback: SubscriptionCallback<T>,
}

/// Subscriptions of one connection and the task delivering their values
pub struct SubscriptionRegistry<T: Tag> {
    entries: Arc<RwLock<HashMap<SubscriptionHandle, Entry<T>>>>,
    queue: mpsc::Sender<(T, Value)>,
    dispatcher: JoinHandle<()>,
}

impl<T: Tag> fmt::Debug for SubscriptionRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry").finish_non_exhaustive()
    }
}

impl<T: Tag> SubscriptionRegistry<T> {
    /// Create a registry whose dispatch queue holds `depth` values
    pub fn new(depth: usize) -> Self {
        let entries = Arc::new(RwLock::new(HashMap::new()));
        let (queue, rx) = mpsc::channel(depth.max(1));
        let dispatcher = tokio::spawn(
            dispatch_values(entries.clone(), rx).instrument(tracing::Span::current()),
        );
        Self {
            entries,
            queue,
            dispatcher,
        }
    }

    /// Register `callback` for values of `tags`
    pub async fn register(&self, tags: impl IntoIterator<Item = T>, callback: SubscriptionCallback<T>) -> SubscriptionHandle {
        let handle = SubscriptionHandle::new();
        let tags: HashSet<T> = tags.into_iter().collect();
        debug!("Subscription {} registered for {} tags", handle, tags.len());
        self.entries
            .write()
            .await
            .insert(handle.clone(), Entry { tags, callback });
        handle
    }

    /// Remove a subscription; returns whether it was still registered
    pub async fn unregister(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.entries.write().await.remove(handle).is_some();
        if removed {
            debug!("Subscription {} removed", handle);
        }
        removed
    }

    /// Number of live subscriptions
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no subscription is live
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Queue a value for delivery without waiting
    ///
    /// Returns `false` when the queue is full or the dispatcher is gone; the
    /// value is dropped in that case.
    pub fn offer(&self, tag: T, value: Value) -> bool {
        match self.queue.try_send((tag, value)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full((tag, _))) => {
                warn!("Subscription queue full, dropping value of {}", tag);
                false
            }
            Err(mpsc::error::TrySendError::Closed((tag, _))) => {
                warn!("Subscription dispatcher gone, dropping value of {}", tag);
                false
            }
        }
    }

    /// A sender feeding the dispatch queue
    pub fn sender(&self) -> mpsc::Sender<(T, Value)> {
        self.queue.clone()
    }
}

impl<T: Tag> Drop for SubscriptionRegistry<T> {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch_values<T: Tag>(
    entries: Arc<RwLock<HashMap<SubscriptionHandle, Entry<T>>>>,
    mut rx: mpsc::Receiver<(T, Value)>,
) {
    while let Some((tag, value)) = rx.recv().await {
        let targets: Vec<(SubscriptionHandle, SubscriptionCallback<T>)> = entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.tags.contains(&tag))
            .map(|(handle, entry)| (handle.clone(), entry.callback.clone()))
            .collect();

        if targets.is_empty() {
            trace!("No subscription for {}", tag);
            continue;
        }

        let timestamp = Utc::now();
        for (handle, callback) in targets {
            callback(SubscriptionEvent {
                handle,
                tag: tag.clone(),
                value: value.clone(),
                timestamp,
            });
        }
    }
    debug!("Subscription dispatcher stopped");
}
