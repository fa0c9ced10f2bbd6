// Event Hub - keyed pub/sub for workflow execution events
//
// Routes ExecutionEvents to the dashboard connections subscribed to that
// execution id. Each connection gets its own bounded queue: a slow or broken
// consumer is shed (its connection closed) instead of blocking the publisher
// or buffering without bound. There is no replay: a connection subscribed
// after an event was published never receives it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::events::{ExecutionEvent, ExecutionId};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Outbound queue bound per connection. Real-time status updates are
    /// stale the moment a newer one exists, so the bound stays small.
    pub subscriber_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_capacity: 64,
        }
    }
}

struct SubscriberHandle {
    connection_id: Uuid,
    tx: mpsc::Sender<ExecutionEvent>,
}

/// Fanout hub for execution events, keyed by execution id.
pub struct EventHub {
    config: HubConfig,
    subscribers: Mutex<HashMap<ExecutionId, Vec<SubscriberHandle>>>,
}

impl EventHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a connection under `execution_id`.
    ///
    /// The returned subscription unsubscribes itself on drop, so a client
    /// that vanishes without a close frame is still cleaned up when its
    /// stream is torn down.
    pub fn subscribe(self: &Arc<Self>, execution_id: ExecutionId) -> Subscription {
        let (tx, rx) = mpsc::channel(self.config.subscriber_queue_capacity);
        let connection_id = Uuid::new_v4();

        self.subscribers
            .lock()
            .entry(execution_id)
            .or_default()
            .push(SubscriberHandle { connection_id, tx });

        debug!(%execution_id, %connection_id, "Subscriber connected");
        metrics::counter!("event_hub_subscribed_total").increment(1);

        Subscription {
            hub: Arc::clone(self),
            execution_id,
            connection_id,
            rx,
        }
    }

    /// Remove a connection from whatever key it was under. Idempotent.
    pub fn unsubscribe(&self, execution_id: ExecutionId, connection_id: Uuid) {
        let mut subscribers = self.subscribers.lock();
        if let Some(handles) = subscribers.get_mut(&execution_id) {
            let before = handles.len();
            handles.retain(|h| h.connection_id != connection_id);
            if handles.len() < before {
                debug!(%execution_id, %connection_id, "Subscriber disconnected");
            }
            if handles.is_empty() {
                subscribers.remove(&execution_id);
            }
        }
    }

    /// Deliver `event` to every connection subscribed to its execution id.
    ///
    /// Returns the number of connections that accepted the event. A full or
    /// closed queue sheds that connection; delivery to the remaining
    /// subscribers is unaffected. Publishing holds the subscriber table lock
    /// only for non-blocking sends, which is also what guarantees per-key
    /// delivery order across connections.
    pub fn publish(&self, event: ExecutionEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        let Some(handles) = subscribers.get_mut(&event.execution_id) else {
            debug!(execution_id = %event.execution_id, "No subscribers for event");
            return 0;
        };

        let mut delivered = 0;
        let mut shed = 0usize;
        handles.retain(|handle| match handle.tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    execution_id = %event.execution_id,
                    connection_id = %handle.connection_id,
                    "Subscriber queue full, shedding connection"
                );
                shed += 1;
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(
                    execution_id = %event.execution_id,
                    connection_id = %handle.connection_id,
                    "Subscriber gone, dropping connection"
                );
                false
            }
        });

        if handles.is_empty() {
            subscribers.remove(&event.execution_id);
        }

        metrics::counter!("event_hub_published_total").increment(1);
        if shed > 0 {
            metrics::counter!("event_hub_shed_total").increment(shed as u64);
        }
        delivered
    }

    /// Number of connections currently subscribed to `execution_id`.
    pub fn subscriber_count(&self, execution_id: &ExecutionId) -> usize {
        self.subscribers
            .lock()
            .get(execution_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Total connections across all executions.
    pub fn total_subscribers(&self) -> usize {
        self.subscribers.lock().values().map(Vec::len).sum()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

/// One connection's view of an execution's event stream.
///
/// Dropping the subscription removes the connection from the hub.
pub struct Subscription {
    hub: Arc<EventHub>,
    execution_id: ExecutionId,
    connection_id: Uuid,
    rx: mpsc::Receiver<ExecutionEvent>,
}

impl Subscription {
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Receive the next event. Returns `None` once the connection has been
    /// shed or the hub dropped the sender.
    pub async fn recv(&mut self) -> Option<ExecutionEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for draining in tests and polling contexts.
    pub fn try_recv(&mut self) -> Option<ExecutionEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.execution_id, self.connection_id);
    }
}
