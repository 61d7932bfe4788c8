//! Subscriber management and event fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{Result, WatchError};
use crate::event::Event;

/// Default capacity of the delivery ring shared by all subscribers.
const DELIVERY_CAPACITY: usize = 1024;

/// A consumer of watch events.
///
/// Methods are invoked from a dedicated per-subscriber delivery task, never
/// under the hub's locks, so implementations may block without stalling the
/// producer or other subscribers.
pub trait FileWatchClient: Send + Sync + 'static {
    /// A semantic event was observed under the root.
    fn on_event(&self, event: Event);

    /// A non-fatal error occurred: a backend failure, or this subscriber's
    /// queue overflowed ([`WatchError::Overflow`]).
    fn on_error(&self, error: &WatchError);

    /// The watcher has shut down. Invoked exactly once, after the last
    /// delivered event.
    fn on_closed(&self);
}

/// Handle identifying a registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

/// What flows through the delivery ring.
#[derive(Debug, Clone)]
enum Delivery {
    Event(Event),
    Error(Arc<WatchError>),
}

/// A registered subscriber's delivery task.
struct ClientHandle {
    /// Dropping this wakes the task, which exits without `on_closed`.
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Fans watcher output out to every registered subscriber.
///
/// Each subscriber owns a cursor into a bounded broadcast ring and a
/// delivery task draining it. A slow subscriber lags, losing its oldest
/// undelivered messages, instead of blocking the producer or its peers.
pub(crate) struct ClientHub {
    sender: RwLock<Option<broadcast::Sender<Delivery>>>,
    clients: RwLock<HashMap<ClientId, ClientHandle>>,
}

impl ClientHub {
    pub(crate) fn new() -> Self {
        Self::with_capacity(DELIVERY_CAPACITY)
    }

    /// A subscriber that falls more than `capacity` messages behind starts
    /// losing its oldest undelivered ones and is told so via `on_error`.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: RwLock::new(Some(sender)),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a subscriber and spawn its delivery task.
    pub(crate) async fn add_client(&self, client: Arc<dyn FileWatchClient>) -> Result<ClientId> {
        let receiver = match self.sender.read().await.as_ref() {
            Some(sender) => sender.subscribe(),
            None => return Err(WatchError::NotRunning),
        };
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(deliver(client, receiver, stop_rx));
        let id = ClientId(Uuid::new_v4());
        self.clients.write().await.insert(
            id,
            ClientHandle {
                stop: stop_tx,
                task,
            },
        );
        trace!("subscriber {id:?} registered");
        Ok(id)
    }

    /// Deregister a subscriber; once this returns, no further callbacks are
    /// invoked on it. Unknown ids are ignored.
    pub(crate) async fn remove_client(&self, id: ClientId) {
        let handle = self.clients.write().await.remove(&id);
        if let Some(handle) = handle {
            drop(handle.stop);
            let _ = handle.task.await;
            trace!("subscriber {id:?} removed");
        }
    }

    /// Deliver an event to every subscriber, in emission order.
    pub(crate) async fn broadcast_event(&self, event: Event) {
        if let Some(sender) = self.sender.read().await.as_ref() {
            // A send error just means no subscriber is currently registered.
            let _ = sender.send(Delivery::Event(event));
        }
    }

    /// Surface a backend error to every subscriber.
    pub(crate) async fn broadcast_error(&self, error: WatchError) {
        if let Some(sender) = self.sender.read().await.as_ref() {
            let _ = sender.send(Delivery::Error(Arc::new(error)));
        }
    }

    /// Shut the hub down. Every subscriber drains its backlog, then receives
    /// exactly one `on_closed`.
    pub(crate) async fn close(&self) {
        self.sender.write().await.take();
        let handles: Vec<ClientHandle> = self.clients.write().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            // The stop sender stays alive until the task has drained and
            // emitted its on_closed.
            let _ = handle.task.await;
        }
        debug!("client hub closed");
    }
}

/// Per-subscriber delivery loop. Runs until the hub closes or the
/// subscriber is removed.
async fn deliver(
    client: Arc<dyn FileWatchClient>,
    mut receiver: broadcast::Receiver<Delivery>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => {
                return;
            }
            delivery = receiver.recv() => match delivery {
                Ok(Delivery::Event(event)) => client.on_event(event),
                Ok(Delivery::Error(error)) => client.on_error(&error),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagged, oldest events dropped");
                    client.on_error(&WatchError::Overflow(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    client.on_closed();
                    return;
                }
            },
        }
    }
}
