//! Fan-out hub between the ingestion path and viewer sessions.
//!
//! The bus is a registry of bounded per-subscriber queues. [`EventBus::publish`]
//! copies the registry under its read lock, releases the lock, then offers
//! the event to each queue with a non-blocking `try_send`. A queue that is
//! full belongs to a reader that stopped keeping up: the event is dropped
//! for that reader and its subscription is evicted, which closes the
//! receiving side once it has drained what was already queued.
//!
//! Publishers are never slowed down by readers and memory never grows
//! past `subscribers x capacity` events.
//!
//! [`EventBus::join`] and [`EventBus::leave`] take the write lock only to
//! insert or remove one entry; the lock is never held across a send.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use plan_types::Event;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Default number of events buffered per subscriber before eviction.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Identifier for one subscription, unique for the life of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of a single [`EventBus::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers whose queue accepted the event.
    pub delivered: usize,
    /// Subscribers evicted because their queue was full.
    pub evicted: usize,
}

struct Registry {
    queues: RwLock<BTreeMap<SubscriptionId, mpsc::Sender<Event>>>,
    next_id: AtomicU64,
    capacity: usize,
}

/// Handle to the broadcast hub.
///
/// Cheap to clone; every clone refers to the same registry. Ingestion
/// adapters hold one to publish, the HTTP layer holds one to join.
#[derive(Clone)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.registry.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus whose subscribers each buffer up to `capacity` events.
    ///
    /// A capacity of zero is raised to one; tokio channels need room for
    /// at least a single message.
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                queues: RwLock::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Per-subscriber queue capacity.
    pub fn capacity(&self) -> usize {
        self.registry.capacity
    }

    /// Join the bus. The subscription receives every event published
    /// after this call returns, until it leaves or is evicted.
    pub fn join(&self) -> Subscription {
        let id = SubscriptionId(self.registry.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.registry.capacity);
        self.registry
            .queues
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        debug!(subscription = %id, "subscriber joined");
        Subscription {
            id,
            rx,
            bus: self.clone(),
        }
    }

    /// Remove a subscription from the registry.
    ///
    /// Idempotent: leaving twice, or leaving after eviction, is a no-op.
    /// No event published after this returns reaches the subscription.
    pub fn leave(&self, id: SubscriptionId) {
        let removed = self
            .registry
            .queues
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            debug!(subscription = %id, "subscriber left");
        }
    }

    /// Offer `event` to every current subscriber without waiting.
    pub fn publish(&self, event: &Event) -> PublishReport {
        let targets: Vec<(SubscriptionId, mpsc::Sender<Event>)> = self
            .registry
            .queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut report = PublishReport::default();
        let mut stale = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        subscription = %id,
                        event_type = event.event_type(),
                        "subscriber queue full, evicting"
                    );
                    report.evicted += 1;
                    stale.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    // Receiver dropped without leaving; prune quietly.
                    stale.push(id);
                }
            }
        }

        if !stale.is_empty() {
            let mut queues = self
                .registry
                .queues
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for id in &stale {
                queues.remove(id);
            }
        }

        report
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.registry
            .queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// One viewer's membership in the bus.
///
/// Owned exclusively by its session. Dropping it leaves the bus.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<Event>,
    bus: EventBus,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Subscription {
    /// This subscription's identifier.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the subscription has been evicted or has left
    /// and every event queued before that point has been drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Whether the bus has dropped this subscription.
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }

    /// Leave the bus now. Queued events can still be drained.
    pub fn leave(&self) {
        self.bus.leave(self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.leave(self.id);
    }
}
