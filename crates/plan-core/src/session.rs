//! Per-viewer session: snapshot first, then live events.
//!
//! A [`ClientSession`] moves through two phases:
//!
//! 1. **Syncing** -- every cached entry is sent as a synthetic event so the
//!    viewer's first render reflects a real point-in-time state.
//! 2. **Streaming** -- every event published on the bus is forwarded until
//!    the transport fails, the viewer closes, the subscription is evicted
//!    or a heartbeat goes unanswered.
//!
//! The session joins the bus *before* reading the stores. Anything
//! committed after the snapshot was taken is therefore already queued on
//! the subscription and is delivered right after the snapshot; an update
//! racing with the snapshot may be delivered twice, never lost, and a
//! repeat of the latest value is harmless to a last-write-wins viewer.
//!
//! Transport I/O happens with no lock held: the snapshot is a copy and
//! the subscription is owned by the session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use plan_types::Event;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::bus::{EventBus, Subscription};
use crate::store::StateStores;

/// A write to the viewer failed; the viewer is gone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("viewer transport failed: {0}")]
pub struct TransportError(pub String);

/// Something the viewer sent us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Answer to one of our heartbeat pings.
    Pong,
    /// The viewer closed the connection or the read side failed.
    Closed,
    /// Anything else; viewers have nothing meaningful to say.
    Other,
}

/// The server-push connection to one viewer.
pub trait ViewerTransport: Send {
    /// Serialize and push one event.
    fn send(&mut self, event: &Event) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Send a heartbeat ping.
    fn ping(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Wait for the next inbound frame.
    ///
    /// Must be cancel safe: it is raced against the bus in a `select!`.
    fn recv(&mut self) -> impl Future<Output = Inbound> + Send;

    /// Release the connection.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Which phase a session is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Sending the snapshot.
    Syncing,
    /// Forwarding live events.
    Streaming,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// A write to the viewer failed.
    TransportFailed,
    /// The bus evicted the subscription (queue overflow).
    SubscriptionClosed,
    /// The viewer closed the connection.
    ClientClosed,
    /// A heartbeat ping went unanswered for a whole interval.
    HeartbeatMissed,
}

/// One connected viewer.
pub struct ClientSession<T> {
    id: Uuid,
    transport: T,
    stores: Arc<StateStores>,
    bus: EventBus,
    ping_interval: Option<Duration>,
    phase: SessionPhase,
}

impl<T> std::fmt::Debug for ClientSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("ping_interval", &self.ping_interval)
            .finish_non_exhaustive()
    }
}

impl<T: ViewerTransport> ClientSession<T> {
    /// Create a session over `transport`. No heartbeat by default.
    pub fn new(transport: T, stores: Arc<StateStores>, bus: EventBus) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport,
            stores,
            bus,
            ping_interval: None,
            phase: SessionPhase::Syncing,
        }
    }

    /// Ping the viewer every `interval` and drop it if a ping goes
    /// unanswered until the next one. `None` or a zero interval disables
    /// the heartbeat.
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = interval.filter(|period| !period.is_zero());
        self
    }

    /// This session's id, used to correlate log lines.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Run the session to completion and release the transport.
    pub async fn run(mut self) -> SessionEnd {
        let mut subscription = self.bus.join();
        info!(
            session = %self.id,
            subscription = %subscription.id(),
            "viewer connected"
        );

        let end = match self.sync().await {
            Ok(()) => self.stream(&mut subscription).await,
            Err(e) => {
                debug!(session = %self.id, error = %e, "snapshot send failed");
                SessionEnd::TransportFailed
            }
        };

        subscription.leave();
        drop(subscription);
        self.transport.close().await;
        info!(
            session = %self.id,
            phase = ?self.phase,
            reason = ?end,
            "viewer disconnected"
        );
        end
    }

    async fn sync(&mut self) -> Result<(), TransportError> {
        let snapshot = self.stores.snapshot_events();
        debug!(session = %self.id, entries = snapshot.len(), "sending snapshot");
        for event in &snapshot {
            self.transport.send(event).await?;
        }
        Ok(())
    }

    async fn stream(&mut self, subscription: &mut Subscription) -> SessionEnd {
        self.phase = SessionPhase::Streaming;
        let mut heartbeat = self.ping_interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut awaiting_pong = false;

        loop {
            tokio::select! {
                next = subscription.recv() => {
                    let Some(event) = next else {
                        return SessionEnd::SubscriptionClosed;
                    };
                    if let Err(e) = self.transport.send(&event).await {
                        debug!(session = %self.id, error = %e, "event send failed");
                        return SessionEnd::TransportFailed;
                    }
                }
                inbound = self.transport.recv() => {
                    match inbound {
                        Inbound::Pong => awaiting_pong = false,
                        Inbound::Closed => return SessionEnd::ClientClosed,
                        Inbound::Other => {}
                    }
                }
                () = next_tick(heartbeat.as_mut()) => {
                    if awaiting_pong {
                        return SessionEnd::HeartbeatMissed;
                    }
                    if let Err(e) = self.transport.ping().await {
                        debug!(session = %self.id, error = %e, "ping failed");
                        return SessionEnd::TransportFailed;
                    }
                    awaiting_pong = true;
                }
            }
        }
    }
}

/// Wait for the next heartbeat tick, or forever when disabled.
async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
