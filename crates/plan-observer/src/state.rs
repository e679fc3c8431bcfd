//! Shared application state for the viewer server.
//!
//! [`AppState`] hands each new viewer session what it needs: the state
//! caches to snapshot, the event bus to join and the heartbeat setting.
//! It also carries the broker status for `/health`. It holds handles
//! only; the caches and bus are owned by nobody in particular and live
//! as long as any handle does.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use plan_core::{BrokerStatus, EventBus, StateStores};
use tokio::sync::watch;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Latest door and temperature values, snapshotted per new viewer.
    pub stores: Arc<StateStores>,
    /// Live event fan-out joined by every viewer session.
    pub bus: EventBus,
    /// Broker connection status, written by the broker loop.
    pub broker: watch::Receiver<BrokerStatus>,
    /// Directory holding the floor-plan page and its assets.
    pub web_base: PathBuf,
    /// Heartbeat interval for viewer sessions; `None` disables it.
    pub ping_interval: Option<Duration>,
    /// Service name reported by `/health`.
    pub name: String,
}

impl AppState {
    /// Create state over existing caches, bus and broker status.
    pub fn new(
        stores: Arc<StateStores>,
        bus: EventBus,
        broker: watch::Receiver<BrokerStatus>,
    ) -> Self {
        Self {
            stores,
            bus,
            broker,
            web_base: PathBuf::from("static"),
            ping_interval: None,
            name: String::from("Plan"),
        }
    }

    /// Serve the floor-plan page from `web_base`.
    #[must_use]
    pub fn with_web_base(mut self, web_base: impl Into<PathBuf>) -> Self {
        self.web_base = web_base.into();
        self
    }

    /// Ping viewers at this interval.
    #[must_use]
    pub const fn with_ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Report this name from `/health`.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
