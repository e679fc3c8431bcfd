//! Broker connection status shared between the broker loop and `/health`.
//!
//! The bridge does not exit when the broker goes away. Instead the broker
//! loop flips [`BrokerStatus`] to `Degraded` and keeps retrying, and the
//! HTTP layer reports the current status. Viewers keep their sessions
//! and see the cached state until events flow again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// Connection state of the broker client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BrokerStatus {
    /// No connection has been established yet.
    Connecting,
    /// Connected and subscribed.
    Connected {
        /// When the current connection was acknowledged.
        since: DateTime<Utc>,
    },
    /// The connection failed; the loop is backing off and will retry.
    Degraded {
        /// When the connection was lost.
        since: DateTime<Utc>,
        /// The most recent connection error.
        reason: String,
    },
}

impl BrokerStatus {
    /// Whether events are currently flowing from the broker.
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Writer side of the broker status, held by the broker loop.
#[derive(Debug)]
pub struct BrokerHealth {
    tx: watch::Sender<BrokerStatus>,
}

impl Default for BrokerHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerHealth {
    /// Start in [`BrokerStatus::Connecting`].
    pub fn new() -> Self {
        let (tx, _) = watch::channel(BrokerStatus::Connecting);
        Self { tx }
    }

    /// A reader for the HTTP layer.
    pub fn subscribe(&self) -> watch::Receiver<BrokerStatus> {
        self.tx.subscribe()
    }

    /// The current status.
    pub fn current(&self) -> BrokerStatus {
        self.tx.borrow().clone()
    }

    /// Record a fresh connection.
    pub fn connected(&self) {
        self.tx.send_replace(BrokerStatus::Connected { since: Utc::now() });
    }

    /// Record a connection failure.
    ///
    /// Repeated failures keep the original `since` so `/health` shows how
    /// long the outage has lasted, while `reason` tracks the latest error.
    pub fn degraded(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_modify(|status| {
            let since = match status {
                BrokerStatus::Degraded { since, .. } => *since,
                BrokerStatus::Connecting | BrokerStatus::Connected { .. } => Utc::now(),
            };
            *status = BrokerStatus::Degraded { since, reason };
        });
    }
}
