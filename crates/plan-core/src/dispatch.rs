//! Routing of inbound broker messages.
//!
//! The [`Dispatcher`] is the broker callback. It owns one adapter per
//! message category plus the [`StatusResponder`] and hands each message
//! to whichever one's filter matches. Rejected messages are logged and
//! absorbed here; nothing propagates back into the broker loop.

use std::sync::Arc;

use plan_types::Event;
use tracing::warn;

use crate::bus::EventBus;
use crate::ingest::{
    DoorButtonAdapter, DoorStateAdapter, IngestError, IngestionAdapter, TemperatureAdapter,
};
use crate::status::StatusResponder;
use crate::store::StateStores;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// An adapter accepted it and published this event.
    Published(Event),
    /// It was a status request and a reply was sent.
    StatusReplied,
    /// It was on the status topic but was not a `STATUS` request, or the
    /// reply could not be queued.
    StatusIgnored,
    /// An adapter rejected it; nothing was stored or published.
    Rejected(IngestError),
    /// No adapter subscribes to this topic.
    Unrouted,
}

/// Match an MQTT topic against a subscription filter.
///
/// `+` matches exactly one level and `#` matches the remaining levels
/// (including none) when it is the final level of the filter.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Routes broker messages to the ingestion adapters and status responder.
pub struct Dispatcher {
    adapters: Vec<Box<dyn IngestionAdapter>>,
    status: StatusResponder,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("filters", &self.subscriptions())
            .field("status", &self.status)
            .finish()
    }
}

impl Dispatcher {
    /// Build a dispatcher from an explicit adapter list.
    pub fn new(adapters: Vec<Box<dyn IngestionAdapter>>, status: StatusResponder) -> Self {
        Self { adapters, status }
    }

    /// Build the standard door-state, door-button and temperature adapters
    /// over shared stores and bus.
    pub fn standard(stores: &Arc<StateStores>, bus: &EventBus, status: StatusResponder) -> Self {
        let adapters: Vec<Box<dyn IngestionAdapter>> = vec![
            Box::new(DoorStateAdapter::new(Arc::clone(stores), bus.clone())),
            Box::new(DoorButtonAdapter::new(bus.clone())),
            Box::new(TemperatureAdapter::new(Arc::clone(stores), bus.clone())),
        ];
        Self::new(adapters, status)
    }

    /// Every filter the broker client must subscribe to.
    pub fn subscriptions(&self) -> Vec<String> {
        self.adapters
            .iter()
            .map(|a| a.topic_filter().to_owned())
            .chain(std::iter::once(self.status.request_topic().to_owned()))
            .collect()
    }

    /// Handle one inbound message. Never panics, never blocks.
    pub fn dispatch(&self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        if topic_matches(self.status.request_topic(), topic) {
            return if self.status.handle(payload) {
                DispatchOutcome::StatusReplied
            } else {
                DispatchOutcome::StatusIgnored
            };
        }

        let Some(adapter) = self
            .adapters
            .iter()
            .find(|a| topic_matches(a.topic_filter(), topic))
        else {
            warn!(topic, "message on unrouted topic");
            return DispatchOutcome::Unrouted;
        };

        match adapter.ingest(topic, payload) {
            Ok(event) => DispatchOutcome::Published(event),
            Err(e) => {
                warn!(
                    topic,
                    category = %adapter.category(),
                    error = %e,
                    "dropping malformed message"
                );
                DispatchOutcome::Rejected(e)
            }
        }
    }
}
