//! MQTT broker integration: the inbound event loop and the outbound
//! publisher used for status replies.
//!
//! The broker loop polls the `rumqttc` event loop forever. Each `ConnAck`
//! marks the bridge connected and re-issues every subscription, since the
//! broker forgets them with a clean session. Each incoming publish goes
//! straight to the [`Dispatcher`]. Connection errors mark the bridge
//! degraded and the loop backs off before polling again, which makes
//! `rumqttc` reconnect.

use std::sync::Arc;
use std::time::Duration;

use plan_core::config::MqttConfig;
use plan_core::{BrokerHealth, BrokerPublisher, Dispatcher, PublishError};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tracing::{debug, info, warn};

use crate::error::BrokerError;

/// First delay after a connection failure.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Longest delay between reconnect attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// `rumqttc` rejects keep-alive intervals below this.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Outstanding requests buffered between the client handle and the loop.
const REQUEST_CAPACITY: usize = 32;

/// Build the client handle and event loop for the configured broker.
///
/// Nothing connects until the event loop is polled.
pub fn connect(config: &MqttConfig) -> (AsyncClient, EventLoop) {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(config.keep_alive().max(MIN_KEEP_ALIVE));
    info!(
        host = %config.host,
        port = config.port,
        client_id = %config.client_id,
        "MQTT client configured"
    );
    AsyncClient::new(options, REQUEST_CAPACITY)
}

/// [`BrokerPublisher`] backed by the `rumqttc` client handle.
///
/// Publishing only queues the request; the broker loop writes it out.
#[derive(Debug, Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Wrap a client handle.
    pub const fn new(client: AsyncClient) -> Self {
        Self { client }
    }

    /// As a trait object for the status responder.
    pub fn shared(self) -> Arc<dyn BrokerPublisher> {
        Arc::new(self)
    }
}

impl BrokerPublisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| PublishError {
                topic: topic.to_owned(),
                reason: e.to_string(),
            })
    }
}

/// Exponential reconnect delay, doubling from [`INITIAL_BACKOFF`] up to
/// [`MAX_BACKOFF`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    next: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff {
    /// Start at the initial delay.
    pub const fn new() -> Self {
        Self {
            next: INITIAL_BACKOFF,
        }
    }

    /// The delay to wait now; the following one doubles.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(MAX_BACKOFF);
        delay
    }

    /// Back to the initial delay after a successful connect.
    pub const fn reset(&mut self) {
        self.next = INITIAL_BACKOFF;
    }
}

/// Drives the broker connection and feeds incoming messages to the
/// dispatcher.
pub struct BrokerLoop {
    client: AsyncClient,
    eventloop: EventLoop,
    dispatcher: Dispatcher,
    health: BrokerHealth,
    backoff: Backoff,
}

impl BrokerLoop {
    /// Assemble the loop from a client pair, a dispatcher and the health
    /// writer.
    pub fn new(
        client: AsyncClient,
        eventloop: EventLoop,
        dispatcher: Dispatcher,
        health: BrokerHealth,
    ) -> Self {
        Self {
            client,
            eventloop,
            dispatcher,
            health,
            backoff: Backoff::new(),
        }
    }

    /// Poll the broker forever.
    pub async fn run(mut self) {
        info!("Broker loop started");
        loop {
            match self.eventloop.poll().await {
                Ok(event) => self.handle_event(&event),
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(
                        error = %e,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Broker connection failed"
                    );
                    self.health.degraded(e.to_string());
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn handle_event(&mut self, event: &Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                info!(session_present = ack.session_present, "Connected to broker");
                self.backoff.reset();
                self.health.connected();
                if let Err(e) = self.subscribe_all() {
                    warn!(error = %e, "Subscription request failed");
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                let outcome = self.dispatcher.dispatch(&publish.topic, &publish.payload);
                debug!(topic = %publish.topic, ?outcome, "Broker message handled");
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                debug!(pkid = ack.pkid, "Subscription acknowledged");
            }
            Event::Incoming(_) | Event::Outgoing(_) => {}
        }
    }

    fn subscribe_all(&self) -> Result<(), BrokerError> {
        for filter in self.dispatcher.subscriptions() {
            self.client
                .try_subscribe(filter.as_str(), QoS::AtMostOnce)
                .map_err(|e| BrokerError::Subscribe {
                    filter: filter.clone(),
                    reason: e.to_string(),
                })?;
            debug!(%filter, "Subscription requested");
        }
        Ok(())
    }
}
