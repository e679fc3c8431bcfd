//! Translation of broker messages into typed events.
//!
//! Each [`IngestionAdapter`] handles one message category. It pulls the
//! entity key out of the topic, parses the payload, updates the matching
//! [`StateStore`](crate::store::StateStore) and publishes the event on the
//! [`EventBus`]. Anything that does not parse is rejected with an
//! [`IngestError`] before the store or the bus is touched, so a garbled
//! message can never land on a default key.
//!
//! | topic | payload | event |
//! |-------|---------|-------|
//! | `nh/gk/<door>/DoorState` | state string | [`Event::DoorState`] |
//! | `nh/gk/<door>/DoorButton` | ignored | [`Event::DoorButton`] |
//! | `nh/temperature/<location>` | decimal | [`Event::Temperature`] |
//!
//! The store update and the publish happen under one per-adapter guard,
//! so two messages for the same key reach the cache and the subscribers
//! in the same order.

use std::sync::{Arc, Mutex, PoisonError};

use plan_types::{DoorId, EntityCategory, Event};
use tracing::debug;

use crate::bus::EventBus;
use crate::store::StateStores;

/// Broker subscription filter for door state topics.
pub const DOOR_STATE_FILTER: &str = "nh/gk/+/DoorState";
/// Broker subscription filter for door bell button topics.
pub const DOOR_BUTTON_FILTER: &str = "nh/gk/+/DoorButton";
/// Broker subscription filter for temperature topics.
pub const TEMPERATURE_FILTER: &str = "nh/temperature/+";

/// Reasons an inbound message is dropped instead of ingested.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// The topic does not have the shape this adapter expects.
    #[error("malformed topic {topic:?}: {reason}")]
    MalformedTopic {
        /// The offending topic.
        topic: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The payload could not be parsed as the category's value type.
    #[error("malformed payload on {topic:?}: {reason}")]
    MalformedPayload {
        /// Topic the payload arrived on.
        topic: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The payload is not valid UTF-8.
    #[error("non UTF-8 payload on {topic:?}")]
    NonUtf8Payload {
        /// Topic the payload arrived on.
        topic: String,
    },
}

/// Turns messages of one category into events.
///
/// Implementations must not block: they run on the broker's dispatch path.
pub trait IngestionAdapter: Send + Sync {
    /// The store category this adapter feeds.
    fn category(&self) -> EntityCategory;

    /// The broker subscription filter whose messages this adapter handles.
    fn topic_filter(&self) -> &'static str;

    /// Parse one message, update the cache and publish the event.
    ///
    /// On error nothing has been stored or published.
    fn ingest(&self, topic: &str, payload: &[u8]) -> Result<Event, IngestError>;
}

/// Extract the door id from `nh/gk/<door>/<leaf>`.
fn door_key(topic: &str, leaf: &str) -> Result<DoorId, IngestError> {
    let mut levels = topic.split('/');
    match (
        levels.next(),
        levels.next(),
        levels.next(),
        levels.next(),
        levels.next(),
    ) {
        (Some("nh"), Some("gk"), Some(door), Some(last), None) if last == leaf => {
            door.parse::<DoorId>()
                .map_err(|e| IngestError::MalformedTopic {
                    topic: topic.to_owned(),
                    reason: e.to_string(),
                })
        }
        _ => Err(IngestError::MalformedTopic {
            topic: topic.to_owned(),
            reason: format!("expected nh/gk/<door>/{leaf}"),
        }),
    }
}

/// Extract the location from `nh/temperature/<location>`.
fn temperature_key(topic: &str) -> Result<String, IngestError> {
    match topic.strip_prefix("nh/temperature/") {
        Some(location) if !location.is_empty() && !location.contains('/') => {
            Ok(location.to_owned())
        }
        _ => Err(IngestError::MalformedTopic {
            topic: topic.to_owned(),
            reason: String::from("expected nh/temperature/<location>"),
        }),
    }
}

fn utf8_payload<'a>(topic: &str, payload: &'a [u8]) -> Result<&'a str, IngestError> {
    std::str::from_utf8(payload).map_err(|_e| IngestError::NonUtf8Payload {
        topic: topic.to_owned(),
    })
}

/// Parse a temperature payload such as `21.5` or ` -3 `.
fn parse_reading(topic: &str, payload: &str) -> Result<f64, IngestError> {
    let trimmed = payload.trim();
    let reading: f64 = trimmed
        .parse()
        .map_err(|e| IngestError::MalformedPayload {
            topic: topic.to_owned(),
            reason: format!("{trimmed:?} is not a number: {e}"),
        })?;
    if reading.is_finite() {
        Ok(reading)
    } else {
        Err(IngestError::MalformedPayload {
            topic: topic.to_owned(),
            reason: format!("{trimmed:?} is not a finite reading"),
        })
    }
}

/// Handles `nh/gk/<door>/DoorState`: caches and publishes the state string.
#[derive(Debug)]
pub struct DoorStateAdapter {
    stores: Arc<StateStores>,
    bus: EventBus,
    commit: Mutex<()>,
}

impl DoorStateAdapter {
    /// Create an adapter writing to `stores.doors` and publishing on `bus`.
    pub const fn new(stores: Arc<StateStores>, bus: EventBus) -> Self {
        Self {
            stores,
            bus,
            commit: Mutex::new(()),
        }
    }
}

impl IngestionAdapter for DoorStateAdapter {
    fn category(&self) -> EntityCategory {
        EntityCategory::Door
    }

    fn topic_filter(&self) -> &'static str {
        DOOR_STATE_FILTER
    }

    fn ingest(&self, topic: &str, payload: &[u8]) -> Result<Event, IngestError> {
        let door_id = door_key(topic, "DoorState")?;
        let value = utf8_payload(topic, payload)?.to_owned();

        let event = Event::DoorState {
            door_id,
            value: value.clone(),
        };
        let report = {
            let _commit = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
            self.stores.doors.set(door_id, value);
            self.bus.publish(&event)
        };
        debug!(
            %door_id,
            delivered = report.delivered,
            evicted = report.evicted,
            "door state ingested"
        );
        Ok(event)
    }
}

/// Handles `nh/gk/<door>/DoorButton`: publishes a press, caches nothing.
#[derive(Debug)]
pub struct DoorButtonAdapter {
    bus: EventBus,
}

impl DoorButtonAdapter {
    /// Create an adapter publishing on `bus`.
    pub const fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl IngestionAdapter for DoorButtonAdapter {
    fn category(&self) -> EntityCategory {
        EntityCategory::Door
    }

    fn topic_filter(&self) -> &'static str {
        DOOR_BUTTON_FILTER
    }

    fn ingest(&self, topic: &str, _payload: &[u8]) -> Result<Event, IngestError> {
        let door_id = door_key(topic, "DoorButton")?;
        let event = Event::DoorButton { door_id };
        let report = self.bus.publish(&event);
        debug!(%door_id, delivered = report.delivered, "door button ingested");
        Ok(event)
    }
}

/// Handles `nh/temperature/<location>`: caches and publishes the reading.
#[derive(Debug)]
pub struct TemperatureAdapter {
    stores: Arc<StateStores>,
    bus: EventBus,
    commit: Mutex<()>,
}

impl TemperatureAdapter {
    /// Create an adapter writing to `stores.temperatures` and publishing on `bus`.
    pub const fn new(stores: Arc<StateStores>, bus: EventBus) -> Self {
        Self {
            stores,
            bus,
            commit: Mutex::new(()),
        }
    }
}

impl IngestionAdapter for TemperatureAdapter {
    fn category(&self) -> EntityCategory {
        EntityCategory::Temperature
    }

    fn topic_filter(&self) -> &'static str {
        TEMPERATURE_FILTER
    }

    fn ingest(&self, topic: &str, payload: &[u8]) -> Result<Event, IngestError> {
        let location = temperature_key(topic)?;
        let reading = parse_reading(topic, utf8_payload(topic, payload)?)?;

        let event = Event::Temperature {
            location: location.clone(),
            reading,
        };
        let report = {
            let _commit = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
            self.stores.temperatures.set(location.clone(), reading);
            self.bus.publish(&event)
        };
        debug!(
            %location,
            reading,
            delivered = report.delivered,
            evicted = report.evicted,
            "temperature ingested"
        );
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn setup() -> (Arc<StateStores>, EventBus) {
        (Arc::new(StateStores::new()), EventBus::new(16))
    }

    #[test]
    fn door_state_updates_store_and_publishes() {
        let (stores, bus) = setup();
        let mut sub = bus.join();
        let adapter = DoorStateAdapter::new(Arc::clone(&stores), bus.clone());

        let event = adapter.ingest("nh/gk/12/DoorState", b"open").unwrap();

        let expected = Event::DoorState {
            door_id: DoorId(12),
            value: String::from("open"),
        };
        assert_eq!(event, expected);
        assert_eq!(stores.doors.get(&DoorId(12)).as_deref(), Some("open"));
        assert_eq!(sub.try_recv(), Some(expected));
    }

    #[test]
    fn door_state_sequence_keeps_last_value() {
        let (stores, bus) = setup();
        let adapter = DoorStateAdapter::new(Arc::clone(&stores), bus);
        for value in ["closed", "open", "locked"] {
            adapter.ingest("nh/gk/3/DoorState", value.as_bytes()).unwrap();
        }
        assert_eq!(stores.doors.get(&DoorId(3)).as_deref(), Some("locked"));
    }

    #[test]
    fn non_numeric_door_is_rejected_without_side_effects() {
        let (stores, bus) = setup();
        let mut sub = bus.join();
        let adapter = DoorStateAdapter::new(Arc::clone(&stores), bus.clone());

        let err = adapter.ingest("nh/gk/not-a-number/DoorState", b"open");

        assert!(matches!(err, Err(IngestError::MalformedTopic { .. })));
        assert!(stores.doors.is_empty());
        assert_eq!(stores.doors.get(&DoorId(0)), None);
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn door_topic_shape_is_checked() {
        for topic in [
            "nh/gk/1/DoorButton",
            "nh/gk/1/DoorState/extra",
            "nh/gk//DoorState",
            "nh/xx/1/DoorState",
            "DoorState",
        ] {
            assert!(
                matches!(door_key(topic, "DoorState"), Err(IngestError::MalformedTopic { .. })),
                "{topic} should be rejected"
            );
        }
    }

    #[test]
    fn non_utf8_door_state_is_rejected() {
        let (stores, bus) = setup();
        let adapter = DoorStateAdapter::new(Arc::clone(&stores), bus);
        let err = adapter.ingest("nh/gk/1/DoorState", &[0xff, 0xfe]);
        assert_eq!(
            err,
            Err(IngestError::NonUtf8Payload {
                topic: String::from("nh/gk/1/DoorState"),
            })
        );
        assert!(stores.doors.is_empty());
    }

    #[test]
    fn door_button_publishes_without_caching() {
        let (stores, bus) = setup();
        let mut sub = bus.join();
        let adapter = DoorButtonAdapter::new(bus.clone());

        let event = adapter.ingest("nh/gk/7/DoorButton", &[0xff, 0x00]).unwrap();

        assert_eq!(event, Event::DoorButton { door_id: DoorId(7) });
        assert_eq!(sub.try_recv(), Some(event));
        assert!(stores.doors.is_empty());
    }

    #[test]
    fn temperature_is_parsed_and_cached() {
        let (stores, bus) = setup();
        let mut sub = bus.join();
        let adapter = TemperatureAdapter::new(Arc::clone(&stores), bus.clone());

        let event = adapter.ingest("nh/temperature/kitchen", b"21.5").unwrap();

        let expected = Event::Temperature {
            location: String::from("kitchen"),
            reading: 21.5,
        };
        assert_eq!(event, expected);
        assert_eq!(stores.temperatures.get(&String::from("kitchen")), Some(21.5));
        assert_eq!(sub.try_recv(), Some(expected));
    }

    #[test]
    fn temperature_payload_whitespace_is_tolerated() {
        let (stores, bus) = setup();
        let adapter = TemperatureAdapter::new(Arc::clone(&stores), bus);
        adapter.ingest("nh/temperature/yard", b" -3.25\n").unwrap();
        assert_eq!(stores.temperatures.get(&String::from("yard")), Some(-3.25));
    }

    #[test]
    fn bad_temperature_payloads_are_rejected() {
        let (stores, bus) = setup();
        let mut sub = bus.join();
        let adapter = TemperatureAdapter::new(Arc::clone(&stores), bus.clone());
        for payload in ["", "warm", "NaN", "inf", "21.5C"] {
            let err = adapter.ingest("nh/temperature/kitchen", payload.as_bytes());
            assert!(
                matches!(err, Err(IngestError::MalformedPayload { .. })),
                "{payload:?} should be rejected"
            );
        }
        assert!(stores.temperatures.is_empty());
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn temperature_location_must_be_one_level() {
        for topic in ["nh/temperature/", "nh/temperature/a/b", "nh/temp/a"] {
            assert!(temperature_key(topic).is_err(), "{topic} should be rejected");
        }
        assert_eq!(temperature_key("nh/temperature/g5").unwrap(), "g5");
    }

    #[test]
    fn adapters_report_their_filters() {
        let (stores, bus) = setup();
        assert_eq!(
            DoorStateAdapter::new(Arc::clone(&stores), bus.clone()).topic_filter(),
            DOOR_STATE_FILTER
        );
        assert_eq!(DoorButtonAdapter::new(bus.clone()).topic_filter(), DOOR_BUTTON_FILTER);
        let temp = TemperatureAdapter::new(stores, bus);
        assert_eq!(temp.topic_filter(), TEMPERATURE_FILTER);
        assert_eq!(temp.category(), EntityCategory::Temperature);
    }
}
