//! Events fanned out to floor-plan viewers.
//!
//! Every event is self-describing on the wire: the `EventType` tag names
//! the variant and the remaining fields carry the variant's data. The
//! field names match what the floor-plan page (`static/app.js`) reads:
//!
//! ```json
//! {"EventType":"DoorState","DoorId":12,"Value":"open"}
//! {"EventType":"DoorButton","DoorId":7}
//! {"EventType":"Temperature","Location":"kitchen","Temperature":21.5}
//! ```
//!
//! Events are immutable once built and are cloned per subscriber, so no
//! two viewers ever share mutable event state.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{DoorId, EntityCategory};

/// A single observation pushed to every connected viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "EventType")]
#[ts(export, export_to = "bindings/")]
pub enum Event {
    /// A door reported a new state string (e.g. `open`, `closed`, `locked`).
    DoorState {
        /// The door that changed.
        #[serde(rename = "DoorId")]
        door_id: DoorId,
        /// The state string exactly as published by the door controller.
        #[serde(rename = "Value")]
        value: String,
    },
    /// Someone pressed the door bell button. Not cached.
    DoorButton {
        /// The door whose button was pressed.
        #[serde(rename = "DoorId")]
        door_id: DoorId,
    },
    /// A temperature sensor published a reading in degrees Celsius.
    Temperature {
        /// The sensor's location name, taken from its topic.
        #[serde(rename = "Location")]
        location: String,
        /// The parsed reading.
        #[serde(rename = "Temperature")]
        reading: f64,
    },
}

impl Event {
    /// The wire tag for this event (`DoorState`, `DoorButton`, `Temperature`).
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::DoorState { .. } => "DoorState",
            Self::DoorButton { .. } => "DoorButton",
            Self::Temperature { .. } => "Temperature",
        }
    }

    /// The store category this event belongs to.
    pub const fn category(&self) -> EntityCategory {
        match self {
            Self::DoorState { .. } | Self::DoorButton { .. } => EntityCategory::Door,
            Self::Temperature { .. } => EntityCategory::Temperature,
        }
    }

    /// The door this event concerns, if it is a door event.
    pub const fn door_id(&self) -> Option<DoorId> {
        match self {
            Self::DoorState { door_id, .. } | Self::DoorButton { door_id } => Some(*door_id),
            Self::Temperature { .. } => None,
        }
    }
}
