//! Entity keys for the tracked objects on the floor plan.
//!
//! Doors are addressed by the small integer the gatekeeper firmware
//! publishes in its topic (`nh/gk/<id>/...`). Temperature sensors are
//! addressed by a free-form location name and need no wrapper.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Identifier of a gatekeeper-controlled door.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DoorId(pub u32);

impl DoorId {
    /// Return the raw numeric identifier.
    pub const fn into_inner(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DoorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DoorId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Error returned when a topic segment is not a valid door identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid door id: {input:?}")]
pub struct ParseDoorIdError {
    input: String,
}

impl ParseDoorIdError {
    /// The text that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl FromStr for DoorId {
    type Err = ParseDoorIdError;

    /// Parse a door identifier from a topic segment.
    ///
    /// Only plain ASCII digits are accepted. Signs, whitespace and empty
    /// segments are rejected so that a garbled topic can never collapse
    /// onto door 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseDoorIdError {
                input: s.to_owned(),
            });
        }
        s.parse::<u32>().map(Self).map_err(|_e| ParseDoorIdError {
            input: s.to_owned(),
        })
    }
}

/// The categories of state the bridge caches, one store per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    /// Door state and door-button topics, keyed by [`DoorId`].
    Door,
    /// Temperature sensor topics, keyed by location name.
    Temperature,
}

impl EntityCategory {
    /// Short lowercase name used in log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Door => "door",
            Self::Temperature => "temperature",
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
