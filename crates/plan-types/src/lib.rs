//! Shared type definitions for the floor-plan event bridge.
//!
//! These types cross every boundary in the workspace: the ingestion
//! adapters build them from broker messages, the event bus fans them out,
//! and the viewer sessions serialize them to the browser. Types flow
//! downstream to `TypeScript` via `ts-rs` for the floor-plan page.
//!
//! # Modules
//!
//! - [`ids`] -- Entity keys (door identifiers) and store categories
//! - [`events`] -- The [`Event`] tagged union pushed to viewers

pub mod events;
pub mod ids;

pub use events::Event;
pub use ids::{DoorId, EntityCategory, ParseDoorIdError};
