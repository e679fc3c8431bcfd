//! Event distribution core for the hackspace floor-plan bridge.
//!
//! Sparse sensor events (door state, door bell presses, temperatures)
//! arrive from an MQTT broker and must reach every connected viewer. This
//! crate owns the parts with real invariants:
//!
//! - [`store`] -- last-write-wins caches, one per entity category
//! - [`bus`] -- fan-out hub with bounded per-subscriber queues
//! - [`ingest`] -- topic/payload parsing into typed events
//! - [`status`] -- the `STATUS` liveness request/reply
//! - [`dispatch`] -- routes an inbound broker message to the right handler
//! - [`session`] -- per-viewer snapshot-then-stream state machine
//! - [`health`] -- broker connection status shared with the HTTP layer
//! - [`config`] -- YAML configuration with environment overrides
//!
//! # Data flow
//!
//! ```text
//! broker --> Dispatcher --> IngestionAdapter --> {StateStore::set, EventBus::publish}
//!                                                            |
//!                                   N x ClientSession <------+
//! ```
//!
//! Publishing never waits on a viewer. A viewer whose queue fills up is
//! evicted and its session ends; the rest carry on.

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod ingest;
pub mod session;
pub mod status;
pub mod store;

pub use bus::{EventBus, PublishReport, Subscription, SubscriptionId};
pub use config::{ConfigError, PlanConfig};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use health::{BrokerHealth, BrokerStatus};
pub use ingest::{
    DoorButtonAdapter, DoorStateAdapter, IngestError, IngestionAdapter, TemperatureAdapter,
};
pub use session::{ClientSession, Inbound, SessionEnd, SessionPhase, TransportError, ViewerTransport};
pub use status::{BrokerPublisher, PublishError, StatusResponder};
pub use store::{StateStore, StateStores};
