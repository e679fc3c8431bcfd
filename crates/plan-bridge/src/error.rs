//! Error types for the bridge binary.
//!
//! Startup failures surface as [`BridgeError`] and end the process.
//! Broker trouble at runtime never does; the broker loop logs it and
//! retries.

use plan_core::ConfigError;
use plan_observer::ServerError;

/// Errors that abort the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The configuration file or an environment override was unusable.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The viewer server failed to bind or serve.
    #[error("server error: {0}")]
    Server(#[from] ServerError),
}

/// Errors talking to the MQTT broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// A subscription request could not be queued.
    #[error("failed to subscribe to {filter}: {reason}")]
    Subscribe {
        /// The topic filter.
        filter: String,
        /// Why the client refused it.
        reason: String,
    },
}
