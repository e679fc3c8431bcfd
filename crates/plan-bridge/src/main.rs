//! Floor-plan bridge entry point.
//!
//! The bridge listens to the hackspace MQTT broker for door and
//! temperature messages, keeps the latest value of each, and streams
//! them to browsers viewing the floor plan over a `WebSocket`.
//!
//! # Architecture
//!
//! ```text
//! MQTT --> Dispatcher --> adapters --> StateStores + EventBus --> ClientSession --> WebSocket
//!              \--> StatusResponder --> MQTT (status reply)
//! ```
//!
//! Losing the broker degrades the bridge but does not stop it: viewers
//! keep their sessions and the loop reconnects with backoff.

mod error;
mod mqtt;

use std::path::PathBuf;
use std::sync::Arc;

use plan_core::{BrokerHealth, Dispatcher, EventBus, PlanConfig, StateStores, StatusResponder};
use plan_observer::{AppState, ServerConfig, start_server};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::BridgeError;
use crate::mqtt::{BrokerLoop, MqttPublisher};

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "PLAN_CONFIG";

/// Configuration file used when `PLAN_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "plan-config.yaml";

/// Application entry point.
///
/// Initializes logging, loads configuration, wires the ingestion pipeline
/// to the broker, then serves viewers until `Ctrl-C`.
///
/// # Errors
///
/// Returns an error if the configuration is unusable or the server
/// cannot bind.
#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("plan-bridge starting");

    let config = load_config()?;
    info!(
        mqtt_host = %config.mqtt.host,
        mqtt_port = config.mqtt.port,
        listen_port = config.plan.listen_port,
        web_base = %config.plan.web_base.display(),
        queue_capacity = config.bus.queue_capacity,
        "configuration loaded"
    );

    if !config.plan.web_base.join("index.html").is_file() {
        warn!(
            web_base = %config.plan.web_base.display(),
            "index.html not found; GET / will return 404"
        );
    }

    // Shared state: caches, fan-out bus, broker status
    let stores = Arc::new(StateStores::new());
    let bus = EventBus::new(config.bus.queue_capacity);
    let health = BrokerHealth::new();

    // Broker client and ingestion pipeline
    let (client, eventloop) = mqtt::connect(&config.mqtt);
    let status = StatusResponder::new(
        config.mqtt.status_request.as_str(),
        config.mqtt.status_response.as_str(),
        &config.mqtt.status_name,
        MqttPublisher::new(client.clone()).shared(),
    );
    let dispatcher = Dispatcher::standard(&stores, &bus, status);
    let app_state = Arc::new(
        AppState::new(Arc::clone(&stores), bus, health.subscribe())
            .with_web_base(config.plan.web_base.clone())
            .with_ping_interval(config.session.ping_interval())
            .with_name(config.mqtt.status_name),
    );

    let broker = tokio::spawn(BrokerLoop::new(client, eventloop, dispatcher, health).run());

    let server_config = ServerConfig::from(&config.plan);
    let served = start_server(&server_config, app_state, shutdown_signal()).await;

    broker.abort();
    info!("plan-bridge stopped");
    served.map_err(BridgeError::from)
}

/// Read the configuration file, or fall back to defaults when it is
/// absent. Environment overrides apply either way.
fn load_config() -> Result<PlanConfig, BridgeError> {
    let path = std::env::var(CONFIG_ENV)
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);

    if path.exists() {
        info!(path = %path.display(), "loading configuration file");
        return Ok(PlanConfig::from_file(&path)?);
    }

    info!(path = %path.display(), "configuration file not found, using defaults");
    let mut config = PlanConfig::default();
    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    Ok(config)
}

/// Resolves on `Ctrl-C`. Never resolves if the signal cannot be watched.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
