//! Configuration loading and typed config structures for the bridge.
//!
//! The configuration lives in a YAML file (default `plan-config.yaml`,
//! overridable with `PLAN_CONFIG`). Every field has a default so a missing
//! file or a partial one still yields a usable configuration. A handful
//! of deployment-specific values can also be overridden from the
//! environment without editing the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// An environment override had an unusable value.
    #[error("invalid value for {name}: {reason}")]
    Env {
        /// The environment variable.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PlanConfig {
    /// Broker connection and status topics.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Viewer-facing HTTP server.
    #[serde(default)]
    pub plan: ServerSection,

    /// Event bus tuning.
    #[serde(default)]
    pub bus: BusConfig,

    /// Viewer session tuning.
    #[serde(default)]
    pub session: SessionConfig,
}

impl PlanConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override file values:
    /// - `MQTT_HOST` overrides `mqtt.host`
    /// - `MQTT_PORT` overrides `mqtt.port`
    /// - `PLAN_LISTEN_PORT` overrides `plan.listen_port`
    /// - `PLAN_WEB_BASE` overrides `plan.web_base`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Env`] if an override does not parse.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, without env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Apply overrides looked up through `lookup` (normally the process
    /// environment).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] if a numeric override does not parse.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup("MQTT_PORT") {
            self.mqtt.port = parse_port("MQTT_PORT", &port)?;
        }
        if let Some(port) = lookup("PLAN_LISTEN_PORT") {
            self.plan.listen_port = parse_port("PLAN_LISTEN_PORT", &port)?;
        }
        if let Some(base) = lookup("PLAN_WEB_BASE") {
            self.plan.web_base = PathBuf::from(base);
        }
        Ok(())
    }
}

fn parse_port(name: &'static str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|e| ConfigError::Env {
        name,
        reason: format!("{value:?}: {e}"),
    })
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MqttConfig {
    /// Broker host name.
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// Broker TCP port.
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// MQTT client identifier.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Topic liveness requests arrive on.
    #[serde(default = "default_status_request")]
    pub status_request: String,

    /// Topic liveness replies are published to.
    #[serde(default = "default_status_response")]
    pub status_response: String,

    /// Name reported in `Running: <name>`.
    #[serde(default = "default_status_name")]
    pub status_name: String,

    /// MQTT keep-alive interval in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl MqttConfig {
    /// Keep-alive interval as a [`Duration`].
    pub const fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            status_request: default_status_request(),
            status_response: default_status_response(),
            status_name: default_status_name(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

fn default_mqtt_host() -> String {
    String::from("localhost")
}

const fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    String::from("plan")
}

fn default_status_request() -> String {
    String::from("nh/status/req")
}

fn default_status_response() -> String {
    String::from("nh/status/res")
}

fn default_status_name() -> String {
    String::from("Plan")
}

const fn default_keep_alive_secs() -> u64 {
    30
}

/// Viewer-facing HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Address to bind.
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    /// TCP port to listen on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Directory holding `index.html`, `app.js`, `config.json` and images.
    #[serde(default = "default_web_base")]
    pub web_base: PathBuf,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            web_base: default_web_base(),
        }
    }
}

fn default_listen_host() -> String {
    String::from("0.0.0.0")
}

const fn default_listen_port() -> u16 {
    8080
}

fn default_web_base() -> PathBuf {
    PathBuf::from("static")
}

/// Event bus settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BusConfig {
    /// Events buffered per viewer before the viewer is evicted.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

const fn default_queue_capacity() -> usize {
    crate::bus::DEFAULT_QUEUE_CAPACITY
}

/// Viewer session settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Seconds between heartbeat pings; `0` disables the heartbeat.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

impl SessionConfig {
    /// The heartbeat interval, or `None` when disabled.
    pub const fn ping_interval(&self) -> Option<Duration> {
        if self.ping_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.ping_interval_secs))
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

const fn default_ping_interval_secs() -> u64 {
    30
}
