//! Viewer HTTP server lifecycle.
//!
//! [`bind`] resolves and binds the listen address; [`serve`] runs the
//! router on a bound listener until the shutdown future completes.
//! [`start_server`] does both. Splitting the two lets callers bind port
//! `0` and learn the real address before serving.

use std::future::Future;
use std::io;
use std::sync::Arc;

use plan_core::config::ServerSection;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Where the viewer server listens.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host name or address to bind (`0.0.0.0`, `localhost`, `::1`).
    pub host: String,
    /// The TCP port to listen on; `0` picks a free one.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
        }
    }
}

impl From<&ServerSection> for ServerConfig {
    fn from(section: &ServerSection) -> Self {
        Self {
            host: section.listen_host.clone(),
            port: section.listen_port,
        }
    }
}

/// Bind the configured address. Host names are resolved and each
/// resolved address is tried in turn.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if no resolved address can be bound.
pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
    TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|source| ServerError::Bind {
            host: config.host.clone(),
            port: config.port,
            source,
        })
}

/// Serve viewers on `listener` until `shutdown` resolves.
///
/// Open `WebSocket` sessions end when their sockets are dropped.
///
/// # Errors
///
/// Returns [`ServerError::Serve`] on a fatal I/O error.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let addr = listener.local_addr().map_err(ServerError::Serve)?;
    info!(%addr, "Plan server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve)?;

    info!(%addr, "Plan server stopped");
    Ok(())
}

/// Bind, then serve until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or serving fails.
pub async fn start_server(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let listener = bind(config).await?;
    serve(listener, state, shutdown).await
}

/// Errors that can occur when starting or running the viewer server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// No address for the configured host could be bound.
    #[error("failed to bind {host}:{port}: {source}")]
    Bind {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// The last bind error.
        source: io::Error,
    },

    /// The server hit a fatal I/O error while serving.
    #[error("serve error: {0}")]
    Serve(io::Error),
}
