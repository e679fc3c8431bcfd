//! HTTP endpoint handlers for the viewer server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | The floor-plan page (`<web_base>/index.html`) |
//! | `GET` | `/health` | Broker status and cache sizes |
//!
//! Assets under `/static/` are served by the router directly.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::Html;
use plan_core::BrokerStatus;
use serde::Serialize;
use tracing::warn;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET / -- floor-plan page
// ---------------------------------------------------------------------------

/// Serve `index.html` from the configured web base.
///
/// The file is read on every request so the page can be edited without a
/// restart.
pub async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, ObserverError> {
    let path = state.web_base.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Ok(Html(page)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Floor-plan page unreadable");
            Err(ObserverError::NotFound(String::from("index.html")))
        }
    }
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `ok` while the broker is connected, `degraded` otherwise.
    pub status: &'static str,
    /// Configured service name.
    pub name: String,
    /// Broker connection detail.
    pub broker: BrokerStatus,
    /// Viewers currently joined to the bus.
    pub subscribers: usize,
    /// Doors with a known state.
    pub doors: usize,
    /// Locations with a known reading.
    pub temperatures: usize,
}

/// Report broker status and cache sizes.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let broker = state.broker.borrow().clone();
    let status = if broker.is_connected() { "ok" } else { "degraded" };
    Json(HealthResponse {
        status,
        name: state.name.clone(),
        broker,
        subscribers: state.bus.subscriber_count(),
        doors: state.stores.doors.len(),
        temperatures: state.stores.temperatures.len(),
    })
}
