//! Axum router construction for the viewer server.
//!
//! Assembles the floor-plan page, its static assets, the `WebSocket`
//! stream and the health endpoint into a single [`Router`].

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the viewer server.
///
/// The router includes:
/// - `GET /` -- the floor-plan page
/// - `GET /static/*` -- files under the web base directory
/// - `GET /ws` -- same-origin `WebSocket` event stream
/// - `GET /health` -- broker status and cache sizes
pub fn build_router(state: Arc<AppState>) -> Router {
    let assets = ServeDir::new(&state.web_base);

    Router::new()
        .route("/", get(handlers::index))
        .route("/ws", get(ws::ws_events))
        .route("/health", get(handlers::health))
        .nest_service("/static", assets)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
