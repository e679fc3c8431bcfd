//! Viewer-facing server for the floor-plan bridge.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`) running one
//!   [`ClientSession`](plan_core::ClientSession) per viewer: the cached
//!   door and temperature state first, then every live event
//! - **Floor-plan page** (`GET /`) and its assets under `/static/`
//! - **Health endpoint** (`GET /health`) reporting broker connectivity and
//!   cache sizes
//!
//! # Trust boundary
//!
//! `WebSocket` upgrades are refused unless the request's `Origin` names the
//! host being served. Viewers are otherwise unauthenticated.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, bind, serve, start_server};
pub use state::AppState;
