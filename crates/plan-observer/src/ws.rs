//! `WebSocket` endpoint streaming door and temperature events to viewers.
//!
//! Clients connect to `GET /ws` and first receive one event per known
//! door and location, then every live event as it is ingested. Each
//! connection is driven by a [`ClientSession`]; this module only supplies
//! the origin policy and the socket-backed [`ViewerTransport`].
//!
//! Only same-origin pages may connect: the `Origin` header must be
//! `http://<Host>` or `https://<Host>`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::http::header::{HOST, ORIGIN};
use axum::response::{IntoResponse, Response};
use plan_core::{ClientSession, Inbound, TransportError, ViewerTransport};
use plan_types::Event;
use tracing::{debug, warn};

use crate::error::ObserverError;
use crate::state::AppState;

/// Check an upgrade request's origin, then hand the socket to a session.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !origin_allowed(&headers) {
        warn!(
            origin = ?headers.get(ORIGIN),
            host = ?headers.get(HOST),
            "Rejected cross-origin WebSocket request"
        );
        return ObserverError::Forbidden(String::from("Origin not allowed")).into_response();
    }

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.on_upgrade(move |socket| async move {
        let session = ClientSession::new(
            WsTransport::new(socket),
            Arc::clone(&state.stores),
            state.bus.clone(),
        )
        .with_ping_interval(state.ping_interval);
        session.run().await;
    })
}

/// Whether `Origin` names the same host the request was sent to.
pub fn origin_allowed(headers: &HeaderMap) -> bool {
    let (Some(origin), Some(host)) = (
        headers.get(ORIGIN).and_then(|v| v.to_str().ok()),
        headers.get(HOST).and_then(|v| v.to_str().ok()),
    ) else {
        return false;
    };

    ["http://", "https://"]
        .iter()
        .any(|scheme| origin.strip_prefix(scheme) == Some(host))
}

/// [`ViewerTransport`] over an upgraded Axum socket.
#[derive(Debug)]
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    /// Wrap an upgraded socket.
    pub const fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl ViewerTransport for WsTransport {
    async fn send(&mut self, event: &Event) -> Result<(), TransportError> {
        let json = serde_json::to_string(event).map_err(|e| TransportError(e.to_string()))?;
        self.socket
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| TransportError(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.socket
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(|e| TransportError(e.to_string()))
    }

    async fn recv(&mut self) -> Inbound {
        match self.socket.recv().await {
            Some(Ok(Message::Pong(_))) => Inbound::Pong,
            Some(Ok(Message::Close(_))) | None => Inbound::Closed,
            // Pings are answered by the protocol layer itself.
            Some(Ok(Message::Ping(_) | Message::Text(_) | Message::Binary(_))) => Inbound::Other,
            Some(Err(e)) => {
                debug!("WebSocket error: {e}");
                Inbound::Closed
            }
        }
    }

    async fn close(mut self) {
        if let Err(e) = self.socket.send(Message::Close(None)).await {
            debug!("WebSocket close frame not sent: {e}");
        }
    }
}
