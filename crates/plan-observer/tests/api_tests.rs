//! Integration tests for the viewer server endpoints.
//!
//! Most tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. The `/ws` stream needs a real upgrade, so those
//! tests serve on a loopback port and connect with `tokio-tungstenite`.

#![allow(clippy::unwrap_used)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use plan_core::{BrokerHealth, DoorStateAdapter, EventBus, IngestionAdapter, StateStores};
use plan_observer::router::build_router;
use plan_observer::state::AppState;
use plan_observer::{ServerConfig, bind, serve};
use plan_types::DoorId;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

fn web_base(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("plan-observer-{}-{test}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn make_test_state(web_base: PathBuf, health: &BrokerHealth) -> Arc<AppState> {
    let stores = Arc::new(StateStores::new());
    stores.doors.set(DoorId(1), String::from("open"));
    stores.doors.set(DoorId(2), String::from("closed"));
    stores
        .temperatures
        .set(String::from("kitchen"), 21.5);
    Arc::new(
        AppState::new(stores, EventBus::default(), health.subscribe())
            .with_web_base(web_base)
            .with_name("Plan (test)"),
    )
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn upgrade_request(origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::get("/ws")
        .header("host", "plan.lan:8080")
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==");
    if let Some(origin) = origin {
        builder = builder.header("origin", origin);
    }
    builder.body(Body::empty()).unwrap()
}

// =========================================================================
// GET /health
// =========================================================================

#[tokio::test]
async fn test_health_reports_degraded_before_connect() {
    let health = BrokerHealth::new();
    let router = build_router(make_test_state(web_base("health-degraded"), &health));

    let response = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["name"], "Plan (test)");
    assert_eq!(json["broker"]["state"], "connecting");
    assert_eq!(json["doors"], 2);
    assert_eq!(json["temperatures"], 1);
    assert_eq!(json["subscribers"], 0);
}

#[tokio::test]
async fn test_health_reports_ok_when_connected() {
    let health = BrokerHealth::new();
    let router = build_router(make_test_state(web_base("health-ok"), &health));
    health.connected();

    let response = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["broker"]["state"], "connected");
    assert!(json["broker"]["since"].is_string());
}

// =========================================================================
// GET / and /static
// =========================================================================

#[tokio::test]
async fn test_index_serves_floor_plan_page() {
    let dir = web_base("index");
    std::fs::write(dir.join("index.html"), "<html><body>plan</body></html>").unwrap();
    let router = build_router(make_test_state(dir, &BrokerHealth::new()));

    let response = router
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("plan"));
}

#[tokio::test]
async fn test_index_missing_is_404() {
    let dir = web_base("index-missing");
    let _ = std::fs::remove_file(dir.join("index.html"));
    let router = build_router(make_test_state(dir, &BrokerHealth::new()));

    let response = router
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn test_static_assets_are_served() {
    let dir = web_base("static");
    std::fs::write(dir.join("app.js"), "connect();").unwrap();
    let router = build_router(make_test_state(dir, &BrokerHealth::new()));

    let response = router
        .oneshot(Request::get("/static/app.js").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_string(response.into_body()).await, "connect();");
}

#[tokio::test]
async fn test_unknown_static_asset_is_404() {
    let router = build_router(make_test_state(web_base("static-missing"), &BrokerHealth::new()));

    let response = router
        .oneshot(Request::get("/static/nope.png").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =========================================================================
// GET /ws origin policy
// =========================================================================

#[tokio::test]
async fn test_ws_cross_origin_is_forbidden() {
    let router = build_router(make_test_state(web_base("ws-cross"), &BrokerHealth::new()));

    let response = router
        .oneshot(upgrade_request(Some("http://evil.example")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "Origin not allowed");
}

#[tokio::test]
async fn test_ws_without_origin_is_forbidden() {
    let router = build_router(make_test_state(web_base("ws-none"), &BrokerHealth::new()));

    let response = router.oneshot(upgrade_request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ws_same_origin_passes_policy() {
    let router = build_router(make_test_state(web_base("ws-same"), &BrokerHealth::new()));

    let response = router
        .oneshot(upgrade_request(Some("http://plan.lan:8080")))
        .await
        .unwrap();

    assert_ne!(response.status(), StatusCode::FORBIDDEN);
}

// =========================================================================
// GET /ws over a live socket
// =========================================================================

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct LiveServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), plan_observer::ServerError>>,
}

impl LiveServer {
    async fn start(state: Arc<AppState>) -> Self {
        let listener = bind(&ServerConfig {
            host: String::from("127.0.0.1"),
            port: 0,
        })
        .await
        .unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve(listener, state, async move {
            let _ = stopped.await;
        }));
        Self { addr, stop, handle }
    }

    async fn connect(&self, origin: &str) -> Result<Client, tungstenite::Error> {
        let mut request = format!("ws://{}/ws", self.addr)
            .into_client_request()
            .unwrap();
        request
            .headers_mut()
            .insert("origin", HeaderValue::from_str(origin).unwrap());
        tokio_tungstenite::connect_async(request)
            .await
            .map(|(ws, _)| ws)
    }

    async fn stop(self) {
        self.stop.send(()).unwrap();
        assert!(self.handle.await.unwrap().is_ok());
    }
}

/// Next JSON event, skipping heartbeat pings.
async fn next_event(ws: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Keep reading (so the client answers pings) until `window` has passed.
async fn pings_within(ws: &mut Client, window: Duration) -> usize {
    let deadline = tokio::time::Instant::now() + window;
    let mut pings = 0;
    while let Ok(Some(frame)) = tokio::time::timeout_at(deadline, ws.next()).await {
        if matches!(frame.unwrap(), Message::Ping(_)) {
            pings += 1;
        }
    }
    pings
}

async fn wait_for_subscribers(bus: &EventBus, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.subscriber_count() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_ws_streams_snapshot_then_live_events() {
    let stores = Arc::new(StateStores::new());
    let bus = EventBus::default();
    let health = BrokerHealth::new();
    let adapter = DoorStateAdapter::new(Arc::clone(&stores), bus.clone());
    adapter.ingest("nh/gk/12/DoorState", b"open").unwrap();

    let state = Arc::new(
        AppState::new(Arc::clone(&stores), bus.clone(), health.subscribe())
            .with_web_base(web_base("ws-live"))
            .with_ping_interval(Some(Duration::from_millis(200))),
    );
    let server = LiveServer::start(state).await;
    let mut ws = server
        .connect(&format!("http://{}", server.addr))
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut ws).await,
        json!({"EventType": "DoorState", "DoorId": 12, "Value": "open"})
    );

    // A client that answers pings survives several heartbeats.
    let pings = pings_within(&mut ws, Duration::from_millis(900)).await;
    assert!(pings >= 3, "only {pings} pings");
    assert_eq!(bus.subscriber_count(), 1);

    adapter.ingest("nh/gk/12/DoorState", b"closed").unwrap();
    assert_eq!(
        next_event(&mut ws).await,
        json!({"EventType": "DoorState", "DoorId": 12, "Value": "closed"})
    );

    ws.close(None).await.unwrap();
    wait_for_subscribers(&bus, 0).await;

    server.stop().await;
}

#[tokio::test]
async fn test_ws_cross_origin_connect_is_refused() {
    let state = make_test_state(web_base("ws-live-cross"), &BrokerHealth::new());
    let server = LiveServer::start(Arc::clone(&state)).await;

    let err = server.connect("http://evil.example").await.unwrap_err();

    assert!(
        matches!(&err, tungstenite::Error::Http(response) if response.status().as_u16() == 403),
        "{err:?}"
    );
    assert_eq!(state.bus.subscriber_count(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_ws_client_ping_gets_a_single_pong() {
    let stores = Arc::new(StateStores::new());
    let bus = EventBus::default();
    let health = BrokerHealth::new();
    let adapter = DoorStateAdapter::new(Arc::clone(&stores), bus.clone());
    let state = Arc::new(
        AppState::new(Arc::clone(&stores), bus.clone(), health.subscribe())
            .with_web_base(web_base("ws-live-ping")),
    );
    let server = LiveServer::start(state).await;
    let mut ws = server
        .connect(&format!("http://{}", server.addr))
        .await
        .unwrap();
    wait_for_subscribers(&bus, 1).await;

    ws.send(Message::Ping(b"are-you-there".to_vec().into()))
        .await
        .unwrap();
    adapter.ingest("nh/gk/4/DoorState", b"open").unwrap();

    let mut pongs = 0;
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match frame {
            Message::Pong(payload) => {
                assert_eq!(payload.as_ref(), b"are-you-there");
                pongs += 1;
            }
            Message::Text(_) => break,
            _ => {}
        }
    }
    // The event may overtake the pong; drain briefly for a late reply.
    while let Ok(Some(Ok(frame))) =
        tokio::time::timeout(Duration::from_millis(200), ws.next()).await
    {
        if matches!(frame, Message::Pong(_)) {
            pongs += 1;
        }
    }
    assert_eq!(pongs, 1);

    ws.close(None).await.unwrap();
    wait_for_subscribers(&bus, 0).await;
    server.stop().await;
}
