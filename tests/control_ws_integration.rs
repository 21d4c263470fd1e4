//! Integration tests for the control WebSocket + REST surface.
//!
//! Each test starts a real engine over an in-memory feed, serves the control
//! routes on a random port, and talks to them over tokio-tungstenite or
//! through the router directly.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use message_finder::config::EngineConfig;
use message_finder::control::control_routes;
use message_finder::engine::{Engine, EngineDeps, EngineHandle};
use message_finder::executor::LogExecutor;
use message_finder::feed::MemoryFeed;
use message_finder::model::{ItemSnapshot, Settings};
use message_finder::store::MemoryStore;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Start an engine with every item eligible and no sampling.
async fn start_engine() -> (EngineHandle, Arc<MemoryFeed>) {
    let feed = Arc::new(MemoryFeed::with_items(vec![ItemSnapshot::new(1, "[3]", "old")]));
    let store = MemoryStore::with_settings(Settings {
        action_probability: 100,
        ..Settings::default()
    });
    let config = EngineConfig {
        sampling: None,
        rng_seed: Some(1),
        stats_interval: Duration::from_secs(3600),
        ..EngineConfig::default()
    };
    let deps = EngineDeps {
        feed: feed.clone(),
        executor: Arc::new(LogExecutor),
        store: Arc::new(store),
    };
    let (engine, _task) = Engine::start(config, deps).await.unwrap();
    (engine, feed)
}

/// Start an Axum server on a random port, return (port, feed).
async fn start_server() -> (u16, Arc<MemoryFeed>) {
    let (engine, feed) = start_engine().await;
    let app = control_routes(engine);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, feed)
}

/// Helper: parse a WS text message as JSON.
fn parse_ws_json(msg: &Message) -> Value {
    match msg {
        Message::Text(text) => serde_json::from_str(text).unwrap(),
        other => panic!("expected text message, got {other:?}"),
    }
}

/// Read frames until one has the given `type`.
async fn next_of_type<S>(ws: &mut S, kind: &str) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        if json["type"] == kind {
            return json;
        }
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ── WebSocket Tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn ws_sends_initial_status() {
    timeout(TEST_TIMEOUT, async {
        let (port, _feed) = start_server().await;
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
            .await
            .unwrap();

        let msg = ws.next().await.unwrap().unwrap();
        let json = parse_ws_json(&msg);
        assert_eq!(json["type"], "stats");
        assert_eq!(json["status"]["paused"], false);
        assert_eq!(json["status"]["baseline"], 1);
        assert_eq!(json["status"]["settings"]["action_probability"], 100);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_pause_command_replies_with_status() {
    timeout(TEST_TIMEOUT, async {
        let (port, _feed) = start_server().await;
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
            .await
            .unwrap();
        next_of_type(&mut ws, "stats").await;

        ws.send(Message::Text(r#"{"type":"pause"}"#.into()))
            .await
            .unwrap();

        let update = next_of_type(&mut ws, "status_update").await;
        assert_eq!(update["paused"], true);
        let stats = next_of_type(&mut ws, "stats").await;
        assert_eq!(stats["status"]["paused"], true);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_rejects_out_of_range_probability() {
    timeout(TEST_TIMEOUT, async {
        let (port, _feed) = start_server().await;
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
            .await
            .unwrap();
        next_of_type(&mut ws, "stats").await;

        ws.send(Message::Text(r#"{"type":"setProbability","value":150}"#.into()))
            .await
            .unwrap();

        let error = next_of_type(&mut ws, "error").await;
        assert!(error["message"].as_str().unwrap().contains("150"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_ignores_unknown_frames() {
    timeout(TEST_TIMEOUT, async {
        let (port, _feed) = start_server().await;
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
            .await
            .unwrap();
        next_of_type(&mut ws, "stats").await;

        ws.send(Message::Text("not json".into())).await.unwrap();
        ws.send(Message::Text(r#"{"type":"requestStats"}"#.into()))
            .await
            .unwrap();

        // The connection survives and answers the next command.
        let stats = next_of_type(&mut ws, "stats").await;
        assert_eq!(stats["status"]["paused"], false);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_forwards_acted_events() {
    timeout(TEST_TIMEOUT, async {
        let (port, feed) = start_server().await;
        let (mut ws, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
            .await
            .unwrap();
        next_of_type(&mut ws, "stats").await;

        feed.insert(ItemSnapshot::new(2, "[7] (bea@example.com)", "bea"))
            .await;

        let acted = next_of_type(&mut ws, "acted").await;
        assert_eq!(acted["item_id"], 2);
        assert_eq!(acted["tag"], 7);
        assert_eq!(acted["contact"], "bea@example.com");
        assert_eq!(acted["payload"], "[7]");
    })
    .await
    .expect("test timed out");
}

// ── REST Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn rest_health() {
    let (engine, _feed) = start_engine().await;
    let response = control_routes(engine)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn rest_status_and_pause() {
    let (engine, _feed) = start_engine().await;
    let app = control_routes(engine);

    let response = app
        .clone()
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["paused"], false);

    let response = app
        .clone()
        .oneshot(Request::post("/api/pause").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(response).await["paused"], true);

    let response = app
        .oneshot(Request::post("/api/resume").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(response).await["paused"], false);
}

#[tokio::test]
async fn rest_settings_update() {
    let (engine, _feed) = start_engine().await;
    let app = control_routes(engine);

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/settings")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"actionProbability":20}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["settings"]["action_probability"], 20);

    let response = app
        .oneshot(
            Request::post("/api/settings")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"logLevel":9}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
}
