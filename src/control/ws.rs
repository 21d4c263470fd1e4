//! WebSocket server + REST endpoints for the control channel.

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use super::command::Command;
use crate::engine::{EngineEvent, EngineHandle};
use crate::error::ControlError;
use crate::model::SettingsPatch;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
}

/// Build the Axum router with the control WebSocket and REST routes.
pub fn control_routes(engine: EngineHandle) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/pause", post(pause))
        .route("/api/resume", post(resume))
        .route("/api/settings", post(update_settings))
        .layer(CorsLayer::permissive())
        .with_state(AppState { engine })
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "message-finder"
    }))
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("Control client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state.engine))
}

async fn handle_socket(mut socket: WebSocket, engine: EngineHandle) {
    // Subscribe before the initial snapshot so nothing falls in between.
    let mut rx = engine.subscribe();

    if !send_status(&mut socket, &engine).await {
        warn!("Failed to send initial status, client disconnected");
        return;
    }
    info!("Control client connected");

    loop {
        tokio::select! {
            // Forward engine events to this client
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !send_event(&mut socket, &event).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "Control client lagged behind broadcast");
                        if !send_status(&mut socket, &engine).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Engine event channel closed");
                        break;
                    }
                }
            }

            // Receive commands from client
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_client_message(&text, &mut socket, &engine).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Control client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Control connection closed");
}

/// Apply one command and answer on the same socket. Returns `false` once
/// the socket is unusable.
async fn handle_client_message(text: &str, socket: &mut WebSocket, engine: &EngineHandle) -> bool {
    let command = match Command::parse(text) {
        Ok(command) => command,
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized control frame");
            return true;
        }
    };

    debug!(?command, "Control command received");
    let reply = match command.apply(engine).await {
        Ok(status) => EngineEvent::Stats { status },
        Err(e) => {
            warn!(error = %e, "Control command failed");
            EngineEvent::Error {
                message: e.to_string(),
            }
        }
    };
    send_event(socket, &reply).await
}

async fn send_status(socket: &mut WebSocket, engine: &EngineHandle) -> bool {
    match engine.status().await {
        Ok(status) => send_event(socket, &EngineEvent::Stats { status }).await,
        Err(_) => false,
    }
}

async fn send_event(socket: &mut WebSocket, event: &EngineEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, kind = event.kind(), "Failed to serialize event");
            true
        }
    }
}

// ── REST Endpoints ──────────────────────────────────────────────────────

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    respond(state.engine.status().await)
}

async fn pause(State(state): State<AppState>) -> impl IntoResponse {
    respond(state.engine.pause().await)
}

async fn resume(State(state): State<AppState>) -> impl IntoResponse {
    respond(state.engine.resume().await)
}

async fn update_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> impl IntoResponse {
    respond(state.engine.apply_settings(patch).await)
}

fn respond<T: serde::Serialize>(
    result: Result<T, ControlError>,
) -> (StatusCode, Json<serde_json::Value>) {
    match result {
        Ok(body) => (StatusCode::OK, Json(serde_json::json!(body))),
        Err(e @ ControlError::InvalidValue { .. }) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
        Err(e @ ControlError::EngineStopped) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}
