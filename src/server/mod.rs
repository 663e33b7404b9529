//! Viewer server
//!
//! Browsers connect on `/ws` and receive every published event as JSON
//! (`{"event": ..., "data": ...}`). The first connection starts the sampling
//! loop; later ones just join the broadcast.

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{Json, Response},
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::monitor::{Monitor, MonitorStatus};
use crate::publisher::BroadcastPublisher;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub monitor: Arc<Monitor>,
    pub publisher: BroadcastPublisher,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn start(host: &str, port: u16, state: ServerState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     Water Quality Monitor");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Viewer stream: ws://{}/ws", addr);
    println!("✓ Status:        http://{}/api/status", addr);
    println!();

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn status_handler(State(state): State<ServerState>) -> Json<MonitorStatus> {
    Json(state.monitor.status())
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
) -> Response {
    ws.on_upgrade(|socket| handle_viewer_socket(socket, state))
}

async fn handle_viewer_socket(socket: WebSocket, state: ServerState) {
    // Subscribe before starting so the loop's first events reach this viewer
    let mut events = state.publisher.subscribe();
    info!("Viewer connected ({} watching)", state.publisher.subscriber_count());

    if state.monitor.start() {
        info!("First viewer connected, sampling loop started");
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Viewer fell behind, {} events dropped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode event: {}", e);
                    continue;
                }
            };

            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Viewers only listen; drain until they go away
    let read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Close(_) => break,
                other => debug!("Ignoring viewer message: {:?}", other),
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = read_task => {},
    }

    info!("Viewer disconnected");
}
