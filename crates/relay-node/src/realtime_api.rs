//! Real-time WebSocket API.
//!
//! - `/ws` - WebSocket endpoint; every connection runs one hub session
//! - `/api/realtime/stats` - Statistics about real-time connections
//!
//! ## WebSocket Protocol
//!
//! ```json
//! // Named event with payload fields
//! {"event": "hello", "name": "John"}
//!
//! // Keepalive
//! {"event": "ping"}
//! ```
//!
//! Events without a handler are relayed to every other client as
//! `{"event", "sender_id", "sender_name", "data"}`.

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use relay_realtime::{create_connection, run_session, EventHub, HubStats, Inbox, RealtimeError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::api::AppState;

/// Create the real-time API routes.
pub fn realtime_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/realtime/stats", get(get_stats))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub.clone()))
}

/// Reads event frames from the receiving half of a WebSocket.
struct WsInbox {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl Inbox for WsInbox {
    async fn receive(&mut self) -> Result<String, RealtimeError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => {
                    return String::from_utf8(bytes.to_vec()).map_err(|_| {
                        RealtimeError::Protocol("binary frame is not valid UTF-8".to_string())
                    })
                }
                Some(Ok(Message::Ping(data))) => {
                    // Axum answers pings itself
                    debug!("Ping received, len={}", data.len());
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => return Err(RealtimeError::Disconnected),
                Some(Err(e)) => return Err(RealtimeError::Transport(e.to_string())),
            }
        }
    }
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, hub: Arc<EventHub>) {
    let (connection, mut outbound) = create_connection(hub.config().outbound_buffer);
    let (mut ws_sender, ws_receiver) = socket.split();

    // Forward messages from the hub to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
        debug!("Send task ended");
    });

    match run_session(&hub, connection, WsInbox { stream: ws_receiver }).await {
        Ok(summary) => {
            info!(
                client_id = %summary.client_id,
                name = %summary.display_name,
                events = summary.events,
                reason = ?summary.close_reason,
                "WebSocket session closed"
            );
        }
        Err(e) => {
            error!("Failed to register client: {}", e);
        }
    }

    send_task.abort();
}

/// Statistics response.
#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    stats: HubStats,
    handlers: Vec<String>,
}

/// Get real-time connection statistics.
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatsResponse {
        stats: state.hub.stats(),
        handlers: state.hub.handlers().names(),
    })
}
