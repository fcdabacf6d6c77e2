// WebSocket handler for duel event streaming.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use serde::Deserialize;

use super::AppState;
use crate::metrics;

#[derive(Deserialize)]
pub struct WsParams {
    /// Only forward events of this duel.
    pub duel_id: Option<String>,
}

/// WebSocket upgrade handler for duel event streaming.
pub async fn ws_duels(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state, params.duel_id))
}

/// Whether a broadcast event belongs to the requested duel.
fn wanted(msg: &str, filter: Option<&str>) -> bool {
    let Some(duel_id) = filter else {
        return true;
    };
    serde_json::from_str::<serde_json::Value>(msg)
        .ok()
        .and_then(|v| v.get("duel_id").and_then(|d| d.as_str()).map(|d| d == duel_id))
        .unwrap_or(false)
}

async fn handle_ws(mut socket: WebSocket, state: AppState, filter: Option<String>) {
    let mut rx = state.engine.subscribe();
    metrics::CONNECTED_WEBSOCKETS.inc();

    // Forward broadcast events to the client until either side closes.
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if !wanted(&msg, filter.as_deref()) {
                            continue;
                        }
                        if socket.send(Message::Text(msg.into())).await.is_err() {
                            // Client disconnected
                            break;
                        }
                        metrics::WEBSOCKET_MESSAGES_SENT_TOTAL.inc();
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket client lagged, skipped {n} messages");
                    }
                }
            }
            // Client messages are ignored; only disconnects matter.
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    metrics::CONNECTED_WEBSOCKETS.dec();
}
