//! `WebSocket` handler for live snapshot streaming.
//!
//! Clients connect to `GET /ws/state` and immediately receive the current
//! [`LoopSnapshot`](lanepilot_types::LoopSnapshot) as JSON, then one message
//! per change. The watch channel only keeps the latest value, so a slow
//! client skips intermediate states instead of falling behind.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use lanepilot_runner::{ChatBackend, GameApi};
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection and begin
/// streaming snapshots.
///
/// # Route
///
/// `GET /ws/state`
pub async fn ws_state<G, B>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<G, B>>>,
) -> impl IntoResponse
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

async fn handle_ws<G, B>(mut socket: WebSocket, state: Arc<AppState<G, B>>)
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    debug!("WebSocket client connected");

    let mut rx = state.agent.subscribe();
    // Release the state so the loop can be dropped while clients linger.
    drop(state);

    // Send the current value first; `changed()` only fires on updates.
    rx.mark_changed();

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    debug!("agent loop dropped, closing WebSocket");
                    return;
                }
                let json = match serde_json::to_string(&*rx.borrow_and_update()) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!(error = %e, "failed to serialize snapshot");
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    debug!("WebSocket client disconnected (send failed)");
                    return;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket error");
                        return;
                    }
                    // Clients have nothing to say.
                    _ => {}
                }
            }
        }
    }
}
