// =============================================================================
// WebSocket Handler — per-session request/response protocol
// =============================================================================
//
// Clients connect to `/ws/:session_id` and send `{"action":"analyze",
// "ticker":"..."}` frames. Each accepted request streams back up to five
// `analysis_result` frames as the Analysis Engine's metric kernels complete.
//
// On connect: `repository.ensure` (idempotent create-if-absent), build a
// `SessionController`, register it. The connection task then runs a
// `tokio::select!` loop forwarding:
//   - inbound text frames into `SessionController::handle_inbound_raw`,
//   - the controller's outbound channel into the socket,
//   - an idle timer, reset on every inbound frame, that tears the session
//     down if the client goes quiet for `idle_timeout_secs`.
//
// On close or idle timeout, the Controller cancels any in-flight run, waits
// for it to settle, and removes itself from the Session Registry.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::session::{OutboundMessage, SessionController};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!(session_id = %session_id, "WebSocket connection accepted — upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, session_id, state))
}

async fn handle_ws_connection(socket: WebSocket, session_id: String, state: Arc<AppState>) {
    if let Err(e) = state.repository.ensure(&session_id, HashMap::new()).await {
        warn!(session_id = %session_id, error = %e, "failed to ensure session document, closing connection");
        return;
    }

    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(32);

    let controller = Arc::new(SessionController::new(
        session_id.clone(),
        state.engine.clone(),
        state.rng.clone(),
        state.registry.clone(),
        outbound_tx,
    ));
    state
        .registry
        .insert(session_id.clone(), controller.clone());

    let idle_timeout = std::time::Duration::from_secs(state.config.idle_timeout_secs);
    let mut idle_deadline = tokio::time::Instant::now() + idle_timeout;

    loop {
        tokio::select! {
            // ── Outbound: forward the controller's channel to the socket ──
            msg = outbound_rx.recv() => {
                match msg {
                    Some(out_msg) => {
                        if let Err(e) = send_json(&mut sender, &out_msg).await {
                            debug!(session_id = %session_id, error = %e, "send failed, disconnecting");
                            break;
                        }
                    }
                    None => {
                        // Only happens if the controller itself were
                        // dropped, which this loop prevents by holding an
                        // `Arc` to it for its whole lifetime.
                        break;
                    }
                }
            }

            // ── Inbound: client frames ────────────────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        idle_deadline = tokio::time::Instant::now() + idle_timeout;
                        controller.handle_inbound_raw(&text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!(session_id = %session_id, "WebSocket close frame received");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        debug!(session_id = %session_id, "binary frame ignored");
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, error = %e, "WebSocket receive error");
                        break;
                    }
                    None => {
                        info!(session_id = %session_id, "WebSocket stream ended");
                        break;
                    }
                }
            }

            // ── Idle timeout ───────────────────────────────────────────────
            _ = tokio::time::sleep_until(idle_deadline) => {
                info!(session_id = %session_id, "idle timeout reached, closing connection");
                break;
            }
        }
    }

    controller.teardown().await;
}

async fn send_json(
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &OutboundMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json)).await,
        Err(e) => {
            warn!(error = %e, "failed to serialize outbound message");
            Ok(())
        }
    }
}
