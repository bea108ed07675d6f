//! WebSocket connection handlers.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use hiroba_shared::protocol::{CHAT_EVENT, Frame};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{domain::ConnectionId, ui::state::AppState};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    /// Self-declared nickname, used for logging only
    pub nickname: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.nickname))
}

/// Spawns a task that forwards frames queued for this connection to the WebSocket sink.
///
/// The same task pings the client every `ping_interval`. The task ends when
/// the channel closes or the socket rejects a write.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    ping_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    if sender.send(Message::Text(msg.into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, nickname: Option<String>) {
    let (sender, mut receiver) = socket.split();

    // Create a channel for this connection to receive frames
    let (tx, rx) = mpsc::unbounded_channel();
    let record = state
        .connect_client_usecase
        .execute(tx, nickname.as_deref())
        .await;
    let connection_id = record.id;

    let mut send_task = pusher_loop(rx, sender, state.ping_interval);

    let state_clone = state.clone();
    let connection_id_clone = connection_id.clone();

    // Spawn a task to receive frames from this connection
    let mut recv_task = tokio::spawn(async move {
        let idle_timeout = state_clone.idle_timeout;
        loop {
            let msg = match tokio::time::timeout(idle_timeout, receiver.next()).await {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => {
                    tracing::error!("WebSocket error on '{}': {}", connection_id_clone, e);
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "Connection '{}' silent for {:?}, closing",
                        connection_id_clone,
                        idle_timeout
                    );
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    tracing::debug!("Received text from '{}': {}", connection_id_clone, text);
                    handle_text(&state_clone, &connection_id_clone, text.as_str()).await;
                }
                Message::Binary(data) => {
                    tracing::warn!(
                        "Ignoring {} bytes of binary data from '{}'",
                        data.len(),
                        connection_id_clone
                    );
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // Ping/pong replies are handled by the WebSocket protocol
                    tracing::trace!("Heartbeat from '{}'", connection_id_clone);
                }
                Message::Close(_) => {
                    tracing::info!("Connection '{}' requested close", connection_id_clone);
                    break;
                }
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    state
        .disconnect_client_usecase
        .execute(&connection_id)
        .await;
}

/// Decode one text frame and dispatch it by event name.
///
/// Text that is not a frame is answered like an invalid chat message, so a
/// misbehaving client learns why nothing happened without being disconnected.
async fn handle_text(state: &AppState, from: &ConnectionId, text: &str) {
    let frame = match Frame::from_json(text) {
        Ok(frame) => frame,
        Err(e) => {
            state
                .relay_chat_usecase
                .reject(from, e.to_string(), None)
                .await;
            return;
        }
    };

    match frame.event.as_str() {
        CHAT_EVENT => {
            state
                .relay_chat_usecase
                .execute(from, &frame.data, frame.ack)
                .await;
        }
        other => {
            tracing::warn!("Ignoring unknown event '{}' from '{}'", other, from);
        }
    }
}
