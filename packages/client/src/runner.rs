//! Transport task with reconnection support.

use std::{sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use hiroba_shared::protocol::Frame;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

use crate::{
    domain::{close_reason, should_attempt_reconnect},
    manager::Shared,
    session::ChatSession,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything the transport task owns
pub(crate) struct Transport {
    pub url: String,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: Option<u32>,
    pub shared: Arc<Shared>,
    pub outbound: mpsc::UnboundedReceiver<Frame>,
    pub shutdown: oneshot::Receiver<()>,
}

enum SessionEnd {
    /// The manager asked to stop
    Shutdown,
    /// The connection dropped; reconnect
    Lost(String),
}

/// Keep one logical connection alive until shutdown or until the attempts run out
pub(crate) async fn run_transport(mut transport: Transport) {
    let mut failed_attempts: u32 = 0;

    loop {
        transport.shared.apply(ChatSession::on_connecting);
        tracing::info!(
            "Attempting to connect to {} (attempt {})",
            transport.url,
            failed_attempts + 1
        );

        let result = tokio::select! {
            _ = &mut transport.shutdown => break,
            result = connect_async(transport.url.as_str()) => result,
        };

        match result {
            Ok((ws_stream, _response)) => {
                failed_attempts = 0;
                tracing::info!("Connected to chat server!");
                transport.shared.apply(ChatSession::on_connected);

                match run_connection(ws_stream, &mut transport).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Lost(reason) => {
                        tracing::warn!("Connection lost: {}", reason);
                        transport.shared.apply(|session| session.on_disconnected(&reason));
                        discard_queued(&mut transport.outbound);
                    }
                }
            }
            Err(e) => {
                failed_attempts += 1;
                let reason = e.to_string();
                tracing::warn!("Connection failed: {}", reason);
                transport
                    .shared
                    .apply(|session| session.on_connect_error(&reason));
            }
        }

        if !should_attempt_reconnect(failed_attempts, transport.max_reconnect_attempts) {
            tracing::error!(
                "Failed to reconnect after {} attempts. Giving up.",
                failed_attempts
            );
            break;
        }

        tracing::info!("Reconnecting in {:?}...", transport.reconnect_interval);
        tokio::select! {
            _ = &mut transport.shutdown => break,
            _ = tokio::time::sleep(transport.reconnect_interval) => {}
        }
    }

    tracing::info!("Transport task stopped");
}

/// Pump frames in both directions over one established connection
async fn run_connection(ws_stream: WsStream, transport: &mut Transport) -> SessionEnd {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = &mut transport.shutdown => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Shutdown;
            }
            frame = transport.outbound.recv() => {
                let Some(frame) = frame else {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                };
                let json = match frame.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!("Failed to encode outgoing frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    return SessionEnd::Lost(e.to_string());
                }
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    tracing::debug!("Received: {}", text);
                    transport.shared.apply(|session| session.on_frame(text.as_str()));
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!("Server closed the connection");
                    let reason = close_reason(
                        frame
                            .as_ref()
                            .map(|frame| (u16::from(frame.code), frame.reason.as_str())),
                    );
                    return SessionEnd::Lost(reason);
                }
                Some(Ok(Message::Binary(data))) => {
                    tracing::warn!("Ignoring {} bytes of binary data", data.len());
                }
                // ping/pong replies are handled by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                None => return SessionEnd::Lost(close_reason(None)),
            },
        }
    }
}

/// Report unacknowledged messages every `check_interval` until aborted
pub(crate) async fn run_ack_expiry(shared: Arc<Shared>, check_interval: Duration) {
    let mut ticker = tokio::time::interval(check_interval);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        shared.apply(ChatSession::expire_acks);
    }
}

/// Frames queued for a connection that just died are not replayed later
fn discard_queued(outbound: &mut mpsc::UnboundedReceiver<Frame>) {
    let mut discarded = 0;
    while outbound.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        tracing::warn!("Discarded {} unsent message(s) after disconnect", discarded);
    }
}
