use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use viewer_api::{clean, Channel, OutboundMessage, ProtocolError};

use super::AppState;
use crate::hub::{Outbound, WsChannel};

// ═══════════════════════════════════════════════════════════════
//  WebSocket: /ws/{id}
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_ws(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(channel) = state.hub.get(&id) else {
        return (StatusCode::NOT_FOUND, format!("no data viewer channel '{id}'")).into_response();
    };
    let buffer = state.hub.buffer();
    ws.on_upgrade(move |socket| ws_connection(socket, channel, buffer))
}

// ═══════════════════════════════════════════════════════════════
//  Connection handler
// ═══════════════════════════════════════════════════════════════

async fn ws_connection(mut socket: WebSocket, channel: Arc<WsChannel>, buffer: usize) {
    let Some((conn, mut outbound)) = channel.attach(buffer) else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };
    tracing::info!(channel = %channel.id(), conn, "viewer connected");

    // Replies are queued synchronously by `deliver`; the queue is drained
    // before the next inbound frame is read so it never fills up on a
    // burst of requests.
    while flush(&mut socket, &mut outbound).await {
        tokio::select! {
            biased;

            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        if !write(&mut socket, frame).await {
                            break;
                        }
                    }
                    // Replaced by a newer connection.
                    None => break,
                }
            }

            msg = socket.recv() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    _ => break,
                };

                let text = match msg {
                    Message::Text(t) => t,
                    Message::Close(_) => break,
                    _ => continue,
                };

                match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(value) => channel.deliver(value),
                    Err(e) => {
                        let reply = OutboundMessage::error(ProtocolError::Malformed(e.to_string()).to_string());
                        if let Ok(json) = clean(&reply) {
                            if socket.send(Message::Text(json.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    channel.detach(conn);
    tracing::info!(channel = %channel.id(), conn, "viewer disconnected");
}

/// Write every frame already queued. `false` once the connection is done.
async fn flush(socket: &mut WebSocket, outbound: &mut mpsc::Receiver<Outbound>) -> bool {
    loop {
        match outbound.try_recv() {
            Ok(frame) => {
                if !write(socket, frame).await {
                    return false;
                }
            }
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

/// Write one frame. `false` once the connection is done.
async fn write(socket: &mut WebSocket, frame: Outbound) -> bool {
    match frame {
        Outbound::Text(text) => socket.send(Message::Text(text.into())).await.is_ok(),
        Outbound::Close => {
            let _ = socket.send(Message::Close(None)).await;
            false
        }
    }
}
