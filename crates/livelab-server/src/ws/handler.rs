use crate::auth::verify_identity;
use crate::state::AppState;
use crate::ws::connections::Outbound;
use axum::{
    body::Bytes,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use livelab_protocol::{ClientMessage, ErrorCode, ServerMessage};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval, timeout};
use uuid::Uuid;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = Uuid::new_v4();

    // Create channel for outbound frames
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    // Register with the connection manager before the hub can address it
    state.connections.add_connection(connection_id, tx);
    state.hub.connected(connection_id);
    tracing::info!(connection_id = %connection_id, "WebSocket connected");

    // Forward queued frames to the socket and keep it pinged
    let heartbeat_interval = state.config.heartbeat_interval();
    let mut send_task = tokio::spawn(async move {
        let mut ticker = interval(heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                frame = rx.recv() => match frame {
                    Some(Outbound::Text(json)) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close) => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Handle incoming frames; silence longer than the timeout drops the socket
    let heartbeat_timeout = state.config.heartbeat_timeout();
    loop {
        let next = tokio::select! {
            next = timeout(heartbeat_timeout, receiver.next()) => next,
            _ = &mut send_task => break,
        };

        match next {
            Err(_) => {
                tracing::warn!(connection_id = %connection_id, "Heartbeat timed out");
                break;
            }
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Ok(Message::Text(text)))) => {
                handle_text(&state, connection_id, text.as_str());
            }
            Ok(Some(Ok(_))) => {
                // ping/pong/binary only refresh the heartbeat
            }
            Ok(Some(Err(e))) => {
                tracing::error!(connection_id = %connection_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    // Cleanup on disconnect
    state.connections.remove_connection(connection_id);
    state.hub.disconnected(connection_id);
    send_task.abort();

    tracing::info!(connection_id = %connection_id, "WebSocket disconnected");
}

fn handle_text(state: &AppState, connection_id: Uuid, text: &str) {
    let message = match ClientMessage::from_json(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(connection_id = %connection_id, "Invalid message: {}", e);
            state.connections.send_to_connection(
                connection_id,
                &ServerMessage::error(ErrorCode::InvalidMessage, e.to_string()),
            );
            return;
        }
    };

    if let (ClientMessage::Identify { id, role, token, .. }, Some(secret)) =
        (&message, state.config.identity_secret.as_deref())
    {
        if let Err(e) = verify_identity(token.as_deref(), secret, id, *role) {
            tracing::warn!(connection_id = %connection_id, "Identify rejected: {}", e);
            state.connections.send_to_connection(
                connection_id,
                &ServerMessage::error(ErrorCode::Unauthorized, "identity could not be verified"),
            );
            return;
        }
    }

    state.hub.client_message(connection_id, message);
}
