use futures_util::{SinkExt, StreamExt};
use livelab_protocol::{ClientMessage, ServerMessage};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::{ClientError, Result};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 100;

/// Cloneable handle for queueing outbound signaling messages
#[derive(Debug, Clone)]
pub struct SignalingSender {
    tx: mpsc::Sender<ClientMessage>,
}

impl SignalingSender {
    pub fn new(tx: mpsc::Sender<ClientMessage>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, message: ClientMessage) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| ClientError::NotConnected)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// WebSocket connection to the signaling hub
pub struct SignalingClient {
    sender: SignalingSender,
    tasks: Vec<JoinHandle<()>>,
}

impl SignalingClient {
    /// Connect and return the client plus the stream of hub events.
    /// The receiver yields `None` once the socket is gone.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<ServerMessage>)> {
        let (ws_stream, _) = connect_async(url).await?;
        tracing::info!("Connected to signaling server at {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<ClientMessage>(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<ServerMessage>(CHANNEL_CAPACITY);

        // Outgoing messages
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let json = match msg.to_json() {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };

                if write.send(Message::Text(json.into())).await.is_err() {
                    tracing::error!("Failed to send WebSocket message");
                    break;
                }
            }
            let _ = write.close().await;
        });

        // Incoming messages
        let reader = tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(Message::Text(text)) => match ServerMessage::from_json(text.as_str()) {
                        Ok(msg) => {
                            if event_tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Skipping unparseable signaling frame: {}", e);
                        }
                    },
                    Ok(Message::Close(_)) => {
                        tracing::info!("WebSocket closed by server");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    // Pong is handled automatically by tungstenite
                    _ => {}
                }
            }
        });

        // Keepalive
        let tx_ping = tx.clone();
        let pinger = tokio::spawn(async move {
            let mut interval = tokio::time::interval(PING_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx_ping.send(ClientMessage::Ping).await.is_err() {
                    break;
                }
            }
        });

        Ok((
            Self {
                sender: SignalingSender::new(tx),
                tasks: vec![writer, reader, pinger],
            },
            event_rx,
        ))
    }

    pub fn sender(&self) -> SignalingSender {
        self.sender.clone()
    }

    pub async fn send(&self, message: ClientMessage) -> Result<()> {
        self.sender.send(message).await
    }

    pub fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    #[tokio::test]
    async fn test_skips_garbage_and_relays_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text("{not json".into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"pong"}"#.into())).await.unwrap();

            loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => return text.to_string(),
                    Some(Ok(_)) => continue,
                    other => panic!("unexpected {:?}", other),
                }
            }
        });

        let (client, mut events) = SignalingClient::connect(&format!("ws://{}", addr))
            .await
            .unwrap();

        let first = timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, ServerMessage::Pong);

        client.send(ClientMessage::LeaveRoom).await.unwrap();
        let received = timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
        assert_eq!(received, r#"{"type":"leave-room"}"#);
    }

    #[tokio::test]
    async fn test_closed_sender_reports_not_connected() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = SignalingSender::new(tx);
        assert!(sender.is_closed());
        assert!(matches!(
            sender.send(ClientMessage::Ping).await,
            Err(ClientError::NotConnected)
        ));
    }
}
