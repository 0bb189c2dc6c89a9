use livelab_protocol::ServerMessage;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::hub::{Effect, Liveness};

/// Frame queued for a socket's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

pub struct ConnectionManager {
    /// Map from connection ID to the socket writer's channel
    senders: RwLock<HashMap<Uuid, mpsc::UnboundedSender<Outbound>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_connection(&self, connection_id: Uuid, sender: mpsc::UnboundedSender<Outbound>) {
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection_id, sender);
        tracing::debug!("Connection {} registered", connection_id);
    }

    pub fn remove_connection(&self, connection_id: Uuid) {
        if self
            .senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&connection_id)
            .is_some()
        {
            tracing::debug!("Connection {} removed", connection_id);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn send_to_connection(&self, connection_id: Uuid, message: &ServerMessage) {
        let json = match message.to_json() {
            Ok(j) => j,
            Err(e) => {
                tracing::error!("Failed to serialize message: {}", e);
                return;
            }
        };
        self.push(connection_id, Outbound::Text(json));
    }

    pub fn broadcast(&self, connection_ids: &[Uuid], message: &ServerMessage) {
        let json = match message.to_json() {
            Ok(j) => j,
            Err(e) => {
                tracing::error!("Failed to serialize message: {}", e);
                return;
            }
        };

        let senders = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!("Broadcasting to {} connections", connection_ids.len());
        for conn_id in connection_ids {
            if let Some(sender) = senders.get(conn_id) {
                if let Err(e) = sender.send(Outbound::Text(json.clone())) {
                    tracing::error!("Failed to send message to {}: {}", conn_id, e);
                }
            }
        }
    }

    /// Ask the socket's writer to send a close frame and stop
    pub fn close(&self, connection_id: Uuid) {
        self.push(connection_id, Outbound::Close);
    }

    /// Deliver hub effects in order
    pub fn deliver(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send { to, message } => self.send_to_connection(to, &message),
                Effect::Broadcast { to, message } => self.broadcast(&to, &message),
                Effect::Close { connection_id } => self.close(connection_id),
            }
        }
    }

    fn push(&self, connection_id: Uuid, frame: Outbound) {
        let senders = self.senders.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = senders.get(&connection_id) {
            if let Err(e) = sender.send(frame) {
                tracing::error!("Failed to send message to {}: {}", connection_id, e);
            }
        }
    }
}

impl Liveness for ConnectionManager {
    fn is_live(&self, connection_id: Uuid) -> bool {
        self.senders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&connection_id)
            .map(|sender| !sender.is_closed())
            .unwrap_or(false)
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_follows_writer() {
        let manager = ConnectionManager::new();
        let conn = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        manager.add_connection(conn, tx);
        assert!(manager.is_live(conn));

        drop(rx);
        assert!(!manager.is_live(conn));
        assert!(!manager.is_live(Uuid::new_v4()));
    }

    #[test]
    fn test_deliver_routes_effects() {
        let manager = ConnectionManager::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        manager.add_connection(a, tx_a);
        manager.add_connection(b, tx_b);

        manager.deliver(vec![
            Effect::Broadcast {
                to: vec![a, b],
                message: ServerMessage::Pong,
            },
            Effect::Send {
                to: a,
                message: ServerMessage::EntryRefused,
            },
            Effect::Close { connection_id: a },
        ]);

        assert_eq!(
            rx_a.try_recv().unwrap(),
            Outbound::Text(r#"{"type":"pong"}"#.to_string())
        );
        assert_eq!(
            rx_a.try_recv().unwrap(),
            Outbound::Text(r#"{"type":"entry-refused"}"#.to_string())
        );
        assert_eq!(rx_a.try_recv().unwrap(), Outbound::Close);
        assert_eq!(
            rx_b.try_recv().unwrap(),
            Outbound::Text(r#"{"type":"pong"}"#.to_string())
        );
        assert!(rx_b.try_recv().is_err());
    }
}
