//! Signaling hub
//!
//! One tokio task owns all live-session state and handles events strictly in
//! arrival order. Socket handlers and HTTP routes talk to it through a
//! [`HubHandle`].

mod admission;
mod lock;
mod moderation;
mod presence;
mod room;
mod state;

pub use admission::{AdmissionController, AdmissionError, DecisionOutcome, JoinOutcome, ViewerPhase};
pub use lock::{BroadcasterLock, Liveness, LockAcquire, LockError, LockHolder};
pub use presence::{Participant, PresenceRegistry};
pub use room::Room;
pub use state::{Effect, HubSettings, HubSnapshot, HubState};

use livelab_protocol::ClientMessage;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::AppError;
use crate::ws::connections::ConnectionManager;

#[derive(Debug)]
pub enum HubEvent {
    Connected {
        connection_id: Uuid,
    },
    Client {
        connection_id: Uuid,
        message: ClientMessage,
    },
    Disconnected {
        connection_id: Uuid,
    },
    Snapshot {
        reply: oneshot::Sender<HubSnapshot>,
    },
}

pub struct SignalingHub {
    state: HubState,
    connections: Arc<ConnectionManager>,
    events: mpsc::UnboundedReceiver<HubEvent>,
}

impl SignalingHub {
    /// Start the hub task and return a handle to it
    pub fn spawn(settings: HubSettings, connections: Arc<ConnectionManager>) -> HubHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = SignalingHub {
            state: HubState::new(settings),
            connections,
            events: rx,
        };
        tokio::spawn(hub.run());
        HubHandle { events: tx }
    }

    async fn run(mut self) {
        tracing::info!("Signaling hub started for room {}", self.state.room_id());
        while let Some(event) = self.events.recv().await {
            self.handle(event);
        }
        tracing::info!("Signaling hub stopped");
    }

    fn handle(&mut self, event: HubEvent) {
        let effects = match event {
            HubEvent::Connected { connection_id } => {
                tracing::debug!(connection_id = %connection_id, "Socket attached to hub");
                self.state.connect(connection_id);
                Vec::new()
            }
            HubEvent::Client {
                connection_id,
                message,
            } => {
                tracing::debug!(connection_id = %connection_id, ?message, "Client event");
                self.state
                    .handle_client(connection_id, message, self.connections.as_ref())
            }
            HubEvent::Disconnected { connection_id } => {
                tracing::debug!(connection_id = %connection_id, "Socket detached from hub");
                self.state.disconnect(connection_id)
            }
            HubEvent::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
                Vec::new()
            }
        };
        self.connections.deliver(effects);
    }
}

/// Cloneable sending side of the hub
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::UnboundedSender<HubEvent>,
}

impl HubHandle {
    pub fn connected(&self, connection_id: Uuid) {
        self.dispatch(HubEvent::Connected { connection_id });
    }

    pub fn client_message(&self, connection_id: Uuid, message: ClientMessage) {
        self.dispatch(HubEvent::Client {
            connection_id,
            message,
        });
    }

    pub fn disconnected(&self, connection_id: Uuid) {
        self.dispatch(HubEvent::Disconnected { connection_id });
    }

    pub async fn snapshot(&self) -> Result<HubSnapshot, AppError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(HubEvent::Snapshot { reply })
            .map_err(|_| AppError::HubUnavailable)?;
        rx.await.map_err(|_| AppError::HubUnavailable)
    }

    fn dispatch(&self, event: HubEvent) {
        if let Err(e) = self.events.send(event) {
            tracing::error!("Signaling hub is gone, dropping {:?}", e.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::connections::Outbound;
    use livelab_protocol::{AdmissionMode, Role, ServerMessage};
    use std::time::Duration;
    use tokio::time::timeout;

    async fn next_message(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> ServerMessage {
        match timeout(Duration::from_secs(1), rx.recv()).await {
            Ok(Some(Outbound::Text(json))) => ServerMessage::from_json(&json).unwrap(),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hub_task_round_trip() {
        let connections = Arc::new(ConnectionManager::new());
        let hub = SignalingHub::spawn(HubSettings::default(), connections.clone());

        let conn = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        connections.add_connection(conn, tx);
        hub.connected(conn);
        hub.client_message(
            conn,
            ClientMessage::Identify {
                id: "admin".into(),
                name: "Mr. B".into(),
                role: Role::Broadcaster,
                token: None,
            },
        );

        assert_eq!(
            next_message(&mut rx).await,
            ServerMessage::Identified {
                connection_id: conn,
                role: Role::Broadcaster
            }
        );

        hub.client_message(
            conn,
            ClientMessage::SetRoomMode {
                live: true,
                mode: AdmissionMode::Approval,
            },
        );
        let snapshot = hub.snapshot().await.unwrap();
        assert!(snapshot.live);
        assert_eq!(snapshot.online, 1);

        hub.disconnected(conn);
        let snapshot = hub.snapshot().await.unwrap();
        assert!(!snapshot.live);
        assert_eq!(snapshot.online, 0);
    }
}
