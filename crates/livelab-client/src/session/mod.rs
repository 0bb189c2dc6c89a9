//! Role-selected live sessions
//!
//! A [`LiveSession`] is created once per identity. Broadcasters composite and
//! fan out media; viewers join, wait for admission and receive.

mod broadcaster;
mod viewer;

pub use broadcaster::{BroadcasterMedia, BroadcasterSession};
pub use viewer::{ViewerPhase, ViewerSession};

use livelab_protocol::{ChatMessageData, ClientMessage, Role, ServerMessage};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ClientError, Result};
use crate::network::SignalingSender;
use crate::transport::RtcApi;

/// Who this client claims to be when identifying
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub token: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn identify_message(&self) -> ClientMessage {
        ClientMessage::Identify {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role,
            token: self.token.clone(),
        }
    }

    /// Local copy of a chat line; the hub never echoes it back to the sender
    fn own_chat(&self, text: &str) -> ChatMessageData {
        ChatMessageData {
            id: Uuid::new_v4(),
            author: self.name.clone(),
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
            is_broadcaster: self.role == Role::Broadcaster,
        }
    }
}

pub enum LiveSession {
    Broadcaster(BroadcasterSession),
    Viewer(ViewerSession),
}

impl LiveSession {
    /// Pick the variant from `identity.role`; broadcasters need `media`
    pub fn new(
        identity: Identity,
        room_id: impl Into<String>,
        signaling: SignalingSender,
        rtc: Arc<RtcApi>,
        media: Option<BroadcasterMedia>,
    ) -> Result<Self> {
        match identity.role {
            Role::Broadcaster => {
                let media = media.ok_or_else(|| {
                    ClientError::InvalidState(
                        "a broadcaster session needs capture devices and an encoder".to_string(),
                    )
                })?;
                Ok(LiveSession::Broadcaster(BroadcasterSession::new(
                    identity, signaling, rtc, media,
                )))
            }
            Role::Viewer => Ok(LiveSession::Viewer(ViewerSession::new(
                identity,
                room_id.into(),
                signaling,
                rtc,
            ))),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            LiveSession::Broadcaster(_) => Role::Broadcaster,
            LiveSession::Viewer(_) => Role::Viewer,
        }
    }

    pub async fn identify(&self) -> Result<()> {
        match self {
            LiveSession::Broadcaster(s) => s.identify().await,
            LiveSession::Viewer(s) => s.identify().await,
        }
    }

    pub async fn send_chat(&mut self, text: &str) -> Result<()> {
        match self {
            LiveSession::Broadcaster(s) => s.send_chat(text).await,
            LiveSession::Viewer(s) => s.send_chat(text).await,
        }
    }

    pub async fn handle(&mut self, message: ServerMessage) -> Result<()> {
        match self {
            LiveSession::Broadcaster(s) => s.handle(message).await,
            LiveSession::Viewer(s) => s.handle(message).await,
        }
    }

    pub async fn shutdown(&mut self) {
        match self {
            LiveSession::Broadcaster(s) => s.shutdown().await,
            LiveSession::Viewer(s) => s.shutdown().await,
        }
    }

    pub fn connection_id(&self) -> Option<Uuid> {
        match self {
            LiveSession::Broadcaster(s) => s.connection_id(),
            LiveSession::Viewer(s) => s.connection_id(),
        }
    }

    pub fn chat_log(&self) -> &[ChatMessageData] {
        match self {
            LiveSession::Broadcaster(s) => s.chat_log(),
            LiveSession::Viewer(s) => s.chat_log(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::tests::{FakeEncoderFactory, offline_api};
    use livelab_media::{CompositorConfig, TestPatternDevices};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    pub fn small_media(devices: TestPatternDevices) -> BroadcasterMedia {
        BroadcasterMedia {
            devices: Arc::new(devices.with_sizes((32, 24), (64, 36))),
            encoders: Arc::new(FakeEncoderFactory::default()),
            compositor: CompositorConfig {
                width: 64,
                height: 36,
                padding: 4,
                border: 2,
                ..CompositorConfig::default()
            },
        }
    }

    /// Next outbound message that is not a keepalive or ICE candidate
    pub async fn next_sent(rx: &mut mpsc::Receiver<ClientMessage>) -> ClientMessage {
        loop {
            let msg = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for outbound message")
                .expect("signaling channel closed");
            match msg {
                ClientMessage::Ping | ClientMessage::RtcIceCandidate { .. } => continue,
                other => return other,
            }
        }
    }

    pub fn nothing_sent(rx: &mut mpsc::Receiver<ClientMessage>) -> bool {
        loop {
            match rx.try_recv() {
                Ok(ClientMessage::RtcIceCandidate { .. }) => continue,
                Ok(_) => return false,
                Err(_) => return true,
            }
        }
    }

    #[tokio::test]
    async fn test_role_selects_variant() {
        let (tx, mut rx) = mpsc::channel(16);
        let viewer = LiveSession::new(
            Identity::new("s-1", "Ada", Role::Viewer).with_token("tok"),
            "live-room",
            SignalingSender::new(tx.clone()),
            offline_api(),
            None,
        )
        .unwrap();
        assert_eq!(viewer.role(), Role::Viewer);

        viewer.identify().await.unwrap();
        assert_eq!(
            next_sent(&mut rx).await,
            ClientMessage::Identify {
                id: "s-1".to_string(),
                name: "Ada".to_string(),
                role: Role::Viewer,
                token: Some("tok".to_string()),
            }
        );

        let broadcaster = LiveSession::new(
            Identity::new("t-1", "Mr. B", Role::Broadcaster),
            "live-room",
            SignalingSender::new(tx),
            offline_api(),
            Some(small_media(TestPatternDevices::new())),
        )
        .unwrap();
        assert_eq!(broadcaster.role(), Role::Broadcaster);
    }

    #[tokio::test]
    async fn test_broadcaster_needs_media() {
        let (tx, _rx) = mpsc::channel(16);
        let result = LiveSession::new(
            Identity::new("t-1", "Mr. B", Role::Broadcaster),
            "live-room",
            SignalingSender::new(tx),
            offline_api(),
            None,
        );
        assert!(matches!(result, Err(ClientError::InvalidState(_))));
    }
}
