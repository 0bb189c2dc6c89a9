use livelab_protocol::{
    AdmissionMode, ChatMessageData, ClientMessage, ErrorCode, ParticipantData, Role,
    ServerMessage,
};
use std::sync::Arc;
use uuid::Uuid;

use super::Identity;
use crate::error::{ClientError, Result};
use crate::network::SignalingSender;
use crate::transport::{RemoteStream, RtcApi, ViewerTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerPhase {
    Idle,
    /// `join-room` sent, no verdict yet
    Connecting,
    /// Queued for broadcaster approval
    Waiting,
    Watching,
    Refused,
    Kicked,
    /// The broadcast stopped
    Ended,
}

impl ViewerPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ViewerPhase::Refused | ViewerPhase::Kicked | ViewerPhase::Ended
        )
    }

    fn is_in_room(self) -> bool {
        matches!(
            self,
            ViewerPhase::Connecting | ViewerPhase::Waiting | ViewerPhase::Watching
        )
    }
}

pub struct ViewerSession {
    identity: Identity,
    room_id: String,
    signaling: SignalingSender,
    rtc: Arc<RtcApi>,
    connection_id: Option<Uuid>,
    phase: ViewerPhase,
    transport_id: Option<String>,
    transport: Option<ViewerTransport>,
    muted: bool,
    live: bool,
    mode: AdmissionMode,
    chat: Vec<ChatMessageData>,
    participants: Vec<ParticipantData>,
    /// Last message worth showing: kick reason, rejected chat, server error
    notice: Option<String>,
}

impl ViewerSession {
    pub fn new(
        identity: Identity,
        room_id: String,
        signaling: SignalingSender,
        rtc: Arc<RtcApi>,
    ) -> Self {
        Self {
            identity,
            room_id,
            signaling,
            rtc,
            connection_id: None,
            phase: ViewerPhase::Idle,
            transport_id: None,
            transport: None,
            muted: false,
            live: false,
            mode: AdmissionMode::default(),
            chat: Vec::new(),
            participants: Vec::new(),
            notice: None,
        }
    }

    pub async fn identify(&self) -> Result<()> {
        self.signaling.send(self.identity.identify_message()).await
    }

    pub fn connection_id(&self) -> Option<Uuid> {
        self.connection_id
    }

    pub fn phase(&self) -> ViewerPhase {
        self.phase
    }

    pub fn transport_id(&self) -> Option<&str> {
        self.transport_id.as_deref()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Whether a broadcast is running, as last announced by the hub
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn mode(&self) -> AdmissionMode {
        self.mode
    }

    pub fn chat_log(&self) -> &[ChatMessageData] {
        &self.chat
    }

    pub fn participants(&self) -> &[ParticipantData] {
        &self.participants
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn remote_stream(&self) -> Option<RemoteStream> {
        self.transport.as_ref().map(|t| t.stream())
    }

    pub async fn join(&mut self) -> Result<()> {
        if !matches!(self.phase, ViewerPhase::Idle | ViewerPhase::Ended) {
            return Err(ClientError::InvalidState(format!(
                "cannot join while {:?}",
                self.phase
            )));
        }
        self.notice = None;
        self.send_join().await
    }

    /// Every attempt uses a fresh transport id
    async fn send_join(&mut self) -> Result<()> {
        let transport_id = Uuid::new_v4().to_string();
        self.signaling
            .send(ClientMessage::JoinRoom {
                room_id: self.room_id.clone(),
                transport_id: transport_id.clone(),
                name: self.identity.name.clone(),
                role: Role::Viewer,
            })
            .await?;

        tracing::debug!("Joining {} with transport {}", self.room_id, transport_id);
        self.transport_id = Some(transport_id);
        self.phase = ViewerPhase::Connecting;
        Ok(())
    }

    pub async fn leave(&mut self) -> Result<()> {
        self.teardown().await;
        self.transport_id = None;
        self.phase = ViewerPhase::Idle;
        self.signaling.send(ClientMessage::LeaveRoom).await
    }

    pub async fn send_chat(&mut self, text: &str) -> Result<()> {
        if self.muted {
            return Err(ClientError::Muted);
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.signaling
            .send(ClientMessage::ChatSend {
                text: text.to_string(),
            })
            .await?;
        self.chat.push(self.identity.own_chat(text));
        Ok(())
    }

    pub async fn handle(&mut self, message: ServerMessage) -> Result<()> {
        match message {
            ServerMessage::Identified {
                connection_id,
                role,
            } => {
                tracing::info!("Identified as {} with connection {}", role, connection_id);
                self.connection_id = Some(connection_id);
            }
            ServerMessage::WaitingForApproval => {
                if self.phase == ViewerPhase::Connecting {
                    tracing::info!("Waiting for the broadcaster to let us in");
                    self.phase = ViewerPhase::Waiting;
                }
            }
            ServerMessage::EntryAccepted => match self.phase {
                // approval grants a fresh attempt, which the hub now admits
                ViewerPhase::Waiting => self.send_join().await?,
                ViewerPhase::Connecting => {
                    tracing::info!("Admitted, waiting for the stream");
                    self.phase = ViewerPhase::Watching;
                }
                phase => tracing::debug!("Ignoring entry-accepted while {:?}", phase),
            },
            ServerMessage::EntryRefused => {
                tracing::info!("Entry refused");
                self.end(ViewerPhase::Refused).await;
            }
            ServerMessage::RtcOffer { from, sdp } => self.answer(from, sdp).await?,
            ServerMessage::RtcIceCandidate {
                from,
                candidate,
                sdp_mid,
                sdp_mline_index,
            } => match &self.transport {
                Some(transport) if transport.broadcaster() == from => {
                    transport
                        .add_ice_candidate(candidate, sdp_mid, sdp_mline_index)
                        .await?;
                }
                _ => tracing::debug!("Ignoring ICE candidate from {}", from),
            },
            ServerMessage::RoomStatus { live, mode } => {
                self.live = live;
                self.mode = mode;
                if !live && self.phase.is_in_room() {
                    tracing::info!("Broadcast ended");
                    self.end(ViewerPhase::Ended).await;
                }
            }
            ServerMessage::ForceDisconnect { reason } => {
                tracing::info!("Removed from the room: {}", reason);
                self.notice = Some(reason);
                self.end(ViewerPhase::Kicked).await;
            }
            ServerMessage::MuteState { muted } => {
                tracing::info!("Chat {}", if muted { "muted" } else { "unmuted" });
                self.muted = muted;
            }
            ServerMessage::ChatRejected { reason } => {
                self.muted = true;
                self.notice = Some(reason);
            }
            ServerMessage::ChatReceive(chat) => self.chat.push(chat),
            ServerMessage::PresenceUpdate { participants } => self.participants = participants,
            ServerMessage::TransportError { from, message } => {
                tracing::error!("Broadcaster {} reported a transport failure: {}", from, message);
                self.teardown().await;
                self.notice = Some(message);
            }
            ServerMessage::Error { code, message } => {
                tracing::warn!("Server rejected a command ({}): {}", code, message);
                let join_failed = matches!(
                    code,
                    ErrorCode::NoLiveRoom
                        | ErrorCode::RoomFull
                        | ErrorCode::UnknownRoom
                        | ErrorCode::Unauthorized
                );
                if join_failed && self.phase == ViewerPhase::Connecting {
                    self.transport_id = None;
                    self.phase = ViewerPhase::Idle;
                }
                self.notice = Some(message);
            }
            ServerMessage::Pong => {}
            other => tracing::debug!("Ignoring {:?}", other),
        }
        Ok(())
    }

    /// Auto-answer the broadcaster's offer
    async fn answer(&mut self, broadcaster: Uuid, sdp: String) -> Result<()> {
        if !matches!(self.phase, ViewerPhase::Connecting | ViewerPhase::Watching) {
            tracing::warn!("Ignoring offer while {:?}", self.phase);
            return Ok(());
        }
        self.teardown().await;

        match ViewerTransport::answer(&self.rtc, broadcaster, sdp, self.signaling.clone()).await {
            Ok((transport, answer)) => {
                self.transport = Some(transport);
                self.phase = ViewerPhase::Watching;
                self.signaling
                    .send(ClientMessage::RtcAnswer {
                        target: broadcaster,
                        sdp: answer,
                    })
                    .await
            }
            Err(e) => {
                tracing::error!("Could not answer offer: {}", e);
                let report = ClientMessage::TransportError {
                    target: broadcaster,
                    message: e.to_string(),
                };
                if self.signaling.send(report).await.is_err() {
                    tracing::debug!("Could not report transport failure, signaling closed");
                }
                Err(e)
            }
        }
    }

    async fn end(&mut self, phase: ViewerPhase) {
        self.teardown().await;
        self.transport_id = None;
        self.phase = phase;
    }

    async fn teardown(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
    }

    pub async fn shutdown(&mut self) {
        let was_in_room = self.phase.is_in_room();
        self.teardown().await;
        if was_in_room && self.signaling.send(ClientMessage::LeaveRoom).await.is_err() {
            tracing::debug!("Leave during shutdown not delivered");
        }
    }
}
