use livelab_media::{
    Compositor, CompositorConfig, EncoderFactory, MediaDevices, PipPosition, SourceKind,
};
use livelab_protocol::{
    AdmissionMode, ChatMessageData, ClientMessage, Decision, ErrorCode, ParticipantData,
    PendingRequestData, Role, ServerMessage,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

use super::Identity;
use crate::error::Result;
use crate::network::SignalingSender;
use crate::transport::{Fanout, RtcApi};

/// Capture and encoding backends for a broadcaster
pub struct BroadcasterMedia {
    pub devices: Arc<dyn MediaDevices>,
    pub encoders: Arc<dyn EncoderFactory>,
    pub compositor: CompositorConfig,
}

pub struct BroadcasterSession {
    identity: Identity,
    signaling: SignalingSender,
    devices: Arc<dyn MediaDevices>,
    compositor: Compositor,
    fanout: Fanout,
    connection_id: Option<Uuid>,
    live: bool,
    /// Set once the hub has reported the room live for the current session
    live_confirmed: bool,
    mode: AdmissionMode,
    /// Join requests in arrival order
    pending: VecDeque<PendingRequestData>,
    spectators: Vec<ParticipantData>,
    chat: Vec<ChatMessageData>,
    last_error: Option<String>,
}

impl BroadcasterSession {
    pub fn new(
        identity: Identity,
        signaling: SignalingSender,
        rtc: Arc<RtcApi>,
        media: BroadcasterMedia,
    ) -> Self {
        let compositor = Compositor::new(media.compositor);
        let fanout = Fanout::new(rtc, signaling.clone(), &compositor, media.encoders);

        Self {
            identity,
            signaling,
            devices: media.devices,
            compositor,
            fanout,
            connection_id: None,
            live: false,
            live_confirmed: false,
            mode: AdmissionMode::default(),
            pending: VecDeque::new(),
            spectators: Vec::new(),
            chat: Vec::new(),
            last_error: None,
        }
    }

    pub async fn identify(&self) -> Result<()> {
        self.signaling.send(self.identity.identify_message()).await
    }

    pub fn connection_id(&self) -> Option<Uuid> {
        self.connection_id
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn mode(&self) -> AdmissionMode {
        self.mode
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingRequestData> {
        self.pending.iter()
    }

    pub fn spectators(&self) -> &[ParticipantData] {
        &self.spectators
    }

    pub fn chat_log(&self) -> &[ChatMessageData] {
        &self.chat
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn fanout(&self) -> &Fanout {
        &self.fanout
    }

    pub fn pip(&self) -> PipPosition {
        self.compositor.pip()
    }

    /// Start capture and compositing, then announce the room as live.
    /// Missing camera or microphone is reported but does not abort.
    pub async fn go_live(&mut self, mode: AdmissionMode) -> Result<()> {
        if self.compositor.source(SourceKind::Camera).is_none() {
            if let Err(e) = self.toggle_source(SourceKind::Camera).await {
                tracing::warn!("Going live without camera: {}", e);
                self.last_error = Some(e.to_string());
            }
        }

        if !self.fanout.has_microphone() {
            match self.devices.open_microphone().await {
                Ok(microphone) => self.fanout.attach_microphone(microphone),
                Err(e) => tracing::warn!("Microphone unavailable, continuing video-only: {}", e),
            }
        }

        self.compositor.start();
        self.signaling
            .send(ClientMessage::SetRoomMode { live: true, mode })
            .await?;

        self.live = true;
        self.live_confirmed = false;
        self.mode = mode;
        tracing::info!("Live in {:?} mode", mode);
        Ok(())
    }

    pub async fn set_mode(&mut self, mode: AdmissionMode) -> Result<()> {
        self.signaling
            .send(ClientMessage::SetRoomMode {
                live: self.live,
                mode,
            })
            .await?;
        self.mode = mode;
        Ok(())
    }

    /// End the session; local teardown happens even if the hub is unreachable
    pub async fn stop(&mut self) -> Result<()> {
        let announced = self
            .signaling
            .send(ClientMessage::SetRoomMode {
                live: false,
                mode: self.mode,
            })
            .await;

        self.teardown().await;
        tracing::info!("Session stopped");
        announced
    }

    async fn teardown(&mut self) {
        self.live = false;
        self.live_confirmed = false;
        self.fanout.close_all().await;
        self.compositor.stop();
        self.release_source(SourceKind::Camera);
        self.release_source(SourceKind::Screen);
        self.fanout.detach_microphone();
        self.pending.clear();
        self.spectators.clear();
    }

    /// Returns whether the camera is now on
    pub async fn toggle_camera(&mut self) -> Result<bool> {
        self.toggle_source(SourceKind::Camera).await
    }

    /// Returns whether screen sharing is now on
    pub async fn toggle_screen_share(&mut self) -> Result<bool> {
        self.toggle_source(SourceKind::Screen).await
    }

    /// Returns whether the microphone is now on
    pub async fn toggle_microphone(&mut self) -> Result<bool> {
        if self.fanout.detach_microphone() {
            tracing::info!("Microphone off");
            return Ok(false);
        }
        let microphone = self.devices.open_microphone().await?;
        self.fanout.attach_microphone(microphone);
        tracing::info!("Microphone on");
        Ok(true)
    }

    async fn toggle_source(&mut self, kind: SourceKind) -> Result<bool> {
        if self.release_source(kind) {
            tracing::info!("{} off", kind);
            return Ok(false);
        }

        let handle = match kind {
            SourceKind::Camera => self.devices.open_camera().await?,
            SourceKind::Screen => self.devices.open_screen().await?,
        };
        self.compositor.set_source(kind, Some(handle));
        tracing::info!("{} on", kind);
        Ok(true)
    }

    fn release_source(&self, kind: SourceKind) -> bool {
        match self.compositor.set_source(kind, None) {
            Some(handle) => {
                handle.end();
                true
            }
            None => false,
        }
    }

    /// Pointer position in canvas pixels at the PIP centre
    pub fn drag_pip(&self, pointer_x: f32, pointer_y: f32) {
        self.compositor.drag_pip(pointer_x, pointer_y);
    }

    pub async fn decide(&mut self, connection_id: Uuid, decision: Decision) -> Result<()> {
        self.pending.retain(|p| p.connection_id != connection_id);
        self.signaling
            .send(ClientMessage::AdmissionDecision {
                connection_id,
                decision,
            })
            .await
    }

    pub async fn kick(&mut self, connection_id: Uuid) -> Result<()> {
        self.spectators.retain(|p| p.connection_id != connection_id);
        self.fanout.close(connection_id).await;
        self.signaling
            .send(ClientMessage::Kick { connection_id })
            .await
    }

    pub async fn mute(&mut self, connection_id: Uuid) -> Result<()> {
        if let Some(spectator) = self
            .spectators
            .iter_mut()
            .find(|p| p.connection_id == connection_id)
        {
            spectator.muted = !spectator.muted;
        }
        self.signaling
            .send(ClientMessage::Mute { connection_id })
            .await
    }

    pub async fn send_chat(&mut self, text: &str) -> Result<()> {
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
            ServerMessage::RoomStatus { live, mode } => {
                if self.live && !live {
                    // status queued before our go-live reached the hub
                    if !self.live_confirmed {
                        tracing::debug!("Ignoring offline status sent before going live");
                        return Ok(());
                    }
                    tracing::warn!("Room went offline underneath the session");
                    self.teardown().await;
                }
                self.live = live;
                self.live_confirmed = live;
                self.mode = mode;
            }
            ServerMessage::JoinRequest {
                connection_id,
                name,
            } => {
                if !self.pending.iter().any(|p| p.connection_id == connection_id) {
                    tracing::info!("{} asks to join", name);
                    self.pending.push_back(PendingRequestData {
                        connection_id,
                        name,
                    });
                }
            }
            ServerMessage::ViewerJoined {
                connection_id,
                transport_id,
                name,
            } => {
                tracing::info!("{} joined, opening transport", name);
                self.pending.retain(|p| p.connection_id != connection_id);
                self.open_transport(connection_id, &transport_id).await?;
            }
            ServerMessage::ViewerLeft { connection_id } => {
                self.fanout.close(connection_id).await;
                self.pending.retain(|p| p.connection_id != connection_id);
                self.spectators.retain(|p| p.connection_id != connection_id);
            }
            ServerMessage::RtcAnswer { from, sdp } => {
                self.fanout.apply_answer(from, sdp).await?;
            }
            ServerMessage::RtcIceCandidate {
                from,
                candidate,
                sdp_mid,
                sdp_mline_index,
            } => {
                self.fanout
                    .add_ice_candidate(from, candidate, sdp_mid, sdp_mline_index)
                    .await?;
            }
            ServerMessage::TransportError { from, message } => {
                tracing::warn!("Viewer {} reported a transport failure: {}", from, message);
                self.fanout.close(from).await;
            }
            ServerMessage::ChatReceive(chat) => self.chat.push(chat),
            ServerMessage::PresenceUpdate { participants } => {
                let online: HashSet<Uuid> = participants.iter().map(|p| p.connection_id).collect();
                self.pending.retain(|p| online.contains(&p.connection_id));
                self.spectators = participants
                    .into_iter()
                    .filter(|p| p.role == Role::Viewer && p.in_room)
                    .collect();
            }
            ServerMessage::Error { code, message } => {
                tracing::warn!("Server rejected a command ({}): {}", code, message);
                if code == ErrorCode::LockConflict {
                    self.live = false;
                    self.live_confirmed = false;
                }
                self.last_error = Some(message);
            }
            ServerMessage::Pong => {}
            other => tracing::debug!("Ignoring {:?}", other),
        }
        Ok(())
    }

    async fn open_transport(&mut self, viewer: Uuid, transport_id: &str) -> Result<()> {
        match self.fanout.open(viewer, transport_id).await {
            Ok(sdp) => {
                self.signaling
                    .send(ClientMessage::RtcOffer { target: viewer, sdp })
                    .await
            }
            Err(e) => {
                tracing::error!("Could not open transport for viewer {}: {}", viewer, e);
                let report = ClientMessage::TransportError {
                    target: viewer,
                    message: e.to_string(),
                };
                if self.signaling.send(report).await.is_err() {
                    tracing::debug!("Could not report transport failure, signaling closed");
                }
                Err(e)
            }
        }
    }

    pub async fn shutdown(&mut self) {
        if self.live {
            if let Err(e) = self.stop().await {
                tracing::debug!("Stop during shutdown: {}", e);
            }
        } else {
            self.teardown().await;
        }
    }
}
